//! Scanner session for a client interface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error};

use super::{Lifecycle, ManagedInterface, ScanCommands, SessionRole};
use crate::netlink::error::{Error, Result};
use crate::nl80211::{
    BandInfo, Nl80211Event, PnoSettings, ScanCapabilities, ScanEvent, ScanKind, ScanRequest,
    ScanResult, ScanSettings, ScheduledScanRequest, WiphyFeatures,
};

/// Receives one-shot scan notifications.
pub trait ScanEventHandler: Send + Sync {
    /// A scan finished and results can be fetched.
    fn on_scan_result_ready(&self);

    /// A scan was aborted.
    fn on_scan_failed(&self);
}

/// Receives scheduled (PNO) scan notifications.
pub trait PnoScanEventHandler: Send + Sync {
    /// A scheduled scan found a matching network.
    fn on_pno_network_found(&self);

    /// A scheduled scan we started was stopped by the driver.
    fn on_pno_scan_failed(&self);
}

type Slot<T> = Mutex<Option<Arc<T>>>;

fn load<T: ?Sized>(slot: &Slot<T>) -> Option<Arc<T>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

fn store<T: ?Sized>(slot: &Slot<T>, value: Option<Arc<T>>) -> Option<Arc<T>> {
    std::mem::replace(&mut *slot.lock().unwrap_or_else(PoisonError::into_inner), value)
}

/// Scanner bound to one client interface.
///
/// Capability snapshots are captured at construction and never change.
pub struct ScannerSession<S> {
    lifecycle: Lifecycle,
    commands: Arc<S>,
    scan_capabilities: ScanCapabilities,
    wiphy_features: WiphyFeatures,
    band_info: BandInfo,
    pno_scan_started: AtomicBool,
    scan_handler: Slot<dyn ScanEventHandler>,
    pno_handler: Slot<dyn PnoScanEventHandler>,
}

impl<S: ScanCommands> ScannerSession<S> {
    /// Create a scanner for `interface_index`.
    pub fn new(
        interface_index: u32,
        commands: Arc<S>,
        scan_capabilities: ScanCapabilities,
        wiphy_features: WiphyFeatures,
        band_info: BandInfo,
    ) -> Self {
        Self {
            lifecycle: Lifecycle::new(interface_index),
            commands,
            scan_capabilities,
            wiphy_features,
            band_info,
            pno_scan_started: AtomicBool::new(false),
            scan_handler: Mutex::new(None),
            pno_handler: Mutex::new(None),
        }
    }

    /// Interface index.
    pub fn interface_index(&self) -> u32 {
        self.lifecycle.interface_index()
    }

    /// Check whether the session is still valid.
    pub fn is_valid(&self) -> bool {
        self.lifecycle.is_valid()
    }

    /// Invalidate the session.
    pub fn invalidate(&self) {
        self.lifecycle.invalidate();
    }

    /// Driver scan limits.
    pub fn scan_capabilities(&self) -> Result<ScanCapabilities> {
        self.lifecycle.check("scan_capabilities")?;
        Ok(self.scan_capabilities)
    }

    /// Available 2.4 GHz channel frequencies.
    pub fn available_2g_channels(&self) -> Result<Vec<u32>> {
        self.lifecycle.check("available_2g_channels")?;
        Ok(self.band_info.band_2g.clone())
    }

    /// Available 5 GHz channel frequencies that do not need DFS.
    pub fn available_5g_non_dfs_channels(&self) -> Result<Vec<u32>> {
        self.lifecycle.check("available_5g_non_dfs_channels")?;
        Ok(self.band_info.band_5g.clone())
    }

    /// Available DFS channel frequencies.
    pub fn available_dfs_channels(&self) -> Result<Vec<u32>> {
        self.lifecycle.check("available_dfs_channels")?;
        Ok(self.band_info.band_dfs.clone())
    }

    /// Start a one-shot scan.
    ///
    /// The wildcard SSID is always scanned for first, followed by the hidden
    /// SSIDs from `settings`.
    pub async fn scan(&self, settings: &ScanSettings) -> Result<()> {
        self.lifecycle.check("scan")?;

        let mut ssids = vec![Vec::new()];
        ssids.extend(settings.hidden_ssids.iter().cloned());

        let request = ScanRequest {
            random_mac: self.wiphy_features.supports_random_mac_oneshot_scan,
            ssids,
            frequencies: settings.frequencies.clone(),
        };

        self.commands
            .trigger_scan(self.interface_index(), &request)
            .await
            .map_err(|e| {
                if e.is_no_device() {
                    error!(
                        ifindex = self.interface_index(),
                        "scan request failed with ENODEV: driver is in a bad state"
                    );
                } else {
                    error!(ifindex = self.interface_index(), error = %e, "failed to start a scan");
                }
                e
            })
    }

    /// Fetch the latest scan results.
    pub async fn scan_results(&self) -> Result<Vec<ScanResult>> {
        self.lifecycle.check("scan_results")?;
        self.commands
            .get_scan_results(self.interface_index())
            .await
            .inspect_err(|e| error!(error = %e, "failed to get scan results via nl80211"))
    }

    /// Start a scheduled (PNO) scan.
    ///
    /// Fails if one is already running. Every network is a match set;
    /// hidden networks are also scanned for directly.
    pub async fn start_pno_scan(&self, settings: &PnoSettings) -> Result<()> {
        self.lifecycle.check("start_pno_scan")?;

        if self.pno_scan_started.load(Ordering::Acquire) {
            error!(ifindex = self.interface_index(), "pno scan already started");
            return Err(Error::InvalidState("pno scan already started".into()));
        }

        let mut scan_ssids = vec![Vec::new()];
        let mut match_ssids = Vec::new();
        for network in &settings.networks {
            match_ssids.push(network.ssid.clone());
            if network.hidden {
                scan_ssids.push(network.ssid.clone());
            }
        }

        // TODO: pass min_5g_rssi once the scheduled scan request carries
        // per-band thresholds.
        let request = ScheduledScanRequest {
            interval_ms: settings.interval_ms,
            rssi_threshold: settings.min_2g_rssi,
            random_mac: self.wiphy_features.supports_random_mac_sched_scan,
            scan_ssids,
            match_ssids,
            frequencies: Vec::new(),
        };

        self.commands
            .start_scheduled_scan(self.interface_index(), &request)
            .await
            .inspect_err(|e| error!(error = %e, "failed to start scheduled scan"))?;

        self.pno_scan_started.store(true, Ordering::Release);
        Ok(())
    }

    /// Stop the scheduled scan started by [`start_pno_scan`](Self::start_pno_scan).
    pub async fn stop_pno_scan(&self) -> Result<()> {
        self.lifecycle.check("stop_pno_scan")?;

        if !self.pno_scan_started.load(Ordering::Acquire) {
            error!(ifindex = self.interface_index(), "no pno scan started");
            return Err(Error::InvalidState("no pno scan started".into()));
        }

        self.commands
            .stop_scheduled_scan(self.interface_index())
            .await?;

        self.pno_scan_started.store(false, Ordering::Release);
        Ok(())
    }

    /// Check whether a scheduled scan started by this session is running.
    pub fn is_pno_scan_started(&self) -> bool {
        self.pno_scan_started.load(Ordering::Acquire)
    }

    /// Register the one-shot scan handler, replacing any existing one.
    pub fn subscribe_scan_events(&self, handler: Arc<dyn ScanEventHandler>) -> Result<()> {
        self.lifecycle.check("subscribe_scan_events")?;
        if store(&self.scan_handler, Some(handler)).is_some() {
            error!("found existing scan events subscriber, replacing it");
        }
        Ok(())
    }

    /// Remove the one-shot scan handler.
    pub fn unsubscribe_scan_events(&self) -> Result<()> {
        self.lifecycle.check("unsubscribe_scan_events")?;
        store(&self.scan_handler, None);
        Ok(())
    }

    /// Register the scheduled scan handler, replacing any existing one.
    pub fn subscribe_pno_scan_events(&self, handler: Arc<dyn PnoScanEventHandler>) -> Result<()> {
        self.lifecycle.check("subscribe_pno_scan_events")?;
        if store(&self.pno_handler, Some(handler)).is_some() {
            error!("found existing pno scan events subscriber, replacing it");
        }
        Ok(())
    }

    /// Remove the scheduled scan handler.
    pub fn unsubscribe_pno_scan_events(&self) -> Result<()> {
        self.lifecycle.check("unsubscribe_pno_scan_events")?;
        store(&self.pno_handler, None);
        Ok(())
    }

    fn on_scan_event(&self, event: &ScanEvent) {
        match event.kind {
            ScanKind::Ready | ScanKind::Aborted => {
                let Some(handler) = load(&self.scan_handler) else {
                    return;
                };
                if event.is_aborted() {
                    handler.on_scan_failed();
                } else {
                    handler.on_scan_result_ready();
                }
            }
            ScanKind::ScheduledResults => {
                if let Some(handler) = load(&self.pno_handler) {
                    handler.on_pno_network_found();
                }
            }
            ScanKind::ScheduledStopped => {
                // Only a scan we started and have not stopped counts as failed;
                // otherwise this is the echo of our own stop request.
                let was_started = self.pno_scan_started.swap(false, Ordering::AcqRel);
                if let (true, Some(handler)) = (was_started, load(&self.pno_handler)) {
                    handler.on_pno_scan_failed();
                }
            }
        }
    }
}

impl<S: ScanCommands + Send + Sync> ManagedInterface for ScannerSession<S> {
    fn interface_index(&self) -> u32 {
        self.lifecycle.interface_index()
    }

    fn role(&self) -> SessionRole {
        SessionRole::Scanner
    }

    fn is_valid(&self) -> bool {
        self.lifecycle.is_valid()
    }

    fn invalidate(&self) {
        self.lifecycle.invalidate();
    }

    fn handle_event(&self, event: &Nl80211Event) {
        if !self.lifecycle.is_valid() {
            debug!(ifindex = self.interface_index(), "invalid scanner ignoring event");
            return;
        }
        if let Nl80211Event::Scan(scan) = event {
            self.on_scan_event(scan);
        }
    }
}

impl<S> Drop for ScannerSession<S> {
    fn drop(&mut self) {
        debug!(
            ifindex = self.lifecycle.interface_index(),
            "scanner session dropped"
        );
    }
}
