//! Access point session.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, warn};

use super::{
    HostapdControl, InterfaceCommands, Lifecycle, LinkControl, ManagedInterface, SessionRole,
};
use crate::netlink::error::Result;
use crate::nl80211::{BandInfo, InterfaceMode, Nl80211Event, StationEvent, StationEventKind};

/// Receives AP state notifications.
pub trait ApEventHandler: Send + Sync {
    /// The number of associated stations changed.
    fn on_number_of_associated_stations_changed(&self, count: u32);
}

/// Access point bound to one interface.
pub struct ApSession<H, L, I> {
    interface_name: String,
    lifecycle: Lifecycle,
    band_info: BandInfo,
    hostapd: Arc<H>,
    link: Arc<L>,
    interface: Arc<I>,
    associated_stations: AtomicU32,
    handler: Mutex<Option<Arc<dyn ApEventHandler>>>,
}

impl<H, L, I> ApSession<H, L, I>
where
    H: HostapdControl,
    L: LinkControl,
    I: InterfaceCommands,
{
    /// Create an AP session for `interface_name` / `interface_index`.
    ///
    /// `band_info` is the wiphy's channel list, queried once when the
    /// interface is set up.
    pub fn new(
        interface_name: impl Into<String>,
        interface_index: u32,
        band_info: BandInfo,
        hostapd: Arc<H>,
        link: Arc<L>,
        interface: Arc<I>,
    ) -> Self {
        Self {
            interface_name: interface_name.into(),
            lifecycle: Lifecycle::new(interface_index),
            band_info,
            hostapd,
            link,
            interface,
            associated_stations: AtomicU32::new(0),
            handler: Mutex::new(None),
        }
    }

    /// Interface name.
    pub fn interface_name(&self) -> &str {
        &self.interface_name
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

    /// 2.4 GHz channels the AP may use, in MHz.
    pub fn available_2g_channels(&self) -> Result<Vec<u32>> {
        self.lifecycle.check("available_2g_channels")?;
        Ok(self.band_info.band_2g.clone())
    }

    /// 5 GHz channels without radar detection requirements, in MHz.
    pub fn available_5g_non_dfs_channels(&self) -> Result<Vec<u32>> {
        self.lifecycle.check("available_5g_non_dfs_channels")?;
        Ok(self.band_info.band_5g.clone())
    }

    /// 5 GHz DFS channels, in MHz.
    pub fn available_dfs_channels(&self) -> Result<Vec<u32>> {
        self.lifecycle.check("available_dfs_channels")?;
        Ok(self.band_info.band_dfs.clone())
    }

    /// Start hostapd on this interface.
    pub async fn start_hostapd(&self) -> Result<()> {
        self.lifecycle.check("start_hostapd")?;
        self.hostapd
            .start_hostapd()
            .await
            .inspect_err(|e| error!(ifname = %self.interface_name, error = %e, "failed to start hostapd"))
    }

    /// Stop hostapd and return the interface to client mode.
    ///
    /// The link is brought down before the mode switch, which the kernel
    /// requires for interfaces that are up.
    pub async fn stop_hostapd(&self) -> Result<()> {
        self.lifecycle.check("stop_hostapd")?;

        self.hostapd
            .stop_hostapd()
            .await
            .inspect_err(|e| error!(error = %e, "failed to stop hostapd"))?;

        self.link
            .set_up_state(&self.interface_name, false)
            .await
            .inspect_err(|e| error!(ifname = %self.interface_name, error = %e, "failed to bring interface down"))?;

        self.interface
            .set_interface_mode(self.interface_index(), InterfaceMode::Station)
            .await
            .inspect_err(|e| error!(error = %e, "failed to set interface back to station mode"))?;

        self.associated_stations.store(0, Ordering::Release);
        info!(ifname = %self.interface_name, "hostapd stopped");
        Ok(())
    }

    /// Number of stations currently associated with the AP.
    pub fn number_of_associated_stations(&self) -> Result<u32> {
        self.lifecycle.check("number_of_associated_stations")?;
        Ok(self.associated_stations.load(Ordering::Acquire))
    }

    /// Register the AP event handler, replacing any existing one.
    pub fn subscribe(&self, handler: Arc<dyn ApEventHandler>) -> Result<()> {
        self.lifecycle.check("subscribe")?;
        let previous = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handler);
        if previous.is_some() {
            warn!(ifname = %self.interface_name, "replacing existing ap event handler");
        }
        Ok(())
    }

    /// Remove the AP event handler.
    pub fn unsubscribe(&self) -> Result<()> {
        self.lifecycle.check("unsubscribe")?;
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }

    fn on_station_event(&self, event: &StationEvent) {
        let count = match event.kind {
            StationEventKind::New => self.associated_stations.fetch_add(1, Ordering::AcqRel) + 1,
            StationEventKind::Del => {
                // Stations that joined before we started watching can leave
                let previous = self
                    .associated_stations
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
                    .unwrap_or(0);
                previous.saturating_sub(1)
            }
        };
        debug!(
            ifname = %self.interface_name,
            mac = %event.mac,
            count,
            "associated stations changed"
        );

        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler.on_number_of_associated_stations_changed(count);
        }
    }
}

impl<H, L, I> ManagedInterface for ApSession<H, L, I>
where
    H: HostapdControl + Send + Sync,
    L: LinkControl + Send + Sync,
    I: InterfaceCommands + Send + Sync,
{
    fn interface_index(&self) -> u32 {
        self.lifecycle.interface_index()
    }

    fn role(&self) -> SessionRole {
        SessionRole::Ap
    }

    fn is_valid(&self) -> bool {
        self.lifecycle.is_valid()
    }

    fn invalidate(&self) {
        self.lifecycle.invalidate();
    }

    fn handle_event(&self, event: &Nl80211Event) {
        if !self.lifecycle.is_valid() {
            debug!(ifname = %self.interface_name, "invalid ap session ignoring event");
            return;
        }
        if let Nl80211Event::Station(station) = event {
            self.on_station_event(station);
        }
    }
}
