//! Common test utilities for integration tests.
//!
//! Provides builders for kernel-shaped nl80211 messages and a recording
//! test double for every kernel-facing collaborator trait.

use std::sync::{Arc, Mutex};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use wificond::Result;
use wificond::netlink::MessageBuilder;
use wificond::netlink::genl::GenlMsgHdr;
use wificond::nl80211::{
    InterfaceMode, Nl80211Attr, Nl80211Cmd, ScanRequest, ScanResult, ScheduledScanRequest,
};
use wificond::session::{HostapdControl, InterfaceCommands, LinkControl, ScanCommands};

/// Family ID used for nl80211 in hand-built messages.
pub const FAMILY_ID: u16 = 0x1c;

/// Install a tracing subscriber that writes through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("wificond=debug")
        .try_init();
}

/// Layer that keeps the level of every event logged by this crate.
#[derive(Clone, Default)]
pub struct LevelRecorder(Arc<Mutex<Vec<Level>>>);

impl LevelRecorder {
    pub fn count(&self, level: Level) -> usize {
        self.0.lock().unwrap().iter().filter(|l| **l == level).count()
    }
}

impl<S: Subscriber> Layer<S> for LevelRecorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with("wificond") {
            self.0.lock().unwrap().push(*meta.level());
        }
    }
}

/// Run `f` under a subscriber that records log levels, on this thread only.
pub fn record_levels<R>(f: impl FnOnce() -> R) -> (R, LevelRecorder) {
    let recorder = LevelRecorder::default();
    let subscriber = tracing_subscriber::registry().with(recorder.clone());
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, recorder)
}

/// Build one nl80211 message.
pub fn message(cmd: Nl80211Cmd, attrs: impl FnOnce(&mut MessageBuilder)) -> Vec<u8> {
    let mut builder = MessageBuilder::new(FAMILY_ID, 0);
    builder.append(&GenlMsgHdr::new(cmd as u8, 1));
    attrs(&mut builder);
    builder.finish().unwrap()
}

/// `NL80211_CMD_CONNECT` with an optional status code.
pub fn connect(ifindex: u32, bssid: [u8; 6], status: Option<u16>) -> Vec<u8> {
    message(Nl80211Cmd::Connect, |b| {
        b.append_attr_u32(Nl80211Attr::Ifindex as u16, ifindex);
        b.append_attr(Nl80211Attr::Mac as u16, &bssid);
        if let Some(status) = status {
            b.append_attr_u16(Nl80211Attr::StatusCode as u16, status);
        }
    })
}

/// Scan notification (`NEW_SCAN_RESULTS`, `SCAN_ABORTED`, ...).
pub fn scan(cmd: Nl80211Cmd, ifindex: u32) -> Vec<u8> {
    message(cmd, |b| b.append_attr_u32(Nl80211Attr::Ifindex as u16, ifindex))
}

/// `NL80211_CMD_NEW_STATION` / `NL80211_CMD_DEL_STATION`.
pub fn station(cmd: Nl80211Cmd, ifindex: u32, mac: [u8; 6]) -> Vec<u8> {
    message(cmd, |b| {
        b.append_attr_u32(Nl80211Attr::Ifindex as u16, ifindex);
        b.append_attr(Nl80211Attr::Mac as u16, &mac);
    })
}

/// `NL80211_CMD_DEL_INTERFACE`.
pub fn del_interface(ifindex: u32) -> Vec<u8> {
    message(Nl80211Cmd::DelInterface, |b| {
        b.append_attr_u32(Nl80211Attr::Ifindex as u16, ifindex)
    })
}

/// Concatenate messages into one receive buffer.
pub fn batch(messages: &[Vec<u8>]) -> Vec<u8> {
    messages.concat()
}

/// Records every kernel-facing call.
#[derive(Default)]
pub struct FakeKernel {
    calls: Mutex<Vec<String>>,
}

impl FakeKernel {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ScanCommands for FakeKernel {
    async fn trigger_scan(&self, ifindex: u32, request: &ScanRequest) -> Result<()> {
        self.record(format!("trigger_scan {} ssids={}", ifindex, request.ssids.len()));
        Ok(())
    }

    async fn start_scheduled_scan(
        &self,
        ifindex: u32,
        _request: &ScheduledScanRequest,
    ) -> Result<()> {
        self.record(format!("start_scheduled_scan {}", ifindex));
        Ok(())
    }

    async fn stop_scheduled_scan(&self, ifindex: u32) -> Result<()> {
        self.record(format!("stop_scheduled_scan {}", ifindex));
        Ok(())
    }

    async fn get_scan_results(&self, ifindex: u32) -> Result<Vec<ScanResult>> {
        self.record(format!("get_scan_results {}", ifindex));
        Ok(Vec::new())
    }
}

impl InterfaceCommands for FakeKernel {
    async fn set_interface_mode(&self, ifindex: u32, mode: InterfaceMode) -> Result<()> {
        self.record(format!("set_interface_mode {} {:?}", ifindex, mode));
        Ok(())
    }
}

impl HostapdControl for FakeKernel {
    async fn start_hostapd(&self) -> Result<()> {
        self.record("start_hostapd".to_string());
        Ok(())
    }

    async fn stop_hostapd(&self) -> Result<()> {
        self.record("stop_hostapd".to_string());
        Ok(())
    }
}

impl LinkControl for FakeKernel {
    async fn set_up_state(&self, ifname: &str, up: bool) -> Result<()> {
        self.record(format!("set_up_state {} {}", ifname, up));
        Ok(())
    }
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Skip the test if not running as root.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}
