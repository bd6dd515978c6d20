//! Decode → dispatch → session tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use std::sync::Mutex;

use wificond::Error;
use wificond::dispatch::{DispatchOutcome, Dispatcher, InterfaceEventHandler, MlmeEventHandler};
use wificond::nl80211::{
    BandInfo, ConnectEvent, Nl80211Cmd, PnoSettings, ScanCapabilities, ScanSettings,
    WiphyFeatures,
};
use wificond::session::{
    ApEventHandler, ApSession, ScanEventHandler, ScannerSession, SessionRole,
};

use crate::common::{self, FakeKernel, batch, connect, del_interface, scan, station};

const BSSID: [u8; 6] = [0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0xee];

#[derive(Default)]
struct ScanCounter {
    ready: AtomicUsize,
    failed: AtomicUsize,
}

impl ScanEventHandler for ScanCounter {
    fn on_scan_result_ready(&self) {
        self.ready.fetch_add(1, Ordering::SeqCst);
    }

    fn on_scan_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct StatusRecorder(AtomicU32);

impl MlmeEventHandler for StatusRecorder {
    fn on_connect(&self, event: &ConnectEvent) {
        self.0.store(u32::from(event.status_code) + 1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct StationCount(AtomicU32);

impl ApEventHandler for StationCount {
    fn on_number_of_associated_stations_changed(&self, count: u32) {
        self.0.store(count, Ordering::SeqCst);
    }
}

fn scanner(ifindex: u32, kernel: &Arc<FakeKernel>) -> Arc<ScannerSession<FakeKernel>> {
    Arc::new(ScannerSession::new(
        ifindex,
        kernel.clone(),
        ScanCapabilities::default(),
        WiphyFeatures::default(),
        BandInfo {
            band_2g: vec![2412],
            band_5g: vec![5180],
            band_dfs: Vec::new(),
        },
    ))
}

#[test]
fn test_scan_events_route_by_ifindex() {
    common::init_tracing();

    let kernel = Arc::new(FakeKernel::default());
    let dispatcher = Dispatcher::with_interface_limit(2);
    let wlan0 = scanner(3, &kernel);
    let wlan1 = scanner(4, &kernel);
    dispatcher.register(wlan0.clone()).unwrap();
    dispatcher.register(wlan1.clone()).unwrap();

    let counter0 = Arc::new(ScanCounter::default());
    let counter1 = Arc::new(ScanCounter::default());
    wlan0.subscribe_scan_events(counter0.clone()).unwrap();
    wlan1.subscribe_scan_events(counter1.clone()).unwrap();

    let outcomes = dispatcher.dispatch_buffer(&batch(&[
        scan(Nl80211Cmd::NewScanResults, 3),
        scan(Nl80211Cmd::ScanAborted, 4),
        scan(Nl80211Cmd::NewScanResults, 9),
    ]));

    assert_eq!(
        outcomes,
        vec![
            DispatchOutcome::Delivered { interface_index: 3 },
            DispatchOutcome::Delivered { interface_index: 4 },
            DispatchOutcome::Unmanaged { interface_index: 9 },
        ]
    );
    assert_eq!(counter0.ready.load(Ordering::SeqCst), 1);
    assert_eq!(counter0.failed.load(Ordering::SeqCst), 0);
    assert_eq!(counter1.ready.load(Ordering::SeqCst), 0);
    assert_eq!(counter1.failed.load(Ordering::SeqCst), 1);
    assert!(kernel.calls().is_empty());
}

#[tokio::test]
async fn test_interface_removal_invalidates_scanner() {
    common::init_tracing();

    let kernel = Arc::new(FakeKernel::default());
    let dispatcher = Dispatcher::new();
    let wlan0 = scanner(3, &kernel);
    dispatcher.register(wlan0.clone()).unwrap();

    wlan0.scan(&ScanSettings::new()).await.unwrap();
    assert_eq!(kernel.calls(), vec!["trigger_scan 3 ssids=1"]);

    let outcomes = dispatcher.dispatch_buffer(&del_interface(3));
    assert_eq!(
        outcomes,
        vec![DispatchOutcome::InterfaceRemoved {
            interface_index: 3,
            had_session: true,
        }]
    );

    assert!(!wlan0.is_valid());
    assert!(wlan0.scan(&ScanSettings::new()).await.unwrap_err().is_invalidated());
    assert!(wlan0.scan_results().await.unwrap_err().is_invalidated());
    assert!(
        wlan0
            .start_pno_scan(&PnoSettings::new())
            .await
            .unwrap_err()
            .is_invalidated()
    );
    assert!(wlan0.available_2g_channels().unwrap_err().is_invalidated());

    // Only the call made before removal reached the kernel
    assert_eq!(kernel.calls().len(), 1);
}

#[test]
fn test_events_after_removal_are_unmanaged() {
    let kernel = Arc::new(FakeKernel::default());
    let dispatcher = Dispatcher::new();
    let wlan0 = scanner(3, &kernel);
    let counter = Arc::new(ScanCounter::default());
    wlan0.subscribe_scan_events(counter.clone()).unwrap();
    dispatcher.register(wlan0).unwrap();

    let outcomes = dispatcher.dispatch_buffer(&batch(&[
        del_interface(3),
        scan(Nl80211Cmd::NewScanResults, 3),
    ]));
    assert_eq!(outcomes[1], DispatchOutcome::Unmanaged { interface_index: 3 });
    assert_eq!(counter.ready.load(Ordering::SeqCst), 0);
}

#[test]
fn test_mlme_handler_sees_connect_status() {
    common::init_tracing();

    let dispatcher = Dispatcher::new();
    let recorder = Arc::new(StatusRecorder::default());
    dispatcher.subscribe_mlme(3, recorder.clone());

    dispatcher.dispatch_buffer(&connect(3, BSSID, Some(17)));
    assert_eq!(recorder.0.load(Ordering::SeqCst), 18);

    dispatcher.dispatch_buffer(&connect(3, BSSID, None));
    assert_eq!(recorder.0.load(Ordering::SeqCst), 1);

    // Other interfaces do not reach this handler
    dispatcher.dispatch_buffer(&connect(4, BSSID, Some(40)));
    assert_eq!(recorder.0.load(Ordering::SeqCst), 1);
}

#[test]
fn test_malformed_message_does_not_stop_batch() {
    common::init_tracing();

    let dispatcher = Dispatcher::new();
    let recorder = Arc::new(StatusRecorder::default());
    dispatcher.subscribe_mlme(3, recorder.clone());

    let mut bad = connect(3, BSSID, Some(2));
    // Break the first attribute's length so the message fails to parse
    bad[20..22].copy_from_slice(&2u16.to_ne_bytes());

    let outcomes = dispatcher.dispatch_buffer(&batch(&[bad, connect(3, BSSID, Some(5))]));
    assert_eq!(outcomes, vec![DispatchOutcome::Delivered { interface_index: 3 }]);
    assert_eq!(recorder.0.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_ap_session_counts_stations() {
    common::init_tracing();

    let kernel = Arc::new(FakeKernel::default());
    let dispatcher = Dispatcher::new();
    let ap = Arc::new(ApSession::new(
        "wlan1",
        7,
        BandInfo::default(),
        kernel.clone(),
        kernel.clone(),
        kernel.clone(),
    ));
    let count = Arc::new(StationCount::default());
    ap.subscribe(count.clone()).unwrap();
    dispatcher.register(ap.clone()).unwrap();

    ap.start_hostapd().await.unwrap();
    dispatcher.dispatch_buffer(&batch(&[
        station(Nl80211Cmd::NewStation, 7, [2, 0, 0, 0, 0, 1]),
        station(Nl80211Cmd::NewStation, 7, [2, 0, 0, 0, 0, 2]),
        station(Nl80211Cmd::DelStation, 7, [2, 0, 0, 0, 0, 1]),
    ]));
    assert_eq!(ap.number_of_associated_stations().unwrap(), 1);
    assert_eq!(count.0.load(Ordering::SeqCst), 1);

    ap.stop_hostapd().await.unwrap();
    assert_eq!(
        kernel.calls(),
        vec![
            "start_hostapd",
            "stop_hostapd",
            "set_up_state wlan1 false",
            "set_interface_mode 7 Station",
        ]
    );

    dispatcher.tear_down_all();
    assert!(ap.start_hostapd().await.unwrap_err().is_invalidated());
    assert_eq!(kernel.calls().len(), 4);
}

#[derive(Default)]
struct InterfaceLog(Mutex<Vec<String>>);

impl InterfaceEventHandler for InterfaceLog {
    fn on_interface_ready(&self, ifindex: u32, role: SessionRole) {
        self.0.lock().unwrap().push(format!("ready {} {:?}", ifindex, role));
    }

    fn on_interface_torn_down(&self, ifindex: u32, role: SessionRole) {
        self.0.lock().unwrap().push(format!("torn_down {} {:?}", ifindex, role));
    }
}

#[test]
fn test_one_interface_at_a_time() {
    common::init_tracing();

    let kernel = Arc::new(FakeKernel::default());
    let dispatcher = Dispatcher::new();
    let log = Arc::new(InterfaceLog::default());
    dispatcher.subscribe_interface_events(log.clone());

    let wlan0 = scanner(3, &kernel);
    dispatcher.register(wlan0.clone()).unwrap();

    let ap = Arc::new(ApSession::new(
        "wlan1",
        7,
        BandInfo::default(),
        kernel.clone(),
        kernel.clone(),
        kernel.clone(),
    ));
    assert!(matches!(
        dispatcher.register(ap.clone()),
        Err(Error::TooManyInterfaces { limit: 1 })
    ));
    assert!(ap.is_valid());
    assert!(dispatcher.sessions_by_role(SessionRole::Ap).is_empty());
    assert_eq!(dispatcher.sessions_by_role(SessionRole::Scanner).len(), 1);

    // Kernel removal frees the slot for the AP
    dispatcher.dispatch_buffer(&del_interface(3));
    dispatcher.register(ap.clone()).unwrap();
    assert_eq!(dispatcher.sessions_by_role(SessionRole::Ap).len(), 1);

    dispatcher.tear_down_all();
    assert_eq!(
        *log.0.lock().unwrap(),
        vec![
            "ready 3 Scanner",
            "torn_down 3 Scanner",
            "ready 7 Ap",
            "torn_down 7 Ap",
        ]
    );
    assert!(!ap.is_valid());
}
