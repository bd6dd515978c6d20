//! Scan command - trigger a one-shot scan and print the results.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use wificond::dispatch::Dispatcher;
use wificond::nl80211::{
    BandInfo, NL80211_MULTICAST_GROUP_CONFIG, NL80211_MULTICAST_GROUP_SCAN, Nl80211Connection,
    Nl80211EventSocket, ScanCapabilities, ScanSettings, WiphyFeatures,
};
use wificond::session::{ScanEventHandler, ScannerSession};
use wificond::{Error, Result};

use crate::output::print_scan_results;

#[derive(Args)]
pub struct ScanArgs {
    /// Interface index to scan on
    #[arg(long)]
    pub ifindex: u32,

    /// Frequency to scan in MHz (repeatable)
    #[arg(long = "freq")]
    pub frequencies: Vec<u32>,

    /// Hidden network SSID to scan for (repeatable)
    #[arg(long = "ssid")]
    pub ssids: Vec<String>,

    /// Randomize the scan source address
    #[arg(long)]
    pub random_mac: bool,

    /// Seconds to wait for the scan to finish
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
}

/// Forwards scan completion to the command loop.
struct Completion(mpsc::UnboundedSender<bool>);

impl ScanEventHandler for Completion {
    fn on_scan_result_ready(&self) {
        let _ = self.0.send(true);
    }

    fn on_scan_failed(&self) {
        let _ = self.0.send(false);
    }
}

pub async fn run(args: ScanArgs, json: bool) -> Result<()> {
    // Join before triggering so the completion event cannot be missed
    let mut events = Nl80211EventSocket::with_groups(&[
        NL80211_MULTICAST_GROUP_SCAN,
        NL80211_MULTICAST_GROUP_CONFIG,
    ])
    .await?;
    let commands = Arc::new(Nl80211Connection::new().await?);

    let scanner = Arc::new(ScannerSession::new(
        args.ifindex,
        commands,
        ScanCapabilities::default(),
        WiphyFeatures {
            supports_random_mac_oneshot_scan: args.random_mac,
            supports_random_mac_sched_scan: false,
        },
        BandInfo::default(),
    ));

    let (tx, mut done) = mpsc::unbounded_channel();
    scanner.subscribe_scan_events(Arc::new(Completion(tx)))?;

    let dispatcher = Dispatcher::new();
    dispatcher.register(scanner.clone())?;

    let settings = ScanSettings {
        frequencies: args.frequencies,
        hidden_ssids: args.ssids.into_iter().map(String::into_bytes).collect(),
    };
    scanner.scan(&settings).await?;

    let deadline = tokio::time::sleep(Duration::from_secs(args.timeout));
    tokio::pin!(deadline);

    let succeeded = loop {
        tokio::select! {
            Some(ok) = done.recv() => break ok,
            Some(packet) = events.next() => {
                dispatcher.dispatch_packet(&packet?);
                if !scanner.is_valid() {
                    return Err(Error::InterfaceInvalidated { ifindex: args.ifindex });
                }
            }
            _ = &mut deadline => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "timed out waiting for scan results",
                )));
            }
        }
    };

    if !succeeded {
        return Err(Error::Io(io::Error::other("scan aborted by the kernel")));
    }

    let mut results = scanner.scan_results().await?;
    print_scan_results(&mut results, json)?;

    dispatcher.tear_down_all();
    Ok(())
}
