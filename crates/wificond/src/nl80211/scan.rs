//! Scan completion events.

use tracing::warn;

use super::event::{EventDecoder, required};
use super::packet::Packet;
use super::{Nl80211Attr, Nl80211Cmd};
use crate::netlink::attr::AttributeView;
use crate::netlink::error::Result;

/// Which scan notification was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScanKind {
    /// `NEW_SCAN_RESULTS`: a one-shot scan finished.
    Ready,
    /// `SCAN_ABORTED`: a one-shot scan was aborted.
    Aborted,
    /// `SCHED_SCAN_RESULTS`: a scheduled scan found matches.
    ScheduledResults,
    /// `SCHED_SCAN_STOPPED`: the scheduled scan stopped.
    ScheduledStopped,
}

/// A decoded scan notification.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScanEvent {
    pub interface_index: u32,
    pub kind: ScanKind,
    /// SSIDs the scan searched for (one-shot scans only).
    pub ssids: Vec<Vec<u8>>,
    /// Frequencies scanned, in MHz (one-shot scans only).
    pub frequencies: Vec<u32>,
}

impl ScanEvent {
    /// Check if this is a one-shot scan notification.
    pub fn is_one_shot(&self) -> bool {
        matches!(self.kind, ScanKind::Ready | ScanKind::Aborted)
    }

    /// Check if this reports a scan that did not complete.
    pub fn is_aborted(&self) -> bool {
        self.kind == ScanKind::Aborted
    }
}

fn nested_ssids(attr: &AttributeView) -> Result<Vec<Vec<u8>>> {
    Ok(attr
        .nested()?
        .into_iter()
        .map(|ssid| ssid.payload().to_vec())
        .collect())
}

fn nested_frequencies(attr: &AttributeView) -> Result<Vec<u32>> {
    attr.nested()?.iter().map(AttributeView::value).collect()
}

impl EventDecoder {
    /// Decode a one-shot or scheduled scan notification.
    pub fn decode_scan(packet: &Packet) -> Option<ScanEvent> {
        let kind = match Nl80211Cmd::from_u8(packet.command())? {
            Nl80211Cmd::NewScanResults => ScanKind::Ready,
            Nl80211Cmd::ScanAborted => ScanKind::Aborted,
            Nl80211Cmd::SchedScanResults => ScanKind::ScheduledResults,
            Nl80211Cmd::SchedScanStopped => ScanKind::ScheduledStopped,
            _ => return None,
        };
        let interface_index = required(packet, Nl80211Attr::Ifindex, "scan")?;

        let mut ssids = Vec::new();
        let mut frequencies = Vec::new();

        if matches!(kind, ScanKind::Ready | ScanKind::Aborted) {
            if let Some(attr) = packet.attribute(Nl80211Attr::ScanSsids) {
                ssids = nested_ssids(attr).unwrap_or_else(|e| {
                    warn!(error = %e, "malformed NL80211_ATTR_SCAN_SSIDS, ignoring");
                    Vec::new()
                });
            }
            if let Some(attr) = packet.attribute(Nl80211Attr::ScanFrequencies) {
                frequencies = nested_frequencies(attr).unwrap_or_else(|e| {
                    warn!(error = %e, "malformed NL80211_ATTR_SCAN_FREQUENCIES, ignoring");
                    Vec::new()
                });
            }
        }

        Some(ScanEvent {
            interface_index,
            kind,
            ssids,
            frequencies,
        })
    }
}
