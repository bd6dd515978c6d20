//! Event decoding entry point.
//!
//! Every decoder is a pure function of a [`Packet`]: it checks the command
//! code first and returns `None` on mismatch, so decoders can be tried in
//! any order without side effects beyond logging. [`EventDecoder::decode`]
//! is the dispatch table keyed by command code.

use tracing::{error, trace};

use super::mlme::MlmeEvent;
use super::packet::Packet;
use super::scan::ScanEvent;
use super::station::StationEvent;
use super::{Nl80211Attr, Nl80211Cmd};
use crate::netlink::attr::AttrValue;

/// Decoders for kernel-originated nl80211 events.
///
/// The per-family decoders (`decode_connect`, `decode_scan`, ...) live next
/// to their event types.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventDecoder;

/// Any event this crate decodes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Nl80211Event {
    /// Association, connection and roaming results.
    Mlme(MlmeEvent),
    /// Scan completion and scheduled scan notifications.
    Scan(ScanEvent),
    /// Station added to or removed from an AP interface.
    Station(StationEvent),
    /// The kernel removed a network interface.
    InterfaceRemoved {
        /// Index of the removed interface.
        interface_index: u32,
    },
}

impl Nl80211Event {
    /// Interface the event is addressed to.
    pub fn interface_index(&self) -> u32 {
        match self {
            Self::Mlme(event) => event.interface_index(),
            Self::Scan(event) => event.interface_index,
            Self::Station(event) => event.interface_index,
            Self::InterfaceRemoved { interface_index } => *interface_index,
        }
    }
}

impl EventDecoder {
    /// Decode any supported event.
    ///
    /// Returns `None` for commands no decoder claims and for packets that
    /// lack required attributes.
    pub fn decode(packet: &Packet) -> Option<Nl80211Event> {
        let Some(cmd) = Nl80211Cmd::from_u8(packet.command()) else {
            trace!(cmd = packet.command(), "ignoring unknown nl80211 command");
            return None;
        };

        match cmd {
            Nl80211Cmd::Associate
            | Nl80211Cmd::Connect
            | Nl80211Cmd::Roam
            | Nl80211Cmd::Disassociate
            | Nl80211Cmd::Disconnect => Self::decode_mlme(packet).map(Nl80211Event::Mlme),
            Nl80211Cmd::NewScanResults
            | Nl80211Cmd::ScanAborted
            | Nl80211Cmd::SchedScanResults
            | Nl80211Cmd::SchedScanStopped => Self::decode_scan(packet).map(Nl80211Event::Scan),
            Nl80211Cmd::NewStation | Nl80211Cmd::DelStation => {
                Self::decode_station(packet).map(Nl80211Event::Station)
            }
            Nl80211Cmd::DelInterface => Self::decode_interface_removed(packet),
            _ => {
                trace!(?cmd, "no decoder for nl80211 command");
                None
            }
        }
    }

    /// Decode `NL80211_CMD_DEL_INTERFACE`.
    pub fn decode_interface_removed(packet: &Packet) -> Option<Nl80211Event> {
        if packet.command() != Nl80211Cmd::DelInterface as u8 {
            return None;
        }
        let interface_index = required(packet, Nl80211Attr::Ifindex, "interface removed")?;
        Some(Nl80211Event::InterfaceRemoved { interface_index })
    }
}

/// Read an attribute every event of this kind must carry.
///
/// Absent or malformed values are logged at ERROR and yield `None`.
pub(crate) fn required<T: AttrValue>(
    packet: &Packet,
    attr: Nl80211Attr,
    event: &'static str,
) -> Option<T> {
    match packet.get_attribute(attr) {
        Ok(Some(value)) => Some(value),
        Ok(None) => {
            error!(event, attribute = attr.name(), "failed to get required attribute");
            None
        }
        Err(e) => {
            error!(event, attribute = attr.name(), error = %e, "malformed required attribute");
            None
        }
    }
}
