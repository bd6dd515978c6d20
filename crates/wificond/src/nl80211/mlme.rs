//! MLME events: association, connection, roaming and their teardown.

use tracing::warn;

use super::event::{EventDecoder, required};
use super::packet::Packet;
use super::types::MacAddr;
use super::{Nl80211Attr, Nl80211Cmd};

/// Result of an `NL80211_CMD_ASSOCIATE` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AssociateEvent {
    pub interface_index: u32,
    pub bssid: MacAddr,
    /// Always 0: the real status lives in the unparsed management frame.
    pub status_code: u16,
}

/// Result of an `NL80211_CMD_CONNECT` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConnectEvent {
    pub interface_index: u32,
    pub bssid: MacAddr,
    /// IEEE 802.11 status code, 0 if the kernel omitted it.
    pub status_code: u16,
    /// The connection attempt timed out without a response.
    pub timed_out: bool,
}

/// Result of an `NL80211_CMD_ROAM` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RoamEvent {
    pub interface_index: u32,
    pub bssid: MacAddr,
    /// IEEE 802.11 status code, 0 if the kernel omitted it.
    pub status_code: u16,
}

/// `NL80211_CMD_DISASSOCIATE` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DisassociateEvent {
    pub interface_index: u32,
    pub bssid: MacAddr,
    /// Always 0, for the same reason as [`AssociateEvent::status_code`].
    pub status_code: u16,
}

/// `NL80211_CMD_DISCONNECT` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DisconnectEvent {
    pub interface_index: u32,
    pub bssid: MacAddr,
    /// IEEE 802.11 status code, 0 unless the kernel reported one.
    pub status_code: u16,
    /// IEEE 802.11 reason code, if reported.
    pub reason_code: Option<u16>,
    /// The AP initiated the disconnect.
    pub disconnected_by_ap: bool,
}

/// A decoded MLME event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MlmeEvent {
    Associate(AssociateEvent),
    Connect(ConnectEvent),
    Roam(RoamEvent),
    Disassociate(DisassociateEvent),
    Disconnect(DisconnectEvent),
}

impl MlmeEvent {
    /// Interface the event is addressed to.
    pub fn interface_index(&self) -> u32 {
        match self {
            Self::Associate(e) => e.interface_index,
            Self::Connect(e) => e.interface_index,
            Self::Roam(e) => e.interface_index,
            Self::Disassociate(e) => e.interface_index,
            Self::Disconnect(e) => e.interface_index,
        }
    }

    /// BSSID of the access point involved.
    pub fn bssid(&self) -> MacAddr {
        match self {
            Self::Associate(e) => e.bssid,
            Self::Connect(e) => e.bssid,
            Self::Roam(e) => e.bssid,
            Self::Disassociate(e) => e.bssid,
            Self::Disconnect(e) => e.bssid,
        }
    }

    /// IEEE 802.11 status code (0 where unavailable).
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Associate(e) => e.status_code,
            Self::Connect(e) => e.status_code,
            Self::Roam(e) => e.status_code,
            Self::Disassociate(e) => e.status_code,
            Self::Disconnect(e) => e.status_code,
        }
    }

    /// Short lowercase name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Associate(_) => "associate",
            Self::Connect(_) => "connect",
            Self::Roam(_) => "roam",
            Self::Disassociate(_) => "disassociate",
            Self::Disconnect(_) => "disconnect",
        }
    }
}

/// Interface index and BSSID, required by every MLME event.
fn common_fields(packet: &Packet, event: &'static str) -> Option<(u32, MacAddr)> {
    let interface_index = required(packet, Nl80211Attr::Ifindex, event)?;
    let bssid = required(packet, Nl80211Attr::Mac, event)?;
    Some((interface_index, bssid))
}

/// Status code, defaulted to 0 with a warning when absent or malformed.
fn status_code_or_default(packet: &Packet, event: &'static str) -> u16 {
    match packet.get_attribute::<u16>(Nl80211Attr::StatusCode) {
        Ok(Some(status)) => status,
        Ok(None) => {
            warn!(event, "failed to get NL80211_ATTR_STATUS_CODE, using 0");
            0
        }
        Err(e) => {
            warn!(event, error = %e, "malformed NL80211_ATTR_STATUS_CODE, using 0");
            0
        }
    }
}

impl EventDecoder {
    /// Decode `NL80211_CMD_ASSOCIATE`.
    pub fn decode_associate(packet: &Packet) -> Option<AssociateEvent> {
        if packet.command() != Nl80211Cmd::Associate as u8 {
            return None;
        }
        let (interface_index, bssid) = common_fields(packet, "associate")?;

        // TODO: parse the status code out of the NL80211_ATTR_FRAME
        // association response body.
        Some(AssociateEvent {
            interface_index,
            bssid,
            status_code: 0,
        })
    }

    /// Decode `NL80211_CMD_CONNECT`.
    pub fn decode_connect(packet: &Packet) -> Option<ConnectEvent> {
        if packet.command() != Nl80211Cmd::Connect as u8 {
            return None;
        }
        let (interface_index, bssid) = common_fields(packet, "connect")?;

        Some(ConnectEvent {
            interface_index,
            bssid,
            status_code: status_code_or_default(packet, "connect"),
            timed_out: packet.has_attribute(Nl80211Attr::TimedOut),
        })
    }

    /// Decode `NL80211_CMD_ROAM`.
    pub fn decode_roam(packet: &Packet) -> Option<RoamEvent> {
        if packet.command() != Nl80211Cmd::Roam as u8 {
            return None;
        }
        let (interface_index, bssid) = common_fields(packet, "roam")?;

        Some(RoamEvent {
            interface_index,
            bssid,
            status_code: status_code_or_default(packet, "roam"),
        })
    }

    /// Decode `NL80211_CMD_DISASSOCIATE`.
    pub fn decode_disassociate(packet: &Packet) -> Option<DisassociateEvent> {
        if packet.command() != Nl80211Cmd::Disassociate as u8 {
            return None;
        }
        let (interface_index, bssid) = common_fields(packet, "disassociate")?;

        Some(DisassociateEvent {
            interface_index,
            bssid,
            status_code: 0,
        })
    }

    /// Decode `NL80211_CMD_DISCONNECT`.
    pub fn decode_disconnect(packet: &Packet) -> Option<DisconnectEvent> {
        if packet.command() != Nl80211Cmd::Disconnect as u8 {
            return None;
        }
        let (interface_index, bssid) = common_fields(packet, "disconnect")?;

        let reason_code = match packet.get_attribute::<u16>(Nl80211Attr::ReasonCode) {
            Ok(reason) => reason,
            Err(e) => {
                warn!(error = %e, "malformed NL80211_ATTR_REASON_CODE, ignoring");
                None
            }
        };

        Some(DisconnectEvent {
            interface_index,
            bssid,
            // Disconnect notifications normally carry no status.
            status_code: packet
                .get_attribute(Nl80211Attr::StatusCode)
                .ok()
                .flatten()
                .unwrap_or(0),
            reason_code,
            disconnected_by_ap: packet.has_attribute(Nl80211Attr::DisconnectedByAp),
        })
    }

    /// Decode any MLME event.
    pub fn decode_mlme(packet: &Packet) -> Option<MlmeEvent> {
        match Nl80211Cmd::from_u8(packet.command())? {
            Nl80211Cmd::Associate => Self::decode_associate(packet).map(MlmeEvent::Associate),
            Nl80211Cmd::Connect => Self::decode_connect(packet).map(MlmeEvent::Connect),
            Nl80211Cmd::Roam => Self::decode_roam(packet).map(MlmeEvent::Roam),
            Nl80211Cmd::Disassociate => {
                Self::decode_disassociate(packet).map(MlmeEvent::Disassociate)
            }
            Nl80211Cmd::Disconnect => Self::decode_disconnect(packet).map(MlmeEvent::Disconnect),
            _ => None,
        }
    }
}
