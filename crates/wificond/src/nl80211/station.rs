//! Station add/remove events on AP interfaces.

use super::event::{EventDecoder, required};
use super::packet::Packet;
use super::types::MacAddr;
use super::{Nl80211Attr, Nl80211Cmd};

/// Whether a station joined or left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StationEventKind {
    New,
    Del,
}

/// `NL80211_CMD_NEW_STATION` / `NL80211_CMD_DEL_STATION` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StationEvent {
    pub interface_index: u32,
    pub kind: StationEventKind,
    /// MAC address of the station.
    pub mac: MacAddr,
}

impl EventDecoder {
    /// Decode a station event.
    pub fn decode_station(packet: &Packet) -> Option<StationEvent> {
        let kind = match Nl80211Cmd::from_u8(packet.command())? {
            Nl80211Cmd::NewStation => StationEventKind::New,
            Nl80211Cmd::DelStation => StationEventKind::Del,
            _ => return None,
        };

        Some(StationEvent {
            interface_index: required(packet, Nl80211Attr::Ifindex, "station")?,
            kind,
            mac: required(packet, Nl80211Attr::Mac, "station")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::builder::MessageBuilder;
    use crate::netlink::genl::GenlMsgHdr;

    fn station_packet(cmd: Nl80211Cmd, mac: &[u8]) -> Packet {
        let mut builder = MessageBuilder::new(0x1c, 0);
        builder.append(&GenlMsgHdr::new(cmd as u8, 1));
        builder.append_attr_u32(Nl80211Attr::Ifindex as u16, 8);
        builder.append_attr(Nl80211Attr::Mac as u16, mac);
        builder.append_attr_u32(Nl80211Attr::Generation as u16, 41);
        Packet::decode(&builder.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_new_station() {
        let event =
            EventDecoder::decode_station(&station_packet(Nl80211Cmd::NewStation, &[2, 0, 0, 0, 0, 1]))
                .unwrap();
        assert_eq!(event.interface_index, 8);
        assert_eq!(event.kind, StationEventKind::New);
        assert_eq!(event.mac.to_string(), "02:00:00:00:00:01");
    }

    #[test]
    fn test_del_station() {
        let event =
            EventDecoder::decode_station(&station_packet(Nl80211Cmd::DelStation, &[2, 0, 0, 0, 0, 1]))
                .unwrap();
        assert_eq!(event.kind, StationEventKind::Del);
    }

    #[test]
    fn test_station_requires_full_mac() {
        assert!(
            EventDecoder::decode_station(&station_packet(Nl80211Cmd::NewStation, &[2, 0, 0]))
                .is_none()
        );
    }
}
