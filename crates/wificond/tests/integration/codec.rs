//! Codec tests over whole receive buffers.

use bytes::Bytes;
use tracing::Level;
use wificond::Error;
use wificond::netlink::AttributeView;
use wificond::nl80211::{EventDecoder, MlmeEvent, Nl80211Attr, Nl80211Cmd, Nl80211Event, Packet};

use crate::common::{self, batch, connect, del_interface, message, scan};

const BSSID: [u8; 6] = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];

#[test]
fn test_batch_decodes_in_order() {
    let buf = Bytes::from(batch(&[
        connect(3, BSSID, Some(17)),
        scan(Nl80211Cmd::NewScanResults, 3),
        del_interface(3),
    ]));

    let commands: Vec<u8> = Packet::decode_all(&buf)
        .into_iter()
        .map(|p| p.unwrap().command())
        .collect();
    assert_eq!(
        commands,
        vec![
            Nl80211Cmd::Connect as u8,
            Nl80211Cmd::NewScanResults as u8,
            Nl80211Cmd::DelInterface as u8,
        ]
    );
}

#[test]
fn test_connect_status_round_trip() {
    common::init_tracing();

    let packet = Packet::decode(&connect(3, BSSID, Some(17))).unwrap();
    let Some(Nl80211Event::Mlme(MlmeEvent::Connect(event))) = EventDecoder::decode(&packet) else {
        panic!("expected a connect event");
    };
    assert_eq!(event.status_code, 17);
    assert_eq!(event.bssid.octets(), BSSID);

    let reencoded = Packet::decode(&packet.encode().unwrap()).unwrap();
    assert_eq!(reencoded, packet);
}

#[test]
fn test_connect_without_status_defaults_to_zero() {
    common::init_tracing();

    let packet = Packet::decode(&connect(3, BSSID, None)).unwrap();
    let event = EventDecoder::decode_connect(&packet).unwrap();
    assert_eq!(event.status_code, 0);
}

#[test]
fn test_missing_status_logs_one_warning() {
    let packet = Packet::decode(&connect(3, BSSID, None)).unwrap();
    let (event, levels) = common::record_levels(|| EventDecoder::decode_connect(&packet));

    assert_eq!(event.unwrap().status_code, 0);
    assert_eq!(levels.count(Level::WARN), 1);
    assert_eq!(levels.count(Level::ERROR), 0);
}

#[test]
fn test_missing_bssid_logs_error() {
    let buf = message(Nl80211Cmd::Connect, |b| {
        b.append_attr_u32(Nl80211Attr::Ifindex as u16, 3);
        b.append_attr_u16(Nl80211Attr::StatusCode as u16, 0);
    });
    let packet = Packet::decode(&buf).unwrap();
    let (event, levels) = common::record_levels(|| EventDecoder::decode_connect(&packet));

    assert!(event.is_none());
    assert_eq!(levels.count(Level::ERROR), 1);
    assert_eq!(levels.count(Level::WARN), 0);
}

#[test]
fn test_missing_ifindex_logs_error() {
    let buf = message(Nl80211Cmd::Roam, |b| {
        b.append_attr(Nl80211Attr::Mac as u16, &BSSID);
        b.append_attr_u16(Nl80211Attr::StatusCode as u16, 0);
    });
    let packet = Packet::decode(&buf).unwrap();
    let (event, levels) = common::record_levels(|| EventDecoder::decode(&packet));

    assert!(event.is_none());
    assert_eq!(levels.count(Level::ERROR), 1);
}

#[test]
fn test_connect_without_bssid_is_none() {
    common::init_tracing();

    let buf = message(Nl80211Cmd::Connect, |b| {
        b.append_attr_u32(Nl80211Attr::Ifindex as u16, 3);
        b.append_attr_u16(Nl80211Attr::StatusCode as u16, 0);
    });
    let packet = Packet::decode(&buf).unwrap();
    assert!(EventDecoder::decode_connect(&packet).is_none());
    assert!(EventDecoder::decode(&packet).is_none());
}

#[test]
fn test_associate_status_is_always_zero() {
    let buf = message(Nl80211Cmd::Associate, |b| {
        b.append_attr_u32(Nl80211Attr::Ifindex as u16, 3);
        b.append_attr(Nl80211Attr::Mac as u16, &BSSID);
        b.append_attr_u16(Nl80211Attr::StatusCode as u16, 5);
        b.append_attr(Nl80211Attr::Frame as u16, &[0xde, 0xad, 0xbe, 0xef]);
    });
    let event = EventDecoder::decode_associate(&Packet::decode(&buf).unwrap()).unwrap();
    assert_eq!(event.status_code, 0);
}

#[test]
fn test_every_truncation_fails_cleanly() {
    let full = connect(3, BSSID, Some(1));
    for len in 0..full.len() {
        match Packet::decode(&full[..len]) {
            Err(e) => assert!(e.is_decode_error(), "len {}: {:?}", len, e),
            Ok(_) => panic!("decoded a buffer cut to {} bytes", len),
        }
    }
}

#[test]
fn test_inner_length_overflow_is_truncated() {
    let mut buf = connect(3, BSSID, Some(1));
    // Declare the first attribute (IFINDEX at offset 20) longer than the message
    buf[20..22].copy_from_slice(&200u16.to_ne_bytes());
    assert!(matches!(
        Packet::decode(&buf),
        Err(Error::Truncated { .. })
    ));
}

#[test]
fn test_unknown_attributes_survive_reencode() {
    let buf = message(Nl80211Cmd::Connect, |b| {
        b.append_attr_u32(Nl80211Attr::Ifindex as u16, 3);
        b.append_attr(Nl80211Attr::Mac as u16, &BSSID);
        b.append_attr(0x7ff0, &[1, 2, 3]);
    });
    let packet = Packet::decode(&buf).unwrap();
    assert_eq!(packet.attributes().len(), 3);
    assert_eq!(packet.encode().unwrap(), buf);
    assert!(EventDecoder::decode_connect(&packet).is_some());
}

#[test]
fn test_oversized_attribute_refuses_to_encode() {
    let packet = Packet::decode(&connect(3, BSSID, Some(0)))
        .unwrap()
        .with_attribute(AttributeView::new(Nl80211Attr::ReqIe as u16, vec![0xab; 70_000]));

    assert!(matches!(packet.encode(), Err(Error::InvalidAttribute(_))));
}
