//! Parsed nl80211 message.

use bytes::Bytes;

use super::Nl80211Attr;
use crate::netlink::attr::{AttrValue, AttributeView, find, parse_attributes};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::error::{Error, Result};
use crate::netlink::genl::{GENL_HDRLEN, GenlMsgHdr};
use crate::netlink::message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, frame, nlmsg_align};

/// One generic netlink message: transport header, GENL header and the
/// ordered top-level attribute list.
///
/// Attributes with unknown type tags are kept, so a decoded packet
/// re-encodes to the same attribute set. Lookup is by type tag, first
/// match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: NlMsgHdr,
    genl: GenlMsgHdr,
    attributes: Vec<AttributeView>,
}

impl Packet {
    /// Create an empty packet for an outbound command.
    ///
    /// `message_type` is the resolved family ID.
    pub fn new(message_type: u16, command: u8, version: u8) -> Self {
        Self {
            header: NlMsgHdr::new(message_type, 0),
            genl: GenlMsgHdr::new(command, version),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute (builder style).
    pub fn with_attribute(mut self, attr: AttributeView) -> Self {
        self.attributes.push(attr);
        self
    }

    /// Set the netlink flags (builder style).
    pub fn with_flags(mut self, flags: u16) -> Self {
        self.header.nlmsg_flags = flags;
        self
    }

    /// Append an attribute.
    pub fn push(&mut self, attr: AttributeView) {
        self.attributes.push(attr);
    }

    /// Decode a single netlink message.
    ///
    /// The buffer must start with the `nlmsghdr`. Bytes past the declared
    /// length are only allowed as alignment padding.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Self::decode_bytes(Bytes::copy_from_slice(buf))
    }

    /// Decode a single netlink message without copying attribute payloads.
    pub fn decode_bytes(buf: Bytes) -> Result<Self> {
        let (header, msg_len) = frame(&buf)?;
        if buf.len() > nlmsg_align(msg_len) {
            return Err(Error::InvalidMessage(format!(
                "{} trailing bytes after message of length {}",
                buf.len() - msg_len,
                msg_len
            )));
        }

        Self::from_parts(header, buf.slice(NLMSG_HDRLEN..msg_len))
    }

    /// Build a packet from an already split header and payload.
    ///
    /// `payload` is everything after the `nlmsghdr`, as yielded by
    /// [`MessageIter`](crate::netlink::MessageIter).
    pub fn from_parts(header: NlMsgHdr, payload: Bytes) -> Result<Self> {
        let (genl, _) = GenlMsgHdr::split(&payload)?;
        let attributes = parse_attributes(&payload.slice(GENL_HDRLEN..))?;

        Ok(Self {
            header,
            genl,
            attributes,
        })
    }

    /// Decode every message in a receive buffer, in order.
    ///
    /// Netlink control messages (`NOOP`, `ERROR`, `DONE`) are skipped. A
    /// malformed message yields an error item; a framing error also ends
    /// the sequence since the remaining boundaries are unknown.
    pub fn decode_all(buf: &Bytes) -> Vec<Result<Self>> {
        let mut packets = Vec::new();
        for result in MessageIter::new(buf) {
            match result {
                Ok((header, _)) if header.is_control() => continue,
                Ok((header, payload)) => {
                    packets.push(Self::from_parts(header, buf.slice_ref(payload)));
                }
                Err(e) => packets.push(Err(e)),
            }
        }
        packets
    }

    /// Encode the packet, recomputing every length field and padding.
    ///
    /// An attribute longer than `nla_len` can express is an
    /// [`Error::InvalidAttribute`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut builder = MessageBuilder::with_header(self.header);
        builder.append(&self.genl);
        for attr in &self.attributes {
            builder.append_attribute(attr);
        }
        builder.finish()
    }

    /// Transport header.
    pub fn header(&self) -> &NlMsgHdr {
        &self.header
    }

    /// Netlink message type (the family ID).
    pub fn message_type(&self) -> u16 {
        self.header.nlmsg_type
    }

    /// Sequence number (0 for kernel broadcasts).
    pub fn sequence(&self) -> u32 {
        self.header.nlmsg_seq
    }

    /// Sender port ID (0 for the kernel).
    pub fn port_id(&self) -> u32 {
        self.header.nlmsg_pid
    }

    /// Generic netlink command code.
    pub fn command(&self) -> u8 {
        self.genl.cmd
    }

    /// Generic netlink family version.
    pub fn version(&self) -> u8 {
        self.genl.version
    }

    /// All top-level attributes in wire order.
    pub fn attributes(&self) -> &[AttributeView] {
        &self.attributes
    }

    /// First attribute with the given tag.
    pub fn attribute(&self, attr: Nl80211Attr) -> Option<&AttributeView> {
        find(&self.attributes, attr as u16)
    }

    /// Check whether an attribute is present (flag attributes carry no payload).
    pub fn has_attribute(&self, attr: Nl80211Attr) -> bool {
        self.attribute(attr).is_some()
    }

    /// Read an attribute as `T`.
    ///
    /// Returns `Ok(None)` if the tag is absent and [`Error::SizeMismatch`]
    /// if the payload does not have the width `T` needs.
    pub fn get_attribute<T: AttrValue>(&self, attr: Nl80211Attr) -> Result<Option<T>> {
        self.attribute(attr).map(AttributeView::value).transpose()
    }

    /// Read an attribute that must be present.
    pub fn require_attribute<T: AttrValue>(&self, attr: Nl80211Attr) -> Result<T> {
        self.get_attribute(attr)?
            .ok_or(Error::MissingAttribute { name: attr.name() })
    }

    /// Interface index, if present and well formed.
    pub fn interface_index(&self) -> Option<u32> {
        self.get_attribute(Nl80211Attr::Ifindex).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::{NLA_F_NESTED, NLA_HDRLEN};
    use crate::nl80211::Nl80211Cmd;
    use crate::nl80211::types::MacAddr;

    const FAMILY: u16 = 0x1c;
    const BSSID: [u8; 6] = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];

    fn connect_message() -> Vec<u8> {
        let mut builder = MessageBuilder::new(FAMILY, 0);
        builder.append(&GenlMsgHdr::new(Nl80211Cmd::Connect as u8, 1));
        builder.append_attr_u32(Nl80211Attr::Wiphy as u16, 0);
        builder.append_attr_u32(Nl80211Attr::Ifindex as u16, 7);
        builder.append_attr(Nl80211Attr::Mac as u16, &BSSID);
        builder.append_attr_u16(Nl80211Attr::StatusCode as u16, 17);
        builder.append_attr(Nl80211Attr::RespIe as u16, &[0x01, 0x02, 0x82, 0x84, 0x8b]);
        builder.finish().unwrap()
    }

    #[test]
    fn test_decode_connect() {
        let packet = Packet::decode(&connect_message()).unwrap();
        assert_eq!(packet.message_type(), FAMILY);
        assert_eq!(packet.command(), Nl80211Cmd::Connect as u8);
        assert_eq!(packet.version(), 1);
        assert_eq!(packet.attributes().len(), 5);
        assert_eq!(packet.interface_index(), Some(7));
        assert_eq!(
            packet.get_attribute::<u16>(Nl80211Attr::StatusCode).unwrap(),
            Some(17)
        );
        assert_eq!(
            packet.get_attribute::<MacAddr>(Nl80211Attr::Mac).unwrap(),
            Some(MacAddr::new(BSSID))
        );
        assert_eq!(
            packet.attribute(Nl80211Attr::RespIe).unwrap().payload().len(),
            5
        );
    }

    #[test]
    fn test_absent_attribute_is_none() {
        let packet = Packet::decode(&connect_message()).unwrap();
        assert_eq!(
            packet.get_attribute::<u16>(Nl80211Attr::ReasonCode).unwrap(),
            None
        );
        assert!(matches!(
            packet.require_attribute::<u16>(Nl80211Attr::ReasonCode),
            Err(Error::MissingAttribute {
                name: "NL80211_ATTR_REASON_CODE"
            })
        ));
    }

    #[test]
    fn test_wrong_width_is_size_mismatch() {
        let packet = Packet::decode(&connect_message()).unwrap();
        let err = packet.get_attribute::<u32>(Nl80211Attr::StatusCode).unwrap_err();
        assert!(matches!(
            err,
            Error::SizeMismatch {
                kind: 72,
                expected: 4,
                actual: 2
            }
        ));
        assert!(packet.get_attribute::<MacAddr>(Nl80211Attr::Ifindex).is_err());
    }

    #[test]
    fn test_unknown_attributes_retained() {
        let mut builder = MessageBuilder::new(FAMILY, 0);
        builder.append(&GenlMsgHdr::new(Nl80211Cmd::Roam as u8, 1));
        builder.append_attr_u32(0x1ff, 0xdead_beef);
        builder.append_attr_u32(Nl80211Attr::Ifindex as u16, 3);
        let packet = Packet::decode(&builder.finish().unwrap()).unwrap();

        assert_eq!(packet.attributes().len(), 2);
        assert_eq!(packet.attributes()[0].kind(), 0x1ff);
        assert_eq!(packet.interface_index(), Some(3));
    }

    #[test]
    fn test_semantic_round_trip() {
        let original = Packet::decode(&connect_message()).unwrap();
        let reencoded = Packet::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(reencoded.command(), original.command());
        assert_eq!(reencoded.attributes(), original.attributes());
    }

    #[test]
    fn test_encode_outbound_command() {
        let packet = Packet::new(FAMILY, Nl80211Cmd::TriggerScan as u8, 1)
            .with_attribute(AttributeView::new(
                Nl80211Attr::Ifindex as u16,
                4u32.to_ne_bytes().to_vec(),
            ))
            .with_attribute(AttributeView::nest(
                Nl80211Attr::ScanSsids as u16,
                &[AttributeView::new(1, Vec::<u8>::new())],
            )
            .unwrap());
        let bytes = packet.encode().unwrap();

        let header = NlMsgHdr::from_bytes(&bytes).unwrap();
        assert_eq!(header.nlmsg_len as usize, bytes.len());

        let decoded = Packet::decode(&bytes).unwrap();
        let ssids = decoded.attribute(Nl80211Attr::ScanSsids).unwrap();
        assert_eq!(ssids.raw_type(), Nl80211Attr::ScanSsids as u16 | NLA_F_NESTED);
        assert_eq!(ssids.nested().unwrap().len(), 1);
    }

    #[test]
    fn test_truncated_anywhere_inside_attribute() {
        let message = connect_message();
        let original = Packet::decode(&message).unwrap();

        // Header plus payload span of every record, padding excluded.
        let mut records = Vec::new();
        let mut offset = NLMSG_HDRLEN + GENL_HDRLEN;
        for attr in original.attributes() {
            records.push((offset, offset + NLA_HDRLEN + attr.payload().len()));
            offset += attr.encoded_len();
        }

        // Shrink the buffer and the declared length together so that only the
        // attribute framing is at fault.
        for cut in NLMSG_HDRLEN + GENL_HDRLEN..message.len() {
            let mut short = message[..cut].to_vec();
            short[0..4].copy_from_slice(&(cut as u32).to_ne_bytes());

            let inside = records.iter().any(|&(start, end)| cut > start && cut < end);
            let result = Packet::decode(&short);
            if inside {
                assert!(matches!(result, Err(Error::Truncated { .. })), "cut at {}", cut);
            } else {
                assert!(result.is_ok(), "cut at {}", cut);
            }
        }
    }

    #[test]
    fn test_buffer_shorter_than_declared_length() {
        let message = connect_message();
        let err = Packet::decode(&message[..message.len() - 4]).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }

    #[test]
    fn test_missing_genl_header() {
        let mut message = MessageBuilder::new(FAMILY, 0).finish().unwrap();
        message.extend_from_slice(&[46, 1]);
        message[0..4].copy_from_slice(&18u32.to_ne_bytes());
        let err = Packet::decode(&message).unwrap_err();
        assert!(matches!(err, Error::Truncated { expected: 4, actual: 2 }));
    }

    #[test]
    fn test_decode_all_keeps_order_and_skips_control() {
        let mut buf = connect_message();
        let mut done = MessageBuilder::new(crate::netlink::message::NLMSG_DONE, 0);
        done.append_bytes(&0i32.to_ne_bytes());
        buf.extend(done.finish().unwrap());

        let mut roam = MessageBuilder::new(FAMILY, 0);
        roam.append(&GenlMsgHdr::new(Nl80211Cmd::Roam as u8, 1));
        roam.append_attr_u32(Nl80211Attr::Ifindex as u16, 8);
        buf.extend(roam.finish().unwrap());

        let packets: Vec<Packet> = Packet::decode_all(&Bytes::from(buf))
            .into_iter()
            .map(|p| p.unwrap())
            .collect();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].command(), Nl80211Cmd::Connect as u8);
        assert_eq!(packets[1].command(), Nl80211Cmd::Roam as u8);
        assert_eq!(packets[1].interface_index(), Some(8));
    }

    #[test]
    fn test_decode_all_reports_bad_message() {
        let mut buf = connect_message();
        let mut bad = MessageBuilder::new(FAMILY, 0);
        bad.append(&GenlMsgHdr::new(Nl80211Cmd::Roam as u8, 1));
        bad.append_attr_u32(Nl80211Attr::Ifindex as u16, 8);
        let mut bad = bad.finish().unwrap();
        // Attribute claims 12 bytes but only 8 remain in the message
        let at = NLMSG_HDRLEN + GENL_HDRLEN;
        bad[at..at + 2].copy_from_slice(&12u16.to_ne_bytes());
        buf.extend(bad);

        let results = Packet::decode_all(&Bytes::from(buf));
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Truncated { .. })));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let mut message = connect_message();
        message.extend_from_slice(&[0; 8]);
        assert!(matches!(
            Packet::decode(&message),
            Err(Error::InvalidMessage(_))
        ));
    }
}
