//! Netlink request encoder.
//!
//! The header is kept apart from the body while attributes are appended and
//! only serialized by [`MessageBuilder::finish`], so `nlmsg_len` is always
//! the real encoded size.
//!
//! Appenders never fail. A length that does not fit its 16-bit `nla_len`
//! is recorded, the offending record is left out, and `finish` returns the
//! first such error instead of a message.

use zerocopy::{Immutable, IntoBytes};

use super::attr::{AttributeView, NLA_F_NESTED, NLA_HDRLEN, NlAttr, nla_align};
use super::error::{Error, Result};
use super::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};

/// Open nested attribute, closed with [`MessageBuilder::nest_end`].
#[derive(Debug, Clone, Copy)]
#[must_use = "an open nest must be closed with nest_end"]
pub struct NestToken {
    /// Body offset of the nest's `nlattr`.
    offset: usize,
}

/// Incrementally encodes one netlink message.
#[derive(Debug)]
pub struct MessageBuilder {
    header: NlMsgHdr,
    body: Vec<u8>,
    overflow: Option<Error>,
}

impl MessageBuilder {
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self::with_header(NlMsgHdr::new(msg_type, flags))
    }

    /// Start from an existing header. Sequence and port are carried over.
    pub fn with_header(header: NlMsgHdr) -> Self {
        Self {
            header,
            body: Vec::with_capacity(64),
            overflow: None,
        }
    }

    /// Set the sequence number and sender port of the request.
    pub fn stamp(&mut self, seq: u32, pid: u32) {
        self.header.nlmsg_seq = seq;
        self.header.nlmsg_pid = pid;
    }

    /// Append an unframed payload, padded to netlink alignment.
    pub fn append_bytes(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
        self.pad(nlmsg_align);
    }

    /// Append a fixed-layout family header such as `genlmsghdr`.
    pub fn append<T: IntoBytes + Immutable>(&mut self, data: &T) {
        self.append_bytes(data.as_bytes());
    }

    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) {
        if self.push_header(attr_type, data.len()) {
            self.body.extend_from_slice(data);
            self.pad(nla_align);
        }
    }

    /// Re-emit a decoded attribute with its original type bits.
    pub fn append_attribute(&mut self, attr: &AttributeView) {
        if let Err(e) = attr.write_to(&mut self.body) {
            self.record(e);
        }
    }

    /// Zero-length attribute; presence alone carries the meaning.
    pub fn append_flag(&mut self, attr_type: u16) {
        self.append_attr(attr_type, &[]);
    }

    pub fn append_attr_u16(&mut self, attr_type: u16, value: u16) {
        self.append_attr(attr_type, &value.to_ne_bytes());
    }

    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) {
        self.append_attr(attr_type, &value.to_ne_bytes());
    }

    /// Signed 32-bit value, e.g. an RSSI threshold in dBm.
    pub fn append_attr_i32(&mut self, attr_type: u16, value: i32) {
        self.append_attr(attr_type, &value.to_ne_bytes());
    }

    /// NUL-terminated string, as genetlink expects for names.
    pub fn append_attr_str(&mut self, attr_type: u16, value: &str) {
        if self.push_header(attr_type, value.len() + 1) {
            self.body.extend_from_slice(value.as_bytes());
            self.body.push(0);
            self.pad(nla_align);
        }
    }

    pub fn nest_start(&mut self, attr_type: u16) -> NestToken {
        let offset = self.body.len();
        self.push_header(attr_type | NLA_F_NESTED, 0);
        NestToken { offset }
    }

    /// Close a nest, patching its `nla_len` to cover everything since
    /// [`nest_start`](Self::nest_start).
    pub fn nest_end(&mut self, token: NestToken) {
        let at = token.offset..token.offset + NLA_HDRLEN;
        let kind = u16::from_ne_bytes([self.body[at.start + 2], self.body[at.start + 3]]);
        match NlAttr::new(kind, self.body.len() - at.end) {
            Ok(header) => self.body[at].copy_from_slice(header.as_bytes()),
            Err(e) => self.record(e),
        }
        self.pad(nla_align);
    }

    /// Write `items` as a nested list whose entries are typed by position,
    /// starting at 1. This is the layout nl80211 uses for SSID, frequency
    /// and match-set lists.
    pub fn append_list<T>(
        &mut self,
        attr_type: u16,
        items: &[T],
        mut write: impl FnMut(&mut Self, u16, &T),
    ) {
        let list = self.nest_start(attr_type);
        for (i, item) in items.iter().enumerate() {
            write(self, i as u16 + 1, item);
        }
        self.nest_end(list);
    }

    /// Serialize header and body into one buffer.
    ///
    /// Fails with the first length overflow seen while appending.
    pub fn finish(self) -> Result<Vec<u8>> {
        if let Some(e) = self.overflow {
            return Err(e);
        }

        let mut header = self.header;
        header.nlmsg_len = u32::try_from(NLMSG_HDRLEN + self.body.len()).map_err(|_| {
            Error::InvalidMessage(format!("message body of {} bytes", self.body.len()))
        })?;

        let mut msg = Vec::with_capacity(header.nlmsg_len as usize);
        msg.extend_from_slice(header.as_bytes());
        msg.resize(NLMSG_HDRLEN, 0);
        msg.extend_from_slice(&self.body);
        Ok(msg)
    }

    /// Write an `nlattr` header, or record why it cannot be encoded.
    fn push_header(&mut self, attr_type: u16, data_len: usize) -> bool {
        match NlAttr::new(attr_type, data_len) {
            Ok(header) => {
                self.body.extend_from_slice(header.as_bytes());
                true
            }
            Err(e) => {
                self.record(e);
                false
            }
        }
    }

    fn record(&mut self, e: Error) {
        self.overflow.get_or_insert(e);
    }

    fn pad(&mut self, align: fn(usize) -> usize) {
        let aligned = align(self.body.len());
        self.body.resize(aligned, 0);
    }
}
