//! `nlmsghdr` framing.
//!
//! A receive buffer holds one or more messages, each starting on a 4-byte
//! boundary and sized by its own `nlmsg_len`.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

pub const NLMSG_ALIGNTO: usize = 4;

pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

pub const NLMSG_HDRLEN: usize = nlmsg_align(std::mem::size_of::<NlMsgHdr>());

// Control message types shared by every netlink protocol
pub const NLMSG_NOOP: u16 = 1;
pub const NLMSG_ERROR: u16 = 2;
pub const NLMSG_DONE: u16 = 3;
pub const NLMSG_OVERRUN: u16 = 4;
/// Types below this value are control messages, never family data.
pub const NLMSG_MIN_TYPE: u16 = 0x10;

pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_MULTI: u16 = 0x02;
pub const NLM_F_ACK: u16 = 0x04;
/// Dump was interrupted by a concurrent change and may be inconsistent.
pub const NLM_F_DUMP_INTR: u16 = 0x10;
pub const NLM_F_DUMP: u16 = 0x100 | 0x200;

/// `struct nlmsghdr`.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct NlMsgHdr {
    /// Length including this header, excluding trailing padding.
    pub nlmsg_len: u32,
    /// Control type, or the family ID for generic netlink.
    pub nlmsg_type: u16,
    pub nlmsg_flags: u16,
    pub nlmsg_seq: u32,
    /// Sender port; 0 for the kernel.
    pub nlmsg_pid: u32,
}

impl NlMsgHdr {
    /// Header for an empty message; the length is fixed up on encode.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            nlmsg_len: NLMSG_HDRLEN as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.nlmsg_type == NLMSG_ERROR
    }

    pub fn is_done(&self) -> bool {
        self.nlmsg_type == NLMSG_DONE
    }

    /// `NOOP`, `ERROR`, `DONE` or `OVERRUN`, as opposed to family data.
    pub fn is_control(&self) -> bool {
        self.nlmsg_type < NLMSG_MIN_TYPE
    }

    pub fn is_dump_interrupted(&self) -> bool {
        self.nlmsg_flags & NLM_F_DUMP_INTR != 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        IntoBytes::as_bytes(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        read_prefix(data)
    }
}

/// Validate the message at the front of `buf` and return its header and
/// declared length.
pub fn frame(buf: &[u8]) -> Result<(NlMsgHdr, usize)> {
    let header = NlMsgHdr::from_bytes(buf)?;
    let len = header.nlmsg_len as usize;
    if len < NLMSG_HDRLEN {
        return Err(Error::InvalidMessage(format!(
            "nlmsg_len {} is shorter than the header",
            len
        )));
    }
    if len > buf.len() {
        return Err(Error::Truncated {
            expected: len,
            actual: buf.len(),
        });
    }
    Ok((header, len))
}

/// Walks the messages of a receive buffer in order.
///
/// A framing error is yielded once and ends the walk: with a bad length the
/// next boundary cannot be found.
pub struct MessageIter<'a> {
    rest: &'a [u8],
}

impl<'a> MessageIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { rest: data }
    }
}

impl<'a> Iterator for MessageIter<'a> {
    /// Header and the payload following it.
    type Item = Result<(NlMsgHdr, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.rest);
        let (header, len) = match frame(data) {
            Ok(framed) => framed,
            Err(e) => return Some(Err(e)),
        };
        self.rest = data.get(nlmsg_align(len)..).unwrap_or_default();
        Some(Ok((header, &data[NLMSG_HDRLEN..len])))
    }
}

/// Payload of an `NLMSG_ERROR` message. An `error` of 0 is a plain ACK.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
pub struct NlMsgError {
    /// Negative errno, or 0.
    pub error: i32,
    /// Header of the request being answered.
    pub msg: NlMsgHdr,
}

impl NlMsgError {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        read_prefix(data)
    }

    pub fn is_ack(&self) -> bool {
        self.error == 0
    }

    /// Turn an `NLMSG_ERROR` payload into `Ok(())` for an ACK or the
    /// kernel's errno otherwise.
    pub fn check(payload: &[u8]) -> Result<()> {
        let err = Self::from_bytes(payload)?;
        if err.is_ack() {
            Ok(())
        } else {
            Err(Error::from_errno(err.error))
        }
    }
}

fn read_prefix<T: FromBytes + KnownLayout + Immutable>(data: &[u8]) -> Result<T> {
    T::read_from_prefix(data)
        .map(|(value, _)| value)
        .map_err(|_| Error::Truncated {
            expected: std::mem::size_of::<T>(),
            actual: data.len(),
        })
}
