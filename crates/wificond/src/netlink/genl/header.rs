//! `genlmsghdr`, the 4-byte family header that follows `nlmsghdr`.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::netlink::error::{Error, Result};

/// Command and interface version of a generic netlink message.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct GenlMsgHdr {
    /// Family-specific command, e.g. `NL80211_CMD_CONNECT`.
    pub cmd: u8,
    pub version: u8,
    /// Always zero on the wire.
    pub reserved: u16,
}

pub const GENL_HDRLEN: usize = std::mem::size_of::<GenlMsgHdr>();

impl GenlMsgHdr {
    pub const fn new(cmd: u8, version: u8) -> Self {
        Self {
            cmd,
            version,
            reserved: 0,
        }
    }

    /// Split a generic netlink payload into its header and attribute area.
    pub fn split(payload: &[u8]) -> Result<(Self, &[u8])> {
        Self::read_from_prefix(payload).map_err(|_| Error::Truncated {
            expected: GENL_HDRLEN,
            actual: payload.len(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        IntoBytes::as_bytes(self)
    }
}
