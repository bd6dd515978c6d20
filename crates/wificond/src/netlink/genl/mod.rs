//! Generic netlink transport.
//!
//! nl80211 has no fixed protocol number. Its family ID and the IDs of its
//! multicast groups (`mlme`, `scan`, `config`) are assigned at module load
//! and must be looked up through the `nlctrl` family first.
//! [`GenlConnection`] does that lookup, caches it and runs ack'ed or dump
//! requests on top of [`NetlinkSocket`](super::NetlinkSocket).
//!
//! ```rust,no_run
//! use wificond::netlink::genl::GenlConnection;
//!
//! # async fn example() -> wificond::Result<()> {
//! let conn = GenlConnection::new()?;
//! let nl80211 = conn.get_family("nl80211").await?;
//! println!("nl80211 is family {:#x}", nl80211.id);
//! # Ok(())
//! # }
//! ```

mod connection;
mod header;

pub use connection::{FamilyInfo, GenlConnection};
pub use header::{GENL_HDRLEN, GenlMsgHdr};

/// Fixed ID of the `nlctrl` family.
pub const GENL_ID_CTRL: u16 = 0x10;

/// `nlctrl` commands used for family resolution.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlCmd {
    NewFamily = 1,
    GetFamily = 3,
}

/// `CTRL_ATTR_*` tags of a family description.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlAttr {
    FamilyId = 1,
    FamilyName = 2,
    Version = 3,
    HdrSize = 4,
    MaxAttr = 5,
    McastGroups = 7,
}

/// `CTRL_ATTR_MCAST_GRP_*` tags inside each multicast group entry.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlAttrMcastGrp {
    Name = 1,
    Id = 2,
}
