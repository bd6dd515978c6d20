//! Netlink transport and wire format.
//!
//! This module contains everything below nl80211: message and attribute
//! framing, the message builder, the async socket and the Generic Netlink
//! control family.

pub mod attr;
pub mod builder;
pub mod error;
pub mod genl;
pub mod message;
pub mod socket;

pub use attr::{AttrIter, AttrValue, AttributeView, parse_attributes};
pub use builder::{MessageBuilder, NestToken};
pub use error::{Error, Result};
pub use message::{MessageIter, NlMsgError, NlMsgHdr};
pub use socket::NetlinkSocket;
