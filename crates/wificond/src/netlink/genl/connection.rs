//! `nlctrl` family resolution and ack'ed/dump requests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use tracing::{debug, warn};

use super::header::GenlMsgHdr;
use super::{CtrlAttr, CtrlAttrMcastGrp, CtrlCmd, GENL_ID_CTRL};
use crate::netlink::attr::{AttributeView, parse_attributes};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::error::{Error, Result};
use crate::netlink::message::{MessageIter, NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NlMsgError};
use crate::netlink::socket::NetlinkSocket;

/// What `nlctrl` reports about a family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyInfo {
    /// Runtime-assigned ID, used as `nlmsg_type` for this family.
    pub id: u16,
    pub version: u8,
    /// Bytes of family header after `genlmsghdr`; 0 for nl80211.
    pub hdr_size: u32,
    pub max_attr: u32,
    /// Multicast group name to group ID.
    pub mcast_groups: HashMap<String, u32>,
}

impl FamilyInfo {
    pub fn mcast_group(&self, name: &str) -> Option<u32> {
        self.mcast_groups.get(name).copied()
    }
}

/// Request/response channel to the generic netlink bus.
///
/// Resolved families are cached by name for the life of the connection.
pub struct GenlConnection {
    socket: NetlinkSocket,
    families: Mutex<HashMap<String, FamilyInfo>>,
}

impl GenlConnection {
    pub fn new() -> Result<Self> {
        Ok(Self::from_socket(NetlinkSocket::new()?))
    }

    pub fn from_socket(socket: NetlinkSocket) -> Self {
        Self {
            socket,
            families: Mutex::default(),
        }
    }

    pub fn socket(&self) -> &NetlinkSocket {
        &self.socket
    }

    /// Give up request handling and keep the socket, e.g. for an event
    /// listener that joins multicast groups.
    pub fn into_socket(self) -> NetlinkSocket {
        self.socket
    }

    /// Resolve a family by name, asking `nlctrl` on first use.
    pub async fn get_family(&self, name: &str) -> Result<FamilyInfo> {
        let cached = self
            .families
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if let Some(info) = cached {
            return Ok(info);
        }

        let seq = self
            .send_request(GENL_ID_CTRL, NLM_F_ACK, CtrlCmd::GetFamily as u8, 1, |b| {
                b.append_attr_str(CtrlAttr::FamilyName as u16, name)
            })
            .await?;
        let info = parse_family_response(&self.socket.recv().await?, seq, name)?;
        debug!(family = name, id = info.id, "resolved generic netlink family");

        self.families
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), info.clone());
        Ok(info)
    }

    pub async fn get_family_id(&self, name: &str) -> Result<u16> {
        self.get_family(name).await.map(|info| info.id)
    }

    /// Run a command and wait for its ACK.
    ///
    /// A negative errno in the ACK comes back as [`Error::Kernel`].
    pub async fn command(
        &self,
        family_id: u16,
        cmd: u8,
        version: u8,
        build_attrs: impl FnOnce(&mut MessageBuilder),
    ) -> Result<()> {
        let seq = self
            .send_request(family_id, NLM_F_ACK, cmd, version, build_attrs)
            .await?;
        while !process_ack(&self.socket.recv().await?, seq)? {}
        Ok(())
    }

    /// Run a dump and collect every reply up to `NLMSG_DONE`.
    ///
    /// Each returned buffer is one whole message, `nlmsghdr` included.
    pub async fn dump_command(
        &self,
        family_id: u16,
        cmd: u8,
        version: u8,
        build_attrs: impl FnOnce(&mut MessageBuilder),
    ) -> Result<Vec<Vec<u8>>> {
        let seq = self
            .send_request(family_id, NLM_F_DUMP, cmd, version, build_attrs)
            .await?;

        let mut replies = Vec::new();
        loop {
            let data = self.socket.recv().await?;
            for result in MessageIter::new(&data) {
                let (header, payload) = result?;
                if header.nlmsg_seq != seq {
                    continue;
                }
                if header.is_error() {
                    NlMsgError::check(payload)?;
                    continue;
                }
                if header.is_done() {
                    return Ok(replies);
                }
                if header.is_dump_interrupted() {
                    warn!(seq, "dump interrupted, results may be inconsistent");
                }

                let mut message = header.as_bytes().to_vec();
                message.extend_from_slice(payload);
                replies.push(message);
            }
        }
    }

    /// Encode, stamp and send one request; returns its sequence number.
    async fn send_request(
        &self,
        family_id: u16,
        flags: u16,
        cmd: u8,
        version: u8,
        build_attrs: impl FnOnce(&mut MessageBuilder),
    ) -> Result<u32> {
        let mut builder = MessageBuilder::new(family_id, NLM_F_REQUEST | flags);
        builder.append(&GenlMsgHdr::new(cmd, version));
        build_attrs(&mut builder);

        let seq = self.socket.next_seq();
        builder.stamp(seq, self.socket.pid());
        self.socket.send(&builder.finish()?).await?;
        Ok(seq)
    }
}

/// Check a response buffer for the ACK of `seq`.
///
/// Returns `Ok(true)` once the ACK was seen.
fn process_ack(data: &[u8], seq: u32) -> Result<bool> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;

        if header.nlmsg_seq != seq || !header.is_error() {
            continue;
        }

        NlMsgError::check(payload)?;
        return Ok(true);
    }
    Ok(false)
}

/// Parse a CTRL_CMD_GETFAMILY response.
fn parse_family_response(data: &[u8], seq: u32, name: &str) -> Result<FamilyInfo> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;

        if header.nlmsg_seq != seq {
            continue;
        }

        if header.is_error() {
            match NlMsgError::check(payload) {
                Ok(()) => continue,
                Err(Error::Kernel { errno, .. }) if errno == libc::ENOENT => {
                    return Err(Error::FamilyNotFound {
                        name: name.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if header.is_done() {
            continue;
        }

        let (_, attrs) = GenlMsgHdr::split(payload)?;
        return parse_family_attrs(Bytes::copy_from_slice(attrs));
    }

    Err(Error::FamilyNotFound {
        name: name.to_string(),
    })
}

/// Collect the family description carried by a `CTRL_CMD_NEWFAMILY` reply.
fn parse_family_attrs(data: Bytes) -> Result<FamilyInfo> {
    let mut id = None;
    let mut info = FamilyInfo::default();

    for attr in parse_attributes(&data)? {
        let kind = attr.kind();
        if kind == CtrlAttr::FamilyId as u16 {
            id = Some(attr.value::<u16>()?);
        } else if kind == CtrlAttr::Version as u16 {
            info.version = attr.value::<u32>()? as u8;
        } else if kind == CtrlAttr::HdrSize as u16 {
            info.hdr_size = attr.value()?;
        } else if kind == CtrlAttr::MaxAttr as u16 {
            info.max_attr = attr.value()?;
        } else if kind == CtrlAttr::McastGroups as u16 {
            for group in attr.nested()? {
                if let Some((name, group_id)) = parse_mcast_group(&group)? {
                    info.mcast_groups.insert(name, group_id);
                }
            }
        }
    }

    info.id = id.ok_or_else(|| Error::InvalidMessage("missing family ID".into()))?;
    Ok(info)
}

/// One `CTRL_ATTR_MCAST_GROUPS` entry. Entries missing a name or ID are skipped.
fn parse_mcast_group(group: &AttributeView) -> Result<Option<(String, u32)>> {
    let mut name = None;
    let mut id = None;
    for attr in group.nested()? {
        if attr.kind() == CtrlAttrMcastGrp::Name as u16 {
            name = Some(attr.value::<String>()?);
        } else if attr.kind() == CtrlAttrMcastGrp::Id as u16 {
            id = Some(attr.value::<u32>()?);
        }
    }
    Ok(name.zip(id))
}
