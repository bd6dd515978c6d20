//! nl80211 command connection and multicast event socket.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio_stream::Stream;
use tracing::{debug, warn};

use super::packet::Packet;
use super::types::{InterfaceMode, ScanRequest, ScanResult, ScheduledScanRequest};
use super::{
    NL80211_GENL_NAME, NL80211_GENL_VERSION, NL80211_MULTICAST_GROUP_CONFIG,
    NL80211_MULTICAST_GROUP_MLME, NL80211_MULTICAST_GROUP_SCAN, NL80211_SCAN_FLAG_RANDOM_ADDR,
    Nl80211Attr, Nl80211Cmd, Nl80211SchedScanMatchAttr,
};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::error::{Error, Result};
use crate::netlink::genl::{FamilyInfo, GenlConnection};
use crate::netlink::socket::{EVENT_RCVBUF, NetlinkSocket};
use crate::session::{InterfaceCommands, ScanCommands};

/// Connection for issuing nl80211 commands.
///
/// Requests are answered on this connection's own socket, so an in-flight
/// command never blocks event delivery on [`Nl80211EventSocket`].
pub struct Nl80211Connection {
    genl: GenlConnection,
    family_id: u16,
}

impl Nl80211Connection {
    /// Create a new nl80211 connection.
    ///
    /// Fails with [`Error::FamilyNotFound`] when the kernel has no cfg80211.
    pub async fn new() -> Result<Self> {
        let genl = GenlConnection::new()?;
        Self::from_genl(genl).await
    }

    /// Create an nl80211 connection from an existing GENL connection.
    pub async fn from_genl(genl: GenlConnection) -> Result<Self> {
        let family_id = genl.get_family_id(NL80211_GENL_NAME).await?;
        Ok(Self { genl, family_id })
    }

    /// Get the underlying GENL connection.
    pub fn genl(&self) -> &GenlConnection {
        &self.genl
    }

    /// Resolved nl80211 family ID.
    pub fn family_id(&self) -> u16 {
        self.family_id
    }

    /// Request a one-shot scan.
    ///
    /// Completion is reported asynchronously as a scan event.
    pub async fn trigger_scan(&self, ifindex: u32, request: &ScanRequest) -> Result<()> {
        self.genl
            .command(
                self.family_id,
                Nl80211Cmd::TriggerScan as u8,
                NL80211_GENL_VERSION,
                |builder| write_trigger_scan(builder, ifindex, request),
            )
            .await
            .map_err(|e| e.with_context("NL80211_CMD_TRIGGER_SCAN"))
    }

    /// Start a scheduled scan.
    pub async fn start_scheduled_scan(
        &self,
        ifindex: u32,
        request: &ScheduledScanRequest,
    ) -> Result<()> {
        self.genl
            .command(
                self.family_id,
                Nl80211Cmd::StartSchedScan as u8,
                NL80211_GENL_VERSION,
                |builder| write_sched_scan(builder, ifindex, request),
            )
            .await
            .map_err(|e| e.with_context("NL80211_CMD_START_SCHED_SCAN"))
    }

    /// Stop the running scheduled scan.
    pub async fn stop_scheduled_scan(&self, ifindex: u32) -> Result<()> {
        self.genl
            .command(
                self.family_id,
                Nl80211Cmd::StopSchedScan as u8,
                NL80211_GENL_VERSION,
                |builder| builder.append_attr_u32(Nl80211Attr::Ifindex as u16, ifindex),
            )
            .await
            .map_err(|e| e.with_context("NL80211_CMD_STOP_SCHED_SCAN"))
    }

    /// Dump the kernel's cached scan results for an interface.
    ///
    /// Entries that fail to parse are logged and skipped.
    pub async fn get_scan_results(&self, ifindex: u32) -> Result<Vec<ScanResult>> {
        let responses = self
            .genl
            .dump_command(
                self.family_id,
                Nl80211Cmd::GetScan as u8,
                NL80211_GENL_VERSION,
                |builder| builder.append_attr_u32(Nl80211Attr::Ifindex as u16, ifindex),
            )
            .await
            .map_err(|e| e.with_context("NL80211_CMD_GET_SCAN"))?;

        Ok(parse_scan_dump(responses))
    }

    /// Switch an interface to another mode.
    pub async fn set_interface_mode(&self, ifindex: u32, mode: InterfaceMode) -> Result<()> {
        self.genl
            .command(
                self.family_id,
                Nl80211Cmd::SetInterface as u8,
                NL80211_GENL_VERSION,
                |builder| {
                    builder.append_attr_u32(Nl80211Attr::Ifindex as u16, ifindex);
                    builder.append_attr_u32(Nl80211Attr::Iftype as u16, mode.iftype() as u32);
                },
            )
            .await
            .map_err(|e| e.with_context("NL80211_CMD_SET_INTERFACE"))
    }
}

impl ScanCommands for Nl80211Connection {
    async fn trigger_scan(&self, ifindex: u32, request: &ScanRequest) -> Result<()> {
        Nl80211Connection::trigger_scan(self, ifindex, request).await
    }

    async fn start_scheduled_scan(
        &self,
        ifindex: u32,
        request: &ScheduledScanRequest,
    ) -> Result<()> {
        Nl80211Connection::start_scheduled_scan(self, ifindex, request).await
    }

    async fn stop_scheduled_scan(&self, ifindex: u32) -> Result<()> {
        Nl80211Connection::stop_scheduled_scan(self, ifindex).await
    }

    async fn get_scan_results(&self, ifindex: u32) -> Result<Vec<ScanResult>> {
        Nl80211Connection::get_scan_results(self, ifindex).await
    }
}

impl InterfaceCommands for Nl80211Connection {
    async fn set_interface_mode(&self, ifindex: u32, mode: InterfaceMode) -> Result<()> {
        Nl80211Connection::set_interface_mode(self, ifindex, mode).await
    }
}

/// Append `TRIGGER_SCAN` attributes.
fn write_trigger_scan(builder: &mut MessageBuilder, ifindex: u32, request: &ScanRequest) {
    builder.append_attr_u32(Nl80211Attr::Ifindex as u16, ifindex);
    write_ssids(builder, &request.ssids);
    write_frequencies(builder, &request.frequencies);
    if request.random_mac {
        builder.append_attr_u32(Nl80211Attr::ScanFlags as u16, NL80211_SCAN_FLAG_RANDOM_ADDR);
    }
}

/// Append `START_SCHED_SCAN` attributes.
///
/// Each match set carries the SSID and the RSSI threshold. With no match
/// SSIDs a single RSSI-only set is sent, which the kernel applies to all
/// results.
fn write_sched_scan(builder: &mut MessageBuilder, ifindex: u32, request: &ScheduledScanRequest) {
    builder.append_attr_u32(Nl80211Attr::Ifindex as u16, ifindex);
    builder.append_attr_u32(Nl80211Attr::SchedScanInterval as u16, request.interval_ms);
    write_ssids(builder, &request.scan_ssids);

    let rssi = request.rssi_threshold;
    if request.match_ssids.is_empty() {
        builder.append_list(Nl80211Attr::SchedScanMatch as u16, &[()], |b, i, _| {
            let set = b.nest_start(i);
            b.append_attr_i32(Nl80211SchedScanMatchAttr::Rssi as u16, rssi);
            b.nest_end(set);
        });
    } else {
        builder.append_list(
            Nl80211Attr::SchedScanMatch as u16,
            &request.match_ssids,
            |b, i, ssid| {
                let set = b.nest_start(i);
                b.append_attr(Nl80211SchedScanMatchAttr::Ssid as u16, ssid);
                b.append_attr_i32(Nl80211SchedScanMatchAttr::Rssi as u16, rssi);
                b.nest_end(set);
            },
        );
    }

    write_frequencies(builder, &request.frequencies);
    if request.random_mac {
        builder.append_attr_u32(Nl80211Attr::ScanFlags as u16, NL80211_SCAN_FLAG_RANDOM_ADDR);
    }
}

fn write_ssids(builder: &mut MessageBuilder, ssids: &[Vec<u8>]) {
    if !ssids.is_empty() {
        builder.append_list(Nl80211Attr::ScanSsids as u16, ssids, |b, i, ssid| {
            b.append_attr(i, ssid)
        });
    }
}

fn write_frequencies(builder: &mut MessageBuilder, frequencies: &[u32]) {
    if !frequencies.is_empty() {
        builder.append_list(Nl80211Attr::ScanFrequencies as u16, frequencies, |b, i, freq| {
            b.append_attr_u32(i, *freq)
        });
    }
}

fn parse_scan_dump(responses: Vec<Vec<u8>>) -> Vec<ScanResult> {
    let mut results = Vec::with_capacity(responses.len());
    for response in responses {
        let parsed = Packet::decode_bytes(Bytes::from(response))
            .and_then(|packet| ScanResult::from_attrs(packet.attributes()));
        match parsed {
            Ok(result) => results.push(result),
            Err(e) => warn!(error = %e, "skipping malformed scan result"),
        }
    }
    results
}

/// Socket subscribed to the nl80211 multicast groups.
///
/// Packets of other families and malformed messages are dropped with a
/// warning; the rest are yielded in kernel order.
pub struct Nl80211EventSocket {
    socket: NetlinkSocket,
    family: FamilyInfo,
    pending: Vec<Packet>,
}

impl Nl80211EventSocket {
    /// Resolve the nl80211 family and join the `mlme`, `scan` and `config`
    /// groups.
    pub async fn new() -> Result<Self> {
        Self::with_groups(&[
            NL80211_MULTICAST_GROUP_MLME,
            NL80211_MULTICAST_GROUP_SCAN,
            NL80211_MULTICAST_GROUP_CONFIG,
        ])
        .await
    }

    /// Resolve the nl80211 family and join the named multicast groups.
    ///
    /// Groups the kernel does not advertise are skipped with a warning.
    pub async fn with_groups(groups: &[&str]) -> Result<Self> {
        let genl = GenlConnection::new()?;
        let family = genl.get_family(NL80211_GENL_NAME).await?;
        let mut socket = genl.into_socket();
        if let Err(e) = socket.set_recv_buffer_size(EVENT_RCVBUF) {
            warn!(error = %e, "could not enlarge event socket receive buffer");
        }

        let mut joined = 0;
        for name in groups {
            match family.mcast_group(name) {
                Some(id) => {
                    socket.join_group(id)?;
                    debug!(group = *name, id, "joined nl80211 multicast group");
                    joined += 1;
                }
                None => warn!(group = *name, "nl80211 multicast group not available"),
            }
        }
        if joined == 0 {
            return Err(Error::NotSupported(
                "no nl80211 multicast group could be joined".into(),
            ));
        }

        Ok(Self {
            socket,
            family,
            pending: Vec::new(),
        })
    }

    /// nl80211 family information, including multicast group IDs.
    pub fn family(&self) -> &FamilyInfo {
        &self.family
    }

    /// Receive the next batch of packets.
    ///
    /// May return an empty batch when a datagram holds only foreign or
    /// malformed messages.
    pub async fn recv_packets(&mut self) -> Result<Vec<Packet>> {
        if !self.pending.is_empty() {
            // Left behind by the Stream impl, which keeps them reversed
            let mut rest = std::mem::take(&mut self.pending);
            rest.reverse();
            return Ok(rest);
        }
        let data = self.socket.recv().await?;
        Ok(filter_packets(self.family.id, data))
    }
}

/// Decode a datagram, keeping well-formed messages of `family_id`.
fn filter_packets(family_id: u16, data: Bytes) -> Vec<Packet> {
    Packet::decode_all(&data)
        .into_iter()
        .filter_map(|result| match result {
            Ok(packet) if packet.message_type() == family_id => Some(packet),
            Ok(packet) => {
                debug!(
                    message_type = packet.message_type(),
                    "ignoring message from another family"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed nl80211 message");
                None
            }
        })
        .collect()
}

impl Stream for Nl80211EventSocket {
    type Item = Result<Packet>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // Return pending packets first
        if let Some(packet) = this.pending.pop() {
            return Poll::Ready(Some(Ok(packet)));
        }

        loop {
            match this.socket.poll_recv(cx) {
                Poll::Ready(Ok(data)) => {
                    this.pending = filter_packets(this.family.id, data);

                    // Reverse so we pop in the correct order
                    this.pending.reverse();

                    if let Some(packet) = this.pending.pop() {
                        return Poll::Ready(Some(Ok(packet)));
                    }

                    continue;
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Unpin for Nl80211EventSocket {}
