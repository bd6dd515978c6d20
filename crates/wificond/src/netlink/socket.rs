//! Non-blocking `NETLINK_GENERIC` socket driven by the tokio reactor.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::{Context, Poll, ready};

use bytes::{Bytes, BytesMut};
use netlink_sys::{Socket, SocketAddr, protocols};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tracing::{debug, warn};

use super::error::Result;

/// Per-datagram receive capacity. Scan dumps carry full IE blobs per BSS.
const DATAGRAM_CAPACITY: usize = 32 * 1024;

/// Kernel receive queue requested for event sockets. A burst of scan and
/// MLME notifications overflows the default queue on busy radios.
pub const EVENT_RCVBUF: usize = 1024 * 1024;

/// Generic netlink socket bound to a kernel-assigned port.
pub struct NetlinkSocket {
    fd: AsyncFd<Socket>,
    seq: AtomicU32,
    pid: u32,
}

impl NetlinkSocket {
    pub fn new() -> Result<Self> {
        let mut socket = Socket::new(protocols::NETLINK_GENERIC)?;
        socket.set_non_blocking(true)?;

        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;

        // Older kernels reject NETLINK_EXT_ACK; errors then lack the message
        if let Err(e) = socket.set_ext_ack(true) {
            debug!(error = %e, "extended ack unavailable");
        }

        Ok(Self {
            pid: addr.port_number(),
            fd: AsyncFd::new(socket)?,
            seq: AtomicU32::new(1),
        })
    }

    /// Allocate a request sequence number.
    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn join_group(&mut self, group: u32) -> Result<()> {
        Ok(self.fd.get_mut().add_membership(group)?)
    }

    /// Ask the kernel for a larger receive queue (`SO_RCVBUF`).
    ///
    /// The kernel may clamp the value to `net.core.rmem_max`.
    pub fn set_recv_buffer_size(&self, bytes: usize) -> Result<()> {
        let size = libc::c_int::try_from(bytes).unwrap_or(libc::c_int::MAX);
        Ok(self.fd.get_ref().set_rx_buf_sz(size)?)
    }

    /// Current `SO_RCVBUF`, as doubled by the kernel for bookkeeping.
    pub fn recv_buffer_size(&self) -> Result<usize> {
        Ok(self.fd.get_ref().get_rx_buf_sz()?)
    }

    pub async fn send(&self, msg: &[u8]) -> Result<()> {
        loop {
            let mut guard = self.fd.ready(Interest::WRITABLE).await?;
            if let Ok(sent) = guard.try_io(|inner| inner.get_ref().send(msg, 0)) {
                sent?;
                return Ok(());
            }
        }
    }

    /// Wait for the next datagram.
    pub async fn recv(&self) -> Result<Bytes> {
        loop {
            let mut guard = self.fd.ready(Interest::READABLE).await?;
            if let Ok(received) = guard.try_io(|inner| recv_datagram(inner.get_ref())) {
                match received? {
                    Some(data) => return Ok(data),
                    None => continue,
                }
            }
        }
    }

    /// Poll variant of [`recv`](Self::recv) for `Stream` implementations.
    pub fn poll_recv(&self, cx: &mut Context<'_>) -> Poll<Result<Bytes>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;
            if let Ok(received) = guard.try_io(|inner| recv_datagram(inner.get_ref())) {
                match received? {
                    Some(data) => return Poll::Ready(Ok(data)),
                    None => continue,
                }
            }
        }
    }
}

/// Read one datagram. `Ok(None)` means the kernel dropped notifications
/// because the receive queue overflowed; the socket stays usable.
fn recv_datagram(socket: &Socket) -> io::Result<Option<Bytes>> {
    let mut buf = BytesMut::with_capacity(DATAGRAM_CAPACITY);
    match socket.recv(&mut buf, 0) {
        Ok(_) => Ok(Some(buf.freeze())),
        Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
            warn!("netlink receive queue overrun, events were lost");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}
