//! Interface sessions: per-interface state with one-way validity gating.
//!
//! A session is created when an interface is brought under management and
//! invalidated when the interface goes away. Once invalid, every operation
//! fails with [`Error::InterfaceInvalidated`] before touching the kernel.
//!
//! Kernel commands go through small collaborator traits
//! ([`ScanCommands`], [`InterfaceCommands`], [`HostapdControl`],
//! [`LinkControl`]) so the sessions can be driven by
//! [`Nl80211Connection`](crate::nl80211::Nl80211Connection) in the daemon
//! and by test doubles in tests.

mod ap;
mod scanner;

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

pub use ap::{ApEventHandler, ApSession};
pub use scanner::{PnoScanEventHandler, ScanEventHandler, ScannerSession};

use crate::netlink::error::{Error, Result};
use crate::nl80211::{InterfaceMode, Nl80211Event, ScanRequest, ScanResult, ScheduledScanRequest};

/// Role a managed interface plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SessionRole {
    /// Client interface with a scanner.
    Scanner,
    /// Access point interface.
    Ap,
}

/// Validity state of a session.
///
/// Starts valid and can only move to invalid. The flag is atomic so RPC
/// callers on other threads observe invalidation promptly; an operation
/// that passed the check just before invalidation may still reach the
/// kernel, which rejects commands for vanished interfaces itself.
#[derive(Debug)]
pub struct Lifecycle {
    interface_index: u32,
    valid: AtomicBool,
}

impl Lifecycle {
    /// Create a valid lifecycle for an interface.
    pub fn new(interface_index: u32) -> Self {
        Self {
            interface_index,
            valid: AtomicBool::new(true),
        }
    }

    /// Interface this lifecycle belongs to.
    pub fn interface_index(&self) -> u32 {
        self.interface_index
    }

    /// Check whether the session is still valid.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Invalidate the session.
    ///
    /// Returns `true` if this call performed the transition; later calls
    /// are no-ops and return `false`.
    pub fn invalidate(&self) -> bool {
        let was_valid = self.valid.swap(false, Ordering::AcqRel);
        if was_valid {
            info!(ifindex = self.interface_index, "interface session invalidated");
        }
        was_valid
    }

    /// Fail fast if the session is no longer valid.
    pub fn check(&self, operation: &'static str) -> Result<()> {
        if self.is_valid() {
            return Ok(());
        }
        debug!(
            ifindex = self.interface_index,
            operation, "call on invalidated interface session"
        );
        Err(Error::InterfaceInvalidated {
            ifindex: self.interface_index,
        })
    }
}

/// A session the dispatcher can route events to.
pub trait ManagedInterface: Send + Sync {
    /// Interface index, fixed for the session's lifetime.
    fn interface_index(&self) -> u32;

    /// Role of the session.
    fn role(&self) -> SessionRole;

    /// Check whether the session is still valid.
    fn is_valid(&self) -> bool;

    /// Invalidate the session (idempotent).
    fn invalidate(&self);

    /// Handle an event addressed to this interface.
    ///
    /// Invalid sessions ignore events.
    fn handle_event(&self, event: &Nl80211Event);
}

/// Scan commands issued to the kernel.
#[allow(async_fn_in_trait)]
pub trait ScanCommands {
    /// Start a one-shot scan.
    async fn trigger_scan(&self, ifindex: u32, request: &ScanRequest) -> Result<()>;

    /// Start a scheduled (PNO) scan.
    async fn start_scheduled_scan(&self, ifindex: u32, request: &ScheduledScanRequest)
    -> Result<()>;

    /// Stop the scheduled scan.
    async fn stop_scheduled_scan(&self, ifindex: u32) -> Result<()>;

    /// Fetch the kernel's cached scan results.
    async fn get_scan_results(&self, ifindex: u32) -> Result<Vec<ScanResult>>;
}

/// Interface configuration commands issued to the kernel.
#[allow(async_fn_in_trait)]
pub trait InterfaceCommands {
    /// Switch the interface to another operating mode.
    async fn set_interface_mode(&self, ifindex: u32, mode: InterfaceMode) -> Result<()>;
}

/// Controls the hostapd process serving an AP interface.
#[allow(async_fn_in_trait)]
pub trait HostapdControl {
    /// Start hostapd.
    async fn start_hostapd(&self) -> Result<()>;

    /// Stop hostapd.
    async fn stop_hostapd(&self) -> Result<()>;
}

/// Brings network links up and down.
#[allow(async_fn_in_trait)]
pub trait LinkControl {
    /// Set the administrative up state of an interface.
    async fn set_up_state(&self, ifname: &str, up: bool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_starts_valid() {
        let lifecycle = Lifecycle::new(4);
        assert!(lifecycle.is_valid());
        assert!(lifecycle.check("scan").is_ok());
    }

    #[test]
    fn test_invalidate_is_one_way_and_idempotent() {
        let lifecycle = Lifecycle::new(4);
        assert!(lifecycle.invalidate());
        assert!(!lifecycle.invalidate());
        assert!(!lifecycle.is_valid());

        let err = lifecycle.check("scan").unwrap_err();
        assert!(matches!(err, Error::InterfaceInvalidated { ifindex: 4 }));
    }
}
