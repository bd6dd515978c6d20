//! nl80211 netlink codec, kernel event decoding and WiFi interface sessions.
//!
//! This crate parses generic netlink messages of the kernel's `nl80211`
//! family into typed events and routes them to per-interface sessions.
//! Sessions stop accepting operations once their interface goes away.
//!
//! # Features
//!
//! - `serde` - `Serialize` for decoded events and scan results
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio_stream::StreamExt;
//! use wificond::dispatch::Dispatcher;
//! use wificond::nl80211::{Nl80211Connection, Nl80211EventSocket};
//! use wificond::session::ScannerSession;
//!
//! #[tokio::main]
//! async fn main() -> wificond::Result<()> {
//!     let commands = Arc::new(Nl80211Connection::new().await?);
//!     let dispatcher = Dispatcher::new();
//!     dispatcher.register(Arc::new(ScannerSession::new(
//!         3,
//!         commands,
//!         Default::default(),
//!         Default::default(),
//!         Default::default(),
//!     )))?;
//!
//!     let mut events = Nl80211EventSocket::new().await?;
//!     while let Some(packet) = events.try_next().await? {
//!         dispatcher.dispatch_packet(&packet);
//!     }
//!     Ok(())
//! }
//! ```

pub mod dispatch;
pub mod netlink;
pub mod nl80211;
pub mod session;

// Re-export common types at crate root for convenience
pub use netlink::{Error, Result};
