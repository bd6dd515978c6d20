//! Routing of decoded kernel events to interface sessions.
//!
//! The dispatcher owns the registry of managed interfaces keyed by
//! interface index. Each inbound buffer is decoded and dispatched in full,
//! in kernel order, before the next one is read.
//!
//! Only one interface is managed at a time unless a larger limit is set
//! with [`Dispatcher::with_interface_limit`]. Subscribers registered with
//! [`Dispatcher::subscribe_interface_events`] hear about every interface
//! that comes under management or is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use crate::nl80211::{
    AssociateEvent, ConnectEvent, DisassociateEvent, DisconnectEvent, EventDecoder, MlmeEvent,
    Nl80211Event, Packet, RoamEvent,
};
use crate::netlink::error::{Error, Result};
use crate::session::{ManagedInterface, SessionRole};

/// Number of interfaces a default dispatcher manages at once.
pub const DEFAULT_INTERFACE_LIMIT: usize = 1;

/// Hears when interfaces come under management and when they are released.
///
/// Callbacks run without any dispatcher lock held.
pub trait InterfaceEventHandler: Send + Sync {
    fn on_interface_ready(&self, _ifindex: u32, _role: SessionRole) {}
    fn on_interface_torn_down(&self, _ifindex: u32, _role: SessionRole) {}
}

/// Receives MLME events for one interface.
///
/// Every method defaults to doing nothing.
pub trait MlmeEventHandler: Send + Sync {
    fn on_associate(&self, _event: &AssociateEvent) {}
    fn on_connect(&self, _event: &ConnectEvent) {}
    fn on_roam(&self, _event: &RoamEvent) {}
    fn on_disassociate(&self, _event: &DisassociateEvent) {}
    fn on_disconnect(&self, _event: &DisconnectEvent) {}
}

/// What happened to one dispatched packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No decoder claimed the packet, or it lacked required attributes.
    Ignored,
    /// The event reached the session and/or MLME handler of the interface.
    Delivered { interface_index: u32 },
    /// No session or handler is registered for the interface.
    Unmanaged { interface_index: u32 },
    /// The interface was removed; its session, if any, was invalidated.
    InterfaceRemoved {
        interface_index: u32,
        had_session: bool,
    },
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<u32, Arc<dyn ManagedInterface>>,
    mlme_handlers: HashMap<u32, Arc<dyn MlmeEventHandler>>,
    interface_handlers: Vec<Arc<dyn InterfaceEventHandler>>,
}

/// Event dispatcher keyed by interface index.
pub struct Dispatcher {
    registry: Mutex<Registry>,
    interface_limit: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_interface_limit(DEFAULT_INTERFACE_LIMIT)
    }
}

impl Dispatcher {
    /// Create an empty dispatcher managing at most one interface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty dispatcher managing up to `limit` interfaces.
    pub fn with_interface_limit(limit: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            interface_limit: limit,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bring a session under management and announce it to interface
    /// event subscribers.
    ///
    /// An interface that is already managed is never replaced, and a
    /// dispatcher at its interface limit refuses new sessions. A refused
    /// session is left valid for the caller to dispose of.
    pub fn register(&self, session: Arc<dyn ManagedInterface>) -> Result<()> {
        let ifindex = session.interface_index();
        let role = session.role();
        let subscribers = {
            let mut registry = self.registry();
            if registry.sessions.contains_key(&ifindex) {
                warn!(ifindex, "interface is already managed");
                return Err(Error::AlreadyManaged { ifindex });
            }
            if registry.sessions.len() >= self.interface_limit {
                warn!(
                    ifindex,
                    limit = self.interface_limit,
                    "cannot manage another interface while others exist"
                );
                return Err(Error::TooManyInterfaces {
                    limit: self.interface_limit,
                });
            }
            registry.sessions.insert(ifindex, session);
            registry.interface_handlers.clone()
        };
        info!(ifindex, ?role, "interface session registered");
        for handler in &subscribers {
            handler.on_interface_ready(ifindex, role);
        }
        Ok(())
    }

    /// Release an interface. Its session is invalidated, announced as torn
    /// down and returned.
    pub fn unregister(&self, ifindex: u32) -> Option<Arc<dyn ManagedInterface>> {
        let (session, subscribers) = {
            let mut registry = self.registry();
            registry.mlme_handlers.remove(&ifindex);
            (
                registry.sessions.remove(&ifindex),
                registry.interface_handlers.clone(),
            )
        };
        if let Some(session) = &session {
            session.invalidate();
            info!(ifindex, "interface session unregistered");
            for handler in &subscribers {
                handler.on_interface_torn_down(ifindex, session.role());
            }
        }
        session
    }

    /// Invalidate and release every session, announcing each one as torn
    /// down in interface index order. Returns how many were released.
    pub fn tear_down_all(&self) -> usize {
        let (mut sessions, subscribers) = {
            let mut registry = self.registry();
            registry.mlme_handlers.clear();
            let sessions: Vec<_> = registry.sessions.drain().map(|(_, s)| s).collect();
            (sessions, registry.interface_handlers.clone())
        };
        sessions.sort_by_key(|s| s.interface_index());
        for session in &sessions {
            session.invalidate();
            for handler in &subscribers {
                handler.on_interface_torn_down(session.interface_index(), session.role());
            }
        }
        info!(count = sessions.len(), "tore down all interface sessions");
        sessions.len()
    }

    /// Session registered for `ifindex`.
    pub fn session(&self, ifindex: u32) -> Option<Arc<dyn ManagedInterface>> {
        self.registry().sessions.get(&ifindex).cloned()
    }

    /// Sessions playing `role`, in interface index order.
    pub fn sessions_by_role(&self, role: SessionRole) -> Vec<Arc<dyn ManagedInterface>> {
        let mut sessions: Vec<_> = self
            .registry()
            .sessions
            .values()
            .filter(|s| s.role() == role)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.interface_index());
        sessions
    }

    /// Add an interface event subscriber. Registering the same handler
    /// twice is ignored with a warning.
    pub fn subscribe_interface_events(&self, handler: Arc<dyn InterfaceEventHandler>) {
        let mut registry = self.registry();
        if registry
            .interface_handlers
            .iter()
            .any(|h| Arc::ptr_eq(h, &handler))
        {
            warn!("ignoring duplicate interface event handler registration");
            return;
        }
        registry.interface_handlers.push(handler);
        info!("interface event handler registered");
    }

    /// Remove an interface event subscriber.
    pub fn unsubscribe_interface_events(&self, handler: &Arc<dyn InterfaceEventHandler>) {
        let mut registry = self.registry();
        match registry
            .interface_handlers
            .iter()
            .position(|h| Arc::ptr_eq(h, handler))
        {
            Some(at) => {
                registry.interface_handlers.remove(at);
                info!("interface event handler unregistered");
            }
            None => warn!("no such interface event handler to unregister"),
        }
    }

    /// Number of interface event subscribers.
    pub fn interface_subscriber_count(&self) -> usize {
        self.registry().interface_handlers.len()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.registry().sessions.len()
    }

    /// Check if no session is registered.
    pub fn is_empty(&self) -> bool {
        self.registry().sessions.is_empty()
    }

    /// Register the MLME handler for an interface, replacing any existing one.
    pub fn subscribe_mlme(&self, ifindex: u32, handler: Arc<dyn MlmeEventHandler>) {
        if self
            .registry()
            .mlme_handlers
            .insert(ifindex, handler)
            .is_some()
        {
            debug!(ifindex, "replacing mlme event handler");
        }
    }

    /// Remove the MLME handler for an interface.
    pub fn unsubscribe_mlme(&self, ifindex: u32) {
        self.registry().mlme_handlers.remove(&ifindex);
    }

    /// Decode and dispatch every message in a receive buffer, in order.
    ///
    /// Malformed messages are logged and skipped.
    pub fn dispatch_buffer(&self, buf: &[u8]) -> Vec<DispatchOutcome> {
        let buf = Bytes::copy_from_slice(buf);
        let mut outcomes = Vec::new();
        for result in Packet::decode_all(&buf) {
            match result {
                Ok(packet) => outcomes.push(self.dispatch_packet(&packet)),
                Err(e) => warn!(error = %e, "dropping malformed netlink message"),
            }
        }
        outcomes
    }

    /// Decode one packet and route the resulting event.
    pub fn dispatch_packet(&self, packet: &Packet) -> DispatchOutcome {
        trace!(
            cmd = packet.command(),
            seq = packet.sequence(),
            "dispatching nl80211 packet"
        );
        match EventDecoder::decode(packet) {
            Some(event) => self.dispatch_event(&event),
            None => DispatchOutcome::Ignored,
        }
    }

    /// Route a decoded event by interface index.
    pub fn dispatch_event(&self, event: &Nl80211Event) -> DispatchOutcome {
        let ifindex = event.interface_index();

        if let Nl80211Event::InterfaceRemoved { .. } = event {
            let had_session = self.unregister(ifindex).is_some();
            info!(ifindex, had_session, "interface removed by kernel");
            return DispatchOutcome::InterfaceRemoved {
                interface_index: ifindex,
                had_session,
            };
        }

        // Handlers run without the registry lock held
        let (session, mlme_handler) = {
            let registry = self.registry();
            (
                registry.sessions.get(&ifindex).cloned(),
                registry.mlme_handlers.get(&ifindex).cloned(),
            )
        };

        let mut delivered = false;
        if let (Nl80211Event::Mlme(mlme), Some(handler)) = (event, &mlme_handler) {
            deliver_mlme(handler.as_ref(), mlme);
            delivered = true;
        }
        if let Some(session) = session {
            session.handle_event(event);
            delivered = true;
        }

        if delivered {
            DispatchOutcome::Delivered {
                interface_index: ifindex,
            }
        } else {
            debug!(ifindex, "event for unmanaged interface");
            DispatchOutcome::Unmanaged {
                interface_index: ifindex,
            }
        }
    }
}

fn deliver_mlme(handler: &dyn MlmeEventHandler, event: &MlmeEvent) {
    match event {
        MlmeEvent::Associate(e) => handler.on_associate(e),
        MlmeEvent::Connect(e) => handler.on_connect(e),
        MlmeEvent::Roam(e) => handler.on_roam(e),
        MlmeEvent::Disassociate(e) => handler.on_disassociate(e),
        MlmeEvent::Disconnect(e) => handler.on_disconnect(e),
    }
}
