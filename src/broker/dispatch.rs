use crate::protocol::ControlMessage;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::net::{SocketAddr, UdpSocket};
use tracing::{debug, warn};

/// Listener registry and control-message fan-out.
///
/// Owned by the receiver/dispatcher pairing; the executor holds a handle
/// only to trigger `Continue` broadcasts and never reads the registry.
/// Delivery is best-effort over the unreliable transport: send failures
/// are logged and forgotten.
pub(crate) struct NotificationDispatcher {
    socket: UdpSocket,
    listeners: RwLock<HashSet<SocketAddr>>,
}

impl NotificationDispatcher {
    /// `socket` is a clone of the broker's bound socket, so notifications
    /// originate from the address listeners filter on.
    pub fn new(socket: UdpSocket) -> Self {
        Self {
            socket,
            listeners: RwLock::new(HashSet::new()),
        }
    }

    /// Add a listener address. Duplicates collapse into one entry.
    pub fn register(&self, addr: SocketAddr) {
        if self.listeners.write().insert(addr) {
            debug!(%addr, "registered notification listener");
        } else {
            debug!(%addr, "listener already registered");
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Send one datagram per registered listener.
    pub fn broadcast(&self, message: ControlMessage) {
        let listeners = self.listeners.read();
        debug!(%message, count = listeners.len(), "broadcasting control message");
        for addr in listeners.iter() {
            if let Err(e) = self.socket.send_to(message.as_bytes(), addr) {
                warn!(%addr, error = %e, "failed to notify listener");
            }
        }
    }

    /// Terminate broadcast: sent exactly once, right before the receiver
    /// exits, and the registry is cleared afterwards.
    pub fn shutdown(&self) {
        self.broadcast(ControlMessage::Terminate);
        self.listeners.write().clear();
    }
}
