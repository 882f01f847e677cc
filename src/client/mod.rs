//! Producer-side API: sending requests and listening for control
//! messages.
//!
//! Producers talk to the broker over plain datagrams and never share
//! memory with it. Everything here is best-effort, like the transport:
//! a request may be lost, a reply may never come, and the caller is
//! expected to live with both.

use crate::error::Result;
use crate::protocol::{self, ControlMessage, ReplyRow, Request};
use crossbeam::channel::{unbounded, Receiver, TryRecvError};
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

fn resolve(addr: impl ToSocketAddrs) -> std::io::Result<SocketAddr> {
    addr.to_socket_addrs()?.next().ok_or_else(|| {
        std::io::Error::new(ErrorKind::AddrNotAvailable, "address did not resolve")
    })
}

/// Fire-and-forget request send from an ephemeral socket.
///
/// Use a [`Producer`] instead when replies matter: replies go to the
/// sending socket, and this one is gone once the function returns.
pub fn send_request(broker: impl ToSocketAddrs, request: &Request) -> Result<()> {
    let broker_addr = resolve(broker)?;
    let bind_addr = if broker_addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr)?;
    socket.send_to(protocol::encode(request).as_bytes(), broker_addr)?;
    Ok(())
}

/// A producer handle with a stable local address, so Select replies and
/// Pause notifications can find their way back.
pub struct Producer {
    socket: UdpSocket,
    broker_addr: SocketAddr,
}

impl Producer {
    pub fn bind(local: impl ToSocketAddrs, broker: impl ToSocketAddrs) -> Result<Self> {
        let socket = UdpSocket::bind(local)?;
        let broker_addr = resolve(broker)?;
        debug!(local = %socket.local_addr()?, %broker_addr, "producer bound");
        Ok(Self {
            socket,
            broker_addr,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn send(&self, request: &Request) -> Result<()> {
        self.socket
            .send_to(protocol::encode(request).as_bytes(), self.broker_addr)?;
        Ok(())
    }

    pub fn select(&self, condition: Option<&str>, attributes: &[&str]) -> Result<()> {
        self.send(&Request::select(condition, attributes))
    }

    pub fn update(&self, condition: Option<&str>, assignments: &[(&str, &str)]) -> Result<()> {
        self.send(&Request::update(condition, assignments))
    }

    pub fn insert(&self, attributes: &[&str], values: &[&str]) -> Result<()> {
        self.send(&Request::insert(attributes, values))
    }

    pub fn terminate(&self) -> Result<()> {
        self.send(&Request::terminate())
    }

    /// Wait for a control message addressed to this producer, such as the
    /// Pause that follows a burst of sends. Reply rows arriving in the
    /// meantime are discarded. Returns `None` when `deadline` elapses.
    pub fn recv_control(&self, deadline: Duration) -> Result<Option<ControlMessage>> {
        let mut buf = [0u8; 10240];
        let start = Instant::now();

        loop {
            let remaining = deadline.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.socket.set_read_timeout(Some(remaining))?;
            match self.socket.recv_from(&mut buf) {
                Ok((len, addr)) => {
                    if addr != self.broker_addr {
                        continue;
                    }
                    if let Ok(message) = ControlMessage::decode(&buf[..len]) {
                        return Ok(Some(message));
                    }
                }
                Err(e)
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Collect Select reply rows until `deadline` elapses.
    ///
    /// The protocol does not announce how many rows a reply has, so this
    /// is purely deadline-driven: an empty result and a lost reply look
    /// the same. Datagrams from anyone but the broker are ignored.
    pub fn recv_rows(&self, deadline: Duration) -> Result<Vec<ReplyRow>> {
        let mut rows = Vec::new();
        let mut buf = [0u8; 10240];
        let start = Instant::now();

        loop {
            let remaining = deadline.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            self.socket.set_read_timeout(Some(remaining))?;
            match self.socket.recv_from(&mut buf) {
                Ok((len, addr)) => {
                    if addr != self.broker_addr {
                        continue;
                    }
                    // Pause notifications share the socket with replies.
                    if ControlMessage::decode(&buf[..len]).is_ok() {
                        continue;
                    }
                    match protocol::decode_row(&buf[..len]) {
                        Ok(row) => rows.push(row),
                        Err(e) => debug!(error = %e, "ignoring undecodable reply"),
                    }
                }
                Err(e)
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                {
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(rows)
    }
}

/// A registered control-message listener.
///
/// `register` sends the `R` request and spawns a thread that forwards
/// decoded `P`/`C`/`T` messages from the broker; the thread exits after
/// Terminate. Messages are read from the handle, which mirrors the
/// notification queue the reference hands to its workers.
pub struct ControlListener {
    messages: Receiver<ControlMessage>,
    handle: Option<JoinHandle<()>>,
}

impl ControlListener {
    pub fn register(local: impl ToSocketAddrs, broker: impl ToSocketAddrs) -> Result<Self> {
        let socket = UdpSocket::bind(local)?;
        let broker_addr = resolve(broker)?;
        socket.send_to(
            protocol::encode(&Request::register_listener()).as_bytes(),
            broker_addr,
        )?;

        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name("br-notify".into())
            .spawn(move || {
                let mut buf = [0u8; 1024];
                loop {
                    let (len, addr) = match socket.recv_from(&mut buf) {
                        Ok(received) => received,
                        Err(e) => {
                            warn!(error = %e, "notification socket failed");
                            break;
                        }
                    };
                    // Only the broker gets to pause us.
                    if addr != broker_addr {
                        continue;
                    }
                    match ControlMessage::decode(&buf[..len]) {
                        Ok(message) => {
                            debug!(%message, "control message received");
                            let terminate = message == ControlMessage::Terminate;
                            let _ = tx.send(message);
                            if terminate {
                                break;
                            }
                        }
                        Err(e) => debug!(error = %e, "ignoring undecodable notification"),
                    }
                }
                info!("notification listener stopped");
            })?;

        Ok(Self {
            messages: rx,
            handle: Some(handle),
        })
    }

    /// Next pending control message, if any.
    pub fn try_recv(&self) -> Option<ControlMessage> {
        match self.messages.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next control message.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ControlMessage> {
        self.messages.recv_timeout(timeout).ok()
    }

    /// Wait for the listener thread to finish (it exits on Terminate).
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
