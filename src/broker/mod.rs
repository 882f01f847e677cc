mod dispatch;
mod executor;
mod receiver;

use crate::error::Result;
use crate::flow::FlowController;
use crate::protocol::{self, Request};
use crate::store::{Store, StoreOp};
use crate::{BrokerConfig, BrokerStats};
use crossbeam::channel::{unbounded, Sender};
use dispatch::NotificationDispatcher;
use executor::StoreExecutor;
use parking_lot::Mutex;
use receiver::RequestReceiver;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Lifecycle of a broker instance. Once `Stopped`, there is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Starting,
    Listening,
    Draining,
    Stopped,
}

/// Shared state cell; `Stopped` is terminal.
pub(crate) struct StateCell(Mutex<BrokerState>);

impl StateCell {
    fn new() -> Self {
        Self(Mutex::new(BrokerState::Starting))
    }

    pub fn get(&self) -> BrokerState {
        *self.0.lock()
    }

    pub fn set(&self, next: BrokerState) {
        let mut state = self.0.lock();
        if *state != BrokerState::Stopped {
            *state = next;
        }
    }
}

/// Operation counters shared by the receiver and the executor.
#[derive(Default)]
pub(crate) struct Counters {
    pub requests_received: AtomicU64,
    pub requests_dropped: AtomicU64,
    pub operations_applied: AtomicU64,
    pub replies_sent: AtomicU64,
    pub pauses_sent: AtomicU64,
}

/// A translated operation waiting for the executor.
pub(crate) struct QueuedOperation {
    pub op: StoreOp,
    pub reply_expected: bool,
    pub reply_to: SocketAddr,
}

/// Internal queue element. `Shutdown` is the sentinel that drains the
/// executor through the same channel as normal work.
pub(crate) enum QueueItem {
    Op(QueuedOperation),
    Shutdown,
}

/// A running data broker: one bound UDP socket, one receiver thread, one
/// executor thread, and the queue between them.
///
/// All handles are owned by this instance, so several brokers can coexist
/// in one process (tests rely on this). Shutdown is driven by the wire:
/// [`Broker::stop`] just sends the `T` request like any other producer.
pub struct Broker {
    local_addr: SocketAddr,
    state: Arc<StateCell>,
    counters: Arc<Counters>,
    dispatcher: Arc<NotificationDispatcher>,
    queue_tx: Sender<QueueItem>,
    receiver: Option<JoinHandle<()>>,
    executor: Option<JoinHandle<()>>,
}

impl Broker {
    /// Bind the socket and launch both threads, taking exclusive ownership
    /// of `store`.
    ///
    /// A bind failure is fatal: the error is returned and no thread is
    /// spawned.
    pub fn start<S: Store + 'static>(config: BrokerConfig, store: S) -> Result<Self> {
        config.validate()?;
        info!(host = %config.host, port = config.port, "starting broker");

        let socket = UdpSocket::bind((config.host.as_str(), config.port))?;
        let local_addr = socket.local_addr()?;

        let (queue_tx, queue_rx) = unbounded();
        let state = Arc::new(StateCell::new());
        let counters = Arc::new(Counters::default());
        let flow = Arc::new(FlowController::new(config.expected_queue_len));
        let dispatcher = Arc::new(NotificationDispatcher::new(socket.try_clone()?));

        let executor = StoreExecutor {
            store,
            queue: queue_rx,
            socket: socket.try_clone()?,
            dispatcher: Arc::clone(&dispatcher),
            flow: Arc::clone(&flow),
            counters: Arc::clone(&counters),
            state: Arc::clone(&state),
        };
        let executor = thread::Builder::new()
            .name("br-serv".into())
            .spawn(move || executor.run())?;

        let receiver = RequestReceiver {
            socket,
            queue: queue_tx.clone(),
            dispatcher: Arc::clone(&dispatcher),
            flow,
            counters: Arc::clone(&counters),
            state: Arc::clone(&state),
            buffer_size: config.buffer_size,
        };
        // Listening is set before the receiver thread exists, so a
        // Terminate arriving immediately still observes Listening first
        // and Draining second.
        state.set(BrokerState::Listening);
        let receiver = thread::Builder::new()
            .name("br-recv".into())
            .spawn(move || receiver.run())?;

        info!(%local_addr, "broker listening");

        Ok(Self {
            local_addr,
            state,
            counters,
            dispatcher,
            queue_tx,
            receiver: Some(receiver),
            executor: Some(executor),
        })
    }

    /// Address of the bound request socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> BrokerState {
        self.state.get()
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            queue_depth: self.queue_tx.len(),
            registered_listeners: self.dispatcher.listener_count(),
            requests_received: self.counters.requests_received.load(Ordering::Relaxed),
            requests_dropped: self.counters.requests_dropped.load(Ordering::Relaxed),
            operations_applied: self.counters.operations_applied.load(Ordering::Relaxed),
            replies_sent: self.counters.replies_sent.load(Ordering::Relaxed),
            pauses_sent: self.counters.pauses_sent.load(Ordering::Relaxed),
        }
    }

    /// Block until both threads have exited, i.e. until a Terminate
    /// request has been processed.
    pub fn wait(&mut self) {
        for handle in [self.receiver.take(), self.executor.take()]
            .into_iter()
            .flatten()
        {
            if handle.join().is_err() {
                warn!("broker thread panicked");
            }
        }
    }

    /// Send the Terminate request to our own socket and wait for the
    /// drain to finish. Stopping an already stopped broker is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        if self.receiver.is_none() && self.executor.is_none() {
            return Ok(());
        }
        let bind_addr = if self.local_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.send_to(
            protocol::encode(&Request::terminate()).as_bytes(),
            self.local_addr,
        )?;
        self.wait();
        info!("broker stopped");
        Ok(())
    }
}
