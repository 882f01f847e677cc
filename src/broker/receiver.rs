use crate::broker::dispatch::NotificationDispatcher;
use crate::broker::{BrokerState, Counters, QueueItem, QueuedOperation, StateCell};
use crate::flow::{FlowController, Signal};
use crate::protocol::{self, Command, ControlMessage};
use crate::translate::translate;
use crossbeam::channel::Sender;
use std::net::UdpSocket;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The receive loop: sole reader of the broker's inbound socket.
///
/// Decodes each datagram, intercepts the two control commands, runs data
/// requests through the translator and the flow controller, and enqueues
/// the result. Malformed or untranslatable datagrams are logged and
/// dropped; the loop only ends on a Terminate request.
pub(crate) struct RequestReceiver {
    pub socket: UdpSocket,
    pub queue: Sender<QueueItem>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub flow: Arc<FlowController>,
    pub counters: Arc<Counters>,
    pub state: Arc<StateCell>,
    pub buffer_size: usize,
}

impl RequestReceiver {
    pub fn run(self) {
        info!("request receiver started");
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let (len, addr) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "socket receive failed");
                    continue;
                }
            };
            self.counters.requests_received.fetch_add(1, Ordering::Relaxed);

            let request = match protocol::decode(&buf[..len]) {
                Ok(request) => request,
                Err(e) => {
                    warn!(from = %addr, error = %e, "dropping malformed datagram");
                    self.counters.requests_dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            match request.command {
                Command::Terminate => {
                    info!(from = %addr, "terminate requested, draining queue");
                    self.state.set(BrokerState::Draining);
                    // Sentinel goes in first so every queued operation is
                    // applied before the executor exits.
                    let _ = self.queue.send(QueueItem::Shutdown);
                    self.dispatcher.shutdown();
                    break;
                }
                Command::RegisterListener => {
                    self.dispatcher.register(addr);
                }
                _ => {
                    let (op, reply_expected) = match translate(request) {
                        Ok(translated) => translated,
                        Err(e) => {
                            warn!(from = %addr, error = %e, "dropping untranslatable request");
                            self.counters.requests_dropped.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                    };

                    // Advisory backpressure: the triggering request is
                    // still enqueued, only its sender is asked to slow
                    // down.
                    if let Some(Signal::Pause) = self.flow.on_enqueue(self.queue.len()) {
                        debug!(to = %addr, depth = self.queue.len(), "pausing sender");
                        self.counters.pauses_sent.fetch_add(1, Ordering::Relaxed);
                        if let Err(e) =
                            self.socket.send_to(ControlMessage::Pause.as_bytes(), addr)
                        {
                            warn!(to = %addr, error = %e, "failed to send pause");
                        }
                    }

                    let _ = self.queue.send(QueueItem::Op(QueuedOperation {
                        op,
                        reply_expected,
                        reply_to: addr,
                    }));
                }
            }
        }
        info!("request receiver stopped");
    }
}
