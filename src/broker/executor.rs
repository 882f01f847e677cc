use crate::broker::dispatch::NotificationDispatcher;
use crate::broker::{BrokerState, Counters, QueueItem, QueuedOperation, StateCell};
use crate::flow::{FlowController, Signal};
use crate::protocol::{encode_row, ControlMessage};
use crate::store::Store;
use crossbeam::channel::Receiver;
use std::net::UdpSocket;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The single consumer of the internal queue.
///
/// Every store mutation in the system funnels through this loop, one
/// operation at a time, so concurrent producers can never race on the
/// store. A failed operation is logged and skipped; only losing the store
/// connection aborts the loop.
pub(crate) struct StoreExecutor<S: Store> {
    pub store: S,
    pub queue: Receiver<QueueItem>,
    pub socket: UdpSocket,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub flow: Arc<FlowController>,
    pub counters: Arc<Counters>,
    pub state: Arc<StateCell>,
}

impl<S: Store> StoreExecutor<S> {
    pub fn run(mut self) {
        info!("store executor started");
        loop {
            let item = match self.queue.recv() {
                Ok(item) => item,
                Err(_) => {
                    warn!("request queue disconnected without shutdown sentinel");
                    break;
                }
            };

            match item {
                QueueItem::Shutdown => {
                    if let Err(e) = self.store.commit() {
                        error!(error = %e, "final commit failed");
                    }
                    break;
                }
                QueueItem::Op(queued) => {
                    let fatal = self.apply(queued);

                    if let Some(Signal::Continue) = self.flow.on_dequeue(self.queue.len()) {
                        debug!(depth = self.queue.len(), "queue drained, resuming producers");
                        self.dispatcher.broadcast(ControlMessage::Continue);
                    }

                    if fatal {
                        break;
                    }
                }
            }
        }
        self.state.set(BrokerState::Stopped);
        info!("store executor stopped");
    }

    /// Apply one operation. Returns `true` if the failure is fatal to the
    /// executor.
    fn apply(&mut self, queued: QueuedOperation) -> bool {
        match self.store.apply(&queued.op) {
            Ok(rows) => {
                self.counters.operations_applied.fetch_add(1, Ordering::Relaxed);
                if queued.reply_expected {
                    for row in rows {
                        let attributes: Vec<&str> =
                            row.columns.iter().map(|c| c.name()).collect();
                        let values: Vec<&str> =
                            row.values.iter().map(String::as_str).collect();
                        let payload = encode_row(row.aid, &attributes, &values);
                        match self.socket.send_to(payload.as_bytes(), queued.reply_to) {
                            Ok(_) => {
                                self.counters.replies_sent.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                warn!(to = %queued.reply_to, error = %e, "failed to send reply row");
                            }
                        }
                    }
                }
                false
            }
            Err(e) if e.is_fatal() => {
                error!(op = ?queued.op, error = %e, "unrecoverable store failure, aborting executor");
                true
            }
            Err(e) => {
                error!(op = ?queued.op, error = %e, "store rejected operation");
                false
            }
        }
    }
}
