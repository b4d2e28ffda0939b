//! Ordered event delivery to the application sink
//!
//! Events are produced by engine-owned threads and must reach the one
//! registered [`CallEventSink`] in the order the bridge accepted them, one at a
//! time, and never after the sink has been cleared.
//!
//! # Architecture
//!
//! ```text
//! engine threads ──publish()──▶ bounded queue ──▶ forwarder thread ──▶ sink
//!                (seq assigned)                   (delivery lock held
//!                                                  for each delivery)
//! ```
//!
//! - `publish` never blocks: it is called while the bridge state lock is held,
//!   and a full queue drops the event (logged and counted).
//! - Each envelope carries a sequence number. `clear_sink` records the last
//!   published sequence number so everything queued before the clear is
//!   discarded, even if a new sink is installed afterwards.
//! - `clear_sink` takes the delivery lock, so once it returns the old sink sees
//!   nothing more. It waits at most `clear_timeout` for an in-flight delivery and
//!   never waits when called from inside the sink itself.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, trace, warn};

use crate::error::{BridgeError, Result};
use crate::events::{CallEvent, CallEventSink};

/// Counters describing the delivery queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events accepted into the queue
    pub published: u64,
    /// Events handed to a sink
    pub delivered: u64,
    /// Events dequeued with no sink, or queued before a clear
    pub discarded: u64,
    /// Events dropped because the queue was full
    pub overflowed: u64,
}

struct Envelope {
    seq: u64,
    event: CallEvent,
}

struct SinkSlot {
    sink: Option<Arc<dyn CallEventSink>>,
    /// Envelopes with `seq <= discard_through` were queued before the last clear
    discard_through: u64,
}

struct Ingress {
    tx: Option<mpsc::Sender<Envelope>>,
    next_seq: u64,
}

struct Shared {
    slot: RwLock<SinkSlot>,
    /// Held by the forwarder for the duration of each delivery
    delivery: Mutex<()>,
    published: AtomicU64,
    delivered: AtomicU64,
    discarded: AtomicU64,
    overflowed: AtomicU64,
}

/// Serializing, ordered bridge between event producers and the sink
pub struct EventDispatcher {
    shared: Arc<Shared>,
    ingress: Mutex<Ingress>,
    clear_timeout: Duration,
    forwarder_id: ThreadId,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventDispatcher {
    /// Spawn the forwarder thread and return the dispatcher
    pub fn start(capacity: usize, clear_timeout: Duration, thread_name: &str) -> Result<Self> {
        if capacity == 0 {
            return Err(BridgeError::config("event queue capacity must be greater than 0"));
        }

        let (tx, rx) = mpsc::channel(capacity);
        let shared = Arc::new(Shared {
            slot: RwLock::new(SinkSlot {
                sink: None,
                discard_through: 0,
            }),
            delivery: Mutex::new(()),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            overflowed: AtomicU64::new(0),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || forward_loop(worker_shared, rx))?;

        debug!(
            "Event dispatcher started (capacity {}, thread {})",
            capacity, thread_name
        );

        Ok(Self {
            shared,
            ingress: Mutex::new(Ingress {
                tx: Some(tx),
                next_seq: 1,
            }),
            clear_timeout,
            forwarder_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue an event for delivery
    ///
    /// Returns `false` when the event was dropped (queue full or shut down).
    pub fn publish(&self, event: CallEvent) -> bool {
        let mut ingress = self.ingress.lock();
        let seq = ingress.next_seq;
        let Some(tx) = ingress.tx.as_ref() else {
            debug!("Dispatcher shut down, dropping {}", event.name());
            return false;
        };

        match tx.try_send(Envelope { seq, event }) {
            Ok(()) => {
                ingress.next_seq += 1;
                self.shared.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(envelope)) => {
                self.shared.overflowed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Event queue full, dropping {} (seq {})",
                    envelope.event.name(),
                    envelope.seq
                );
                false
            }
            Err(TrySendError::Closed(envelope)) => {
                warn!(
                    "Event forwarder stopped, dropping {}",
                    envelope.event.name()
                );
                false
            }
        }
    }

    /// Install the sink, replacing any previous one
    pub fn set_sink(&self, sink: Arc<dyn CallEventSink>) {
        let mut slot = self.shared.slot.write();
        if slot.sink.is_some() {
            debug!("Replacing event sink");
        }
        slot.sink = Some(sink);
    }

    /// Detach the sink
    ///
    /// Best-effort drain: an in-flight delivery is allowed to complete (bounded
    /// by the clear timeout), queued events are discarded and no new delivery
    /// reaches the old sink. Returns whether a sink was installed. Clearing with
    /// no sink is a no-op.
    pub fn clear_sink(&self) -> bool {
        // Detach before waiting: no queued envelope may reach the old sink.
        let discard_through = self.ingress.lock().next_seq - 1;
        let had_sink = {
            let mut slot = self.shared.slot.write();
            slot.discard_through = discard_through;
            slot.sink.take().is_some()
        };

        if !self.is_forwarder_thread()
            && self.shared.delivery.try_lock_for(self.clear_timeout).is_none()
        {
            warn!(
                "Sink still busy after {:?}, returning without waiting for it",
                self.clear_timeout
            );
        }

        if had_sink {
            debug!("Event sink cleared (discarding through seq {})", discard_through);
        }
        had_sink
    }

    /// Whether a sink is currently installed
    pub fn has_sink(&self) -> bool {
        self.shared.slot.read().sink.is_some()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            published: self.shared.published.load(Ordering::Relaxed),
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
            overflowed: self.shared.overflowed.load(Ordering::Relaxed),
        }
    }

    fn is_forwarder_thread(&self) -> bool {
        thread::current().id() == self.forwarder_id
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        // Closing the sender lets the forwarder drain and exit.
        self.ingress.lock().tx = None;

        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if self.is_forwarder_thread() {
            // Dropped from inside a sink callback; the loop ends on its own.
            return;
        }
        if worker.join().is_err() {
            error!("Event forwarder thread panicked");
        }
    }
}

fn forward_loop(shared: Arc<Shared>, mut rx: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = rx.blocking_recv() {
        let delivery = shared.delivery.lock();

        let sink = {
            let slot = shared.slot.read();
            if envelope.seq <= slot.discard_through {
                None
            } else {
                slot.sink.clone()
            }
        };

        if let Some(sink) = sink {
            let name = envelope.event.name();
            let outcome = catch_unwind(AssertUnwindSafe(|| sink.on_event(envelope.event)));
            shared.delivered.fetch_add(1, Ordering::Relaxed);
            if outcome.is_err() {
                error!("Event sink panicked while handling {}", name);
            }
        } else {
            shared.discarded.fetch_add(1, Ordering::Relaxed);
            trace!(
                "No sink for {} (seq {}), discarded",
                envelope.event.name(),
                envelope.seq
            );
        }

        // A waiting clear_sink must win over the next queued delivery.
        MutexGuard::unlock_fair(delivery);
    }
    debug!("Event forwarder exiting");
}
