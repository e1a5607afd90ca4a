//! EventMultiplexer: fans every controller event source into one consumer.
//!
//! Sources (the remote HTTP listener, local game pad adapters) publish
//! [`ControllerEventBatch`]es through an [`EventSource`].  All sources share a
//! single inbound queue drained by one pump task, which forwards each batch
//! unchanged to the current subscriber.
//!
//! ```text
//! RemoteEventListener ──┐
//!                       ├──► inbound queue ──► pump ──► subscriber (mapping task)
//! local game pad ───────┘
//! ```
//!
//! Batches are never split or merged.  Because every source goes through the
//! same queue, the subscriber sees batches of one source in the order that
//! source published them.  Batches that arrive while nobody is subscribed are
//! dropped.

use std::sync::{Arc, Mutex, PoisonError};

use brick_core::ControllerEventBatch;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Default capacity of the inbound and subscriber queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Error type for multiplexer operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultiplexerError {
    /// The pump task has stopped; no batch can be delivered any more.
    #[error("event multiplexer is closed")]
    Closed,

    /// Another consumer is already attached.
    #[error("event multiplexer already has a subscriber")]
    AlreadySubscribed,
}

/// A batch tagged with the name of the source that produced it.
#[derive(Debug)]
struct Tagged {
    source: Arc<str>,
    batch: ControllerEventBatch,
}

type SubscriberSlot = Arc<Mutex<Option<mpsc::Sender<ControllerEventBatch>>>>;

/// Handle to a running multiplexer.  Cloning is cheap; all clones share the
/// same queue and subscriber slot.
#[derive(Clone)]
pub struct EventMultiplexer {
    inbound: mpsc::Sender<Tagged>,
    subscriber: SubscriberSlot,
    capacity: usize,
}

impl EventMultiplexer {
    /// Spawns the pump task and returns a handle.
    ///
    /// The pump runs until every handle and every [`EventSource`] is dropped.
    /// Must be called from within a Tokio runtime.
    pub fn start(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (inbound, rx) = mpsc::channel(capacity);
        let subscriber: SubscriberSlot = Arc::new(Mutex::new(None));

        tokio::spawn(run_pump(rx, Arc::clone(&subscriber)));

        Self {
            inbound,
            subscriber,
            capacity,
        }
    }

    /// Creates a publishing handle for a named source.
    pub fn source(&self, name: &str) -> EventSource {
        EventSource {
            name: Arc::from(name),
            inbound: self.inbound.clone(),
        }
    }

    /// Attaches the single consumer.
    ///
    /// A previous subscriber whose receiver has been dropped is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`MultiplexerError::AlreadySubscribed`] when a live subscriber
    /// is attached.
    pub fn subscribe(&self) -> Result<mpsc::Receiver<ControllerEventBatch>, MultiplexerError> {
        let mut slot = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(MultiplexerError::AlreadySubscribed);
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        *slot = Some(tx);
        debug!("event subscriber attached");
        Ok(rx)
    }

    /// Detaches the current consumer, if any.
    pub fn unsubscribe(&self) {
        let previous = self
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            debug!("event subscriber detached");
        }
    }

    /// Returns `true` while a live subscriber is attached.
    pub fn has_subscriber(&self) -> bool {
        self.subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

/// Publishing half handed to each event source.
#[derive(Clone)]
pub struct EventSource {
    name: Arc<str>,
    inbound: mpsc::Sender<Tagged>,
}

impl EventSource {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues `batch` for delivery.  Waits while the inbound queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`MultiplexerError::Closed`] when the pump has stopped.
    pub async fn publish(&self, batch: ControllerEventBatch) -> Result<(), MultiplexerError> {
        self.inbound
            .send(Tagged {
                source: Arc::clone(&self.name),
                batch,
            })
            .await
            .map_err(|_| MultiplexerError::Closed)
    }
}

async fn run_pump(mut rx: mpsc::Receiver<Tagged>, subscriber: SubscriberSlot) {
    while let Some(Tagged { source, batch }) = rx.recv().await {
        // Clone the sender out so the lock is not held across the send.
        let target = subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let Some(target) = target else {
            trace!(%source, events = batch.len(), "no subscriber; dropping batch");
            continue;
        };

        if target.send(batch).await.is_err() {
            debug!(%source, "subscriber went away; dropping batch");
        }
    }
    debug!("event multiplexer pump stopped");
}
