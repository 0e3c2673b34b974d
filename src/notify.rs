//! Post-commit event hand-off
//!
//! Subscribers receive [`EngineEvent`]s on a supervised worker thread fed by
//! a bounded channel. Publishing never blocks a writer: when a subscriber
//! falls behind, the event is dropped for that subscriber.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::datastore::DatastoreId;
use crate::error::Result;
use crate::session::SessionId;
use crate::store::Part;

/// Capacity of each subscriber channel
pub const EVENT_QUEUE_DEPTH: usize = 64;

/// Event published after a state change took effect
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Running or startup content changed
    ConfigChange {
        id: DatastoreId,
        part: Part,
        session: SessionId,
        content: Arc<Value>,
    },
    DatastoreLocked {
        id: DatastoreId,
        part: Part,
        session: SessionId,
    },
    DatastoreUnlocked {
        id: DatastoreId,
        part: Part,
        session: SessionId,
    },
}

#[derive(Debug)]
struct Subscriber {
    token: u64,
    sender: SyncSender<EngineEvent>,
}

#[derive(Debug, Default)]
struct Subscribers {
    next_token: u64,
    list: Vec<Subscriber>,
}

/// Fan-out point for engine events
#[derive(Debug, Default, Clone)]
pub struct Notifier {
    inner: Arc<Mutex<Subscribers>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every subscriber without blocking
    pub fn publish(&self, event: EngineEvent) {
        let mut subscribers = self.inner.lock();
        subscribers.list.retain(|sub| match sub.sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Subscriber {} is lagging, dropped event {event:?}", sub.token);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().list.len()
    }

    /// Start a worker thread calling `handler` for every event
    pub fn subscribe<F>(&self, handler: F) -> Result<Subscription>
    where
        F: FnMut(EngineEvent) + Send + 'static,
    {
        let (sender, receiver) = sync_channel(EVENT_QUEUE_DEPTH);
        let token = {
            let mut subscribers = self.inner.lock();
            subscribers.next_token += 1;
            let token = subscribers.next_token;
            subscribers.list.push(Subscriber { token, sender });
            token
        };

        let worker = thread::Builder::new()
            .name(format!("netconf-events-{token}"))
            .spawn(move || run_worker(token, receiver, handler));
        let worker = match worker {
            Ok(handle) => handle,
            Err(err) => {
                self.remove(token);
                return Err(err.into());
            }
        };

        debug!("Started event subscriber {token}");
        Ok(Subscription {
            token,
            notifier: self.clone(),
            worker: Some(worker),
        })
    }

    fn remove(&self, token: u64) {
        self.inner.lock().list.retain(|sub| sub.token != token);
    }
}

fn run_worker<F>(token: u64, receiver: Receiver<EngineEvent>, mut handler: F)
where
    F: FnMut(EngineEvent),
{
    while let Ok(event) = receiver.recv() {
        // a failing handler must not take the subscription down
        if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
            error!("Event handler of subscriber {token} panicked");
        }
    }
    debug!("Event subscriber {token} stopped");
}

/// Handle owning a subscriber's worker thread
#[derive(Debug)]
pub struct Subscription {
    token: u64,
    notifier: Notifier,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Deregister and wait until every queued event was handled
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.notifier.remove(self.token);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}
