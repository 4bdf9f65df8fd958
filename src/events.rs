//! Event Bus
//!
//! Bounded channel per subscriber, one bus per event kind. Producers never block:
//! a full subscriber queue drops the event for that subscriber and bumps a counter.
//! Handlers registered through `register_handler` each run on their own task, so a
//! slow or failing handler cannot stall the producer or the other handlers.
//!
//! Created: 2026-10-18

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct Subscriber<T> {
    name: String,
    sender: mpsc::Sender<T>,
}

pub struct EventBus<T> {
    kind: &'static str,
    capacity: usize,
    subscribers: RwLock<Vec<Subscriber<T>>>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new(kind: &'static str, capacity: usize) -> Self {
        Self {
            kind,
            capacity: capacity.max(1),
            subscribers: RwLock::new(Vec::new()),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Raw receiver with the bus's default capacity
    pub fn subscribe(&self, name: impl Into<String>) -> mpsc::Receiver<T> {
        self.subscribe_with_capacity(name, self.capacity)
    }

    pub fn subscribe_with_capacity(&self, name: impl Into<String>, capacity: usize) -> mpsc::Receiver<T> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let name = name.into();
        if let Ok(mut subs) = self.subscribers.write() {
            debug!("Event subscriber added | bus={} | name={}", self.kind, name);
            subs.push(Subscriber { name, sender });
        }
        receiver
    }

    /// Spawn a task that feeds every event to `handler`. Errors and panics are logged
    /// and the handler keeps receiving.
    pub fn register_handler<F, Fut>(&self, name: impl Into<String>, handler: F) -> JoinHandle<()>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let mut receiver = self.subscribe(name.clone());
        let kind = self.kind;
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match AssertUnwindSafe(handler(event)).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Handler failed | bus={} | handler={} | {:#}", kind, name, e),
                    Err(_) => warn!("Handler panicked | bus={} | handler={}", kind, name),
                }
            }
            debug!("Handler stopped | bus={} | handler={}", kind, name);
        })
    }

    /// Deliver to every subscriber in registration order. Returns how many accepted it.
    pub fn publish(&self, event: T) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let mut delivered = 0;
        let mut closed = false;

        if let Ok(subs) = self.subscribers.read() {
            for sub in subs.iter() {
                match sub.sender.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!("Event dropped | bus={} | subscriber={} | queue full", self.kind, sub.name);
                    }
                    Err(TrySendError::Closed(_)) => closed = true,
                }
            }
        }

        if closed {
            if let Ok(mut subs) = self.subscribers.write() {
                subs.retain(|s| !s.sender.is_closed());
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub type SharedBus<T> = Arc<EventBus<T>>;
