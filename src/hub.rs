//! Real-time fan-out of telemetry readings.
//!
//! A single control task owns the subscriber set. Handles submit `Register`,
//! `Unregister` and `Publish` events over one queue, and the task applies them
//! one at a time, so the set is never shared between tasks. Each publish is
//! serialized once and delivered to every registered subscriber before the
//! next event is looked at, which keeps publishes in submission order for
//! every subscriber. A subscriber whose delivery fails is closed and dropped
//! on the spot; nobody else notices.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::TelemetryReading;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Subscriber connection closed")]
    Closed,
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One observer connection as seen by the hub.
#[async_trait]
pub trait MessageSink: Send {
    async fn send(&mut self, message: &str) -> Result<(), DeliveryError>;

    async fn close(&mut self) {}
}

/// In-process subscriber backed by an unbounded channel.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send(&mut self, message: &str) -> Result<(), DeliveryError> {
        let tx = self.tx.as_ref().ok_or(DeliveryError::Closed)?;
        tx.send(message.to_owned()).map_err(|_| DeliveryError::Closed)
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HubStats {
    pub registered: u64,
    pub unregistered: u64,
    pub published: u64,
    pub delivered: u64,
    pub pruned: u64,
}

enum HubEvent {
    Register {
        id: SubscriberId,
        sink: Box<dyn MessageSink>,
    },
    Unregister(SubscriberId),
    Publish(TelemetryReading),
    Count(oneshot::Sender<usize>),
}

/// Cloneable handle for submitting events to the hub's control task.
#[derive(Clone)]
pub struct BroadcastHub {
    events: mpsc::UnboundedSender<HubEvent>,
    next_id: Arc<AtomicU64>,
}

impl BroadcastHub {
    /// Starts the control task. It runs until every handle has been dropped,
    /// then closes the remaining subscribers and returns its counters.
    pub fn spawn(send_timeout: Duration) -> (Self, JoinHandle<HubStats>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let control = HubLoop {
            events: events_rx,
            subscribers: HashMap::new(),
            send_timeout,
            stats: HubStats::default(),
        };
        let task = tokio::spawn(control.run());

        let hub = Self {
            events: events_tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (hub, task)
    }

    /// Queues a registration and returns without waiting for it to apply.
    /// Every publish submitted after this call reaches the new subscriber.
    pub fn register<S>(&self, sink: S) -> SubscriberId
    where
        S: MessageSink + 'static,
    {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.submit(HubEvent::Register {
            id,
            sink: Box::new(sink),
        });
        id
    }

    pub fn unregister(&self, id: SubscriberId) {
        self.submit(HubEvent::Unregister(id));
    }

    pub fn publish(&self, reading: TelemetryReading) {
        self.submit(HubEvent::Publish(reading));
    }

    /// Number of registered subscribers once every event queued before this
    /// call has been applied, or `None` if the control task has stopped.
    pub async fn subscriber_count(&self) -> Option<usize> {
        let (tx, rx) = oneshot::channel();
        self.submit(HubEvent::Count(tx));
        rx.await.ok()
    }

    fn submit(&self, event: HubEvent) {
        if self.events.send(event).is_err() {
            debug!("Broadcast hub has stopped; event discarded");
        }
    }
}

struct HubLoop {
    events: mpsc::UnboundedReceiver<HubEvent>,
    subscribers: HashMap<SubscriberId, Mutex<Box<dyn MessageSink>>>,
    send_timeout: Duration,
    stats: HubStats,
}

impl HubLoop {
    async fn run(mut self) -> HubStats {
        info!("Broadcast hub started");

        while let Some(event) = self.events.recv().await {
            match event {
                HubEvent::Register { id, sink } => {
                    self.subscribers.insert(id, Mutex::new(sink));
                    self.stats.registered += 1;
                    info!(subscriber = %id, total = self.subscribers.len(), "Subscriber registered");
                }
                HubEvent::Unregister(id) => {
                    if let Some(sink) = self.subscribers.remove(&id) {
                        close_sink(sink).await;
                        self.stats.unregistered += 1;
                        info!(subscriber = %id, total = self.subscribers.len(), "Subscriber unregistered");
                    }
                }
                HubEvent::Publish(reading) => self.broadcast(&reading).await,
                HubEvent::Count(reply) => {
                    let _ = reply.send(self.subscribers.len());
                }
            }
        }

        for (_, sink) in self.subscribers.drain() {
            close_sink(sink).await;
        }
        info!(
            published = self.stats.published,
            delivered = self.stats.delivered,
            pruned = self.stats.pruned,
            "Broadcast hub stopped"
        );
        self.stats
    }

    async fn broadcast(&mut self, reading: &TelemetryReading) {
        let message = match serde_json::to_string(reading) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Failed to serialize telemetry reading");
                return;
            }
        };
        self.stats.published += 1;

        let send_timeout = self.send_timeout;
        let deliveries = self.subscribers.iter().map(|(id, sink)| {
            let message = message.as_str();
            async move { (*id, deliver(sink, message, send_timeout).await) }
        });
        let results = join_all(deliveries).await;

        for (id, result) in results {
            match result {
                Ok(()) => self.stats.delivered += 1,
                Err(e) => {
                    warn!(subscriber = %id, error = %e, "Delivery failed, dropping subscriber");
                    if let Some(sink) = self.subscribers.remove(&id) {
                        close_sink(sink).await;
                    }
                    self.stats.pruned += 1;
                }
            }
        }
        debug!(subscribers = self.subscribers.len(), "Broadcast telemetry reading");
    }
}

async fn deliver(
    sink: &Mutex<Box<dyn MessageSink>>,
    message: &str,
    send_timeout: Duration,
) -> Result<(), DeliveryError> {
    let mut sink = sink.lock().await;
    match tokio::time::timeout(send_timeout, sink.send(message)).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::Timeout(send_timeout)),
    }
}

async fn close_sink(sink: Mutex<Box<dyn MessageSink>>) {
    let mut sink = sink.into_inner();
    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
        debug!("Subscriber close timed out");
    }
}
