//! # Publisher
//!
//! Fire-and-forget delivery of sale record and failure events.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Publish Flow                                    │
//! │                                                                         │
//! │  Reconciler                                                             │
//! │     │  handle.publish_sale_record(&record)                              │
//! │     │  handle.publish_sale_fail(&log)                                   │
//! │     ▼                                                                   │
//! │  bounded mpsc queue ── full? ──► warn!, message dropped                 │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  PublishWorker::run ──► EventBroker::publish(channel, json)            │
//! │                              │                                          │
//! │                              └── error? ──► error!, never retried       │
//! │                                                                         │
//! │  On shutdown the worker drains what is already queued, then exits.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Publishing never blocks or fails the caller. A committed record stays
//! committed whatever happens to its notification.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use salerecord_core::projection::{EventEnvelope, SaleFailEvent, SaleRecordEvent};
use salerecord_core::{SaleRecord, SaleRecordLog};

use crate::broker::EventBroker;

/// Action id stamped on envelopes re-sent through the republish endpoint.
pub const REPUBLISH_ACTION: &str = "republish";

/// One queued broker message.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishMessage {
    pub channel: String,
    pub payload: String,
    /// Log label, e.g. `TransactionId:12`.
    pub label: String,
}

/// Destination channels.
#[derive(Debug, Clone)]
pub struct PublishChannels {
    pub sale_record: String,
    pub sale_fail: String,
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable handle used by the reconciler and HTTP handlers.
#[derive(Clone)]
pub struct PublisherHandle {
    queue_tx: mpsc::Sender<PublishMessage>,
    shutdown_tx: mpsc::Sender<()>,
    channels: Arc<PublishChannels>,
}

impl PublisherHandle {
    /// Enqueues without waiting. Returns false when the message was dropped.
    pub fn submit(&self, message: PublishMessage) -> bool {
        match self.queue_tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(channel = %message.channel, label = %message.label, "Publish queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(message)) => {
                warn!(channel = %message.channel, label = %message.label, "Publisher stopped, dropping event");
                false
            }
        }
    }

    pub fn publish_sale_record(&self, record: &SaleRecord) -> bool {
        self.publish_envelope(
            &self.channels.sale_record,
            format!("TransactionId:{}", record.transaction_id),
            EventEnvelope::new(SaleRecordEvent::from(record)),
        )
    }

    /// Re-sends a stored record, marked as a republish.
    pub fn republish_sale_record(&self, record: &SaleRecord) -> bool {
        self.publish_envelope(
            &self.channels.sale_record,
            format!("TransactionId:{}", record.transaction_id),
            EventEnvelope::new(SaleRecordEvent::from(record)).with_action(REPUBLISH_ACTION),
        )
    }

    pub fn publish_sale_fail(&self, log: &SaleRecordLog) -> bool {
        self.publish_envelope(
            &self.channels.sale_fail,
            format!(
                "orderId:{}, refundId:{}, ErrorType:{}",
                log.order_id, log.refund_id, log.error_type
            ),
            EventEnvelope::new(SaleFailEvent::from(log)),
        )
    }

    fn publish_envelope<T: Serialize>(&self, channel: &str, label: String, envelope: EventEnvelope<T>) -> bool {
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!(%label, error = %e, "Failed to encode event");
                return false;
            }
        };
        self.submit(PublishMessage {
            channel: channel.to_string(),
            payload,
            label,
        })
    }

    /// Asks the worker to drain and stop.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Publisher already stopped");
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

pub struct PublishWorker {
    broker: Arc<dyn EventBroker>,
    queue_rx: mpsc::Receiver<PublishMessage>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl PublishWorker {
    /// Creates a worker and its handle. `capacity` bounds the queue.
    pub fn new(
        broker: Arc<dyn EventBroker>,
        channels: PublishChannels,
        capacity: usize,
    ) -> (Self, PublisherHandle) {
        let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = PublishWorker {
            broker,
            queue_rx,
            shutdown_rx,
        };
        let handle = PublisherHandle {
            queue_tx,
            shutdown_tx,
            channels: Arc::new(channels),
        };

        (worker, handle)
    }

    /// Runs the publish loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Publish worker starting");

        loop {
            tokio::select! {
                message = self.queue_rx.recv() => {
                    match message {
                        Some(message) => self.deliver(message).await,
                        None => break,
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Publish worker shutting down");
                    self.drain().await;
                    break;
                }
            }
        }

        info!("Publish worker stopped");
    }

    async fn drain(&mut self) {
        self.queue_rx.close();
        let mut drained = 0usize;
        while let Some(message) = self.queue_rx.recv().await {
            self.deliver(message).await;
            drained += 1;
        }
        if drained > 0 {
            info!(drained, "Publish queue drained");
        }
    }

    async fn deliver(&self, message: PublishMessage) {
        match self.broker.publish(&message.channel, &message.payload).await {
            Ok(()) => debug!(channel = %message.channel, label = %message.label, "Event published"),
            Err(e) => error!(
                channel = %message.channel,
                label = %message.label,
                error = %e,
                "Failed to publish event to broker"
            ),
        }
    }
}
