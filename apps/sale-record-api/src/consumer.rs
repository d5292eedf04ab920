//! # Order Event Consumer
//!
//! Subscribes to the order-event channel and feeds each message to the
//! reconciler.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  Redis SUBSCRIBE order ──► on_message stream                        │
//! │                                 │                                    │
//! │                   acquire permit (bounded in-flight)                 │
//! │                                 │                                    │
//! │                  tokio::spawn ──► handle_payload                     │
//! │                                   ├── bad JSON ──► warn!, dropped    │
//! │                                   └── Reconciler::handle_event       │
//! │                                                                      │
//! │  Stream ends or errors ──► wait, resubscribe                         │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pub/sub has no acknowledgements: a message whose handler fails is
//! recorded in the log table and not redelivered.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use salerecord_core::event::Event;

use crate::reconcile::{EventOutcome, Reconciler};

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// Stops a running consumer.
#[derive(Clone)]
pub struct ConsumerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ConsumerHandle {
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Consumer already stopped");
        }
    }
}

pub struct EventConsumer {
    subscription: Subscription,
    shutdown_rx: mpsc::Receiver<()>,
}

struct Subscription {
    client: redis::Client,
    channel: String,
    reconciler: Reconciler,
    in_flight: Arc<Semaphore>,
    max_in_flight: usize,
}

impl EventConsumer {
    pub fn new(
        client: redis::Client,
        channel: impl Into<String>,
        reconciler: Reconciler,
        max_in_flight: usize,
    ) -> (Self, ConsumerHandle) {
        let max_in_flight = max_in_flight.max(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let consumer = EventConsumer {
            subscription: Subscription {
                client,
                channel: channel.into(),
                reconciler,
                in_flight: Arc::new(Semaphore::new(max_in_flight)),
                max_in_flight,
            },
            shutdown_rx,
        };

        (consumer, ConsumerHandle { shutdown_tx })
    }

    /// Runs until shut down, resubscribing when the connection drops.
    ///
    /// This should be spawned as a background task.
    pub async fn run(self) {
        let EventConsumer {
            subscription,
            mut shutdown_rx,
        } = self;

        info!(channel = %subscription.channel, "Order event consumer starting");

        loop {
            tokio::select! {
                result = subscription.consume() => {
                    match result {
                        Ok(()) => warn!(channel = %subscription.channel, "Subscription ended"),
                        Err(e) => error!(channel = %subscription.channel, error = %e, "Subscription failed"),
                    }
                }

                _ = shutdown_rx.recv() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
                _ = shutdown_rx.recv() => break,
            }
        }

        info!("Order event consumer shutting down");
        subscription.wait_idle().await;
        info!("Order event consumer stopped");
    }
}

impl Subscription {
    async fn consume(&self) -> redis::RedisResult<()> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        info!(channel = %self.channel, "Subscribed");

        let mut messages = pubsub.on_message();
        while let Some(message) = messages.next().await {
            let payload: String = match message.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Dropping non-text message");
                    continue;
                }
            };

            let Ok(permit) = self.in_flight.clone().acquire_owned().await else {
                return Ok(());
            };
            let reconciler = self.reconciler.clone();
            tokio::spawn(async move {
                handle_payload(&reconciler, &payload).await;
                drop(permit);
            });
        }
        Ok(())
    }

    /// Waits for spawned handlers to finish.
    async fn wait_idle(&self) {
        let permits = u32::try_from(self.max_in_flight).unwrap_or(u32::MAX);
        if self.in_flight.acquire_many(permits).await.is_err() {
            debug!("In-flight semaphore closed");
        }
    }
}

/// Decodes and reconciles one message. Returns `None` for poison
/// messages.
pub async fn handle_payload(reconciler: &Reconciler, payload: &str) -> Option<EventOutcome> {
    let event: Event = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, bytes = payload.len(), "Dropping undecodable order event");
            return None;
        }
    };

    let outcome = reconciler.handle_event(&event).await;
    match &outcome {
        EventOutcome::Skipped => {}
        EventOutcome::Duplicate(record) => {
            info!(order_id = record.order_id, transaction_id = record.transaction_id, "Duplicate order event")
        }
        EventOutcome::Committed(record) => {
            info!(order_id = record.order_id, transaction_id = record.transaction_id, "Sale record committed")
        }
        EventOutcome::Failed(kind) => {
            warn!(order_id = event.payload.id, error_type = %kind, "Order event rejected")
        }
    }
    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use salerecord_core::ErrorKind;

    #[tokio::test]
    async fn test_poison_message_is_dropped() {
        let h = Harness::new(lookups()).await;
        assert!(handle_payload(&h.reconciler, "not json").await.is_none());
        assert!(handle_payload(&h.reconciler, r#"{"payload": 5}"#).await.is_none());
        assert!(h.published_channels().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_terminal_event_is_skipped() {
        let h = Harness::new(lookups()).await;
        let payload = serde_json::to_string(&order_event("SaleOrderProcessing")).unwrap();

        assert_eq!(handle_payload(&h.reconciler, &payload).await, Some(EventOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_committed_and_failed_events() {
        let h = Harness::new(lookups()).await;

        let payload = serde_json::to_string(&order_event("SaleOrderSuccess")).unwrap();
        let outcome = handle_payload(&h.reconciler, &payload).await;
        assert!(matches!(outcome, Some(EventOutcome::Committed(_))));

        let mut unknown_store = order_event("SaleOrderSuccess");
        unknown_store.payload.id = 101;
        unknown_store.payload.store_id = 3;
        let payload = serde_json::to_string(&unknown_store).unwrap();
        assert_eq!(
            handle_payload(&h.reconciler, &payload).await,
            Some(EventOutcome::Failed(ErrorKind::StoreNotExist))
        );

        assert_eq!(
            h.published_channels().await,
            vec!["sale-record", "sale-record-fail"]
        );
    }
}
