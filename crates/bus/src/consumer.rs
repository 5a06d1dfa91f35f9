//! Queue consumer loop.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::Result;
use crate::bus::MessageBus;
use crate::message::{Delivery, Message};
use crate::retry::{RetryDecision, RetryPolicy};

/// Error returned by a handler; the consumer only logs it and retries.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// How a handler settled a message it processed without failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove from the queue.
    Ack,
    /// Unprocessable and not worth keeping; remove from the queue.
    Drop,
    /// Unprocessable but must not be lost; park it on the dead-letter queue.
    DeadLetter(String),
}

/// Processes messages from one queue.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Queue this handler consumes.
    fn queue(&self) -> &str;

    /// Handles one message. An `Err` triggers the consumer's retry policy.
    async fn handle(&self, message: &Message) -> std::result::Result<Disposition, HandlerError>;
}

/// What the consumer did with one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Acked,
    Dropped,
    Requeued,
    DeadLettered,
}

/// Pause after a bus error before [`Consumer::run`] receives again.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Drives a [`MessageHandler`] over its queue.
///
/// The consumer acknowledges only after the handler returned. A failed
/// handler leaves the message with the bus: it is requeued with the policy's
/// fixed delay, or dead-lettered once the policy's ceiling is reached.
pub struct Consumer<B: MessageBus, H: MessageHandler> {
    bus: B,
    handler: H,
    policy: RetryPolicy,
    error_backoff: Duration,
}

impl<B: MessageBus, H: MessageHandler> Consumer<B, H> {
    /// Creates a consumer with the given retry policy.
    pub fn new(bus: B, handler: H, policy: RetryPolicy) -> Self {
        Self {
            bus,
            handler,
            policy,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    /// Sets the pause after a bus error.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Returns the consumed queue.
    pub fn queue(&self) -> &str {
        self.handler.queue()
    }

    /// Returns the handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Processes one ready message, if any, without waiting.
    pub async fn poll_once(&self) -> Result<Option<ConsumeOutcome>> {
        match self.bus.try_receive(self.handler.queue()).await? {
            Some(delivery) => Ok(Some(self.process(delivery).await?)),
            None => Ok(None),
        }
    }

    /// Processes ready messages until the queue is empty.
    ///
    /// Requeued messages with a zero delay are picked up again, so a handler
    /// that never succeeds under an unlimited policy keeps this running.
    pub async fn drain(&self) -> Result<Vec<ConsumeOutcome>> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.poll_once().await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Consumes until `shutdown` flips to `true`.
    ///
    /// Bus errors do not stop the loop: they are logged and the consumer
    /// pauses for its error backoff before receiving again. Messages whose
    /// settlement failed stay with the bus and are delivered again.
    #[tracing::instrument(skip(self, shutdown), fields(queue = %self.handler.queue()))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!("consumer started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                delivery = self.bus.receive(self.handler.queue()) => match delivery {
                    Ok(delivery) => self.process(delivery).await.map(drop),
                    Err(error) => Err(error),
                },
            };

            if let Err(error) = result {
                tracing::warn!(
                    %error,
                    backoff_ms = self.error_backoff.as_millis() as u64,
                    "bus error, consumer backing off"
                );
                let queue = self.handler.queue().to_string();
                metrics::counter!("bus_consumer_errors_total", "queue" => queue).increment(1);
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    () = tokio::time::sleep(self.error_backoff) => {}
                }
            }
        }
        tracing::info!("consumer stopped");
        Ok(())
    }

    async fn process(&self, delivery: Delivery) -> Result<ConsumeOutcome> {
        let queue = self.handler.queue().to_string();
        let message_id = delivery.message.id;
        let attempt = delivery.attempt();

        let outcome = match self.handler.handle(&delivery.message).await {
            Ok(Disposition::Ack) => {
                self.bus.ack(delivery).await?;
                ConsumeOutcome::Acked
            }
            Ok(Disposition::Drop) => {
                self.bus.ack(delivery).await?;
                metrics::counter!("bus_messages_dropped_total", "queue" => queue.clone())
                    .increment(1);
                ConsumeOutcome::Dropped
            }
            Ok(Disposition::DeadLetter(reason)) => {
                self.bus.dead_letter(delivery, &reason).await?;
                ConsumeOutcome::DeadLettered
            }
            Err(error) => match self.policy.decide(attempt) {
                RetryDecision::Requeue(delay) => {
                    tracing::warn!(
                        %queue,
                        %message_id,
                        attempt,
                        retry_in_secs = delay.as_secs_f64(),
                        error = %error,
                        "handler failed, message requeued"
                    );
                    self.bus.requeue(delivery, delay).await?;
                    ConsumeOutcome::Requeued
                }
                RetryDecision::DeadLetter => {
                    self.bus
                        .dead_letter(delivery, &format!("retries exhausted: {error}"))
                        .await?;
                    ConsumeOutcome::DeadLettered
                }
            },
        };

        metrics::counter!("bus_messages_consumed_total", "queue" => queue).increment(1);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBus;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails a configured number of times, then succeeds.
    struct FlakyHandler {
        failures_left: AtomicU32,
        calls: Arc<AtomicU32>,
    }

    impl FlakyHandler {
        fn new(failures: u32) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    failures_left: AtomicU32::new(failures),
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl MessageHandler for FlakyHandler {
        fn queue(&self) -> &str {
            "work"
        }

        async fn handle(&self, message: &Message) -> std::result::Result<Disposition, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if message.payload == serde_json::json!("junk") {
                return Ok(Disposition::Drop);
            }
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err("downstream unavailable".into());
            }
            Ok(Disposition::Ack)
        }
    }

    #[tokio::test]
    async fn test_success_acks() {
        let bus = InMemoryBus::new();
        let (handler, calls) = FlakyHandler::new(0);
        let consumer = Consumer::new(bus.clone(), handler, RetryPolicy::default());

        bus.publish("work", serde_json::json!(1)).await.unwrap();
        let outcomes = consumer.drain().await.unwrap();

        assert_eq!(outcomes, vec![ConsumeOutcome::Acked]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.in_flight_len("work").await, 0);
    }

    #[tokio::test]
    async fn test_failure_requeues_until_success() {
        let bus = InMemoryBus::new();
        let (handler, calls) = FlakyHandler::new(2);
        let consumer = Consumer::new(
            bus.clone(),
            handler,
            RetryPolicy::unlimited(Duration::ZERO),
        );

        bus.publish("work", serde_json::json!(1)).await.unwrap();
        let outcomes = consumer.drain().await.unwrap();

        assert_eq!(
            outcomes,
            vec![
                ConsumeOutcome::Requeued,
                ConsumeOutcome::Requeued,
                ConsumeOutcome::Acked
            ]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_bounded_policy_dead_letters() {
        let bus = InMemoryBus::new();
        let (handler, _) = FlakyHandler::new(10);
        let consumer = Consumer::new(bus.clone(), handler, RetryPolicy::bounded(Duration::ZERO, 2));

        bus.publish("work", serde_json::json!(1)).await.unwrap();
        let outcomes = consumer.drain().await.unwrap();

        assert_eq!(
            outcomes,
            vec![ConsumeOutcome::Requeued, ConsumeOutcome::DeadLettered]
        );
        assert_eq!(bus.peek("work.dlq").await.len(), 1);
    }

    #[tokio::test]
    async fn test_drop_is_acked_without_requeue() {
        let bus = InMemoryBus::new();
        let (handler, calls) = FlakyHandler::new(5);
        let consumer = Consumer::new(bus.clone(), handler, RetryPolicy::default());

        bus.publish("work", serde_json::json!("junk")).await.unwrap();
        let outcomes = consumer.drain().await.unwrap();

        assert_eq!(outcomes, vec![ConsumeOutcome::Dropped]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.ready_len("work").await, 0);
        assert_eq!(bus.delayed_len("work").await, 0);
    }

    #[tokio::test]
    async fn test_run_survives_a_failed_ack() {
        let bus = InMemoryBus::new();
        let (handler, calls) = FlakyHandler::new(0);
        let consumer = Arc::new(
            Consumer::new(bus.clone(), handler, RetryPolicy::default())
                .with_error_backoff(Duration::from_millis(10)),
        );
        let (tx, rx) = watch::channel(false);

        bus.set_fail_on_ack(true);
        let running = Arc::clone(&consumer);
        let handle = tokio::spawn(async move { running.run(rx).await });

        bus.publish("work", serde_json::json!(1)).await.unwrap();
        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        bus.set_fail_on_ack(false);

        // The unsettled message comes back and is acked on redelivery.
        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) >= 2
                && bus.ready_len("work").await == 0
                && bus.in_flight_len("work").await == 0
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!handle.is_finished());
        assert!(calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(bus.in_flight_len("work").await, 0);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let bus = InMemoryBus::new();
        let (handler, calls) = FlakyHandler::new(0);
        let consumer = Arc::new(Consumer::new(bus.clone(), handler, RetryPolicy::default()));
        let (tx, rx) = watch::channel(false);

        let running = Arc::clone(&consumer);
        let handle = tokio::spawn(async move { running.run(rx).await });

        bus.publish("work", serde_json::json!(1)).await.unwrap();
        for _ in 0..50 {
            if calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
