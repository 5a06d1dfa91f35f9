//! Rollback commands travelling over the bus to the registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bus::{ConsumeOutcome, Consumer, InMemoryBus, RetryPolicy};
use rollback::{
    BusRollbackEmitter, CompensationError, CompensationHandler, HandlerRegistry,
    ROLLBACK_QUEUE, RollbackCommand, RollbackConsumer, RollbackEmitter, RollbackParams,
};

/// Fails its first `failures` calls, then succeeds.
struct FlakyHandler {
    failures: AtomicU32,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl CompensationHandler for FlakyHandler {
    fn rollback_type(&self) -> &'static str {
        "DeleteSavedImages"
    }

    async fn compensate(&self, _params: &RollbackParams) -> Result<(), CompensationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(CompensationError::Remote {
                rollback_type: "DeleteSavedImages".into(),
                reason: "image service unavailable".into(),
            });
        }
        Ok(())
    }
}

fn setup(failures: u32) -> (InMemoryBus, Consumer<InMemoryBus, RollbackConsumer>, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let registry = HandlerRegistry::builder()
        .register(FlakyHandler {
            failures: AtomicU32::new(failures),
            calls: Arc::clone(&calls),
        })
        .unwrap()
        .build();
    let bus = InMemoryBus::new();
    let consumer = Consumer::new(
        bus.clone(),
        RollbackConsumer::new(Arc::new(registry)),
        RetryPolicy::unlimited(Duration::ZERO),
    );
    (bus, consumer, calls)
}

#[tokio::test]
async fn test_failing_handler_is_retried_until_it_succeeds() {
    let (bus, consumer, calls) = setup(2);
    let emitter = BusRollbackEmitter::new(bus.clone());

    emitter
        .emit_rollback("DeleteSavedImages", &serde_json::json!({"imageIds": [101, 102]}))
        .await
        .unwrap();
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
    assert_eq!(bus.in_flight_len(ROLLBACK_QUEUE).await, 0);
}

#[tokio::test]
async fn test_unknown_type_is_dropped_without_requeue() {
    let (bus, consumer, calls) = setup(0);
    let emitter = BusRollbackEmitter::new(bus.clone());

    emitter
        .emit(RollbackCommand::new("SendApologyEmail", RollbackParams::new()))
        .await
        .unwrap();
    let outcomes = consumer.drain().await.unwrap();

    assert_eq!(outcomes, vec![ConsumeOutcome::Dropped]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(bus.ready_len(ROLLBACK_QUEUE).await, 0);
    assert_eq!(bus.delayed_len(ROLLBACK_QUEUE).await, 0);
    assert!(bus.peek("rollback.dlq").await.is_empty());
}

#[tokio::test]
async fn test_duplicate_delivery_runs_handler_twice() {
    let (bus, consumer, calls) = setup(0);
    let emitter = BusRollbackEmitter::new(bus.clone());
    let command = RollbackCommand::new("DeleteSavedImages", RollbackParams::new());

    emitter.emit(command.clone()).await.unwrap();
    emitter.emit(command).await.unwrap();
    let outcomes = consumer.drain().await.unwrap();

    assert_eq!(outcomes, vec![ConsumeOutcome::Acked, ConsumeOutcome::Acked]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
