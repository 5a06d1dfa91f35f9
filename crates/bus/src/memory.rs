use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::MessageId;
use tokio::sync::{Mutex, Notify};

use crate::bus::{MessageBus, dead_letter_queue};
use crate::message::{Delivery, Message};
use crate::{BusError, Result};

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Message>,
    in_flight: HashMap<u64, Message>,
    /// Requeued messages waiting out their delay.
    delayed: usize,
    notify: Arc<Notify>,
}

#[derive(Debug, Default)]
struct Shared {
    queues: Mutex<HashMap<String, QueueState>>,
    next_tag: AtomicU64,
    fail_on_publish: AtomicBool,
    fail_on_ack: AtomicBool,
}

/// In-memory bus implementation for testing and single-process runs.
///
/// Queues are created on first use. A message is never lost while the process
/// lives: it is either ready, in flight, or waiting out a requeue delay.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBus {
    shared: Arc<Shared>,
}

impl InMemoryBus {
    /// Creates a new bus with no queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `publish` calls fail.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.shared.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `ack` calls fail as if the connection dropped: the
    /// delivery goes back to the ready queue.
    pub fn set_fail_on_ack(&self, fail: bool) {
        self.shared.fail_on_ack.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of messages ready for delivery on `queue`.
    pub async fn ready_len(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.ready.len()).await
    }

    /// Returns the number of delivered but unsettled messages on `queue`.
    pub async fn in_flight_len(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.in_flight.len()).await
    }

    /// Returns the number of requeued messages still waiting out a delay.
    pub async fn delayed_len(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.delayed).await
    }

    /// Returns copies of the messages ready on `queue`, oldest first.
    pub async fn peek(&self, queue: &str) -> Vec<Message> {
        self.with_queue(queue, |q| q.ready.iter().cloned().collect())
            .await
    }

    async fn with_queue<T>(&self, queue: &str, f: impl FnOnce(&QueueState) -> T) -> T {
        let mut queues = self.shared.queues.lock().await;
        f(queues.entry(queue.to_string()).or_default())
    }

    async fn enqueue(shared: &Shared, message: Message) {
        let mut queues = shared.queues.lock().await;
        let state = queues.entry(message.destination.clone()).or_default();
        state.ready.push_back(message);
        state.notify.notify_one();
    }

    async fn take_in_flight(&self, delivery: &Delivery) -> Result<Message> {
        let mut queues = self.shared.queues.lock().await;
        queues
            .get_mut(&delivery.queue)
            .and_then(|q| q.in_flight.remove(&delivery.tag))
            .ok_or_else(|| BusError::UnknownDelivery {
                queue: delivery.queue.clone(),
                tag: delivery.tag,
            })
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, destination: &str, payload: serde_json::Value) -> Result<MessageId> {
        if self.shared.fail_on_publish.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable(format!(
                "publish to '{destination}' rejected"
            )));
        }

        let message = Message::new(destination, payload);
        let id = message.id;
        Self::enqueue(&self.shared, message).await;
        metrics::counter!("bus_messages_published_total").increment(1);
        Ok(id)
    }

    async fn receive(&self, queue: &str) -> Result<Delivery> {
        loop {
            let notify = self.with_queue(queue, |q| Arc::clone(&q.notify)).await;
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_receive(queue).await? {
                return Ok(delivery);
            }
            notified.await;
        }
    }

    async fn try_receive(&self, queue: &str) -> Result<Option<Delivery>> {
        let mut queues = self.shared.queues.lock().await;
        let state = queues.entry(queue.to_string()).or_default();
        let Some(message) = state.ready.pop_front() else {
            return Ok(None);
        };

        let tag = self.shared.next_tag.fetch_add(1, Ordering::Relaxed);
        state.in_flight.insert(tag, message.clone());
        Ok(Some(Delivery {
            queue: queue.to_string(),
            tag,
            message,
        }))
    }

    async fn ack(&self, delivery: Delivery) -> Result<()> {
        let message = self.take_in_flight(&delivery).await?;
        if self.shared.fail_on_ack.load(Ordering::SeqCst) {
            Self::enqueue(&self.shared, message).await;
            return Err(BusError::Unavailable(format!(
                "ack on '{}' rejected",
                delivery.queue
            )));
        }
        Ok(())
    }

    async fn requeue(&self, delivery: Delivery, delay: Duration) -> Result<()> {
        let mut message = self.take_in_flight(&delivery).await?;
        message.attempt += 1;
        metrics::counter!("bus_messages_requeued_total").increment(1);

        if delay.is_zero() {
            Self::enqueue(&self.shared, message).await;
            return Ok(());
        }

        {
            let mut queues = self.shared.queues.lock().await;
            queues.entry(delivery.queue.clone()).or_default().delayed += 1;
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut queues = shared.queues.lock().await;
                if let Some(state) = queues.get_mut(&message.destination) {
                    state.delayed = state.delayed.saturating_sub(1);
                }
            }
            Self::enqueue(&shared, message).await;
        });
        Ok(())
    }

    async fn dead_letter(&self, delivery: Delivery, reason: &str) -> Result<()> {
        let mut message = self.take_in_flight(&delivery).await?;
        tracing::error!(
            queue = %delivery.queue,
            message_id = %message.id,
            attempt = message.attempt,
            reason,
            "message dead-lettered"
        );
        message.destination = dead_letter_queue(&delivery.queue);
        Self::enqueue(&self.shared, message).await;
        metrics::counter!("bus_messages_dead_lettered_total").increment(1);
        Ok(())
    }
}
