//! Consumer tasks and the in-process wiring of the worker.

use std::sync::Arc;

use bus::{Consumer, InMemoryBus, MessageBus, MessageHandler, RetryPolicy};
use cache::{CacheIndex, InMemoryCacheStore};
use futures_util::future::join_all;
use projections::{
    InMemorySearchIndex, Operation, ProjectionConsumer, ProjectionProcessor, SearchIndexProjection,
};
use rollback::{HandlerRegistry, ROLLBACK_QUEUE, RollbackConsumer};
use saga::workflows::CARD_ENTITY;
use saga::{InMemoryServices, Workflows, handlers};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::{AdminState, Result, WorkerError};

/// The rollback consumer plus one projection consumer per operation.
pub struct Pipeline<B: MessageBus + Clone + 'static> {
    bus: B,
    registry: Arc<HandlerRegistry>,
    processor: ProjectionProcessor,
    rollback_retry: RetryPolicy,
    projection_retry: RetryPolicy,
}

impl<B: MessageBus + Clone + 'static> Pipeline<B> {
    /// Creates a pipeline with the default retry policies.
    pub fn new(bus: B, registry: Arc<HandlerRegistry>, processor: ProjectionProcessor) -> Self {
        Self {
            bus,
            registry,
            processor,
            rollback_retry: RetryPolicy::default(),
            projection_retry: RetryPolicy::default(),
        }
    }

    /// Overrides the retry policies of the rollback and projection queues.
    pub fn with_policies(mut self, rollback: RetryPolicy, projection: RetryPolicy) -> Self {
        self.rollback_retry = rollback;
        self.projection_retry = projection;
        self
    }

    /// Returns the queues this pipeline consumes.
    pub fn queues(&self) -> Vec<&'static str> {
        std::iter::once(ROLLBACK_QUEUE)
            .chain(Operation::ALL.iter().map(Operation::queue))
            .collect()
    }

    /// Describes the pipeline for the health endpoint.
    pub fn admin_state(&self) -> AdminState {
        AdminState {
            queues: self.queues().into_iter().map(String::from).collect(),
            rollback_types: self
                .registry
                .rollback_types()
                .into_iter()
                .map(String::from)
                .collect(),
            projections: self.processor.projection_count(),
        }
    }

    /// Spawns one task per queue. They stop when `shutdown` flips to `true`.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> ConsumerSet {
        let mut set = ConsumerSet::default();
        set.push(
            Consumer::new(
                self.bus.clone(),
                RollbackConsumer::new(Arc::clone(&self.registry)),
                self.rollback_retry,
            ),
            shutdown.clone(),
        );
        for handler in ProjectionConsumer::for_all(&self.processor) {
            set.push(
                Consumer::new(self.bus.clone(), handler, self.projection_retry),
                shutdown.clone(),
            );
        }
        metrics::gauge!("worker_consumers").set(set.len() as f64);
        tracing::info!(consumers = set.len(), "consumers spawned");
        set
    }
}

/// Handles of running consumer tasks.
#[derive(Default)]
pub struct ConsumerSet {
    queues: Vec<String>,
    handles: Vec<JoinHandle<bus::Result<()>>>,
}

impl ConsumerSet {
    fn push<B, H>(&mut self, consumer: Consumer<B, H>, shutdown: watch::Receiver<bool>)
    where
        B: MessageBus + 'static,
        H: MessageHandler + 'static,
    {
        self.queues.push(consumer.queue().to_string());
        self.handles
            .push(tokio::spawn(async move { consumer.run(shutdown).await }));
    }

    /// Returns the number of consumer tasks.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if no consumer was spawned.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every consumer to stop and returns the first failure.
    pub async fn join(self) -> Result<()> {
        let mut first_error: Option<WorkerError> = None;
        for (queue, result) in self.queues.iter().zip(join_all(self.handles).await) {
            let error = match result {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => WorkerError::from(error),
                Err(error) => WorkerError::from(error),
            };
            tracing::error!(queue, %error, "consumer stopped with an error");
            first_error.get_or_insert(error);
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Everything the worker runs, wired over in-memory stores and services.
pub struct Runtime {
    pub services: InMemoryServices,
    pub bus: InMemoryBus,
    pub index: InMemorySearchIndex,
    pub workflows: Workflows<InMemoryBus, InMemoryCacheStore>,
    pub pipeline: Pipeline<InMemoryBus>,
}

impl Runtime {
    /// Builds the runtime from `config`.
    pub fn in_memory(config: &Config) -> Result<Self> {
        let services = InMemoryServices::new();
        let bus = InMemoryBus::new();
        let index = InMemorySearchIndex::new();

        let registry = Arc::new(handlers::registry(&services.handles())?);
        let processor = ProjectionProcessor::new().with(Arc::new(SearchIndexProjection::new(
            CARD_ENTITY,
            index.clone(),
        )));
        let pipeline = Pipeline::new(bus.clone(), registry, processor)
            .with_policies(config.rollback_retry, config.projection_retry);
        let workflows = Workflows::new(
            services.handles(),
            CacheIndex::with_ttl(InMemoryCacheStore::new(), config.cache_ttl),
            bus.clone(),
        );

        Ok(Self {
            services,
            bus,
            index,
            workflows,
            pipeline,
        })
    }

    /// Flushes pending rollback emissions, then stops the consumers.
    pub async fn shutdown(&self, stop: watch::Sender<bool>, consumers: ConsumerSet) -> Result<()> {
        self.workflows.dispatcher().flush().await;
        // Receivers may already be gone if every consumer failed.
        let _ = stop.send(true);
        consumers.join().await
    }
}
