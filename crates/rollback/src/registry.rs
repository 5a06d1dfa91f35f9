//! Immutable rollback type → handler mapping.

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{RollbackCommand, RollbackParams};
use crate::handler::CompensationHandler;
use crate::{CompensationError, Result, RollbackError};

/// Result of dispatching a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler ran and reported success.
    Compensated,
    /// No handler is registered for the command's type.
    Unresolved,
}

/// Collects handlers before the registry is frozen.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn CompensationHandler>>,
}

impl HandlerRegistryBuilder {
    /// Adds a handler under its own rollback type.
    pub fn register<H: CompensationHandler + 'static>(self, handler: H) -> Result<Self> {
        self.register_arc(Arc::new(handler))
    }

    /// Adds a shared handler under its own rollback type.
    pub fn register_arc(mut self, handler: Arc<dyn CompensationHandler>) -> Result<Self> {
        let rollback_type = handler.rollback_type().to_string();
        if self.handlers.contains_key(&rollback_type) {
            return Err(RollbackError::DuplicateHandler(rollback_type));
        }
        self.handlers.insert(rollback_type, handler);
        Ok(self)
    }

    /// Freezes the mapping.
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// Read-only mapping from rollback type to handler.
///
/// Built once at startup and shared by reference (`Arc<HandlerRegistry>`)
/// with every consumer.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CompensationHandler>>,
}

impl HandlerRegistry {
    /// Starts a new builder.
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Returns the handler for `rollback_type`, if any.
    pub fn get(&self, rollback_type: &str) -> Option<&Arc<dyn CompensationHandler>> {
        self.handlers.get(rollback_type)
    }

    /// Returns true if a handler exists for `rollback_type`.
    pub fn contains(&self, rollback_type: &str) -> bool {
        self.handlers.contains_key(rollback_type)
    }

    /// Returns the registered rollback types, sorted.
    pub fn rollback_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler for `rollback_type` with `params`.
    pub async fn compensate(
        &self,
        rollback_type: &str,
        params: &RollbackParams,
    ) -> std::result::Result<DispatchOutcome, CompensationError> {
        let Some(handler) = self.handlers.get(rollback_type) else {
            return Ok(DispatchOutcome::Unresolved);
        };
        handler.compensate(params).await?;
        Ok(DispatchOutcome::Compensated)
    }

    /// Runs the handler matching `command`.
    pub async fn dispatch(
        &self,
        command: &RollbackCommand,
    ) -> std::result::Result<DispatchOutcome, CompensationError> {
        self.compensate(&command.rollback_type, &command.params)
            .await
    }
}
