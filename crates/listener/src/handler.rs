use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::error::{ListenerError, PollError};

/// Passed to the poll source on every cycle.
#[derive(Debug, Clone)]
pub struct PollContext {
    pub listener: Arc<str>,
    pub cycle: u64,
}

/// Passed to a handler for one dispatch. `dispatch_id` is unique per handler
/// invocation and only meant for log attribution.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub listener: Arc<str>,
    pub handler_id: String,
    pub dispatch_id: Uuid,
    pub cycle: u64,
}

/// Produces the next batch of events for a listener.
///
/// Implemented for any `Fn(PollContext, Arc<C>) -> impl Future<Output =
/// Result<Vec<E>, PollError>>`.
#[async_trait]
pub trait PollSource<C, E>: Send + Sync {
    async fn poll(&self, ctx: PollContext, client: Arc<C>) -> Result<Vec<E>, PollError>;
}

#[async_trait]
impl<C, E, F, Fut> PollSource<C, E> for F
where
    C: Send + Sync + 'static,
    E: Send + 'static,
    F: Fn(PollContext, Arc<C>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<E>, PollError>> + Send + 'static,
{
    async fn poll(&self, ctx: PollContext, client: Arc<C>) -> Result<Vec<E>, PollError> {
        (self)(ctx, client).await
    }
}

/// Receives every non-empty batch a listener polls.
///
/// Handlers run as independent tasks and return nothing to the listener;
/// errors are theirs to log.
#[async_trait]
pub trait EventHandler<C, E>: Send + Sync {
    async fn handle(&self, ctx: DispatchContext, client: Arc<C>, events: Arc<[E]>);
}

#[async_trait]
impl<C, E, F, Fut> EventHandler<C, E> for F
where
    C: Send + Sync + 'static,
    E: Send + Sync + 'static,
    F: Fn(DispatchContext, Arc<C>, Arc<[E]>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, ctx: DispatchContext, client: Arc<C>, events: Arc<[E]>) {
        (self)(ctx, client, events).await
    }
}

pub type SharedHandler<C, E> = Arc<dyn EventHandler<C, E>>;

/// Handler id -> handler. Readers take a snapshot, so a dispatch cycle never
/// iterates the map while it is being modified.
pub struct HandlerRegistry<C, E> {
    handlers: RwLock<HashMap<String, SharedHandler<C, E>>>,
}

impl<C, E> HandlerRegistry<C, E> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, id: String, handler: SharedHandler<C, E>) -> Result<(), ListenerError> {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        match handlers.entry(id) {
            Entry::Occupied(entry) => Err(ListenerError::DuplicateHandlerId(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(handler);
                Ok(())
            }
        }
    }

    pub fn deregister(&self, id: &str) -> Result<(), ListenerError> {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ListenerError::UnknownHandlerId(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Copy of the current handler set.
    pub fn snapshot(&self) -> Vec<(String, SharedHandler<C, E>)> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, handler)| (id.clone(), handler.clone()))
            .collect()
    }
}

impl<C, E> Default for HandlerRegistry<C, E> {
    fn default() -> Self {
        Self::new()
    }
}
