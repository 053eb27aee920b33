// The event processor / router (spec.md §4.4): a registry of feed handlers
// keyed by name and by verb, translating a public operation into one or
// more enqueued jobs. Grounded on the original's
// `controllers/EventProcessor.py` classmethod registry, translated from
// mutable class state to an instance built once at boot and shared via
// `Arc` (spec.md §9 "avoid process-wide singletons by passing the processor
// explicitly").
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::error;

use crate::error::CoreError;
use crate::handlers::FeedHandler;
use crate::models::{ConsumeItem, PublishPayload, RetractPayload};
use crate::queue::TaskQueue;

pub struct EventProcessor {
    by_name: HashMap<String, Arc<dyn FeedHandler>>,
    by_verb: HashMap<String, Vec<Arc<dyn FeedHandler>>>,
    queue: RwLock<Option<Arc<TaskQueue>>>,
}

impl EventProcessor {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            by_verb: HashMap::new(),
            queue: RwLock::new(None),
        }
    }

    /// Idempotent on `name`: registering the same feed name twice leaves the
    /// registry unchanged rather than duplicating verb bindings.
    pub fn register(&mut self, handler: Arc<dyn FeedHandler>) {
        let name = handler.name().to_string();
        if self.by_name.contains_key(&name) {
            return;
        }
        for verb in handler.verbs() {
            self.by_verb.entry(verb.clone()).or_default().push(handler.clone());
        }
        self.by_name.insert(name, handler);
    }

    /// Wires the task queue the processor dispatches writes onto. Refuses a
    /// second registration rather than silently replacing the queue (the
    /// original's `register_task_queue` returning `False` on a second call,
    /// surfaced here as a typed error per `[ERROR]`).
    pub async fn register_task_queue(&self, queue: Arc<TaskQueue>) -> Result<(), CoreError> {
        let mut guard = self.queue.write().await;
        if guard.is_some() {
            return Err(CoreError::QueueAlreadyRegistered);
        }
        *guard = Some(queue);
        Ok(())
    }

    async fn queue(&self) -> Result<Arc<TaskQueue>, CoreError> {
        self.queue.read().await.clone().ok_or(CoreError::QueueClosed)
    }

    fn handlers_for_verb(&self, verb: &str) -> Result<Vec<Arc<dyn FeedHandler>>, CoreError> {
        match self.by_verb.get(verb) {
            Some(handlers) if !handlers.is_empty() => Ok(handlers.clone()),
            _ => Err(CoreError::UnknownVerb(verb.to_string())),
        }
    }

    fn handler_for_name(&self, name: &str) -> Result<Arc<dyn FeedHandler>, CoreError> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownFeed(name.to_string()))
    }

    /// Enqueues `handler.add` for every handler bound to `payload.verb`.
    /// Returns after enqueue, not after execution.
    pub async fn publish(&self, payload: PublishPayload) -> Result<(), CoreError> {
        let handlers = self.handlers_for_verb(&payload.verb)?;
        let queue = self.queue().await?;
        for handler in handlers {
            let payload = payload.clone();
            queue
                .submit(Box::pin(async move {
                    if let Err(error) = handler.add(&payload, true).await {
                        error!(feed = handler.name(), %error, "publish job failed");
                    }
                }))
                .await?;
        }
        Ok(())
    }

    /// Symmetric to `publish`: enqueues `handler.retract` for every handler
    /// bound to `payload.verb`.
    pub async fn retract(&self, payload: RetractPayload) -> Result<(), CoreError> {
        let handlers = self.handlers_for_verb(&payload.verb)?;
        let queue = self.queue().await?;
        for handler in handlers {
            let payload = payload.clone();
            queue
                .submit(Box::pin(async move {
                    if let Err(error) = handler.retract(&payload).await {
                        error!(feed = handler.name(), %error, "retract job failed");
                    }
                }))
                .await?;
        }
        Ok(())
    }

    pub async fn subscribe(&self, name: &str, consumer_id: String, producer_id: String) -> Result<(), CoreError> {
        let handler = self.handler_for_name(name)?;
        let queue = self.queue().await?;
        queue
            .submit(Box::pin(async move {
                if let Err(error) = handler.subscribe(&consumer_id, &producer_id).await {
                    error!(feed = handler.name(), %error, "subscribe job failed");
                }
            }))
            .await
    }

    pub async fn unsubscribe(&self, name: &str, consumer_id: String, producer_id: String) -> Result<(), CoreError> {
        let handler = self.handler_for_name(name)?;
        let queue = self.queue().await?;
        queue
            .submit(Box::pin(async move {
                if let Err(error) = handler.unsubscribe(&consumer_id, &producer_id).await {
                    error!(feed = handler.name(), %error, "unsubscribe job failed");
                }
            }))
            .await
    }

    /// Synchronous: bypasses the queue entirely so read latency isn't
    /// coupled to the write backlog (spec.md §4.4, §9 "asynchronous writes,
    /// synchronous reads").
    pub async fn consume(
        &self,
        name: &str,
        consumer_id: &str,
        limit: i64,
        after: Option<&str>,
        before: Option<&str>,
    ) -> Result<Vec<ConsumeItem>, CoreError> {
        let handler = self.handler_for_name(name)?;
        handler.consume(consumer_id, limit, after, before).await
    }

    /// Replays every row of every registered feed through that feed's own
    /// `add` path with `save = false`, to repopulate caches on boot. Feed
    /// order is unspecified; a row whose replay fails is logged and skipped
    /// inside the handler's own `preload` so boot can complete.
    pub async fn preload(&self) {
        for handler in self.by_name.values() {
            if let Err(error) = handler.preload().await {
                error!(feed = handler.name(), %error, "preload failed for feed");
            }
        }
    }
}

impl Default for EventProcessor {
    fn default() -> Self {
        Self::new()
    }
}
