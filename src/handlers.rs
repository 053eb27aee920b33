// Feed handlers: `Flat` (broadcast) and `Activity` (directed), implementing
// the common capability set from spec.md §4.1 (`add`, `retract`,
// `subscribe`, `unsubscribe`, `consume`, `rebuild`). Grounded on the
// original's `controllers/EventController.py` (`BaseEvent`/`Flat`/
// `Activity`), translated from class inheritance to a shared trait with one
// default method (`consume`, the read path both variants share) and two
// concrete structs for the write-path fan-out rules, which is the
// composition the teacher's own `Flat`/`Activity` variant split in
// `models.rs`/`app_state.rs` favors over a class hierarchy.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::cache::{cache_key, TimelineCache};
use crate::error::CoreError;
use crate::models::{ActivityItem, ConsumeItem, FlatItem, PublishPayload, RetractPayload};
use crate::store::Store;

/// Immutable per-feed configuration, spec.md §3 `FeedRegistration` minus the
/// `kind` tag (the kind is now the handler's concrete type).
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub name: String,
    pub verbs: Vec<String>,
    pub include_actor: bool,
    pub max_cache: i64,
}

/// The capability set every feed handler implements, dispatched on by name
/// (`[PROCESSOR]`) and routed to by verb.
#[async_trait]
pub trait FeedHandler: Send + Sync {
    fn name(&self) -> &str;
    fn verbs(&self) -> &[String];

    /// Persists the row (unless `save` is false, the preloader's replay
    /// mode) then fans the item out to every affected consumer cache.
    async fn add(&self, payload: &PublishPayload, save: bool) -> Result<(), CoreError>;

    /// Fans the removal out to every affected consumer cache, cache-first,
    /// then deletes the row (spec.md §9(d)).
    async fn retract(&self, payload: &RetractPayload) -> Result<(), CoreError>;

    async fn subscribe(&self, consumer_id: &str, producer_id: &str) -> Result<(), CoreError>;
    async fn unsubscribe(&self, consumer_id: &str, producer_id: &str) -> Result<(), CoreError>;

    /// Recreates `consumer_id`'s timeline cache from the store. Called
    /// lazily by `consume` on a missing/empty cache.
    async fn rebuild(&self, consumer_id: &str) -> Result<(), CoreError>;

    /// Replays every stored row for this feed through `add(save = false)`,
    /// for the boot-time preloader. A row whose replay fails is logged and
    /// skipped so boot can complete.
    async fn preload(&self) -> Result<(), CoreError>;

    /// Joins a set of cached item ids back to the store to project
    /// `{item_id, verb}`.
    async fn project(&self, consumer_id: &str, item_ids: &[String]) -> Result<Vec<ConsumeItem>, CoreError>;

    fn cache(&self) -> &TimelineCache;

    fn cache_key_for(&self, consumer_id: &str) -> String {
        cache_key(consumer_id, self.name())
    }

    /// The shared read path (spec.md §4.1 paging table). `Flat` and
    /// `Activity` differ only in how `rebuild`/`project` resolve against the
    /// store; the cursor math and lazy-rebuild behavior live here once.
    async fn consume(
        &self,
        consumer_id: &str,
        limit: i64,
        after: Option<&str>,
        before: Option<&str>,
    ) -> Result<Vec<ConsumeItem>, CoreError> {
        if after.is_some() && before.is_some() {
            return Err(CoreError::CursorConflict);
        }

        let key = self.cache_key_for(consumer_id);
        if !self.cache().exists(&key).await || self.cache().cardinality(&key).await == 0 {
            self.rebuild(consumer_id).await?;
        }
        if self.cache().cardinality(&key).await == 0 {
            return Ok(Vec::new());
        }

        let limit = limit.max(0);
        let (start, end): (isize, isize) = if let Some(after) = after {
            let rank = self.cache().reverse_rank(&key, after).await? as isize;
            (rank + 1, rank + limit as isize)
        } else if let Some(before) = before {
            let rank = self.cache().reverse_rank(&key, before).await? as isize;
            (0.max(rank - limit as isize), rank - 1)
        } else {
            (0, limit as isize - 1)
        };

        let range = self.cache().reverse_range(&key, start, end).await;
        let item_ids: Vec<String> = range.into_iter().map(|(member, _)| member).collect();
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let projected = self.project(consumer_id, &item_ids).await?;
        let mut by_id: HashMap<&str, ConsumeItem> = projected
            .iter()
            .map(|item| (item.item_id.as_str(), item.clone()))
            .collect();
        Ok(item_ids
            .iter()
            .filter_map(|id| by_id.remove(id.as_str()))
            .collect())
    }
}

/// Broadcast feed: one producer, every subscriber's cache (spec.md §4.2).
pub struct FlatHandler {
    config: FeedConfig,
    store: Arc<Store>,
    cache: Arc<TimelineCache>,
}

impl FlatHandler {
    pub fn new(config: FeedConfig, store: Arc<Store>, cache: Arc<TimelineCache>) -> Self {
        Self { config, store, cache }
    }
}

#[async_trait]
impl FeedHandler for FlatHandler {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn verbs(&self) -> &[String] {
        &self.config.verbs
    }

    fn cache(&self) -> &TimelineCache {
        &self.cache
    }

    async fn add(&self, payload: &PublishPayload, save: bool) -> Result<(), CoreError> {
        if save {
            let item = FlatItem {
                item_id: payload.item_id.clone(),
                producer_id: payload.producer_id.clone(),
                verb: payload.verb.clone(),
                timestamp: payload.timestamp,
            };
            self.store.insert_flat_item(&self.config.name, &item).await?;
        }

        let subscribers = self
            .store
            .subscribers_of(&self.config.name, &payload.producer_id)
            .await?;
        let member = (payload.item_id.clone(), payload.timestamp);
        for consumer_id in &subscribers {
            self.cache
                .add_and_prune(
                    &self.cache_key_for(consumer_id),
                    std::slice::from_ref(&member),
                    self.config.max_cache as usize,
                )
                .await;
        }
        if self.config.include_actor {
            self.cache
                .add_and_prune(
                    &self.cache_key_for(&payload.producer_id),
                    std::slice::from_ref(&member),
                    self.config.max_cache as usize,
                )
                .await;
        }
        Ok(())
    }

    async fn retract(&self, payload: &RetractPayload) -> Result<(), CoreError> {
        let subscribers = self
            .store
            .subscribers_of(&self.config.name, &payload.producer_id)
            .await?;
        for consumer_id in &subscribers {
            self.cache
                .remove(&self.cache_key_for(consumer_id), &payload.item_id)
                .await;
        }
        if self.config.include_actor {
            self.cache
                .remove(&self.cache_key_for(&payload.producer_id), &payload.item_id)
                .await;
        }
        self.store
            .delete_flat_item(&self.config.name, &payload.producer_id, &payload.item_id)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, consumer_id: &str, producer_id: &str) -> Result<(), CoreError> {
        self.store
            .insert_relation(&self.config.name, producer_id, consumer_id)
            .await?;
        let items = self
            .store
            .flat_items_by_producer(&self.config.name, producer_id)
            .await?;
        let members: Vec<(String, i64)> = items.into_iter().map(|i| (i.item_id, i.timestamp)).collect();
        if !members.is_empty() {
            self.cache
                .add_and_prune(&self.cache_key_for(consumer_id), &members, self.config.max_cache as usize)
                .await;
        }
        Ok(())
    }

    async fn unsubscribe(&self, consumer_id: &str, producer_id: &str) -> Result<(), CoreError> {
        let items = self
            .store
            .flat_items_by_producer(&self.config.name, producer_id)
            .await?;
        let ids: Vec<String> = items.into_iter().map(|i| i.item_id).collect();
        self.cache.remove_many(&self.cache_key_for(consumer_id), &ids).await;
        self.store
            .delete_relation(&self.config.name, producer_id, consumer_id)
            .await?;
        Ok(())
    }

    async fn rebuild(&self, consumer_id: &str) -> Result<(), CoreError> {
        let mut items = self
            .store
            .rebuild_flat_timeline(&self.config.name, consumer_id, self.config.max_cache)
            .await?;
        if self.config.include_actor {
            let own = self
                .store
                .flat_items_by_producer(&self.config.name, consumer_id)
                .await?;
            items.extend(own);
        }
        let members: Vec<(String, i64)> = items.into_iter().map(|i| (i.item_id, i.timestamp)).collect();
        if !members.is_empty() {
            self.cache
                .add_and_prune(&self.cache_key_for(consumer_id), &members, self.config.max_cache as usize)
                .await;
        }
        Ok(())
    }

    async fn preload(&self) -> Result<(), CoreError> {
        let items = self.store.all_flat_items(&self.config.name).await?;
        for item in items {
            let payload = PublishPayload {
                verb: item.verb,
                producer_id: item.producer_id,
                item_id: item.item_id,
                timestamp: item.timestamp,
                consumer_id: None,
            };
            if let Err(error) = self.add(&payload, false).await {
                warn!(feed = %self.config.name, %error, "preload row skipped");
            }
        }
        Ok(())
    }

    async fn project(&self, _consumer_id: &str, item_ids: &[String]) -> Result<Vec<ConsumeItem>, CoreError> {
        self.store.project_flat_verbs(&self.config.name, item_ids).await
    }
}

/// Directed-activity feed: one producer addresses exactly one consumer per
/// row, independent of the relations table on `add`/`retract` (spec.md
/// §4.3). Subscription still gates `subscribe`/`unsubscribe`/`rebuild`.
pub struct ActivityHandler {
    config: FeedConfig,
    store: Arc<Store>,
    cache: Arc<TimelineCache>,
}

impl ActivityHandler {
    pub fn new(config: FeedConfig, store: Arc<Store>, cache: Arc<TimelineCache>) -> Self {
        Self { config, store, cache }
    }
}

#[async_trait]
impl FeedHandler for ActivityHandler {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn verbs(&self) -> &[String] {
        &self.config.verbs
    }

    fn cache(&self) -> &TimelineCache {
        &self.cache
    }

    async fn add(&self, payload: &PublishPayload, save: bool) -> Result<(), CoreError> {
        let consumer_id = payload
            .consumer_id
            .clone()
            .ok_or_else(|| CoreError::InvalidPayload("consumer_id required for activity feeds".into()))?;

        if save {
            let item = ActivityItem {
                item_id: payload.item_id.clone(),
                producer_id: payload.producer_id.clone(),
                consumer_id: consumer_id.clone(),
                verb: payload.verb.clone(),
                timestamp: payload.timestamp,
            };
            self.store.insert_activity_item(&self.config.name, &item).await?;
        }

        self.cache
            .add_and_prune(
                &self.cache_key_for(&consumer_id),
                &[(payload.item_id.clone(), payload.timestamp)],
                self.config.max_cache as usize,
            )
            .await;
        Ok(())
    }

    async fn retract(&self, payload: &RetractPayload) -> Result<(), CoreError> {
        let consumer_id = payload
            .consumer_id
            .clone()
            .ok_or_else(|| CoreError::InvalidPayload("consumer_id required for activity feeds".into()))?;

        self.cache
            .remove(&self.cache_key_for(&consumer_id), &payload.item_id)
            .await;
        self.store
            .delete_activity_item(
                &self.config.name,
                &payload.producer_id,
                &payload.item_id,
                &payload.verb,
                &consumer_id,
            )
            .await?;
        Ok(())
    }

    async fn subscribe(&self, consumer_id: &str, producer_id: &str) -> Result<(), CoreError> {
        self.store
            .insert_relation(&self.config.name, producer_id, consumer_id)
            .await?;
        let items = self
            .store
            .activity_items_by_producer_consumer(&self.config.name, producer_id, consumer_id)
            .await?;
        let members: Vec<(String, i64)> = items.into_iter().map(|i| (i.item_id, i.timestamp)).collect();
        if !members.is_empty() {
            self.cache
                .add_and_prune(&self.cache_key_for(consumer_id), &members, self.config.max_cache as usize)
                .await;
        }
        Ok(())
    }

    async fn unsubscribe(&self, consumer_id: &str, producer_id: &str) -> Result<(), CoreError> {
        let items = self
            .store
            .activity_items_by_producer_consumer(&self.config.name, producer_id, consumer_id)
            .await?;
        let ids: Vec<String> = items.into_iter().map(|i| i.item_id).collect();
        self.cache.remove_many(&self.cache_key_for(consumer_id), &ids).await;
        self.store
            .delete_relation(&self.config.name, producer_id, consumer_id)
            .await?;
        Ok(())
    }

    async fn rebuild(&self, consumer_id: &str) -> Result<(), CoreError> {
        let items = self
            .store
            .rebuild_activity_timeline(&self.config.name, consumer_id, self.config.max_cache)
            .await?;
        let members: Vec<(String, i64)> = items.into_iter().map(|i| (i.item_id, i.timestamp)).collect();
        if !members.is_empty() {
            self.cache
                .add_and_prune(&self.cache_key_for(consumer_id), &members, self.config.max_cache as usize)
                .await;
        }
        Ok(())
    }

    async fn preload(&self) -> Result<(), CoreError> {
        let items = self.store.all_activity_items(&self.config.name).await?;
        for item in items {
            let payload = PublishPayload {
                verb: item.verb,
                producer_id: item.producer_id,
                item_id: item.item_id,
                timestamp: item.timestamp,
                consumer_id: Some(item.consumer_id),
            };
            if let Err(error) = self.add(&payload, false).await {
                warn!(feed = %self.config.name, %error, "preload row skipped");
            }
        }
        Ok(())
    }

    async fn project(&self, consumer_id: &str, item_ids: &[String]) -> Result<Vec<ConsumeItem>, CoreError> {
        self.store
            .project_activity_verbs(&self.config.name, consumer_id, item_ids)
            .await
    }
}
