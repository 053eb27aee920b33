// Shared scaffolding for the integration tests: an in-memory store wired up
// the way `main.rs` wires the real one, minus the HTTP layer. A
// single-connection pool over `sqlite::memory:` keeps every query on the
// same in-memory database — a multi-connection pool would give each
// connection its own empty database.
#![allow(dead_code)]

use std::sync::Arc;

use feed_aggregator::cache::TimelineCache;
use feed_aggregator::handlers::{ActivityHandler, FeedConfig, FlatHandler};
use feed_aggregator::processor::EventProcessor;
use feed_aggregator::queue::TaskQueue;
use feed_aggregator::store::{init_store_with_pool, Store};
use sqlx::sqlite::SqlitePoolOptions;

pub struct Harness {
    pub processor: Arc<EventProcessor>,
    pub queue: Arc<TaskQueue>,
}

impl Harness {
    /// Boots a processor with a broadcast feed `feed` (verb `podcast`,
    /// `max_cache=500`, `include_actor=true`) and a directed feed
    /// `notification` (verbs `like`/`follow`/`comment`/`mention`,
    /// `max_cache=200`, `include_actor=false`) — the two scenario feeds
    /// from spec.md §8.
    pub async fn boot() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect in-memory sqlite");
        let store: Arc<Store> = Arc::new(init_store_with_pool(pool).await.expect("run migrations"));
        let cache = Arc::new(TimelineCache::new());

        let mut processor = EventProcessor::new();
        processor.register(Arc::new(FlatHandler::new(
            FeedConfig {
                name: "feed".to_string(),
                verbs: vec!["podcast".to_string()],
                include_actor: true,
                max_cache: 500,
            },
            store.clone(),
            cache.clone(),
        )));
        processor.register(Arc::new(ActivityHandler::new(
            FeedConfig {
                name: "notification".to_string(),
                verbs: vec![
                    "like".to_string(),
                    "follow".to_string(),
                    "comment".to_string(),
                    "mention".to_string(),
                ],
                include_actor: false,
                max_cache: 200,
            },
            store.clone(),
            cache.clone(),
        )));
        let processor = Arc::new(processor);

        let queue = Arc::new(TaskQueue::new(1, 256));
        processor
            .register_task_queue(queue.clone())
            .await
            .expect("register task queue");
        queue.start();

        Self { processor, queue }
    }

    /// Boots a harness with a tiny `max_cache` so the cap-enforcement
    /// scenario doesn't need 500+ items.
    pub async fn boot_with_small_flat_cap(max_cache: i64) -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect in-memory sqlite");
        let store: Arc<Store> = Arc::new(init_store_with_pool(pool).await.expect("run migrations"));
        let cache = Arc::new(TimelineCache::new());

        let mut processor = EventProcessor::new();
        processor.register(Arc::new(FlatHandler::new(
            FeedConfig {
                name: "feed".to_string(),
                verbs: vec!["podcast".to_string()],
                include_actor: true,
                max_cache,
            },
            store.clone(),
            cache.clone(),
        )));
        let processor = Arc::new(processor);

        let queue = Arc::new(TaskQueue::new(1, 256));
        processor
            .register_task_queue(queue.clone())
            .await
            .expect("register task queue");
        queue.start();

        Self { processor, queue }
    }
}
