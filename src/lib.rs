//! Activity-feed aggregation service: producers publish items, consumers
//! subscribe to producers, and each consumer sees a chronologically
//! ordered, bounded, personalized feed assembled by server-side fan-out.
//!
//! The crate is split the way the teacher splits its pub/sub server: a
//! library of components (`store`, `cache`, `handlers`, `processor`,
//! `queue`, `config`, `error`, `models`, `app_state`, `boundary`) plus a
//! thin `main.rs` that wires them together and starts the axum server. The
//! library split additionally lets the integration tests under `tests/`
//! exercise the fan-out engine directly, without going through HTTP.

pub mod app_state;
pub mod boundary;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod processor;
pub mod queue;
pub mod store;

use std::sync::Arc;

use handlers::{ActivityHandler, FeedConfig, FlatHandler};
use processor::EventProcessor;

/// Registers the two feeds the original service ships with
/// (`app.py::setup_system`): a broadcast `feed` (verb `podcast`) and a
/// directed `notification` feed (verbs `like`/`follow`/`comment`/`mention`).
pub fn register_default_feeds(
    processor: &mut EventProcessor,
    store: &Arc<store::Store>,
    cache: &Arc<cache::TimelineCache>,
) {
    let feed = FlatHandler::new(
        FeedConfig {
            name: "feed".to_string(),
            verbs: vec!["podcast".to_string()],
            include_actor: true,
            max_cache: 500,
        },
        store.clone(),
        cache.clone(),
    );
    processor.register(Arc::new(feed));

    let notification = ActivityHandler::new(
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
    );
    processor.register(Arc::new(notification));
}
