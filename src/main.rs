// Process bootstrap (`[BOOTSTRAP]`): tracing-subscriber init, config load,
// store init + migrations, cache init, feed registration, queue start,
// preload, axum server start. A direct generalization of the teacher's
// `main.rs` (tracing init, `init_database`, `Arc`-wrapped shared state,
// router construction, `axum::serve`) from one pub/sub dashboard service to
// the feed aggregator's own bootstrap sequence.
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::info;

use feed_aggregator::app_state::AppState;
use feed_aggregator::cache::TimelineCache;
use feed_aggregator::config::{Cli, Config};
use feed_aggregator::processor::EventProcessor;
use feed_aggregator::queue::TaskQueue;
use feed_aggregator::{boundary, register_default_feeds, store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    info!("initializing store at {}", config.database.name);
    let store = Arc::new(store::init_store(&config.database.name).await?);

    let cache = Arc::new(TimelineCache::new());

    let mut processor = EventProcessor::new();
    register_default_feeds(&mut processor, &store, &cache);
    let processor = Arc::new(processor);

    let queue = Arc::new(TaskQueue::new(cli.workers, 1024));
    processor.register_task_queue(queue.clone()).await?;
    queue.start();

    info!("preloading caches from the event store");
    processor.preload().await;

    let state = AppState::new(processor, queue, store);

    let app = Router::new()
        .route("/v1/publish", post(boundary::publish))
        .route("/v1/retract", post(boundary::retract))
        .route("/v1/subscribe", post(boundary::subscribe))
        .route("/v1/unsubscribe", post(boundary::unsubscribe))
        .route("/v1/consume", get(boundary::consume))
        .route("/health", get(boundary::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("server starting on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
