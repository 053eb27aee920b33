// Shared process state injected into every HTTP handler (axum's `State`
// extractor). Grounded on the teacher's `AppState`: a small `Clone` struct
// of `Arc`-wrapped shared components, generalized here from
// `{broker, topic_channels, cache, dashboard_enabled}` to the core fan-out
// engine's own shared components.
use std::sync::Arc;

use crate::processor::EventProcessor;
use crate::queue::TaskQueue;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<EventProcessor>,
    pub queue: Arc<TaskQueue>,
    pub store: Arc<Store>,
}

impl AppState {
    pub fn new(processor: Arc<EventProcessor>, queue: Arc<TaskQueue>, store: Arc<Store>) -> Self {
        Self { processor, queue, store }
    }
}
