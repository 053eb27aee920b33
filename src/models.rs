// Row shapes (persisted layout, spec.md §6) and the wire payloads that move
// through the processor and the HTTP boundary.
use serde::{Deserialize, Serialize};

/// A broadcast-feed row. Key: `(producer_id, item_id, verb)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FlatItem {
    pub item_id: String,
    pub producer_id: String,
    pub verb: String,
    pub timestamp: i64,
}

/// A directed-activity-feed row. Key: `(producer_id, item_id, verb,
/// consumer_id)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityItem {
    pub item_id: String,
    pub producer_id: String,
    pub consumer_id: String,
    pub verb: String,
    pub timestamp: i64,
}

/// `add` payload: published by a producer into one feed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublishPayload {
    pub verb: String,
    pub producer_id: String,
    pub item_id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub consumer_id: Option<String>,
}

/// `retract` payload: withdraws a previously published item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetractPayload {
    pub verb: String,
    pub producer_id: String,
    pub item_id: String,
    #[serde(default)]
    pub consumer_id: Option<String>,
}

/// A single projected timeline entry returned by `consume`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConsumeItem {
    pub item_id: String,
    pub verb: String,
}

/// `subscribe`/`unsubscribe` payload: wires a consumer to a producer inside
/// one named feed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscribePayload {
    pub event_name: String,
    pub producer_id: String,
    pub consumer_id: String,
}

/// Query parameters for `GET /v1/consume`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumeQuery {
    pub event_name: String,
    pub consumer_id: String,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishResponse {
    pub ok: bool,
    pub published: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetractResponse {
    pub ok: bool,
    pub retracted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeResponse {
    pub ok: bool,
    pub subscribed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeResponse {
    pub ok: bool,
    pub unsubscribed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumeResponse {
    pub ok: bool,
    pub data: Vec<ConsumeItem>,
}
