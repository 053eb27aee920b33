// HTTP boundary (`[BOUNDARY]`, spec.md §6): thin validation/adapting over
// the processor's public operations. Grounded on the original's
// `routes.py` (one handler per route, schema validation before the call
// reaches `EventProcessor`, `{ok, ...}` response envelopes) and the
// teacher's axum handler style (`State` extraction, `Json` in/out).
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::app_state::AppState;
use crate::models::{
    ConsumeQuery, ConsumeResponse, PublishPayload, PublishResponse, RetractPayload, RetractResponse,
    SubscribePayload, SubscribeResponse, UnsubscribeResponse,
};
use crate::error::CoreError;

const DEFAULT_CONSUME_LIMIT: i64 = 20;

/// `Json<T>` rejects a missing/mistyped field with a 422, but spec.md §7
/// classes that under `InvalidPayload` → 400 same as an empty-string field.
/// Wraps the stock extractor and remaps its rejection so both failure modes
/// surface identically, matching `routes.py`'s manual-validation-returns-400
/// behavior.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| CoreError::InvalidPayload(rejection.body_text()))?;
        Ok(ValidatedJson(value))
    }
}

/// Same remapping for query-string deserialization failures, so a
/// mistyped `limit` on `/v1/consume` also surfaces as `InvalidPayload`
/// rather than axum's generic query-rejection body.
pub struct ValidatedQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| CoreError::InvalidPayload(rejection.body_text()))?;
        Ok(ValidatedQuery(value))
    }
}

fn require_nonempty(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidPayload(format!("{field} must not be empty")));
    }
    Ok(())
}

pub async fn publish(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<PublishPayload>,
) -> Result<Json<PublishResponse>, CoreError> {
    require_nonempty("verb", &payload.verb)?;
    require_nonempty("producer_id", &payload.producer_id)?;
    require_nonempty("item_id", &payload.item_id)?;

    state.processor.publish(payload).await?;
    Ok(Json(PublishResponse {
        ok: true,
        published: true,
    }))
}

pub async fn retract(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RetractPayload>,
) -> Result<Json<RetractResponse>, CoreError> {
    require_nonempty("verb", &payload.verb)?;
    require_nonempty("producer_id", &payload.producer_id)?;
    require_nonempty("item_id", &payload.item_id)?;

    state.processor.retract(payload).await?;
    Ok(Json(RetractResponse {
        ok: true,
        retracted: true,
    }))
}

pub async fn subscribe(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<SubscribePayload>,
) -> Result<Json<SubscribeResponse>, CoreError> {
    require_nonempty("event_name", &payload.event_name)?;
    require_nonempty("producer_id", &payload.producer_id)?;
    require_nonempty("consumer_id", &payload.consumer_id)?;

    state
        .processor
        .subscribe(&payload.event_name, payload.consumer_id, payload.producer_id)
        .await?;
    Ok(Json(SubscribeResponse {
        ok: true,
        subscribed: true,
    }))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<SubscribePayload>,
) -> Result<Json<UnsubscribeResponse>, CoreError> {
    require_nonempty("event_name", &payload.event_name)?;
    require_nonempty("producer_id", &payload.producer_id)?;
    require_nonempty("consumer_id", &payload.consumer_id)?;

    state
        .processor
        .unsubscribe(&payload.event_name, payload.consumer_id, payload.producer_id)
        .await?;
    Ok(Json(UnsubscribeResponse {
        ok: true,
        unsubscribed: true,
    }))
}

pub async fn consume(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<ConsumeQuery>,
) -> Result<Json<ConsumeResponse>, CoreError> {
    require_nonempty("event_name", &query.event_name)?;
    require_nonempty("consumer_id", &query.consumer_id)?;
    if query.after.is_some() && query.before.is_some() {
        return Err(CoreError::CursorConflict);
    }

    let limit = query.limit.unwrap_or(DEFAULT_CONSUME_LIMIT);
    let data = state
        .processor
        .consume(
            &query.event_name,
            &query.consumer_id,
            limit,
            query.after.as_deref(),
            query.before.as_deref(),
        )
        .await?;

    Ok(Json(ConsumeResponse { ok: true, data }))
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

/// Liveness/readiness: can we acquire a DB connection and is the queue
/// still accepting work.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthStatus>, StatusCode> {
    if state.store.health_check().await.is_err() || !state.queue.is_open() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(HealthStatus { status: "healthy" }))
}
