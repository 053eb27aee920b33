// Error taxonomy shared by the processor, handlers, and the HTTP boundary.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unknown feed: {0}")]
    UnknownFeed(String),

    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    #[error("cursor does not point to an item in the cache: {0}")]
    UnknownCursor(String),

    #[error("after and before cannot both be set")]
    CursorConflict,

    #[error("store error: {0}")]
    StoreError(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("task queue is closed")]
    QueueClosed,

    #[error("a task queue is already registered")]
    QueueAlreadyRegistered,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl CoreError {
    fn status(&self) -> StatusCode {
        match self {
            CoreError::InvalidPayload(_)
            | CoreError::UnknownFeed(_)
            | CoreError::UnknownVerb(_)
            | CoreError::UnknownCursor(_)
            | CoreError::CursorConflict => StatusCode::BAD_REQUEST,
            CoreError::StoreError(_)
            | CoreError::CacheError(_)
            | CoreError::QueueClosed
            | CoreError::QueueAlreadyRegistered => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Lets every fallible boundary handler simply return `Result<Json<T>, CoreError>`.
impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}
