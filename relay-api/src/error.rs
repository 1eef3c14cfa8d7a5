use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use relay_core::{RelayError, UpstreamError};
use serde_json::json;
use std::any::Any;

use crate::reply::json_reply;

#[derive(Debug)]
pub enum AppError {
    /// Outcome of the redirect pipeline that is not a selected offer.
    Relay(RelayError),
    /// Failure on the passthrough route, reported in its own envelope.
    Passthrough(RelayError),
    InternalServerError(String),
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        Self::Relay(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Relay(err) | AppError::Passthrough(err @ RelayError::MissingCredential) => {
                relay_error_response(err)
            }
            AppError::Passthrough(RelayError::Upstream(err)) => {
                tracing::error!("Passthrough upstream failure: {}", err);
                let detail = match err {
                    UpstreamError::Unavailable(detail) => detail,
                    other => other.to_string(),
                };
                json_reply(
                    StatusCode::BAD_GATEWAY,
                    json!({
                        "success": false,
                        "error": "Upstream request failed",
                        "detail": detail,
                    }),
                )
            }
            AppError::Passthrough(err) => internal(err.to_string()),
            AppError::InternalServerError(msg) => internal(msg),
        }
    }
}

fn relay_error_response(err: RelayError) -> Response {
    match err {
        RelayError::MissingCredential => {
            tracing::error!("Upstream API key is not configured");
            json_reply(StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": err.to_string() }))
        }
        RelayError::Blocked(reason) => json_reply(
            StatusCode::FORBIDDEN,
            json!({ "blocked": true, "reason": reason.to_string() }),
        ),
        RelayError::NoOffers { .. } => {
            json_reply(StatusCode::NOT_FOUND, json!({ "error": err.to_string() }))
        }
        RelayError::Upstream(upstream) => {
            tracing::error!("Offers upstream failure: {}", upstream);
            let body = match upstream {
                UpstreamError::Unavailable(detail) => json!({
                    "error": "Failed to retrieve data from upstream",
                    "details": detail,
                }),
                UpstreamError::Status { status, body } => json!({
                    "error": "Failed to retrieve data from upstream",
                    "status": status,
                    "body": body,
                }),
                UpstreamError::Malformed(details) => json!({
                    "error": "Failed to retrieve data",
                    "details": details,
                }),
            };
            json_reply(StatusCode::BAD_GATEWAY, body)
        }
        RelayError::Internal(msg) => internal(msg),
    }
}

fn internal(details: String) -> Response {
    tracing::error!("Internal Server Error: {}", details);
    json_reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": "A server error occurred", "details": details }),
    )
}

/// Last-resort conversion of a handler panic into the generic 500 body.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    AppError::InternalServerError(details).into_response()
}
