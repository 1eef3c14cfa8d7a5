use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::Response,
};

use crate::error::AppError;
use crate::reply::json_reply;
use crate::request::inbound;
use crate::state::AppState;

/// GET /api/offers: relay a raw offers query and return the upstream JSON as-is.
pub async fn list_offers(
    State(state): State<AppState>,
    req: Request,
) -> Result<Response, AppError> {
    let inbound = inbound(&req);
    let reply = state.relay.passthrough(&inbound).await.map_err(AppError::Passthrough)?;

    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok(json_reply(status, reply.body))
}
