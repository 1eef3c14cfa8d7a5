use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    response::Response,
};
use relay_core::Selection;
use serde::Serialize;

use crate::error::AppError;
use crate::reply::{found, json_reply};
use crate::request::inbound;
use crate::state::AppState;

#[derive(Serialize)]
struct SelectedOffer<'a> {
    offerid: Option<&'a str>,
    name: Option<&'a str>,
}

/// Body of a `?debug=true` request: what a redirect would have done.
#[derive(Serialize)]
struct DebugReport<'a> {
    ok: bool,
    ip: &'a str,
    country: Option<&'a str>,
    offer_count: usize,
    selected_offer: SelectedOffer<'a>,
    link: &'a str,
    user_agent: &'a str,
}

impl<'a> From<&'a Selection> for DebugReport<'a> {
    fn from(s: &'a Selection) -> Self {
        Self {
            ok: true,
            ip: &s.visitor.ip,
            country: Some(s.visitor.country.as_str()).filter(|c| !c.is_empty()),
            offer_count: s.offer_count,
            selected_offer: SelectedOffer {
                offerid: s.offer.id.as_deref(),
                name: s.offer.name.as_deref(),
            },
            link: &s.link,
            user_agent: &s.visitor.user_agent,
        }
    }
}

/// GET /api/redirect: send the visitor to a randomly picked eligible offer.
pub async fn redirect_visitor(
    State(state): State<AppState>,
    req: Request,
) -> Result<Response, AppError> {
    let inbound = inbound(&req);
    let selection = state.relay.handle(&inbound).await?;

    if selection.debug {
        return Ok(json_reply(StatusCode::OK, DebugReport::from(&selection)));
    }

    let location = HeaderValue::from_str(&selection.link).map_err(|e| {
        AppError::InternalServerError(format!("tracking link is not a valid header: {e}"))
    })?;
    Ok(found(location))
}
