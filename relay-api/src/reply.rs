use axum::{
    http::{
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, LOCATION},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub const NO_STORE: &str = "no-store, max-age=0";

/// JSON body with the open CORS and no-store headers every relay reply carries.
pub fn json_reply<T: Serialize>(status: StatusCode, body: T) -> Response {
    (
        status,
        [(ACCESS_CONTROL_ALLOW_ORIGIN, "*"), (CACHE_CONTROL, NO_STORE)],
        Json(body),
    )
        .into_response()
}

/// `302 Found` to `location`.
pub fn found(location: HeaderValue) -> Response {
    (
        StatusCode::FOUND,
        [
            (LOCATION, location),
            (CACHE_CONTROL, HeaderValue::from_static(NO_STORE)),
        ],
    )
        .into_response()
}
