use axum::{routing::get, Router};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

pub mod error;
pub mod health;
pub mod offers;
pub mod redirect;
pub mod reply;
pub mod request;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/redirect", get(redirect::redirect_visitor))
        .route("/api/offers", get(offers::list_offers))
        .route("/healthz", get(health::liveness))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(error::handle_panic))
        .with_state(state)
}
