//! The tool-layer HTTP surface (spec §4.12/§6.1): `remember`, `recall`,
//! `forget`, `status`, plus the liveness/readiness probes. Grounded in this
//! crate's previous `api_routes_v1` router shape, with the auth middleware
//! layer dropped — the tool protocol has no client-auth concept in this
//! specification.

use api_state::ApiState;
use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use routes::{
    forget::forget, liveness::live, readiness::ready, recall::recall, remember::remember,
    status::status,
};

pub mod api_state;
pub mod error;
mod routes;

/// Router for the tool-layer API, version 1.
pub fn api_routes_v1<S>(_app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    let public = Router::new().route("/ready", get(ready)).route("/live", get(live));

    let tools = Router::new()
        .route("/remember", post(remember))
        .route("/recall", post(recall))
        .route("/forget", post(forget))
        .route("/status", post(status));

    public.merge(tools)
}
