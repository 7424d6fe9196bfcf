//! `recall` (spec §4.11/§6.1): thin handler that validates the tool-layer
//! bounds on the request (spec §8 boundary behaviour) and delegates to
//! `RetrievalService::recall`. Grounded in this crate's previous
//! `routes/ingress.rs` handler shape.

use axum::{extract::State, Json};
use retrieval_pipeline::{RecallRequest, RecallResponse};

use crate::{api_state::ApiState, error::ApiError};

pub async fn recall(
    State(state): State<ApiState>,
    Json(request): Json<RecallRequest>,
) -> Result<Json<RecallResponse>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::invalid_input("query must not be empty"));
    }
    if !(1..=50).contains(&request.limit) {
        return Err(ApiError::invalid_input("limit must be between 1 and 50"));
    }
    if let Some(depth) = request.graph_depth {
        if depth != 1 {
            return Err(ApiError::invalid_input("graph_depth only accepts 1"));
        }
    }
    // `graph_budget=0` is a valid way to request an empty `related_context`
    // (spec §8 boundary behaviour); only values above 50 are rejected.
    if request.graph_budget > 50 {
        return Err(ApiError::invalid_input("graph_budget must be at most 50"));
    }
    if request.graph_expand && !(1..=20).contains(&request.graph_seed_limit) {
        return Err(ApiError::invalid_input(
            "graph_seed_limit must be between 1 and 20",
        ));
    }

    let response = state.retrieval.recall(&request).await?;
    Ok(Json(response))
}
