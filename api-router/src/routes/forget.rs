//! `forget` (spec §4.12/§6.1): deletes an artifact and everything derived
//! from it, or refuses outright for a derived id (`evt_*`). Dispatches on
//! the id's prefix (spec §9 open question: "the source refuses `evt_*`
//! unconditionally; this spec preserves that refusal"). Grounded in this
//! crate's previous `routes/ingress.rs` handler shape.

use axum::{extract::State, Json};
use common::storage::{
    types::{
        artifact_revision::{ArtifactRevision, CascadeCounts},
        semantic_event::SemanticEvent,
    },
    vector::{VectorNamespace, VectorStoreGateway},
};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ForgetRequest {
    pub id: String,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
pub struct ForgetCascade {
    pub chunks: u64,
    pub events: u64,
    pub entities: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct ForgetResponse {
    pub deleted: bool,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cascade: Option<ForgetCascade>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_artifact_id: Option<String>,
}

pub async fn forget(
    State(state): State<ApiState>,
    Json(request): Json<ForgetRequest>,
) -> Result<Json<ForgetResponse>, ApiError> {
    if let Some(event_id) = request.id.strip_prefix("evt_") {
        let source = SemanticEvent::source_artifact_uid(&state.db, event_id).await?;
        let Some(artifact_uid) = source else {
            return Err(ApiError::not_found(format!(
                "no event found for id {}",
                request.id
            )));
        };
        let source_artifact_id = ArtifactRevision::find_latest(&state.db, &artifact_uid)
            .await?
            .map(|r| r.artifact_id)
            .unwrap_or(artifact_uid);
        return Ok(Json(ForgetResponse {
            deleted: false,
            id: request.id.clone(),
            error: Some(
                "Events are derived data and cannot be forgotten directly; forget the source artifact instead."
                    .to_owned(),
            ),
            source_artifact_id: Some(source_artifact_id),
            ..Default::default()
        }));
    }

    if !request.confirm {
        return Ok(Json(ForgetResponse {
            deleted: false,
            id: request.id.clone(),
            error: Some("confirm must be true to delete".to_owned()),
            ..Default::default()
        }));
    }

    let artifact_uid = if let Some(uid) = request.id.strip_prefix("mem_") {
        uid.to_owned()
    } else if let Some(uid) = request.id.strip_prefix("uid_") {
        uid.to_owned()
    } else if request.id.starts_with("art_") {
        let Some(revision) = ArtifactRevision::find_latest_by_artifact_id(&state.db, &request.id).await?
        else {
            return Err(ApiError::not_found(format!(
                "no artifact found for id {}",
                request.id
            )));
        };
        revision.artifact_uid
    } else {
        return Err(ApiError::invalid_input(format!(
            "unrecognized id prefix for {}; expected mem_*, art_*, uid_*, or evt_*",
            request.id
        )));
    };

    let CascadeCounts {
        events, entities, ..
    } = ArtifactRevision::delete_cascade(&state.db, &artifact_uid).await?;

    let gateway = VectorStoreGateway::new(&state.db);
    let chunks_removed = gateway
        .delete_by_artifact(VectorNamespace::Chunks, &artifact_uid)
        .await?;
    let content_removed = gateway
        .delete_by_artifact(VectorNamespace::Content, &artifact_uid)
        .await?;

    Ok(Json(ForgetResponse {
        deleted: true,
        id: request.id,
        cascade: Some(ForgetCascade {
            chunks: chunks_removed + content_removed,
            events,
            entities,
        }),
        ..Default::default()
    }))
}
