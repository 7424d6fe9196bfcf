//! Tool-facing error envelope (spec §6.1/§7): every unrecoverable error a
//! route returns is `{error:{kind, message}}`, where `kind` is one of the
//! stable names in the §7 error table. Grounded in this file's previous
//! `From<AppError>` sanitizing conversion, renamed onto the spec's kind
//! taxonomy instead of HTTP-flavoured variant names.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    status: u16,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST.as_u16(),
            kind: "InvalidInput",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND.as_u16(),
            kind: "NotFound",
            message: message.into(),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let (status, kind) = match &err {
            AppError::InvalidInput(_) | AppError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidInput")
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            AppError::TransientEmbedding(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "TransientEmbeddingError")
            }
            AppError::LLMInvalidResponse(_) => (StatusCode::BAD_GATEWAY, "LLMInvalidResponse"),
            AppError::LLMRateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "LLMRateLimited"),
            AppError::LLMTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "LLMInvalidResponse"),
            AppError::JobConflict(_) => (StatusCode::CONFLICT, "JobConflict"),
            AppError::GraphUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "GraphUnavailable"),
            AppError::Database(_)
            | AppError::OpenAI(_)
            | AppError::Join(_)
            | AppError::Io(_)
            | AppError::Anyhow(_) => (StatusCode::INTERNAL_SERVER_ERROR, "StorageError"),
            AppError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "internal error surfaced to tool client");
        }

        Self {
            status: status.as_u16(),
            kind,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(ErrorEnvelope {
                error: ErrorBody {
                    kind: self.kind,
                    message: self.message,
                },
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_maps_to_400() {
        let err = ApiError::from(AppError::InvalidInput("bad".into()));
        assert_eq!(err.status, 400);
        assert_eq!(err.kind, "InvalidInput");
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::from(AppError::NotFound("missing".into()));
        assert_eq!(err.status, 404);
        assert_eq!(err.kind, "NotFound");
    }

    #[test]
    fn graph_unavailable_maps_to_503() {
        let err = ApiError::from(AppError::GraphUnavailable("down".into()));
        assert_eq!(err.status, 503);
        assert_eq!(err.kind, "GraphUnavailable");
    }

    #[test]
    fn database_error_is_sanitized_to_internal_error_kind() {
        let err = ApiError::from(AppError::InternalError("db password incorrect".into()));
        assert_eq!(err.kind, "InternalError");
    }
}
