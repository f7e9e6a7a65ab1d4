//! HTTP error mapping.
//!
//! Engine errors map onto status codes here and nowhere else. The 401 body
//! is a fixed constant regardless of why verification failed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use vellum_engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {message}")]
    Internal { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub missing_scopes: Vec<String>,
}

impl ErrorBody {
    fn plain(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            retryable: None,
            missing_scopes: Vec::new(),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            WebError::Engine(err) => match err {
                // Constant body: callers learn nothing about what exists.
                EngineError::Unauthorized => (
                    StatusCode::UNAUTHORIZED,
                    ErrorBody::plain("unauthorized"),
                ),
                EngineError::Forbidden { missing_scopes, .. } => (
                    StatusCode::FORBIDDEN,
                    ErrorBody {
                        error: err.to_string(),
                        retryable: None,
                        missing_scopes: missing_scopes.clone(),
                    },
                ),
                EngineError::NoSuchTransition { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorBody::plain(err.to_string()),
                ),
                EngineError::TransitionAlreadyPending { .. }
                | EngineError::JobAlreadyTerminal => (
                    StatusCode::CONFLICT,
                    ErrorBody {
                        error: err.to_string(),
                        retryable: Some(false),
                        missing_scopes: Vec::new(),
                    },
                ),
                EngineError::ConcurrentModification { .. } => (
                    StatusCode::CONFLICT,
                    ErrorBody {
                        error: err.to_string(),
                        retryable: Some(true),
                        missing_scopes: Vec::new(),
                    },
                ),
                EngineError::UnknownJobType(_) | EngineError::JobDispatchFailed { .. } => (
                    StatusCode::BAD_REQUEST,
                    ErrorBody::plain(err.to_string()),
                ),
                EngineError::NotFound { .. } => (
                    StatusCode::NOT_FOUND,
                    ErrorBody::plain(err.to_string()),
                ),
                EngineError::Store(_) => {
                    tracing::error!(error = %err, "store failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorBody::plain("internal error"),
                    )
                }
            },
            WebError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::plain(message.clone()),
            ),
            WebError::Io(_) | WebError::Internal { .. } => {
                tracing::error!(error = %self, "internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::plain("internal error"),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: WebError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn engine_errors_map_to_documented_statuses() {
        assert_eq!(
            status_of(EngineError::Unauthorized.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(
                EngineError::Forbidden {
                    transition: "publish".to_string(),
                    missing_scopes: vec!["submission:publish".to_string()],
                }
                .into()
            ),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(
                EngineError::NoSuchTransition {
                    from: "DRAFT".to_string(),
                    to: "PUBLISHED".to_string(),
                }
                .into()
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(
                EngineError::TransitionAlreadyPending {
                    pending: "publish".to_string(),
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::JobAlreadyTerminal.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::ConcurrentModification { attempts: 5 }.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                EngineError::NotFound {
                    resource: "job 'J1'".to_string(),
                }
                .into()
            ),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn unauthorized_body_is_constant() {
        let response = WebError::from(EngineError::Unauthorized).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        // The body is the fixed minimal shape; details never leak.
        let body = ErrorBody::plain("unauthorized");
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            "{\"error\":\"unauthorized\"}"
        );
    }

    #[test]
    fn concurrent_modification_is_marked_retryable() {
        let err = EngineError::ConcurrentModification { attempts: 3 };
        let WebError::Engine(engine_err) = WebError::from(err) else {
            panic!("wrap");
        };
        assert!(engine_err.is_retryable());
    }
}
