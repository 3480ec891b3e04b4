use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use habitquest_core::error::{CoreError, ErrorKind};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Every variant renders as `{ "error": message, "code": kind }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The request body was not valid JSON for the endpoint.
    #[error("Malformed request body: {0}")]
    InvalidBody(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidBody(rejection.body_text())
    }
}

impl From<habitquest_core::store::StoreError> for AppError {
    fn from(err: habitquest_core::store::StoreError) -> Self {
        AppError::Core(err.into())
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InternalFault => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (kind, message) = match &self {
            AppError::Core(core) => {
                let message = match core {
                    CoreError::NotFound { entity, id } => format!("{entity} with id {id} not found"),
                    CoreError::InvalidInput(msg)
                    | CoreError::Unauthenticated(msg)
                    | CoreError::Forbidden(msg)
                    | CoreError::Conflict(msg) => msg.clone(),
                    CoreError::Internal(msg) => {
                        tracing::error!(error = %msg, "Internal core error");
                        "An internal error occurred".to_string()
                    }
                };
                (core.kind(), message)
            }
            AppError::InvalidBody(msg) => (ErrorKind::InvalidInput, msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": kind.as_code(),
        });

        (status_for(kind), axum::Json(body)).into_response()
    }
}
