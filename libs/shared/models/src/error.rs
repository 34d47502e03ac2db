use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    /// A business rule rejected the request. `code` is stable for clients,
    /// `details` carries rule-specific payload such as a conflict list.
    #[error("{message}")]
    Rejected {
        status: StatusCode,
        code: &'static str,
        message: String,
        details: Option<Value>,
    },

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl AppError {
    pub fn rejected(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        AppError::Rejected { status, code, message: message.into(), details }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Rejected { status, .. } => *status,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            AppError::Internal(cause) | AppError::Database(cause) => {
                // Callers get an opaque id; the cause only goes to the log.
                let incident_id = Uuid::new_v4();
                tracing::error!(%incident_id, "Error: {}: {}", status, cause);
                json!({
                    "error": "Internal server error",
                    "code": "internal_error",
                    "incident_id": incident_id,
                })
            }
            AppError::Rejected { code, message, details, .. } => {
                tracing::warn!(code, "Rejected: {}: {}", status, message);
                let mut body = json!({
                    "error": message,
                    "code": code,
                });
                if let Some(details) = details {
                    body["details"] = details;
                }
                body
            }
            AppError::Auth(msg) | AppError::NotFound(msg) | AppError::BadRequest(msg) => {
                tracing::warn!("Error: {}: {}", status, msg);
                json!({ "error": msg })
            }
        };

        (status, Json(body)).into_response()
    }
}
