use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::accounts::{dto::MessageResponse, repo::DirectoryError};

pub const GENERIC_FAILURE: &str = "Something went wrong!";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("User already exists")]
    AlreadyExists,

    #[error("User not found")]
    NotFound,

    #[error("Invalid password")]
    InvalidCredentials,

    /// Unknown, expired and already-used tokens all end up here.
    #[error("Invalid or expired token")]
    InvalidOrExpired,

    #[error("{0}")]
    Validation(String),

    #[error("password encoding failed: {0}")]
    Encoding(String),

    /// Store or mail transport failure.
    #[error(transparent)]
    Dependency(#[from] anyhow::Error),
}

impl AccountError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AccountError::NotFound => StatusCode::NOT_FOUND,
            AccountError::AlreadyExists
            | AccountError::InvalidCredentials
            | AccountError::InvalidOrExpired
            | AccountError::Validation(_) => StatusCode::BAD_REQUEST,
            AccountError::Encoding(_) | AccountError::Dependency(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for AccountError {
    fn from(rejection: JsonRejection) -> Self {
        AccountError::Validation(rejection.body_text())
    }
}

impl From<DirectoryError> for AccountError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::DuplicateEmail => AccountError::AlreadyExists,
            DirectoryError::Backend(e) => AccountError::Dependency(e),
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!(error = ?self, "request failed");
            GENERIC_FAILURE.to_string()
        } else {
            self.to_string()
        };
        (status, Json(MessageResponse { message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_statuses() {
        assert_eq!(AccountError::AlreadyExists.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AccountError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AccountError::InvalidCredentials.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AccountError::InvalidOrExpired.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AccountError::Validation("name is required".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn dependency_failure_hides_detail() {
        let err = AccountError::Dependency(anyhow::anyhow!("smtp: connection refused"));
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], GENERIC_FAILURE);
    }

    #[test]
    fn duplicate_email_becomes_already_exists() {
        let err: AccountError = DirectoryError::DuplicateEmail.into();
        assert!(matches!(err, AccountError::AlreadyExists));
    }
}
