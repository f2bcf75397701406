use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use tandem_shared::api::AckResponse;
use tandem_store::StoreError;

/// Failure of a single service operation.
///
/// Every variant is recoverable; nothing here takes down the presence
/// registry or the dispatcher.
#[derive(Debug, Error)]
pub enum ServiceError {
    // -- validation --
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("You cannot send a friend request to yourself")]
    SelfRequest,

    #[error("Message must contain text or an image")]
    EmptyMessage,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    // -- authorization --
    #[error("You can only send messages to friends")]
    NotFriends,

    #[error("Not authorized")]
    Unauthorized,

    #[error("Invalid credentials")]
    InvalidCredentials,

    // -- not found --
    #[error("User not found")]
    UnknownUser,

    #[error("Friend request not found")]
    RequestNotFound,

    #[error("Message not found")]
    MessageNotFound,

    // -- conflict --
    #[error("Friend request already sent")]
    DuplicatePending,

    #[error("You are already friends")]
    AlreadyFriends,

    #[error("Account already exists")]
    AccountExists,

    // -- infrastructure --
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::MissingField(_)
            | ServiceError::SelfRequest
            | ServiceError::EmptyMessage
            | ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized | ServiceError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            ServiceError::NotFriends => StatusCode::FORBIDDEN,
            ServiceError::UnknownUser
            | ServiceError::RequestNotFound
            | ServiceError::MessageNotFound => StatusCode::NOT_FOUND,
            ServiceError::DuplicatePending
            | ServiceError::AlreadyFriends
            | ServiceError::AccountExists => StatusCode::CONFLICT,
            ServiceError::Store(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text shown to the caller. Infrastructure details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Store(_) | ServiceError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        (status, axum::Json(AckResponse::failure(self.public_message()))).into_response()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
