use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::state::state_machine::{InvalidTransition, TransitionError};

/// Errors raised by room operations and reported back to the originating connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// The action references a room code that is not registered.
    #[error("room `{0}` not found")]
    RoomNotFound(String),
    /// A connection other than the host attempted a host-only action.
    #[error("only the host of room `{0}` can do this")]
    NotHost(String),
    /// The action is not allowed in the room's current lifecycle state.
    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),
    /// A question or option index is out of range.
    #[error("{kind} index {index} is out of range (0..{len})")]
    InvalidIndex {
        /// What the index points into (`question` or `option`).
        kind: IndexKind,
        /// The offending index.
        index: usize,
        /// Number of valid entries.
        len: usize,
    },
    /// Another host already owns this room code.
    #[error("room `{0}` already exists")]
    DuplicateRoom(String),
    /// The connection answering never joined the room.
    #[error("connection has not joined room `{0}`")]
    NotParticipant(String),
    /// The answer targets a question that is not the active one.
    #[error("question {submitted} is not active (current question is {current})")]
    StaleAnswer {
        /// Question index carried by the submission.
        submitted: usize,
        /// Question index the room is on.
        current: usize,
    },
    /// The participant already answered the active question.
    #[error("answer for question {0} already submitted")]
    AlreadyAnswered(usize),
    /// The inbound message could not be parsed or failed validation.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Target of an index-range check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Index into the room's question list.
    Question,
    /// Index into a question's options.
    Option,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::Question => f.write_str("question"),
            IndexKind::Option => f.write_str("option"),
        }
    }
}

impl RoomError {
    /// Stable machine-readable code carried by the `error` event.
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::RoomNotFound(_) => "room_not_found",
            RoomError::NotHost(_) => "not_host",
            RoomError::InvalidState(_) => "invalid_state",
            RoomError::InvalidIndex { .. } => "invalid_index",
            RoomError::DuplicateRoom(_) => "duplicate_room",
            RoomError::NotParticipant(_) => "not_participant",
            RoomError::StaleAnswer { .. } => "stale_answer",
            RoomError::AlreadyAnswered(_) => "already_answered",
            RoomError::InvalidPayload(_) => "invalid_payload",
        }
    }
}

impl From<TransitionError> for RoomError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Invalid(invalid) => RoomError::InvalidState(invalid),
            TransitionError::OutOfRange { index, len } => RoomError::InvalidIndex {
                kind: IndexKind::Question,
                index,
                len,
            },
        }
    }
}

impl From<ValidationErrors> for RoomError {
    fn from(err: ValidationErrors) -> Self {
        RoomError::InvalidPayload(format!("validation failed: {}", err))
    }
}

impl From<serde_json::Error> for RoomError {
    fn from(err: serde_json::Error) -> Self {
        RoomError::InvalidPayload(err.to_string())
    }
}

/// Errors that can occur in service layer operations behind the REST routes.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<RoomError> for ServiceError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::RoomNotFound(code) => ServiceError::NotFound(format!("room `{code}`")),
            other => ServiceError::InvalidInput(other.to_string()),
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::state_machine::{RoomEvent, RoomStatus};

    #[test]
    fn transition_errors_map_to_protocol_codes() {
        let invalid: RoomError = TransitionError::Invalid(InvalidTransition {
            from: RoomStatus::Ended,
            event: RoomEvent::Start,
        })
        .into();
        assert_eq!(invalid.code(), "invalid_state");

        let out_of_range: RoomError = TransitionError::OutOfRange { index: 7, len: 3 }.into();
        assert_eq!(out_of_range.code(), "invalid_index");
        assert_eq!(
            out_of_range.to_string(),
            "question index 7 is out of range (0..3)"
        );
    }

    #[test]
    fn missing_room_becomes_not_found() {
        let err: AppError = ServiceError::from(RoomError::RoomNotFound("ABCD".into())).into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
