//! Payloads describing rooms, questions and participants on the wire.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        phase::VisibleRoomStatus,
        validation::{validate_question, validate_room_code},
    },
    state::room::{Participant, Question, Room},
};

/// Longest display name accepted on join.
const MAX_NAME_LENGTH: u64 = 40;

/// Question definition supplied by the host when creating a room.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInput {
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    /// Countdown in seconds; the server default applies when omitted.
    #[serde(default)]
    pub time_limit_seconds: Option<u64>,
}

impl From<QuestionInput> for Question {
    fn from(value: QuestionInput) -> Self {
        Self {
            text: value.text,
            options: value.options,
            correct_index: value.correct_index,
            time_limit: value.time_limit_seconds.map(Duration::from_secs),
        }
    }
}

/// Question as sent in `quiz-started`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPayload {
    pub text: String,
    pub options: Vec<String>,
    /// Only present in the host's copy; participants learn it from `answer-feedback`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<usize>,
    pub time_limit_seconds: u64,
}

impl QuestionPayload {
    /// Project a question, resolving its countdown against the server default.
    /// The correct option is included only when `reveal_answer` is set.
    pub fn from_question(
        question: &Question,
        default_time_limit: Duration,
        reveal_answer: bool,
    ) -> Self {
        Self {
            text: question.text.clone(),
            options: question.options.clone(),
            correct_index: reveal_answer.then_some(question.correct_index),
            time_limit_seconds: question.time_limit.unwrap_or(default_time_limit).as_secs(),
        }
    }
}

/// `create-room` payload.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Caller-chosen code; the server generates one when omitted.
    #[serde(default)]
    pub room_code: Option<String>,
    pub quiz_id: String,
    pub questions: Vec<QuestionInput>,
}

impl Validate for CreateRoomRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(ref code) = self.room_code {
            if let Err(e) = validate_room_code(code) {
                errors.add("room_code", e);
            }
        }

        if self.quiz_id.trim().is_empty() {
            let mut err = validator::ValidationError::new("quiz_id");
            err.message = Some("quiz id must not be empty".into());
            errors.add("quiz_id", err);
        }

        if self.questions.is_empty() {
            let mut err = validator::ValidationError::new("questions_empty");
            err.message = Some("a room needs at least one question".into());
            errors.add("questions", err);
        }

        for (position, question) in self.questions.iter().enumerate() {
            if let Err(e) = validate_question(position, question) {
                errors.add("questions", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// `join-room` payload.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[validate(custom(function = "validate_room_code"))]
    pub room_code: String,
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub name: String,
}

/// Payload naming just a room (`start`, `end`, `leave-room`, and several server events).
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    #[validate(custom(function = "validate_room_code"))]
    pub room_code: String,
}

/// `advance` payload. Without a target the host moves to the next question.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    #[validate(custom(function = "validate_room_code"))]
    pub room_code: String,
    #[serde(default)]
    pub target_index: Option<usize>,
}

/// `submit-answer` payload.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    #[validate(custom(function = "validate_room_code"))]
    pub room_code: String,
    pub question_index: usize,
    pub option_index: usize,
    /// Display name of the submitter; informational only.
    #[serde(default)]
    pub name: Option<String>,
}

/// Participant as listed in `participants-updated` and the leaderboard.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
pub struct ParticipantSummary {
    /// Connection identifier of the participant.
    pub id: Uuid,
    pub name: String,
    pub score: u32,
}

impl From<&Participant> for ParticipantSummary {
    fn from(value: &Participant) -> Self {
        Self {
            id: value.connection_id,
            name: value.name.clone(),
            score: value.score,
        }
    }
}

/// Read-only projection of a room returned by `GET /rooms/{code}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_code: String,
    pub quiz_id: String,
    pub status: VisibleRoomStatus,
    pub current_question_index: usize,
    pub question_count: usize,
    pub participants: Vec<ParticipantSummary>,
    /// Number of lifecycle transitions applied so far.
    pub version: usize,
    /// Whether a question countdown is pending.
    pub timer_armed: bool,
    /// Milliseconds left on the pending countdown.
    pub timer_remaining_ms: Option<u64>,
}

impl RoomSnapshot {
    /// Build the projection from a room and the time left on its countdown, if any.
    pub fn new(room: &Room, timer_remaining: Option<Duration>) -> Self {
        Self {
            room_code: room.code().to_string(),
            quiz_id: room.quiz_id().to_string(),
            status: room.status().into(),
            current_question_index: room.current_question_index(),
            question_count: room.questions().len(),
            participants: room.participants().map(ParticipantSummary::from).collect(),
            version: room.version(),
            timer_armed: timer_remaining.is_some(),
            timer_remaining_ms: timer_remaining.map(|left| left.as_millis() as u64),
        }
    }
}
