use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::room::{
        AdvanceRequest, CreateRoomRequest, JoinRoomRequest, ParticipantSummary, QuestionPayload,
        RoomRef, SubmitAnswerRequest,
    },
    error::RoomError,
};

/// Action name reported when an inbound frame cannot even be attributed to an event.
pub const UNKNOWN_ACTION: &str = "unknown";

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
/// Messages accepted from quiz WebSocket clients, as `{ "event": ..., "data": ... }`.
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Host opens a room.
    CreateRoom(CreateRoomRequest),
    /// Participant joins a room.
    JoinRoom(JoinRoomRequest),
    /// Participant leaves a room without disconnecting.
    LeaveRoom(RoomRef),
    /// Host starts the quiz.
    Start(RoomRef),
    /// Host moves to another question.
    Advance(AdvanceRequest),
    /// Participant answers the active question.
    SubmitAnswer(SubmitAnswerRequest),
    /// Host ends the quiz.
    End(RoomRef),
}

impl ClientMessage {
    /// Parse and validate a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, RoomError> {
        let message: Self = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }

    /// Wire name of the event, echoed back in error acknowledgements.
    pub fn action(&self) -> &'static str {
        match self {
            ClientMessage::CreateRoom(_) => "create-room",
            ClientMessage::JoinRoom(_) => "join-room",
            ClientMessage::LeaveRoom(_) => "leave-room",
            ClientMessage::Start(_) => "start",
            ClientMessage::Advance(_) => "advance",
            ClientMessage::SubmitAnswer(_) => "submit-answer",
            ClientMessage::End(_) => "end",
        }
    }

    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            ClientMessage::CreateRoom(payload) => payload.validate(),
            ClientMessage::JoinRoom(payload) => payload.validate(),
            ClientMessage::LeaveRoom(payload)
            | ClientMessage::Start(payload)
            | ClientMessage::End(payload) => payload.validate(),
            ClientMessage::Advance(payload) => payload.validate(),
            ClientMessage::SubmitAnswer(payload) => payload.validate(),
        }
    }
}

/// Best-effort extraction of the `event` field of a frame that failed to parse.
pub fn raw_action(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| value.get("event")?.as_str().map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_ACTION.to_string())
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq)]
/// Messages pushed to quiz WebSocket clients.
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Unicast right after the socket opens.
    Connected(ConnectedEvent),
    /// Unicast to the host once the room exists.
    QuizCreated(RoomRef),
    /// Full participant list after a join or leave.
    ParticipantsUpdated(ParticipantsUpdatedEvent),
    /// Full question set, on start or as late-joiner catch-up.
    QuizStarted(QuizStartedEvent),
    /// A question became active.
    QuestionChanged(QuestionChangedEvent),
    /// Per-option counts for the active question.
    AnswerStats(AnswerStatsEvent),
    /// Unicast to the submitter after an accepted answer.
    AnswerFeedback(AnswerFeedbackEvent),
    /// Final ranking.
    Leaderboard(LeaderboardEvent),
    /// The quiz is over.
    QuizEnded(RoomRef),
    /// Unicast acknowledgement of `leave-room`.
    LeftRoom(RoomRef),
    /// Unicast rejection of an inbound event.
    Error(ErrorEvent),
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Identity assigned to the connection.
pub struct ConnectedEvent {
    pub connection_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Payload of `participants-updated`.
pub struct ParticipantsUpdatedEvent {
    pub room_code: String,
    pub participants: Vec<ParticipantSummary>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Payload of `quiz-started`.
pub struct QuizStartedEvent {
    pub room_code: String,
    pub questions: Vec<QuestionPayload>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Payload of `question-changed`.
pub struct QuestionChangedEvent {
    pub room_code: String,
    pub index: usize,
    /// Unix milliseconds at which the question opened.
    pub timestamp: i64,
    pub time_limit_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Payload of `answer-stats`.
pub struct AnswerStatsEvent {
    pub room_code: String,
    pub question_index: usize,
    pub counts: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Payload of `answer-feedback`.
pub struct AnswerFeedbackEvent {
    pub room_code: String,
    pub question_index: usize,
    pub is_correct: bool,
    pub correct_index: usize,
    pub correct_answer: String,
    pub feedback_text: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Payload of `leaderboard`.
pub struct LeaderboardEvent {
    pub room_code: String,
    pub entries: Vec<ParticipantSummary>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Payload of `error`.
pub struct ErrorEvent {
    /// Inbound event that was rejected.
    pub action: String,
    /// Stable error code, e.g. `invalid_state`.
    pub code: String,
    pub message: String,
}

impl ErrorEvent {
    /// Describe `err` as the answer to `action`.
    pub fn new(action: impl Into<String>, err: &RoomError) -> Self {
        Self {
            action: action.into(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kebab_case_events() {
        let message = ClientMessage::from_json_str(
            r#"{ "event": "submit-answer", "data": { "roomCode": "ABCD", "questionIndex": 0, "optionIndex": 1, "name": "P1" } }"#,
        )
        .unwrap();

        match message {
            ClientMessage::SubmitAnswer(payload) => {
                assert_eq!(payload.room_code, "ABCD");
                assert_eq!(payload.option_index, 1);
                assert_eq!(payload.name.as_deref(), Some("P1"));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn advance_target_is_optional() {
        let message =
            ClientMessage::from_json_str(r#"{ "event": "advance", "data": { "roomCode": "ABCD" } }"#)
                .unwrap();
        assert!(matches!(
            message,
            ClientMessage::Advance(AdvanceRequest {
                target_index: None,
                ..
            })
        ));
    }

    #[test]
    fn invalid_payloads_are_rejected() {
        let err = ClientMessage::from_json_str(r#"{ "event": "start", "data": { "roomCode": "A B" } }"#)
            .unwrap_err();
        assert_eq!(err.code(), "invalid_payload");

        let err = ClientMessage::from_json_str(r#"{ "event": "teleport", "data": {} }"#).unwrap_err();
        assert_eq!(err.code(), "invalid_payload");
        assert_eq!(raw_action(r#"{ "event": "teleport", "data": {} }"#), "teleport");
        assert_eq!(raw_action("not json"), UNKNOWN_ACTION);
    }

    #[test]
    fn server_messages_serialize_with_event_and_data() {
        let message = ServerMessage::AnswerStats(AnswerStatsEvent {
            room_code: "ABCD".into(),
            question_index: 0,
            counts: vec![0, 1],
        });
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["event"], "answer-stats");
        assert_eq!(value["data"]["questionIndex"], 0);
        assert_eq!(value["data"]["counts"], serde_json::json!([0, 1]));
    }
}
