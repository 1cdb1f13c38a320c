//! Connection Gateway: turns inbound WebSocket frames into registry operations
//! and answers rejected ones with an `error` event to the sender only.

use tracing::{debug, warn};

use crate::{
    dto::ws::{ClientMessage, ErrorEvent, ServerMessage, raw_action},
    error::RoomError,
    services::broadcast,
    state::{
        AppState,
        room::{ConnectionId, Question},
    },
};

/// Parse, validate and dispatch one text frame received from `connection_id`.
pub fn handle_text(state: &AppState, connection_id: ConnectionId, text: &str) {
    match ClientMessage::from_json_str(text) {
        Ok(message) => dispatch(state, connection_id, message),
        Err(err) => {
            let action = raw_action(text);
            warn!(
                connection_id = %connection_id,
                action = %action,
                error = %err,
                "failed to parse or validate client message"
            );
            reply_error(state, connection_id, &action, &err);
        }
    }
}

/// Route a decoded message to the registry. Rejections are unicast back to the caller.
pub fn dispatch(state: &AppState, connection_id: ConnectionId, message: ClientMessage) {
    let action = message.action();
    debug!(connection_id = %connection_id, action, "dispatching client message");

    let result = state.apply(|registry| match message {
        ClientMessage::CreateRoom(request) => registry.create_room(
            connection_id,
            request.room_code,
            request.quiz_id,
            request.questions.into_iter().map(Question::from).collect(),
        ),
        ClientMessage::JoinRoom(request) => {
            registry.join_room(connection_id, &request.room_code, request.name)
        }
        ClientMessage::LeaveRoom(request) => registry.leave_room(connection_id, &request.room_code),
        ClientMessage::Start(request) => registry.start(connection_id, &request.room_code),
        ClientMessage::Advance(request) => {
            registry.advance(connection_id, &request.room_code, request.target_index)
        }
        ClientMessage::SubmitAnswer(request) => registry.submit_answer(
            connection_id,
            &request.room_code,
            request.question_index,
            request.option_index,
        ),
        ClientMessage::End(request) => registry.end(connection_id, &request.room_code),
    });

    if let Err(err) = result {
        warn!(
            connection_id = %connection_id,
            action,
            code = err.code(),
            error = %err,
            "client action rejected"
        );
        reply_error(state, connection_id, action, &err);
    }
}

/// Prune a closed connection from every room it had joined and close the rooms it hosted.
pub fn handle_disconnect(state: &AppState, connection_id: ConnectionId) {
    let _ = state.apply(|registry| Ok(registry.disconnect(connection_id)));
}

fn reply_error(state: &AppState, connection_id: ConnectionId, action: &str, err: &RoomError) {
    let message = ServerMessage::Error(ErrorEvent::new(action, err));
    if let Err(send_err) = broadcast::send_to(state, connection_id, &message) {
        debug!(connection_id = %connection_id, error = %send_err, "could not deliver error event");
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{ClientConnection, SharedState, state_machine::RoomStatus},
    };

    struct Client {
        id: ConnectionId,
        rx: mpsc::UnboundedReceiver<Message>,
    }

    impl Client {
        fn connect(state: &AppState) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = Uuid::new_v4();
            state
                .connections()
                .insert(id, ClientConnection { id, tx });
            Self { id, rx }
        }

        fn send(&self, state: &AppState, value: Value) {
            handle_text(state, self.id, &value.to_string());
        }

        fn drain(&mut self) -> Vec<Value> {
            let mut frames = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                if let Message::Text(text) = message {
                    frames.push(serde_json::from_str(text.as_str()).unwrap());
                }
            }
            frames
        }

        fn events(&mut self) -> Vec<String> {
            self.drain()
                .iter()
                .map(|frame| frame["event"].as_str().unwrap().to_string())
                .collect()
        }
    }

    fn state() -> SharedState {
        let (state, _fired) = AppState::new(AppConfig::default());
        state
    }

    fn create_room(code: &str) -> Value {
        json!({
            "event": "create-room",
            "data": {
                "roomCode": code,
                "quizId": "quiz-1",
                "questions": [
                    { "text": "Q0", "options": ["a", "b"], "correctIndex": 1 },
                    { "text": "Q1", "options": ["a", "b", "c"], "correctIndex": 0 }
                ]
            }
        })
    }

    #[tokio::test]
    async fn full_session_over_the_gateway() {
        let state = state();
        let mut host = Client::connect(&state);
        let mut p1 = Client::connect(&state);

        host.send(&state, create_room("ABCD"));
        assert_eq!(host.events(), ["quiz-created"]);

        p1.send(
            &state,
            json!({ "event": "join-room", "data": { "roomCode": "ABCD", "name": "P1" } }),
        );
        assert_eq!(host.events(), ["participants-updated"]);
        assert_eq!(p1.events(), ["participants-updated"]);

        host.send(&state, json!({ "event": "start", "data": { "roomCode": "ABCD" } }));
        let host_frames = host.drain();
        let p1_frames = p1.drain();
        let names = |frames: &[Value]| -> Vec<String> {
            frames
                .iter()
                .map(|frame| frame["event"].as_str().unwrap().to_string())
                .collect()
        };
        let expected = ["quiz-started", "question-changed", "answer-stats"];
        assert_eq!(names(&host_frames), expected);
        assert_eq!(names(&p1_frames), expected);
        assert_eq!(host_frames[0]["data"]["questions"][0]["correctIndex"], 1);
        assert!(p1_frames[0]["data"]["questions"][0].get("correctIndex").is_none());

        p1.send(
            &state,
            json!({
                "event": "submit-answer",
                "data": { "roomCode": "ABCD", "questionIndex": 0, "optionIndex": 1, "name": "P1" }
            }),
        );
        let frames = p1.drain();
        assert_eq!(frames[0]["event"], "answer-stats");
        assert_eq!(frames[0]["data"]["counts"], json!([0, 1]));
        assert_eq!(frames[1]["event"], "answer-feedback");
        assert_eq!(frames[1]["data"]["isCorrect"], true);
        assert_eq!(host.events(), ["answer-stats"]);

        host.send(
            &state,
            json!({ "event": "advance", "data": { "roomCode": "ABCD", "targetIndex": 1 } }),
        );
        let frames = p1.drain();
        assert_eq!(frames[0]["event"], "question-changed");
        assert_eq!(frames[0]["data"]["index"], 1);
        host.drain();

        host.send(&state, json!({ "event": "end", "data": { "roomCode": "ABCD" } }));
        let frames = p1.drain();
        assert_eq!(frames[0]["event"], "leaderboard");
        assert_eq!(frames[0]["data"]["entries"][0]["name"], "P1");
        assert_eq!(frames[0]["data"]["entries"][0]["score"], 1);
        assert_eq!(frames[1]["event"], "quiz-ended");

        let status = state.with_registry(|registry| registry.room("ABCD").map(|room| room.status()));
        assert_eq!(status, Some(RoomStatus::Ended));
    }

    #[tokio::test]
    async fn rejections_are_unicast_with_their_action() {
        let state = state();
        let mut host = Client::connect(&state);
        let mut intruder = Client::connect(&state);

        host.send(&state, create_room("ABCD"));
        host.drain();

        intruder.send(&state, json!({ "event": "start", "data": { "roomCode": "ABCD" } }));
        let frames = intruder.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "error");
        assert_eq!(frames[0]["data"]["action"], "start");
        assert_eq!(frames[0]["data"]["code"], "not_host");
        assert!(host.drain().is_empty());

        host.send(&state, json!({ "event": "start", "data": { "roomCode": "ABCD" } }));
        host.drain();
        host.send(&state, json!({ "event": "start", "data": { "roomCode": "ABCD" } }));
        let frames = host.drain();
        assert_eq!(frames[0]["data"]["code"], "invalid_state");
    }

    #[tokio::test]
    async fn malformed_frames_get_an_invalid_payload_error() {
        let state = state();
        let mut client = Client::connect(&state);

        handle_text(&state, client.id, "definitely not json");
        let frames = client.drain();
        assert_eq!(frames[0]["data"]["action"], "unknown");
        assert_eq!(frames[0]["data"]["code"], "invalid_payload");

        client.send(&state, json!({ "event": "join-room", "data": { "roomCode": "ABCD" } }));
        let frames = client.drain();
        assert_eq!(frames[0]["data"]["action"], "join-room");
        assert_eq!(frames[0]["data"]["code"], "invalid_payload");

        client.send(
            &state,
            json!({ "event": "join-room", "data": { "roomCode": "NOPE", "name": "P" } }),
        );
        let frames = client.drain();
        assert_eq!(frames[0]["data"]["code"], "room_not_found");
    }

    #[tokio::test]
    async fn disconnect_updates_remaining_members() {
        let state = state();
        let mut host = Client::connect(&state);
        let mut p1 = Client::connect(&state);
        let p2 = Client::connect(&state);

        host.send(&state, create_room("ABCD"));
        for (client, name) in [(&p1, "P1"), (&p2, "P2")] {
            client.send(
                &state,
                json!({ "event": "join-room", "data": { "roomCode": "ABCD", "name": name } }),
            );
        }
        host.drain();
        p1.drain();

        state.connections().remove(&p2.id);
        handle_disconnect(&state, p2.id);

        let frames = host.drain();
        assert_eq!(frames[0]["event"], "participants-updated");
        assert_eq!(frames[0]["data"]["participants"].as_array().unwrap().len(), 1);
        assert_eq!(p1.events(), ["participants-updated"]);
    }

    #[tokio::test]
    async fn host_disconnect_closes_its_lobby() {
        let state = state();
        let host = Client::connect(&state);
        let mut p1 = Client::connect(&state);

        host.send(&state, create_room("ABCD"));
        p1.send(
            &state,
            json!({ "event": "join-room", "data": { "roomCode": "ABCD", "name": "P1" } }),
        );
        p1.drain();

        state.connections().remove(&host.id);
        handle_disconnect(&state, host.id);

        assert_eq!(p1.events(), ["quiz-ended"]);
        assert_eq!(state.with_registry(|registry| registry.room_count()), 0);
    }
}
