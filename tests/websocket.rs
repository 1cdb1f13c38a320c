//! End-to-end tests driving the real router over TCP with a WebSocket client.

use std::{net::SocketAddr, time::Duration};

use futures::{SinkExt, StreamExt};
use quiz_rooms::{
    config::AppConfig,
    routes,
    services::timer_service,
    state::AppState,
};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn_server() -> SocketAddr {
    let (state, fired_rx) = AppState::new(AppConfig::default());
    tokio::spawn(timer_service::run(state.clone(), fired_rx));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    addr
}

/// Connect and consume the `connected` greeting, returning the assigned id.
async fn connect(addr: SocketAddr) -> (Socket, String) {
    let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let greeting = recv(&mut socket).await;
    assert_eq!(greeting["event"], "connected");
    let id = greeting["data"]["connectionId"].as_str().unwrap().to_string();
    (socket, id)
}

async fn send(socket: &mut Socket, value: Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

async fn recv(socket: &mut Socket) -> Value {
    loop {
        let frame = timeout(RECV_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn recv_event(socket: &mut Socket, event: &str) -> Value {
    let frame = recv(socket).await;
    assert_eq!(frame["event"], event, "unexpected frame {frame}");
    frame["data"].clone()
}

fn create_room(code: &str, time_limit_seconds: u64) -> Value {
    json!({
        "event": "create-room",
        "data": {
            "roomCode": code,
            "quizId": "quiz-1",
            "questions": [
                { "text": "Q0", "options": ["a", "b"], "correctIndex": 1, "timeLimitSeconds": time_limit_seconds },
                { "text": "Q1", "options": ["a", "b", "c"], "correctIndex": 0, "timeLimitSeconds": time_limit_seconds }
            ]
        }
    })
}

async fn http_get(addr: SocketAddr, path: &str) -> (u16, Value) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    let body = response.split("\r\n\r\n").nth(1).unwrap_or_default();
    (status, serde_json::from_str(body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn host_and_participant_play_a_full_quiz() {
    let addr = spawn_server().await;
    let (mut host, _) = connect(addr).await;
    let (mut player, player_id) = connect(addr).await;

    send(&mut host, create_room("ABCD", 60)).await;
    assert_eq!(recv_event(&mut host, "quiz-created").await["roomCode"], "ABCD");

    send(
        &mut player,
        json!({ "event": "join-room", "data": { "roomCode": "ABCD", "name": "P1" } }),
    )
    .await;
    let update = recv_event(&mut host, "participants-updated").await;
    assert_eq!(update["participants"][0]["id"], player_id.as_str());
    recv_event(&mut player, "participants-updated").await;

    send(&mut host, json!({ "event": "start", "data": { "roomCode": "ABCD" } })).await;
    for (socket, is_host) in [(&mut host, true), (&mut player, false)] {
        let started = recv_event(socket, "quiz-started").await;
        assert_eq!(started["questions"].as_array().unwrap().len(), 2);
        assert_eq!(started["questions"][0].get("correctIndex").is_some(), is_host);
        let changed = recv_event(socket, "question-changed").await;
        assert_eq!(changed["index"], 0);
        assert_eq!(changed["timeLimitSeconds"], 60);
        recv_event(socket, "answer-stats").await;
    }

    send(
        &mut player,
        json!({
            "event": "submit-answer",
            "data": { "roomCode": "ABCD", "questionIndex": 0, "optionIndex": 1, "name": "P1" }
        }),
    )
    .await;
    assert_eq!(recv_event(&mut player, "answer-stats").await["counts"], json!([0, 1]));
    let feedback = recv_event(&mut player, "answer-feedback").await;
    assert_eq!(feedback["isCorrect"], true);
    assert_eq!(feedback["correctAnswer"], "b");
    recv_event(&mut host, "answer-stats").await;

    let (status, snapshot) = http_get(addr, "/rooms/ABCD").await;
    assert_eq!(status, 200);
    assert_eq!(snapshot["status"], "live");
    assert_eq!(snapshot["participants"][0]["score"], 1);

    send(&mut host, json!({ "event": "end", "data": { "roomCode": "ABCD" } })).await;
    for socket in [&mut host, &mut player] {
        let board = recv_event(socket, "leaderboard").await;
        assert_eq!(board["entries"][0]["name"], "P1");
        assert_eq!(board["entries"][0]["score"], 1);
        recv_event(socket, "quiz-ended").await;
    }
}

#[tokio::test]
async fn countdown_advances_without_the_host() {
    let addr = spawn_server().await;
    let (mut host, _) = connect(addr).await;

    send(&mut host, create_room("TICK", 1)).await;
    recv_event(&mut host, "quiz-created").await;
    send(&mut host, json!({ "event": "start", "data": { "roomCode": "TICK" } })).await;
    recv_event(&mut host, "quiz-started").await;
    recv_event(&mut host, "question-changed").await;
    recv_event(&mut host, "answer-stats").await;

    let changed = recv_event(&mut host, "question-changed").await;
    assert_eq!(changed["index"], 1);
    recv_event(&mut host, "answer-stats").await;

    recv_event(&mut host, "leaderboard").await;
    recv_event(&mut host, "quiz-ended").await;
}

#[tokio::test]
async fn rejected_actions_come_back_as_errors() {
    let addr = spawn_server().await;
    let (mut host, _) = connect(addr).await;
    let (mut intruder, _) = connect(addr).await;

    send(&mut host, create_room("ABCD", 60)).await;
    recv_event(&mut host, "quiz-created").await;

    send(&mut intruder, json!({ "event": "start", "data": { "roomCode": "ABCD" } })).await;
    let error = recv_event(&mut intruder, "error").await;
    assert_eq!(error["action"], "start");
    assert_eq!(error["code"], "not_host");

    intruder
        .send(Message::Text("{ not json".into()))
        .await
        .unwrap();
    let error = recv_event(&mut intruder, "error").await;
    assert_eq!(error["code"], "invalid_payload");

    let (status, _) = http_get(addr, "/rooms/NOPE").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn closing_a_socket_prunes_the_participant() {
    let addr = spawn_server().await;
    let (mut host, _) = connect(addr).await;
    let (mut player, _) = connect(addr).await;

    send(&mut host, create_room("ABCD", 60)).await;
    recv_event(&mut host, "quiz-created").await;
    send(
        &mut player,
        json!({ "event": "join-room", "data": { "roomCode": "ABCD", "name": "P1" } }),
    )
    .await;
    recv_event(&mut host, "participants-updated").await;

    player.close(None).await.unwrap();
    let update = recv_event(&mut host, "participants-updated").await;
    assert!(update["participants"].as_array().unwrap().is_empty());

    let (status, health) = http_get(addr, "/healthcheck").await;
    assert_eq!(status, 200);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["rooms"], 1);
}
