//! Room Registry: the in-memory owner of every room, its countdown and the
//! connection indexes used to prune participants and close abandoned rooms on
//! disconnect.
//!
//! Every operation validates before it mutates and returns an [`Outcome`]
//! listing what must be sent to whom. Nothing here awaits, so a caller holding
//! the registry lock runs each operation to completion.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use rand::Rng;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, info};

use crate::{
    dto::{
        room::{ParticipantSummary, QuestionPayload, RoomRef, RoomSnapshot},
        unix_millis_now,
        ws::{
            AnswerFeedbackEvent, AnswerStatsEvent, LeaderboardEvent, ParticipantsUpdatedEvent,
            QuestionChangedEvent, QuizStartedEvent, ServerMessage,
        },
    },
    error::RoomError,
    state::{
        room::{ConnectionId, Question, Room},
        state_machine::{RoomEvent, RoomStatus, Transition},
        timers::{TimerFired, TimerManager},
    },
};

const GENERATED_CODE_LENGTH: usize = 6;
/// Letters and digits that cannot be confused when read aloud or on screen.
const GENERATED_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// One message addressed to a set of connections.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Recipients, resolved when the delivery was produced.
    pub targets: Vec<ConnectionId>,
    /// Message to send to each recipient.
    pub message: ServerMessage,
}

/// Ordered list of deliveries produced by one registry operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    deliveries: Vec<Delivery>,
}

impl Outcome {
    /// Address `message` to a single connection.
    pub fn unicast(&mut self, target: ConnectionId, message: ServerMessage) {
        self.deliveries.push(Delivery {
            targets: vec![target],
            message,
        });
    }

    /// Address `message` to every connection bound to `room`.
    pub fn broadcast(&mut self, room: &Room, message: ServerMessage) {
        self.deliveries.push(Delivery {
            targets: room.members(),
            message,
        });
    }

    /// Address `message` to every participant of `room` other than its host.
    pub fn to_participants(&mut self, room: &Room, message: ServerMessage) {
        let targets: Vec<ConnectionId> = room
            .participants()
            .map(|participant| participant.connection_id)
            .filter(|id| *id != room.host())
            .collect();
        if !targets.is_empty() {
            self.deliveries.push(Delivery { targets, message });
        }
    }

    /// Deliveries in production order.
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Consume the outcome.
    pub fn into_deliveries(self) -> Vec<Delivery> {
        self.deliveries
    }

    /// Whether nothing needs to be sent.
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }
}

/// Owns all rooms, their timers and the connection → rooms indexes.
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    timers: TimerManager,
    /// Rooms each connection joined as a participant.
    memberships: HashMap<ConnectionId, HashSet<String>>,
    /// Rooms each connection hosts.
    hosted: HashMap<ConnectionId, HashSet<String>>,
    default_time_limit: Duration,
}

impl RoomRegistry {
    /// Create an empty registry whose timers report on `fired_tx`.
    pub fn new(fired_tx: mpsc::UnboundedSender<TimerFired>, default_time_limit: Duration) -> Self {
        Self {
            rooms: HashMap::new(),
            timers: TimerManager::new(fired_tx),
            memberships: HashMap::new(),
            hosted: HashMap::new(),
            default_time_limit,
        }
    }

    /// Look up a room.
    pub fn room(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code)
    }

    /// Number of registered rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Whether a countdown is pending for the room.
    pub fn timer_armed(&self, code: &str) -> bool {
        self.timers.is_armed(code)
    }

    /// Deadline of the pending countdown for the room.
    pub fn timer_deadline(&self, code: &str) -> Option<Instant> {
        self.timers.deadline(code)
    }

    /// Read-only projection of a room.
    pub fn snapshot(&self, code: &str) -> Option<RoomSnapshot> {
        let remaining = self
            .timers
            .deadline(code)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        self.rooms
            .get(code)
            .map(|room| RoomSnapshot::new(room, remaining))
    }

    /// Register a room hosted by `caller`.
    ///
    /// Re-creating a code the caller already hosts replaces that room; a code
    /// hosted by another connection is rejected.
    pub fn create_room(
        &mut self,
        caller: ConnectionId,
        room_code: Option<String>,
        quiz_id: String,
        questions: Vec<Question>,
    ) -> Result<Outcome, RoomError> {
        if questions.is_empty() {
            return Err(RoomError::InvalidPayload(
                "a room needs at least one question".into(),
            ));
        }
        for (index, question) in questions.iter().enumerate() {
            if question.options.is_empty() {
                return Err(RoomError::InvalidPayload(format!(
                    "question {index} has no options"
                )));
            }
            if question.correct_index >= question.options.len() {
                return Err(RoomError::InvalidPayload(format!(
                    "question {index}: correct index {} is out of range for {} options",
                    question.correct_index,
                    question.options.len()
                )));
            }
        }

        let code = match room_code {
            Some(code) => {
                if let Some(existing) = self.rooms.get(&code) {
                    if existing.host() != caller {
                        return Err(RoomError::DuplicateRoom(code));
                    }
                }
                code
            }
            None => self.generate_code(),
        };

        if self.rooms.contains_key(&code) {
            info!(room_code = %code, "host re-created room; replacing previous session");
            self.timers.disarm(&code);
            self.drop_room_memberships(&code);
        }

        let room = Room::new(code.clone(), quiz_id, caller, questions);
        info!(
            room_code = %code,
            quiz_id = room.quiz_id(),
            questions = room.questions().len(),
            host = %caller,
            "room created"
        );
        self.rooms.insert(code.clone(), room);
        self.hosted.entry(caller).or_default().insert(code.clone());

        let mut outcome = Outcome::default();
        outcome.unicast(caller, ServerMessage::QuizCreated(RoomRef { room_code: code }));
        Ok(outcome)
    }

    /// Add `caller` as a participant. Late joiners of a live or ended room get a catch-up.
    pub fn join_room(
        &mut self,
        caller: ConnectionId,
        code: &str,
        name: String,
    ) -> Result<Outcome, RoomError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;

        if room.join(caller, name) {
            info!(room_code = code, connection_id = %caller, "participant joined");
        }
        self.memberships
            .entry(caller)
            .or_default()
            .insert(code.to_string());

        let mut outcome = Outcome::default();
        outcome.broadcast(room, participants_updated(room));

        match room.status() {
            RoomStatus::Waiting => {}
            RoomStatus::Live => {
                let index = room.current_question_index();
                let reveal = caller == room.host();
                outcome.unicast(caller, quiz_started(room, self.default_time_limit, reveal));
                outcome.unicast(caller, question_changed(room, index, self.default_time_limit));
                outcome.unicast(caller, answer_stats(room, index));
            }
            RoomStatus::Ended => {
                outcome.unicast(caller, leaderboard(room));
                outcome.unicast(
                    caller,
                    ServerMessage::QuizEnded(RoomRef {
                        room_code: code.to_string(),
                    }),
                );
            }
        }

        Ok(outcome)
    }

    /// Remove `caller` from one room. Absent participants are a no-op.
    pub fn leave_room(&mut self, caller: ConnectionId, code: &str) -> Result<Outcome, RoomError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;

        let removed = room.leave(&caller);
        if let Some(rooms) = self.memberships.get_mut(&caller) {
            rooms.remove(code);
            if rooms.is_empty() {
                self.memberships.remove(&caller);
            }
        }

        let mut outcome = Outcome::default();
        outcome.unicast(
            caller,
            ServerMessage::LeftRoom(RoomRef {
                room_code: code.to_string(),
            }),
        );
        if removed {
            info!(room_code = code, connection_id = %caller, "participant left");
            outcome.broadcast(room, participants_updated(room));
        }
        Ok(outcome)
    }

    /// Prune `caller` from every room it joined and close the rooms it hosted.
    ///
    /// A hosted room still in the lobby is removed, a live one is ended with
    /// its final ranking, and an ended one is left for the eviction sweep.
    pub fn disconnect(&mut self, caller: ConnectionId) -> Outcome {
        let mut outcome = Outcome::default();

        for code in self.memberships.remove(&caller).unwrap_or_default() {
            let Some(room) = self.rooms.get_mut(&code) else {
                continue;
            };
            if room.leave(&caller) {
                info!(room_code = %code, connection_id = %caller, "participant disconnected");
                outcome.broadcast(room, participants_updated(room));
            }
        }

        for code in self.hosted.remove(&caller).unwrap_or_default() {
            self.close_abandoned(&code, &mut outcome);
        }
        outcome
    }

    /// Host-only: open the first question and start its countdown.
    pub fn start(&mut self, caller: ConnectionId, code: &str) -> Result<Outcome, RoomError> {
        let transition = self.host_transition(caller, code, RoomEvent::Start)?;
        let mut outcome = Outcome::default();
        let room = self.room_or_err(code)?;
        outcome.unicast(room.host(), quiz_started(room, self.default_time_limit, true));
        outcome.to_participants(room, quiz_started(room, self.default_time_limit, false));
        self.after_transition(code, transition, &mut outcome)?;
        info!(room_code = code, "quiz started");
        Ok(outcome)
    }

    /// Host-only: jump to `target`, or to the next question when no target is given.
    pub fn advance(
        &mut self,
        caller: ConnectionId,
        code: &str,
        target: Option<usize>,
    ) -> Result<Outcome, RoomError> {
        let target = match target {
            Some(target) => target,
            None => {
                let room = self.room_or_err(code)?;
                room.current_question_index() + 1
            }
        };

        let transition = self.host_transition(caller, code, RoomEvent::Advance { target })?;
        let mut outcome = Outcome::default();
        self.after_transition(code, transition, &mut outcome)?;
        Ok(outcome)
    }

    /// Host-only: end the quiz and publish the leaderboard.
    pub fn end(&mut self, caller: ConnectionId, code: &str) -> Result<Outcome, RoomError> {
        let transition = self.host_transition(caller, code, RoomEvent::End)?;
        let mut outcome = Outcome::default();
        self.after_transition(code, transition, &mut outcome)?;
        Ok(outcome)
    }

    /// Count `caller`'s answer for the active question.
    pub fn submit_answer(
        &mut self,
        caller: ConnectionId,
        code: &str,
        question_index: usize,
        option_index: usize,
    ) -> Result<Outcome, RoomError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;

        let accepted = room.submit_answer(caller, question_index, option_index)?;
        debug!(
            room_code = code,
            connection_id = %caller,
            question_index,
            option_index,
            correct = accepted.is_correct,
            "answer accepted"
        );

        let feedback_text = if accepted.is_correct {
            "Correct!".to_string()
        } else {
            format!("Incorrect. The correct answer was {}.", accepted.correct_answer)
        };

        let mut outcome = Outcome::default();
        outcome.broadcast(room, answer_stats(room, accepted.question_index));
        outcome.unicast(
            caller,
            ServerMessage::AnswerFeedback(AnswerFeedbackEvent {
                room_code: code.to_string(),
                question_index: accepted.question_index,
                is_correct: accepted.is_correct,
                correct_index: accepted.correct_index,
                correct_answer: accepted.correct_answer,
                feedback_text,
            }),
        );
        Ok(outcome)
    }

    /// Apply a countdown expiry. Fires that no longer match the armed timer,
    /// or whose room is gone, are no-ops.
    pub fn timer_fired(&mut self, fired: &TimerFired) -> Outcome {
        let mut outcome = Outcome::default();
        if !self.timers.claim(fired) {
            debug!(room_code = %fired.room_code, token = fired.token, "ignoring stale timer fire");
            return outcome;
        }

        let code = fired.room_code.as_str();
        let Some(room) = self.rooms.get_mut(code) else {
            return outcome;
        };

        let transition = match room.auto_advance() {
            Ok(transition) => transition,
            Err(err) => {
                debug!(room_code = code, error = %err, "timer fire had no effect");
                return outcome;
            }
        };

        if let Err(err) = self.after_transition(code, transition, &mut outcome) {
            debug!(room_code = code, error = %err, "timer fire had no effect");
        }
        outcome
    }

    /// Drop rooms that ended at least `ended_ttl` before `now`, and rooms that
    /// have waited in the lobby for `waiting_ttl` since creation. Live rooms are
    /// kept. Returns the evicted codes.
    pub fn evict_expired(
        &mut self,
        now: Instant,
        ended_ttl: Duration,
        waiting_ttl: Duration,
    ) -> Vec<String> {
        let expired: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, room)| match room.status() {
                RoomStatus::Waiting => now.saturating_duration_since(room.created_at()) >= waiting_ttl,
                RoomStatus::Live => false,
                RoomStatus::Ended => room
                    .ended_at()
                    .is_some_and(|ended_at| now.saturating_duration_since(ended_at) >= ended_ttl),
            })
            .map(|(code, _)| code.clone())
            .collect();

        for code in &expired {
            self.remove_room(code);
        }
        expired
    }

    /// Close a room whose host went away.
    fn close_abandoned(&mut self, code: &str, outcome: &mut Outcome) {
        let Some(room) = self.rooms.get_mut(code) else {
            return;
        };

        match room.status() {
            RoomStatus::Waiting => {
                info!(room_code = code, "host left the lobby; closing room");
                outcome.broadcast(
                    room,
                    ServerMessage::QuizEnded(RoomRef {
                        room_code: code.to_string(),
                    }),
                );
                self.remove_room(code);
            }
            RoomStatus::Live => {
                info!(room_code = code, "host left a live quiz; ending it");
                self.timers.disarm(code);
                let closed = room
                    .apply(RoomEvent::End)
                    .and_then(|transition| self.after_transition(code, transition, outcome));
                if let Err(err) = closed {
                    debug!(room_code = code, error = %err, "could not end abandoned room");
                }
            }
            RoomStatus::Ended => {}
        }
    }

    /// Forget a room together with its countdown and index entries.
    fn remove_room(&mut self, code: &str) {
        self.timers.disarm(code);
        self.drop_room_memberships(code);
        self.hosted.retain(|_, rooms| {
            rooms.remove(code);
            !rooms.is_empty()
        });
        self.rooms.remove(code);
    }

    /// Validate a host action, cancel the room's countdown, then apply it.
    fn host_transition(
        &mut self,
        caller: ConnectionId,
        code: &str,
        event: RoomEvent,
    ) -> Result<Transition, RoomError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;

        room.check(Some(caller), event)?;
        self.timers.disarm(code);
        room.apply(event)
    }

    /// Re-arm and announce after a question opened, or tear down and rank after the end.
    fn after_transition(
        &mut self,
        code: &str,
        transition: Transition,
        outcome: &mut Outcome,
    ) -> Result<(), RoomError> {
        let room = self
            .rooms
            .get(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;

        match transition {
            Transition::QuestionOpened { index } => {
                let limit = room.time_limit(index, self.default_time_limit);
                self.timers.arm(code, limit);
                debug!(room_code = code, index, "question opened");
                outcome.broadcast(room, question_changed(room, index, self.default_time_limit));
                outcome.broadcast(room, answer_stats(room, index));
            }
            Transition::Ended => {
                self.timers.disarm(code);
                info!(
                    room_code = code,
                    participants = room.participants().count(),
                    "quiz ended"
                );
                outcome.broadcast(room, leaderboard(room));
                outcome.broadcast(
                    room,
                    ServerMessage::QuizEnded(RoomRef {
                        room_code: code.to_string(),
                    }),
                );
            }
        }
        Ok(())
    }

    fn room_or_err(&self, code: &str) -> Result<&Room, RoomError> {
        self.rooms
            .get(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))
    }

    fn drop_room_memberships(&mut self, code: &str) {
        self.memberships.retain(|_, rooms| {
            rooms.remove(code);
            !rooms.is_empty()
        });
    }

    fn generate_code(&self) -> String {
        let mut rng = rand::rng();
        loop {
            let code: String = (0..GENERATED_CODE_LENGTH)
                .map(|_| {
                    GENERATED_CODE_ALPHABET[rng.random_range(0..GENERATED_CODE_ALPHABET.len())]
                        as char
                })
                .collect();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

}

fn quiz_started(room: &Room, default_time_limit: Duration, reveal_answers: bool) -> ServerMessage {
    ServerMessage::QuizStarted(QuizStartedEvent {
        room_code: room.code().to_string(),
        questions: room
            .questions()
            .iter()
            .map(|question| {
                QuestionPayload::from_question(question, default_time_limit, reveal_answers)
            })
            .collect(),
    })
}

fn question_changed(room: &Room, index: usize, default_time_limit: Duration) -> ServerMessage {
    ServerMessage::QuestionChanged(QuestionChangedEvent {
        room_code: room.code().to_string(),
        index,
        timestamp: room.question_opened_at_ms().unwrap_or_else(unix_millis_now),
        time_limit_seconds: room.time_limit(index, default_time_limit).as_secs(),
    })
}

fn participants_updated(room: &Room) -> ServerMessage {
    ServerMessage::ParticipantsUpdated(ParticipantsUpdatedEvent {
        room_code: room.code().to_string(),
        participants: room.participants().map(ParticipantSummary::from).collect(),
    })
}

fn answer_stats(room: &Room, index: usize) -> ServerMessage {
    let counts = room.tally(index).map(<[u32]>::to_vec).unwrap_or_else(|| {
        vec![0; room.questions().get(index).map_or(0, |q| q.options.len())]
    });
    ServerMessage::AnswerStats(AnswerStatsEvent {
        room_code: room.code().to_string(),
        question_index: index,
        counts,
    })
}

fn leaderboard(room: &Room) -> ServerMessage {
    ServerMessage::Leaderboard(LeaderboardEvent {
        room_code: room.code().to_string(),
        entries: room
            .leaderboard()
            .iter()
            .map(ParticipantSummary::from)
            .collect(),
    })
}
