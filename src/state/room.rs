use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use indexmap::IndexMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    dto::unix_millis_now,
    error::{IndexKind, RoomError},
    state::state_machine::{RoomEvent, RoomStatus, SessionStateMachine, Transition},
};

/// Identifier assigned to every WebSocket connection.
pub type ConnectionId = Uuid;

/// A question definition, fixed when the room is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Prompt shown to participants.
    pub text: String,
    /// Answer options, in display order.
    pub options: Vec<String>,
    /// Index into `options` of the correct answer.
    pub correct_index: usize,
    /// Countdown for this question; the configured default applies when absent.
    pub time_limit: Option<Duration>,
}

/// A connection that joined the room to answer questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Connection the participant joined from.
    pub connection_id: ConnectionId,
    /// Display name supplied on join.
    pub name: String,
    /// Number of correct answers so far. Never decreases.
    pub score: u32,
}

/// Result of an accepted answer submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    /// Question the answer was counted for.
    pub question_index: usize,
    /// Whether the submitted option was the correct one.
    pub is_correct: bool,
    /// Index of the correct option.
    pub correct_index: usize,
    /// Text of the correct option.
    pub correct_answer: String,
    /// Participant score after the submission.
    pub score: u32,
}

/// One hosted quiz session.
#[derive(Debug, Clone)]
pub struct Room {
    code: String,
    quiz_id: String,
    host: ConnectionId,
    participants: IndexMap<ConnectionId, Participant>,
    questions: Vec<Question>,
    machine: SessionStateMachine,
    tallies: HashMap<usize, Vec<u32>>,
    answered: HashMap<usize, HashSet<ConnectionId>>,
    question_opened_at_ms: Option<i64>,
    created_at: Instant,
    ended_at: Option<Instant>,
}

impl Room {
    /// Build a waiting room with no participants.
    pub fn new(code: String, quiz_id: String, host: ConnectionId, questions: Vec<Question>) -> Self {
        let machine = SessionStateMachine::new(questions.len());
        Self {
            code,
            quiz_id,
            host,
            participants: IndexMap::new(),
            questions,
            machine,
            tallies: HashMap::new(),
            answered: HashMap::new(),
            question_opened_at_ms: None,
            created_at: Instant::now(),
            ended_at: None,
        }
    }

    /// Room code the room is registered under.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Identifier of the quiz definition the room was created from.
    pub fn quiz_id(&self) -> &str {
        &self.quiz_id
    }

    /// Connection recognised as host.
    pub fn host(&self) -> ConnectionId {
        self.host
    }

    /// Lifecycle status.
    pub fn status(&self) -> RoomStatus {
        self.machine.status()
    }

    /// Question cursor.
    pub fn current_question_index(&self) -> usize {
        self.machine.cursor()
    }

    /// Number of lifecycle transitions applied so far.
    pub fn version(&self) -> usize {
        self.machine.version()
    }

    /// Full question set.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Participants in join order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Look up a participant by connection.
    pub fn participant(&self, connection_id: &ConnectionId) -> Option<&Participant> {
        self.participants.get(connection_id)
    }

    /// Every connection bound to the room: the host followed by participants.
    pub fn members(&self) -> Vec<ConnectionId> {
        let mut members = Vec::with_capacity(self.participants.len() + 1);
        members.push(self.host);
        members.extend(
            self.participants
                .keys()
                .filter(|id| **id != self.host)
                .copied(),
        );
        members
    }

    /// Per-option counts for a question, if that question has been opened.
    pub fn tally(&self, question_index: usize) -> Option<&[u32]> {
        self.tallies.get(&question_index).map(Vec::as_slice)
    }

    /// Unix milliseconds at which the active question opened.
    pub fn question_opened_at_ms(&self) -> Option<i64> {
        self.question_opened_at_ms
    }

    /// When the room was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the room reached [`RoomStatus::Ended`].
    pub fn ended_at(&self) -> Option<Instant> {
        self.ended_at
    }

    /// Countdown for `question_index`, using `default` when the question has none.
    pub fn time_limit(&self, question_index: usize, default: Duration) -> Duration {
        self.questions
            .get(question_index)
            .and_then(|question| question.time_limit)
            .unwrap_or(default)
    }

    /// Fail with [`RoomError::NotHost`] unless `caller` is the host.
    pub fn ensure_host(&self, caller: ConnectionId) -> Result<(), RoomError> {
        if caller != self.host {
            return Err(RoomError::NotHost(self.code.clone()));
        }
        Ok(())
    }

    /// Add a participant. Re-joins from the same connection are deduplicated.
    ///
    /// Returns `true` when a new participant was appended.
    pub fn join(&mut self, connection_id: ConnectionId, name: String) -> bool {
        if self.participants.contains_key(&connection_id) {
            return false;
        }
        self.participants.insert(
            connection_id,
            Participant {
                connection_id,
                name,
                score: 0,
            },
        );
        true
    }

    /// Remove a participant, keeping the join order of the others.
    ///
    /// Returns `true` when a participant was removed.
    pub fn leave(&mut self, connection_id: &ConnectionId) -> bool {
        self.participants.shift_remove(connection_id).is_some()
    }

    /// Validate `event` without changing anything. `caller` must be the host
    /// when given; timer-driven events pass `None`.
    pub fn check(
        &self,
        caller: Option<ConnectionId>,
        event: RoomEvent,
    ) -> Result<Transition, RoomError> {
        if let Some(caller) = caller {
            self.ensure_host(caller)?;
        }
        Ok(self.machine.compute_transition(event)?)
    }

    /// Countdown expiry: next question, or the end after the last one.
    pub fn auto_advance(&mut self) -> Result<Transition, RoomError> {
        self.apply(RoomEvent::AutoAdvance)
    }

    /// Count an answer for the active question.
    ///
    /// Every check runs before the tally or score is touched.
    pub fn submit_answer(
        &mut self,
        connection_id: ConnectionId,
        question_index: usize,
        option_index: usize,
    ) -> Result<AnswerOutcome, RoomError> {
        let current = self.machine.accepting_answers()?;

        if question_index != current {
            return Err(RoomError::StaleAnswer {
                submitted: question_index,
                current,
            });
        }

        if !self.participants.contains_key(&connection_id) {
            return Err(RoomError::NotParticipant(self.code.clone()));
        }

        let question = &self.questions[current];
        if option_index >= question.options.len() {
            return Err(RoomError::InvalidIndex {
                kind: IndexKind::Option,
                index: option_index,
                len: question.options.len(),
            });
        }

        if self
            .answered
            .get(&current)
            .is_some_and(|seen| seen.contains(&connection_id))
        {
            return Err(RoomError::AlreadyAnswered(current));
        }

        let is_correct = option_index == question.correct_index;
        let correct_index = question.correct_index;
        let correct_answer = question.options.get(correct_index).cloned().unwrap_or_default();
        let option_count = question.options.len();

        let tally = self
            .tallies
            .entry(current)
            .or_insert_with(|| vec![0; option_count]);
        tally[option_index] += 1;
        self.answered.entry(current).or_default().insert(connection_id);

        let participant = self
            .participants
            .get_mut(&connection_id)
            .ok_or_else(|| RoomError::NotParticipant(self.code.clone()))?;
        if is_correct {
            participant.score += 1;
        }

        Ok(AnswerOutcome {
            question_index: current,
            is_correct,
            correct_index,
            correct_answer,
            score: participant.score,
        })
    }

    /// Participants sorted by score descending, ties kept in join order.
    pub fn leaderboard(&self) -> Vec<Participant> {
        let mut ranked: Vec<Participant> = self.participants.values().cloned().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }

    /// Apply an event to the machine and its side effects on tallies.
    /// Host checks are the caller's business; see [`Room::check`].
    pub fn apply(&mut self, event: RoomEvent) -> Result<Transition, RoomError> {
        let transition = self.machine.apply(event)?;

        match transition {
            Transition::QuestionOpened { index } => {
                let option_count = self.questions[index].options.len();
                self.tallies.insert(index, vec![0; option_count]);
                self.answered.remove(&index);
                self.question_opened_at_ms = Some(unix_millis_now());
            }
            Transition::Ended => self.ended_at = Some(Instant::now()),
        }

        Ok(transition)
    }
}
