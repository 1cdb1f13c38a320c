use std::fmt;

use thiserror::Error;

/// Lifecycle of a quiz room. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    /// Created by the host, collecting participants.
    Waiting,
    /// Questions are being played; the cursor points at the active question.
    Live,
    /// Terminal: leaderboard computed, no further transitions.
    Ended,
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomStatus::Waiting => f.write_str("waiting"),
            RoomStatus::Live => f.write_str("live"),
            RoomStatus::Ended => f.write_str("ended"),
        }
    }
}

/// Events that can be applied to the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Host starts the quiz from the waiting room.
    Start,
    /// Host jumps to an arbitrary question.
    Advance {
        /// Question index to open.
        target: usize,
    },
    /// The question countdown expired.
    AutoAdvance,
    /// Host ends the quiz early.
    End,
    /// A participant answers. Never changes the status; checked with
    /// [`SessionStateMachine::accepting_answers`].
    SubmitAnswer,
}

impl fmt::Display for RoomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomEvent::Start => f.write_str("start"),
            RoomEvent::Advance { target } => write!(f, "advance to question {target}"),
            RoomEvent::AutoAdvance => f.write_str("auto-advance"),
            RoomEvent::End => f.write_str("end"),
            RoomEvent::SubmitAnswer => f.write_str("submit an answer"),
        }
    }
}

/// Error returned when an event cannot be applied from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {event} while the room is {from}")]
pub struct InvalidTransition {
    /// The status the room was in when the event was received.
    pub from: RoomStatus,
    /// The rejected event.
    pub event: RoomEvent,
}

/// Errors produced by [`SessionStateMachine::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The event is not valid from the current status.
    Invalid(InvalidTransition),
    /// A manual advance targeted a question that does not exist.
    OutOfRange {
        /// Requested question index.
        index: usize,
        /// Number of questions in the room.
        len: usize,
    },
}

/// Observable effect of a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A question became active (start, manual or automatic advance).
    QuestionOpened {
        /// Index of the now active question.
        index: usize,
    },
    /// The quiz reached its terminal state.
    Ended,
}

/// Per-room state machine: lifecycle status plus the question cursor.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    status: RoomStatus,
    cursor: usize,
    question_count: usize,
    version: usize,
}

impl SessionStateMachine {
    /// Create a machine in [`RoomStatus::Waiting`] for a room with `question_count` questions.
    pub fn new(question_count: usize) -> Self {
        Self {
            status: RoomStatus::Waiting,
            cursor: 0,
            question_count,
            version: 0,
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Question cursor. Only meaningful while live (or, after the end, the last question shown).
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Active question index, or why answers are not accepted right now.
    pub fn accepting_answers(&self) -> Result<usize, InvalidTransition> {
        match self.status {
            RoomStatus::Live => Ok(self.cursor),
            from => Err(InvalidTransition {
                from,
                event: RoomEvent::SubmitAnswer,
            }),
        }
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Validate and apply `event`. The machine is left untouched on error.
    pub fn apply(&mut self, event: RoomEvent) -> Result<Transition, TransitionError> {
        let transition = self.compute_transition(event)?;

        match transition {
            Transition::QuestionOpened { index } => {
                self.status = RoomStatus::Live;
                self.cursor = index;
            }
            Transition::Ended => self.status = RoomStatus::Ended,
        }
        self.version += 1;

        Ok(transition)
    }

    /// Compute the transition for `event` without mutating the machine.
    pub fn compute_transition(&self, event: RoomEvent) -> Result<Transition, TransitionError> {
        let invalid = || {
            TransitionError::Invalid(InvalidTransition {
                from: self.status,
                event,
            })
        };

        match (self.status, event) {
            (RoomStatus::Waiting, RoomEvent::Start) => {
                if self.question_count == 0 {
                    return Err(TransitionError::OutOfRange { index: 0, len: 0 });
                }
                Ok(Transition::QuestionOpened { index: 0 })
            }
            (RoomStatus::Live, RoomEvent::Advance { target }) => {
                if target >= self.question_count {
                    return Err(TransitionError::OutOfRange {
                        index: target,
                        len: self.question_count,
                    });
                }
                Ok(Transition::QuestionOpened { index: target })
            }
            (RoomStatus::Live, RoomEvent::AutoAdvance) => {
                let next = self.cursor + 1;
                if next < self.question_count {
                    Ok(Transition::QuestionOpened { index: next })
                } else {
                    Ok(Transition::Ended)
                }
            }
            (RoomStatus::Live, RoomEvent::End) => Ok(Transition::Ended),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_waiting() {
        let sm = SessionStateMachine::new(3);
        assert_eq!(sm.status(), RoomStatus::Waiting);
        assert_eq!(sm.cursor(), 0);
    }

    #[test]
    fn full_happy_path_through_quiz() {
        let mut sm = SessionStateMachine::new(3);

        assert_eq!(
            sm.apply(RoomEvent::Start),
            Ok(Transition::QuestionOpened { index: 0 })
        );
        assert_eq!(
            sm.apply(RoomEvent::AutoAdvance),
            Ok(Transition::QuestionOpened { index: 1 })
        );
        assert_eq!(
            sm.apply(RoomEvent::Advance { target: 2 }),
            Ok(Transition::QuestionOpened { index: 2 })
        );
        assert_eq!(sm.apply(RoomEvent::AutoAdvance), Ok(Transition::Ended));
        assert_eq!(sm.status(), RoomStatus::Ended);
        assert_eq!(sm.version(), 4);
    }

    #[test]
    fn manual_advance_can_jump_backwards() {
        let mut sm = SessionStateMachine::new(3);
        sm.apply(RoomEvent::Start).unwrap();
        sm.apply(RoomEvent::Advance { target: 2 }).unwrap();

        assert_eq!(
            sm.apply(RoomEvent::Advance { target: 0 }),
            Ok(Transition::QuestionOpened { index: 0 })
        );
        assert_eq!(sm.cursor(), 0);
    }

    #[test]
    fn manual_advance_out_of_range_is_rejected_without_clamping() {
        let mut sm = SessionStateMachine::new(2);
        sm.apply(RoomEvent::Start).unwrap();

        assert_eq!(
            sm.apply(RoomEvent::Advance { target: 2 }),
            Err(TransitionError::OutOfRange { index: 2, len: 2 })
        );
        assert_eq!(sm.cursor(), 0);
        assert_eq!(sm.version(), 1);
    }

    #[test]
    fn start_twice_is_invalid() {
        let mut sm = SessionStateMachine::new(2);
        sm.apply(RoomEvent::Start).unwrap();
        sm.apply(RoomEvent::AutoAdvance).unwrap();

        let err = sm.apply(RoomEvent::Start).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Invalid(InvalidTransition {
                from: RoomStatus::Live,
                event: RoomEvent::Start,
            })
        );
        assert_eq!(sm.cursor(), 1);
    }

    #[test]
    fn nothing_is_valid_after_end() {
        let mut sm = SessionStateMachine::new(2);
        sm.apply(RoomEvent::Start).unwrap();
        sm.apply(RoomEvent::End).unwrap();

        for event in [
            RoomEvent::Start,
            RoomEvent::Advance { target: 1 },
            RoomEvent::AutoAdvance,
            RoomEvent::End,
        ] {
            match sm.apply(event) {
                Err(TransitionError::Invalid(invalid)) => {
                    assert_eq!(invalid.from, RoomStatus::Ended);
                    assert_eq!(invalid.event, event);
                }
                other => panic!("expected invalid transition for {event}, got {other:?}"),
            }
        }
    }

    #[test]
    fn advance_and_end_require_live_room() {
        let mut sm = SessionStateMachine::new(2);
        assert!(matches!(
            sm.apply(RoomEvent::Advance { target: 1 }),
            Err(TransitionError::Invalid(_))
        ));
        assert!(matches!(
            sm.apply(RoomEvent::End),
            Err(TransitionError::Invalid(_))
        ));
    }

    #[test]
    fn answers_are_accepted_only_while_live() {
        let mut sm = SessionStateMachine::new(2);
        assert_eq!(
            sm.accepting_answers().unwrap_err().to_string(),
            "cannot submit an answer while the room is waiting"
        );
        sm.apply(RoomEvent::Start).unwrap();
        sm.apply(RoomEvent::AutoAdvance).unwrap();
        assert_eq!(sm.accepting_answers(), Ok(1));
        sm.apply(RoomEvent::End).unwrap();
        assert!(sm.accepting_answers().is_err());
    }

    #[test]
    fn invalid_transition_message_names_the_precondition() {
        let err = InvalidTransition {
            from: RoomStatus::Live,
            event: RoomEvent::Start,
        };
        assert_eq!(err.to_string(), "cannot start while the room is live");
    }
}
