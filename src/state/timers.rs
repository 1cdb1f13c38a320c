//! Per-room question countdowns.
//!
//! A timer task only *reports* its expiry on a channel; the transition itself
//! runs in the timer dispatcher under the registry lock. Every arm hands out a
//! fresh token, and a fire is honoured only if its token is still the one armed
//! for the room, so a disarm is effective even when the task already woke up.

use std::{collections::HashMap, time::Duration};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::debug;

/// Identifies one arming of a room timer.
pub type TimerToken = u64;

/// Message sent by a timer task when its deadline passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    /// Room the timer was armed for.
    pub room_code: String,
    /// Token handed out by [`TimerManager::arm`].
    pub token: TimerToken,
}

struct ArmedTimer {
    token: TimerToken,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// Holds at most one pending countdown per room.
pub struct TimerManager {
    armed: HashMap<String, ArmedTimer>,
    next_token: TimerToken,
    fired_tx: mpsc::UnboundedSender<TimerFired>,
}

impl TimerManager {
    /// Create a manager whose timers report expiries on `fired_tx`.
    pub fn new(fired_tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            armed: HashMap::new(),
            next_token: 0,
            fired_tx,
        }
    }

    /// Schedule a single-shot expiry `after` from now, replacing any pending timer for the room.
    pub fn arm(&mut self, room_code: &str, after: Duration) -> TimerToken {
        self.disarm(room_code);

        self.next_token += 1;
        let token = self.next_token;
        let deadline = Instant::now() + after;
        let fired_tx = self.fired_tx.clone();
        let code = room_code.to_string();

        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            let _ = fired_tx.send(TimerFired {
                room_code: code,
                token,
            });
        });

        debug!(room_code, token, after_ms = after.as_millis() as u64, "question timer armed");
        self.armed.insert(
            room_code.to_string(),
            ArmedTimer {
                token,
                deadline,
                handle,
            },
        );
        token
    }

    /// Cancel the pending timer for the room, if any. Returns whether one was armed.
    pub fn disarm(&mut self, room_code: &str) -> bool {
        match self.armed.remove(room_code) {
            Some(timer) => {
                timer.handle.abort();
                debug!(room_code, token = timer.token, "question timer disarmed");
                true
            }
            None => false,
        }
    }

    /// Consume a fire notification. Returns `true` only if it belongs to the timer
    /// currently armed for the room; stale fires are ignored.
    pub fn claim(&mut self, fired: &TimerFired) -> bool {
        match self.armed.get(&fired.room_code) {
            Some(timer) if timer.token == fired.token => {
                self.armed.remove(&fired.room_code);
                true
            }
            _ => false,
        }
    }

    /// Whether a countdown is pending for the room.
    pub fn is_armed(&self, room_code: &str) -> bool {
        self.armed.contains_key(room_code)
    }

    /// Deadline of the pending countdown for the room.
    pub fn deadline(&self, room_code: &str) -> Option<Instant> {
        self.armed.get(room_code).map(|timer| timer.deadline)
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        for timer in self.armed.values() {
            timer.handle.abort();
        }
    }
}
