use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::state_machine::RoomStatus;

/// Room lifecycle status exposed to clients (REST/WebSocket).
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisibleRoomStatus {
    /// Waiting for the host to start.
    Waiting,
    /// Questions are being played.
    Live,
    /// Quiz over, leaderboard available.
    Ended,
}

impl From<RoomStatus> for VisibleRoomStatus {
    fn from(value: RoomStatus) -> Self {
        match value {
            RoomStatus::Waiting => VisibleRoomStatus::Waiting,
            RoomStatus::Live => VisibleRoomStatus::Live,
            RoomStatus::Ended => VisibleRoomStatus::Ended,
        }
    }
}
