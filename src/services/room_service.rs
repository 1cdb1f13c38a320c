//! Read-only projections of registered rooms for the REST surface.

use crate::{
    dto::{room::RoomSnapshot, validation::validate_room_code},
    error::ServiceError,
    state::SharedState,
};

/// Return the snapshot of the room registered under `code`.
pub fn room_snapshot(state: &SharedState, code: &str) -> Result<RoomSnapshot, ServiceError> {
    validate_room_code(code).map_err(|err| {
        ServiceError::InvalidInput(
            err.message
                .map(|message| message.to_string())
                .unwrap_or_else(|| "invalid room code".into()),
        )
    })?;

    state
        .with_registry(|registry| registry.snapshot(code))
        .ok_or_else(|| ServiceError::NotFound(format!("room `{code}`")))
}
