use tracing::debug;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness along with the number of rooms and open sockets.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let rooms = state.with_registry(|registry| registry.room_count());
    let connections = state.connections().len();
    debug!(rooms, connections, "health check");
    HealthResponse::ok(rooms, connections)
}
