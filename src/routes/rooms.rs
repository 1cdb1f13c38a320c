use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::room::RoomSnapshot, error::AppError, services::room_service, state::SharedState,
};

/// Read-only room inspection endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route("/rooms/{code}", get(get_room))
}

#[utoipa::path(
    get,
    path = "/rooms/{code}",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code")),
    responses(
        (status = 200, description = "Current room state", body = RoomSnapshot),
        (status = 400, description = "Malformed room code"),
        (status = 404, description = "No room registered under that code")
    )
)]
/// Return a snapshot of one room: status, question cursor and participants.
pub async fn get_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let snapshot = room_service::room_snapshot(&state, &code)?;
    Ok(Json(snapshot))
}
