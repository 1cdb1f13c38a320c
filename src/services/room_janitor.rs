use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::info;

use crate::state::SharedState;

/// Periodically drop ended rooms and idle lobbies once their TTL has passed.
pub async fn run(state: SharedState) {
    let config = state.config();
    let mut ticker = interval(config.janitor_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        sweep(&state, Instant::now());
    }
}

/// Evict expired rooms once. Returns the evicted codes.
pub fn sweep(state: &SharedState, now: Instant) -> Vec<String> {
    let config = state.config();
    let evicted = state.with_registry(|registry| {
        registry.evict_expired(now, config.ended_room_ttl, config.waiting_room_ttl)
    });
    for code in &evicted {
        info!(room_code = %code, "evicted expired room");
    }
    evicted
}
