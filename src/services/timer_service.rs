use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::state::{SharedState, timers::TimerFired};

/// Apply countdown expiries as they arrive, one at a time under the registry lock.
///
/// Returns once every sender is gone, which only happens when the state is dropped.
pub async fn run(state: SharedState, mut fired_rx: mpsc::UnboundedReceiver<TimerFired>) {
    info!("timer dispatcher started");
    while let Some(fired) = fired_rx.recv().await {
        debug!(room_code = %fired.room_code, token = fired.token, "question timer expired");
        let _ = state.apply(|registry| Ok(registry.timer_fired(&fired)));
    }
    info!("timer dispatcher stopped");
}
