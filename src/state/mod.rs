pub mod registry;
pub mod room;
pub mod state_machine;
pub mod timers;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::{
    config::AppConfig,
    error::RoomError,
    services::broadcast,
    state::{
        registry::{Outcome, RoomRegistry},
        room::ConnectionId,
        timers::TimerFired,
    },
};

pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push messages to a connected client.
pub struct ClientConnection {
    pub id: ConnectionId,
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state: the room registry plus every open socket.
///
/// The registry sits behind a plain mutex. Registry operations never await,
/// so one lock acquisition covers validation, mutation, timer bookkeeping and
/// the enqueueing of the resulting deliveries.
pub struct AppState {
    registry: Mutex<RoomRegistry>,
    connections: DashMap<ConnectionId, ClientConnection>,
    config: Arc<AppConfig>,
}

impl AppState {
    /// Construct the shared state together with the receiver timer tasks report to.
    ///
    /// The receiver must be handed to the timer dispatcher, otherwise countdowns never advance.
    pub fn new(config: AppConfig) -> (SharedState, mpsc::UnboundedReceiver<TimerFired>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let registry = RoomRegistry::new(fired_tx, config.default_time_limit);
        let state = Arc::new(Self {
            registry: Mutex::new(registry),
            connections: DashMap::new(),
            config: Arc::new(config),
        });
        (state, fired_rx)
    }

    /// Runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Registry of open sockets keyed by connection id.
    pub fn connections(&self) -> &DashMap<ConnectionId, ClientConnection> {
        &self.connections
    }

    /// Run `f` with exclusive access to the registry.
    pub fn with_registry<T>(&self, f: impl FnOnce(&mut RoomRegistry) -> T) -> T {
        let mut registry = self.lock_registry();
        f(&mut registry)
    }

    /// Run a registry operation and deliver its outcome before releasing the lock,
    /// so every client observes a room's events in the order they were produced.
    pub fn apply<F>(&self, f: F) -> Result<(), RoomError>
    where
        F: FnOnce(&mut RoomRegistry) -> Result<Outcome, RoomError>,
    {
        let mut registry = self.lock_registry();
        let outcome = f(&mut registry)?;
        broadcast::deliver(self, outcome);
        Ok(())
    }

    fn lock_registry(&self) -> MutexGuard<'_, RoomRegistry> {
        // Operations validate before they mutate, so a poisoned registry is still consistent.
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
