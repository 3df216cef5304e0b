use crate::config::Config;
use crate::engine::registry::RoomRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Online,
    ShuttingDown,
    Restarting,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Online => "online",
            ServerStatus::ShuttingDown => "shutting_down",
            ServerStatus::Restarting => "restarting",
        }
    }
}

/// Shared application state handed to every handler.
pub struct AppState {
    pub registry: RoomRegistry,
    pub config: Config,
    server_status: RwLock<ServerStatus>,
    stop_housekeepers: AtomicBool,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Config) -> SharedState {
        Arc::new(AppState {
            registry: RoomRegistry::new(),
            config,
            server_status: RwLock::new(ServerStatus::Online),
            stop_housekeepers: AtomicBool::new(false),
        })
    }

    pub fn server_status(&self) -> ServerStatus {
        *self
            .server_status
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_server_status(&self, status: ServerStatus) {
        *self
            .server_status
            .write()
            .unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn housekeepers_stopped(&self) -> bool {
        self.stop_housekeepers.load(Ordering::Relaxed)
    }

    pub fn stop_housekeepers(&self) {
        self.stop_housekeepers.store(true, Ordering::Relaxed);
    }
}
