//! Shared application state handed to every handler.

use std::sync::Arc;

use tokio::sync::Mutex;

use chatflow_store::Database;

use crate::config::ServerConfig;
use crate::hotspot::NetworkGroups;
use crate::rooms::Rooms;
use crate::sessions::SessionRegistry;

/// Cloneable handle over all shared server state. The database sits behind
/// a mutex because the SQLite connection is not `Sync`; every other part is
/// independently synchronized.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub registry: SessionRegistry,
    pub networks: NetworkGroups,
    pub rooms: Rooms,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            registry: SessionRegistry::new(),
            networks: NetworkGroups::new(),
            rooms: Rooms::new(),
            config: Arc::new(config),
        }
    }
}

#[cfg(test)]
impl AppState {
    /// State over an in-memory database, for handler tests.
    pub fn for_tests() -> Self {
        let db = Database::open_in_memory().expect("in-memory database");
        Self::new(db, ServerConfig::default())
    }
}
