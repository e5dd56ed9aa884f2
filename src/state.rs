use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::models::{DisplayConfig, Settings};

/// Shared by request handlers and the reminder sweep.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub settings: Arc<Settings>,
    pub display: DisplayConfig,
}

impl AppState {
    pub fn new(conn: Connection, settings: Settings) -> anyhow::Result<Self> {
        let display = settings.general.display_config()?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            settings: Arc::new(settings),
            display,
        })
    }
}
