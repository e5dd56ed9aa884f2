use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::database::{self, accounts, queries};
use crate::models::Settings;
use crate::services::advisory::AdvisoryReminders;
use crate::services::notifier::ReminderNotifier;
use crate::services::reminder_sweep;
use crate::state::AppState;
use crate::utils::config;

#[derive(Parser, Debug)]
#[command(version, about = "Precision-aware timetables with reminders")]
pub struct Cli {
    /// Settings file; missing means defaults.
    #[arg(long, global = true, env = "TIMETABLES_CONFIG", default_value = "settings.json")]
    pub config: PathBuf,

    /// SQLite database path, overrides the settings file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API and the reminder sweep (default).
    Serve {
        /// Address to bind, e.g. 127.0.0.1:3001.
        #[arg(long)]
        listen: Option<String>,
    },
    /// Print countdown notices for one timetable's reminders.
    Watch {
        #[arg(long)]
        username: String,
        #[arg(long)]
        timetable: i64,
        /// Seconds between reloads of the entry list.
        #[arg(long, default_value_t = 30)]
        reload_secs: u64,
    },
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = config::load_settings(&self.config)?;
        if let Some(db) = &self.db {
            settings.server.database_path = db.display().to_string();
        }
        Ok(settings)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let mut settings = self.settings()?;
        match self.command {
            None => serve(settings).await,
            Some(Command::Serve { listen }) => {
                if let Some(listen) = listen {
                    settings.server.listen = listen;
                }
                serve(settings).await
            }
            Some(Command::Watch {
                username,
                timetable,
                reload_secs,
            }) => watch(settings, &username, timetable, reload_secs).await,
        }
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let db_path = PathBuf::from(&settings.server.database_path);
    let conn = database::init_database(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    let listen = settings.server.listen.clone();
    let state = AppState::new(conn, settings)?;

    if state.settings.reminders.enabled {
        let notifier = ReminderNotifier::from_settings(&state.settings.reminders)?;
        reminder_sweep::start_reminder_sweep(state.clone(), notifier);
    } else {
        log::info!("Reminder sweep disabled");
    }

    let app = commands::build_router(state);
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {}", listen))?;
    log::info!("Listening on http://{}", listen);
    log::info!("DB: {}", db_path.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn watch(settings: Settings, username: &str, timetable_id: i64, reload_secs: u64) -> anyhow::Result<()> {
    let display = settings.general.display_config()?;
    let db_path = PathBuf::from(&settings.server.database_path);
    let conn = database::init_database(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    let owner = accounts::find_user(&conn, username)?
        .with_context(|| format!("no user named '{}'", username))?;

    let (mut reminders, mut notices) = AdvisoryReminders::new(display);
    let mut reload = tokio::time::interval(Duration::from_secs(reload_secs.max(1)));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = reload.tick() => {
                let entries = queries::list_entries(&conn, owner.id, timetable_id)?;
                reminders.load(&entries, Utc::now());
                log::debug!("Watching {} reminders in timetable {}", reminders.armed(), timetable_id);
            }
            Some(notice) = notices.recv() => {
                println!("⏰ {} ({})", notice.title, notice.display_date);
            }
            _ = &mut shutdown => break,
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    log::info!("Shutdown requested");
}
