mod cli;
mod commands;
mod database;
mod error;
mod models;
mod services;
mod state;
mod utils;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::config::load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    cli::Cli::parse().run().await
}
