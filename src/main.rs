mod account;
mod api;
mod app;
mod commands;
mod config;
mod contracts;
mod protocol;
mod results;
mod state;
mod tui;
mod workflow;

use std::{fs::OpenOptions, path::Path, sync::Mutex};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{WrapErr, eyre},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let mut config = config::Config::parse();
    init_tracing(config.log_file.as_deref())?;

    match config.command.take() {
        Some(command) => commands::run(command, &config).await,
        None => {
            let app = app::ClauseLensApp::bootstrap(config).await?;
            app.run().await
        }
    }
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("clauselens=info,clauselens::app=debug"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    // The dashboard owns the terminal, so its logs belong in a file.
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .wrap_err_with(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|err| eyre!(err))?;
        }
        None => {
            builder
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|err| eyre!(err))?;
        }
    }

    Ok(())
}
