mod cli;
mod commands;
mod config;
mod observability;
mod output;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use eventhub_client::config::loader::load_config;
use eventhub_client::{
    ApiClient, Community, Event, FileStorage, ManagedUser, SessionEvent, SessionStore,
};
use tokio::sync::broadcast;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    observability::init_tracing_with_level(&cli.log_level);

    let profile = &cli.profile;
    let config_path = config::config_path()?;

    // Commands that never talk to the backend
    if let Commands::Config(args) = &cli.command {
        return run_config(&config_path, profile, &args.command);
    }

    let profile_cfg = config::load_profile(&config_path, profile)?;
    let format = cli.format.or(profile_cfg.format).unwrap_or_default();

    let mut client_cfg = load_config(cli.config.as_deref()).map_err(anyhow::Error::msg)?;
    client_cfg.base_url = config::resolve_server(&cli.server, &profile_cfg, &client_cfg);
    tracing::debug!(server = %client_cfg.base_url, profile = %profile, "using backend");

    let storage = FileStorage::for_profile(profile).context("Failed to open session storage")?;
    let session = Arc::new(SessionStore::restore(Arc::new(storage))?);
    let client = ApiClient::new(&client_cfg, session)?;
    let mut events = client.session().subscribe();

    let result = match &cli.command {
        Commands::Login(args) => commands::auth::login(&client, args).await,
        Commands::Logout => commands::auth::logout(&client).await,
        Commands::Whoami => commands::auth::whoami(&client, profile),
        Commands::Status => commands::server::status(&client).await,
        Commands::Events(args) => {
            commands::resources::run::<Event>(&client, &args.command, format).await
        }
        Commands::Communities(args) => {
            commands::resources::run::<Community>(&client, &args.command, format).await
        }
        Commands::Users(args) => {
            commands::resources::run::<ManagedUser>(&client, &args.command, format).await
        }
        Commands::Settings(args) => commands::settings::run(&client, &args.command, format).await,
        Commands::Config(args) => run_config(&config_path, profile, &args.command),
    };

    report_session_events(&mut events);
    result
}

/// Tells the user when the session was dropped while running a command.
fn report_session_events(events: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        if event == SessionEvent::Invalidated {
            print_error("Your session has expired. Run `eventhub login` to sign in again.");
        }
    }
}

fn run_config(
    path: &std::path::Path,
    profile: &str,
    command: &cli::ConfigCommands,
) -> Result<()> {
    let mut cfg = config::load_profile(path, profile)?;
    match command {
        cli::ConfigCommands::Show => {
            println!("{}: {}", "Profile".cyan(), profile);
            println!(
                "{}: {}",
                "Server".cyan(),
                cfg.server.as_deref().unwrap_or("(not set)")
            );
            println!(
                "{}: {}",
                "Format".cyan(),
                match cfg.format.unwrap_or_default() {
                    cli::OutputFormat::Table => "table",
                    cli::OutputFormat::Json => "json",
                }
            );
        }
        cli::ConfigCommands::Set(args) => {
            config::set_key(&mut cfg, &args.key, &args.value)?;
            config::save_profile(path, profile, &cfg)?;
            output::print_success(&format!("Set {} = {}", args.key, args.value));
        }
    }
    Ok(())
}
