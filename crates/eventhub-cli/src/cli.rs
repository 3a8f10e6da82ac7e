use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "eventhub")]
#[command(about = "Eventhub admin CLI: manage events, communities, users and settings")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Backend base URL (overrides config and EVENTHUB_URL env var)
    #[arg(short, long, global = true, env = "EVENTHUB_URL")]
    pub server: Option<String>,

    /// Profile name; each profile keeps its own session
    #[arg(short, long, global = true, env = "EVENTHUB_PROFILE", default_value = "default")]
    pub profile: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Client config file (defaults to ./eventhub.toml when present)
    #[arg(long, global = true, env = "EVENTHUB_CONFIG")]
    pub config: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Clone, Copy, ValueEnum, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in with a one-time code sent by email
    Login(LoginArgs),
    /// Log out and forget the stored session
    Logout,
    /// Show the logged-in account
    Whoami,
    /// Check backend health
    Status,
    /// Manage events
    Events(ResourceArgs),
    /// Manage communities
    Communities(ResourceArgs),
    /// Manage user accounts
    Users(ResourceArgs),
    /// View or change platform settings
    Settings(SettingsArgs),
    /// Manage CLI configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct LoginArgs {
    /// Account email
    #[arg(short, long)]
    pub email: String,
    /// One-time code (prompted for when omitted)
    #[arg(long)]
    pub otp: Option<String>,
    /// Log out other devices without asking if the account is signed in elsewhere
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args)]
pub struct ResourceArgs {
    #[command(subcommand)]
    pub command: ResourceCommands,
}

#[derive(Subcommand)]
pub enum ResourceCommands {
    /// List one page
    List(ListArgs),
    /// Show one record
    Get(IdArgs),
    /// Create a record from JSON
    Create(WriteArgs),
    /// Replace a record from JSON
    Update(UpdateArgs),
    /// Delete a record
    Delete(IdArgs),
}

#[derive(clap::Args)]
pub struct ListArgs {
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    #[arg(long, default_value_t = 10)]
    pub limit: u32,
    /// Free-text search
    #[arg(short = 'q', long)]
    pub search: Option<String>,
    /// Filters as key=value pairs (e.g. status=published)
    #[arg(long = "filter")]
    pub filters: Vec<String>,
}

#[derive(clap::Args)]
pub struct IdArgs {
    pub id: String,
}

#[derive(clap::Args)]
pub struct WriteArgs {
    /// Path to JSON file (reads from stdin if omitted)
    #[arg(long)]
    pub file: Option<String>,
    /// Image to embed (event cover, community logo, user avatar)
    #[arg(long)]
    pub image: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct UpdateArgs {
    pub id: String,
    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(clap::Args)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommands,
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Show current settings
    Show,
    /// Change one setting (value is parsed as JSON, falling back to a string)
    Set(KeyValueArgs),
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current config
    Show,
    /// Set config value
    Set(KeyValueArgs),
}

#[derive(clap::Args)]
pub struct KeyValueArgs {
    pub key: String,
    pub value: String,
}
