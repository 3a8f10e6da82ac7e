use anyhow::Result;
use colored::Colorize;
use eventhub_client::{ApiClient, Section, require_section};
use serde_json::{Map, Value};

use crate::cli::{OutputFormat, SettingsCommands};
use crate::output::{print_item, print_success};

pub async fn run(client: &ApiClient, command: &SettingsCommands, format: OutputFormat) -> Result<()> {
    require_section(client.session(), Section::Settings)?;
    let settings = client.settings();

    match command {
        SettingsCommands::Show => {
            print_item(&settings.get().await?, format)?;
        }
        SettingsCommands::Set(args) => {
            let mut changes = Map::new();
            changes.insert(args.key.clone(), parse_value(&args.value));
            let updated = settings.update(&Value::Object(changes)).await?;
            print_success(&format!("Set {} = {}", args.key.cyan(), args.value));
            print_item(&updated, format)?;
        }
    }
    Ok(())
}

/// `true`, `42`, `{"a":1}` are JSON; anything else is taken as a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
