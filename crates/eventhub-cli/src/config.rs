use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use eventhub_client::ClientConfig;
use serde::{Deserialize, Serialize};

use crate::cli::OutputFormat;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct ProfileConfig {
    pub server: Option<String>,
    pub format: Option<OutputFormat>,
}

pub type ConfigFile = HashMap<String, ProfileConfig>;

fn config_dir() -> Result<PathBuf> {
    let dir = dirs::home_dir()
        .context("Cannot determine home directory")?
        .join(".eventhub");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn load_all(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::new());
    }
    let content = fs::read_to_string(path)?;
    let cfg: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    Ok(cfg)
}

pub fn load_profile(path: &Path, profile: &str) -> Result<ProfileConfig> {
    Ok(load_all(path)?.remove(profile).unwrap_or_default())
}

pub fn save_profile(path: &Path, profile: &str, config: &ProfileConfig) -> Result<()> {
    let mut all = load_all(path)?;
    all.insert(profile.to_string(), config.clone());
    let content = toml::to_string_pretty(&all)?;
    fs::write(path, content)?;
    Ok(())
}

/// Picks the backend URL: `--server` / `EVENTHUB_URL`, then the profile, then
/// the client config (which defaults to a local backend).
pub fn resolve_server(
    cli_server: &Option<String>,
    profile: &ProfileConfig,
    client: &ClientConfig,
) -> String {
    if let Some(s) = cli_server {
        return s.clone();
    }
    if let Some(s) = &profile.server {
        return s.clone();
    }
    client.base_url.clone()
}

/// Applies `key = value` to a profile.
pub fn set_key(cfg: &mut ProfileConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "server" => cfg.server = Some(value.trim_end_matches('/').to_string()),
        "format" => {
            let format = match value {
                "json" => OutputFormat::Json,
                "table" => OutputFormat::Table,
                other => anyhow::bail!("Unknown format: {other}. Valid formats: table, json"),
            };
            cfg.format = Some(format);
        }
        other => anyhow::bail!("Unknown config key: {other}. Valid keys: server, format"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert_eq!(load_profile(&path, "default").unwrap(), ProfileConfig::default());

        let mut staging = ProfileConfig::default();
        set_key(&mut staging, "server", "https://staging.example.com/").unwrap();
        set_key(&mut staging, "format", "json").unwrap();
        save_profile(&path, "staging", &staging).unwrap();

        let loaded = load_profile(&path, "staging").unwrap();
        assert_eq!(loaded.server.as_deref(), Some("https://staging.example.com"));
        assert_eq!(loaded.format, Some(OutputFormat::Json));
        assert_eq!(load_profile(&path, "default").unwrap(), ProfileConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut cfg = ProfileConfig::default();
        assert!(set_key(&mut cfg, "color", "always").is_err());
        assert!(set_key(&mut cfg, "format", "yaml").is_err());
    }

    #[test]
    fn server_resolution_order() {
        let client = ClientConfig::default();
        let profile = ProfileConfig {
            server: Some("https://profile.example.com".into()),
            format: None,
        };

        let flag = Some("https://flag.example.com".to_string());
        assert_eq!(
            resolve_server(&flag, &profile, &client),
            "https://flag.example.com"
        );
        assert_eq!(
            resolve_server(&None, &profile, &client),
            "https://profile.example.com"
        );
        assert_eq!(
            resolve_server(&None, &ProfileConfig::default(), &client),
            client.base_url
        );
    }
}
