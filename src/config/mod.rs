use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `api.token`
pub const TOKEN_ENV: &str = "BOARDVIEW_API_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

impl Config {
    /// Token from the environment, falling back to the config file
    pub fn api_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.api.token.clone().filter(|t| !t.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub token: Option<String>,
}

fn default_endpoint() -> String {
    "https://api.monday.com/v2".to_string()
}

fn default_api_version() -> String {
    "2024-10".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_version: default_api_version(),
            token: None,
        }
    }
}

/// What the host platform tells us about the signed-in user
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostConfig {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub account_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    20
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
        }
    }
}

/// One retry preset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default)]
    pub default: RetryConfig,
    #[serde(default = "default_items_retry", deserialize_with = "items_retry")]
    pub items: RetryConfig,
}

fn default_items_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 5,
        base_delay_ms: 500,
        ..RetryConfig::default()
    }
}

/// `[retry.items]` as written; missing fields fall back to the items preset
#[derive(Deserialize)]
struct ItemsRetryOverrides {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    backoff_factor: Option<f64>,
    max_delay_ms: Option<u64>,
}

fn items_retry<'de, D>(deserializer: D) -> Result<RetryConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let overrides = ItemsRetryOverrides::deserialize(deserializer)?;
    let preset = default_items_retry();
    Ok(RetryConfig {
        max_attempts: overrides.max_attempts.unwrap_or(preset.max_attempts),
        base_delay_ms: overrides.base_delay_ms.unwrap_or(preset.base_delay_ms),
        backoff_factor: overrides.backoff_factor.unwrap_or(preset.backoff_factor),
        max_delay_ms: overrides.max_delay_ms.unwrap_or(preset.max_delay_ms),
    })
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            default: RetryConfig::default(),
            items: default_items_retry(),
        }
    }
}

/// How a refresh treats a board whose items cannot be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoardErrorMode {
    /// Fail the whole refresh and keep the previous rows
    #[default]
    FailFast,
    /// Show the boards that succeeded and report the rest
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub on_board_error: BoardErrorMode,
}

fn default_concurrency() -> usize {
    1
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            on_board_error: BoardErrorMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Storage file; defaults to `settings.json` in the config directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            path: None,
        }
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let dir = directories::ProjectDirs::from("", "", "boardview")
        .context("Could not determine config directory")?
        .config_dir()
        .to_path_buf();
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn settings_path(config: &Config) -> Result<PathBuf> {
    match &config.settings.path {
        Some(path) => Ok(path.clone()),
        None => Ok(config_dir()?.join("settings.json")),
    }
}

pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        anyhow::bail!(
            "Config file not found at {}. Run `boardview --init` to create one.",
            path.display()
        );
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    parse(&content).with_context(|| format!("Failed to parse config from {}", path.display()))
}

pub fn parse(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

pub async fn init_wizard() -> Result<()> {
    use std::io::{self, Write};

    println!("boardview configuration");
    println!("=======================\n");

    let config_path = default_config_path()?;
    if config_path.exists() {
        print!("Config already exists at {}. Overwrite? [y/N] ", config_path.display());
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let prompt = |label: &str| -> Result<String> {
        print!("{}", label);
        io::stdout().flush()?;
        let mut value = String::new();
        io::stdin().read_line(&mut value)?;
        Ok(value.trim().to_string())
    };

    let token = prompt("API token (leave empty to use $BOARDVIEW_API_TOKEN): ")?;
    let user_id = prompt("Your user id: ")?;
    let account_url = prompt("Account URL (e.g. https://acme.monday.com): ")?;

    let config = Config {
        api: ApiConfig {
            token: if token.is_empty() { None } else { Some(token) },
            ..ApiConfig::default()
        },
        host: HostConfig {
            user_id,
            account_url: account_url.trim_end_matches('/').to_string(),
        },
        ..Config::default()
    };

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Write config with restricted permissions
    let content = toml::to_string_pretty(&config)?;
    std::fs::write(&config_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))?;
    }

    println!("\nConfig saved to {}", config_path.display());
    println!("Run `boardview boards` to see what you can select.");

    Ok(())
}
