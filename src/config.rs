//! Configuration model, defaults, loading, and per-instance resolution.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::HuntError;
use crate::protocol::{ManagerKind, WantedKind};

/// Root configuration read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// State ledger location and default dedup TTL.
    pub state: StateConfig,
    #[serde(default)]
    /// Hunt defaults applied to every instance without an override.
    pub defaults: HuntDefaults,
    #[serde(default)]
    /// Request timeout and retry policy.
    pub http: HttpConfig,
    #[serde(default)]
    /// Wanted-list page sampling.
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub sonarr: Vec<InstanceConfig>,
    #[serde(default)]
    pub radarr: Vec<InstanceConfig>,
}

/// State ledger preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StateConfig {
    /// SQLite file; defaults to `<data dir>/huntarr/huntarr.db`.
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u32,
}

/// Global hunt defaults.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct HuntDefaults {
    #[serde(default = "default_hunt_missing")]
    pub hunt_missing: u32,
    #[serde(default)]
    pub hunt_upgrades: u32,
    #[serde(default = "default_true")]
    pub monitored_only: bool,
    #[serde(default = "default_true")]
    pub skip_future: bool,
}

/// HTTP timeout and retry tuning shared by all instances.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// Wanted-list sampling knobs.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SamplingConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Lists spanning at most this many pages are fetched in full.
    #[serde(default = "default_full_fetch_max_pages")]
    pub full_fetch_max_pages: u32,
    /// Pages drawn at random from larger lists.
    #[serde(default = "default_sample_pages")]
    pub sample_pages: u32,
}

/// One `[[sonarr]]` or `[[radarr]]` entry. Unset overrides fall back to
/// [`HuntDefaults`] and [`StateConfig::ttl_hours`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct InstanceConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub hunt_missing: Option<u32>,
    #[serde(default)]
    pub hunt_upgrades: Option<u32>,
    #[serde(default)]
    pub monitored_only: Option<bool>,
    #[serde(default)]
    pub skip_future: Option<bool>,
    #[serde(default)]
    pub ttl_hours: Option<u32>,
}

/// Instance with every override applied; immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstance {
    pub manager: ManagerKind,
    pub name: String,
    /// Ledger key component, `<manager>/<name>`.
    pub instance_id: String,
    pub url: String,
    pub api_key: String,
    pub hunt_missing: usize,
    pub hunt_upgrades: usize,
    pub monitored_only: bool,
    pub skip_future: bool,
    pub ttl_hours: u32,
}

impl ResolvedInstance {
    /// Per-run trigger cap for `kind`.
    pub fn quota(&self, kind: WantedKind) -> usize {
        match kind {
            WantedKind::Missing => self.hunt_missing,
            WantedKind::Upgrade => self.hunt_upgrades,
        }
    }

    /// Kinds with a non-zero quota, in processing order.
    pub fn enabled_kinds(&self) -> Vec<WantedKind> {
        WantedKind::ALL
            .into_iter()
            .filter(|kind| self.quota(*kind) > 0)
            .collect()
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            database: None,
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl Default for HuntDefaults {
    fn default() -> Self {
        Self {
            hunt_missing: default_hunt_missing(),
            hunt_upgrades: 0,
            monitored_only: true,
            skip_future: true,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            full_fetch_max_pages: default_full_fetch_max_pages(),
            sample_pages: default_sample_pages(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl_hours() -> u32 {
    168
}

fn default_hunt_missing() -> u32 {
    5
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

fn default_page_size() -> u32 {
    100
}

fn default_full_fetch_max_pages() -> u32 {
    3
}

fn default_sample_pages() -> u32 {
    1
}

/// Reads and parses a TOML config file.
pub fn load_config(path: &Path) -> Result<Config, HuntError> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        HuntError::Config(format!("cannot read config file {}: {err}", path.display()))
    })?;
    parse_config(&content)
        .map_err(|err| HuntError::Config(format!("{}: {err}", path.display())))
}

/// Parses config text. An empty document is rejected.
pub fn parse_config(content: &str) -> Result<Config, String> {
    if content.trim().is_empty() {
        return Err("config file is empty".to_string());
    }
    toml::from_str::<Config>(content).map_err(|err| err.to_string())
}

/// Ledger path from config, falling back to the user data directory.
pub fn state_database_path(config: &Config) -> Result<PathBuf, HuntError> {
    if let Some(path) = &config.state.database {
        return Ok(path.clone());
    }
    dirs::data_dir()
        .map(|dir| dir.join("huntarr").join("huntarr.db"))
        .ok_or_else(|| {
            HuntError::Config(
                "no [state].database configured and no user data directory available".to_string(),
            )
        })
}

fn validate_global(config: &Config, problems: &mut Vec<String>) {
    if config.http.timeout_secs == 0 {
        problems.push("[http].timeout_secs must be greater than 0".to_string());
    }
    if config.http.retry_attempts == 0 {
        problems.push("[http].retry_attempts must be greater than 0".to_string());
    }
    if config.sampling.page_size == 0 {
        problems.push("[sampling].page_size must be greater than 0".to_string());
    }
    if config.sampling.full_fetch_max_pages == 0 {
        problems.push("[sampling].full_fetch_max_pages must be greater than 0".to_string());
    }
    if config.sampling.sample_pages == 0 {
        problems.push("[sampling].sample_pages must be greater than 0".to_string());
    }
}

fn resolve_group(
    config: &Config,
    manager: ManagerKind,
    entries: &[InstanceConfig],
    problems: &mut Vec<String>,
) -> Vec<ResolvedInstance> {
    let defaults = &config.defaults;
    let mut seen_names = HashSet::new();
    let mut resolved = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let name = entry
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(manager.default_instance_name())
            .to_string();
        let location = format!("[[{manager}]] #{} ({name})", index + 1);
        let url = entry.url.trim().trim_end_matches('/').to_string();
        let api_key = entry.api_key.trim().to_string();
        let mut valid = true;
        if url.is_empty() {
            problems.push(format!("{location}: url is required"));
            valid = false;
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            problems.push(format!("{location}: url must start with http:// or https://"));
            valid = false;
        }
        if api_key.is_empty() {
            problems.push(format!("{location}: api_key is required"));
            valid = false;
        }
        if !seen_names.insert(name.clone()) {
            problems.push(format!("{location}: duplicate instance name '{name}'"));
            valid = false;
        }
        if !valid {
            continue;
        }
        resolved.push(ResolvedInstance {
            manager,
            instance_id: format!("{manager}/{name}"),
            name,
            url,
            api_key,
            hunt_missing: entry.hunt_missing.unwrap_or(defaults.hunt_missing) as usize,
            hunt_upgrades: entry.hunt_upgrades.unwrap_or(defaults.hunt_upgrades) as usize,
            monitored_only: entry.monitored_only.unwrap_or(defaults.monitored_only),
            skip_future: entry.skip_future.unwrap_or(defaults.skip_future),
            ttl_hours: entry.ttl_hours.unwrap_or(config.state.ttl_hours),
        });
    }
    resolved
}

/// Validates the config and resolves every instance. All problems are
/// reported together in one [`HuntError::Config`].
pub fn resolve_instances(config: &Config) -> Result<Vec<ResolvedInstance>, HuntError> {
    let mut problems = Vec::new();
    validate_global(config, &mut problems);
    let mut instances = resolve_group(config, ManagerKind::Sonarr, &config.sonarr, &mut problems);
    instances.extend(resolve_group(
        config,
        ManagerKind::Radarr,
        &config.radarr,
        &mut problems,
    ));
    if !problems.is_empty() {
        return Err(HuntError::Config(problems.join("; ")));
    }
    Ok(instances)
}
