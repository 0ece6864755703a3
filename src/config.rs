use crate::constants::{
    DEFAULT_ALLOWED_ORIGIN, DEFAULT_DATABASE_URL, DEFAULT_PORT, DEFAULT_SCRAPE_INTERVAL_HOURS,
};
use crate::error::{Result, ScraperError};
use crate::fetch::ChromiumOptions;
use crate::registry::SourceRegistry;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
/// One year
const MAX_SCRAPE_INTERVAL_HOURS: u64 = 24 * 366;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database_url: String,
    pub scrape: ScrapeConfig,
    pub chromium: ChromiumOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub allowed_origin: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Hours between scheduled runs; 0 turns the schedule off
    pub interval_hours: u64,
    pub on_start: bool,
    /// Directory of `*.json` source definitions; built-in sources when unset
    pub sources_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            scrape: ScrapeConfig::default(),
            chromium: ChromiumOptions::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            interval_hours: DEFAULT_SCRAPE_INTERVAL_HOURS,
            on_start: true,
            sources_dir: None,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ScraperError::Config(format!("invalid value for {}: '{}'", key, value)))
}

impl Config {
    /// Read the config file if present. An explicit path must exist; the
    /// default `config.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply overrides from the process environment (after `dotenv`)
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(std::env::vars())
    }

    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "PORT" => self.server.port = parse_env(key, value)?,
                "ALLOWED_ORIGIN" => self.server.allowed_origin = value.trim().to_string(),
                "DATABASE_URL" => self.database_url = value.trim().to_string(),
                "SCRAPE_INTERVAL_HOURS" => self.scrape.interval_hours = parse_env(key, value)?,
                "SCRAPE_ON_START" => self.scrape.on_start = parse_env(key, value)?,
                "SOURCES_DIR" => self.scrape.sources_dir = Some(PathBuf::from(value.trim())),
                "CHROME_EXECUTABLE" => self.chromium.executable = Some(PathBuf::from(value.trim())),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn scrape_interval(&self) -> Result<Option<Duration>> {
        match self.scrape.interval_hours {
            0 => Ok(None),
            hours => hours
                .checked_mul(60 * 60)
                .filter(|_| hours <= MAX_SCRAPE_INTERVAL_HOURS)
                .map(|secs| Some(Duration::from_secs(secs)))
                .ok_or_else(|| {
                    ScraperError::Config(format!("scrape interval of {} hours is too large", hours))
                }),
        }
    }

    pub fn registry(&self) -> Result<SourceRegistry> {
        match &self.scrape.sources_dir {
            Some(dir) => SourceRegistry::load_from_directory(dir),
            None => SourceRegistry::builtin(),
        }
    }
}
