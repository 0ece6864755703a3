//! Declarative table of listing sites.
//!
//! Each source is one JSON document naming its URL, the selector that marks the
//! page as ready, the selector for a single listing, and an ordered list of
//! candidate selectors per field. Site-specific fragility lives here as data.

use crate::constants::{BUILTIN_SOURCES, DEFAULT_NAVIGATION_TIMEOUT_MS, DEFAULT_SELECTOR_TIMEOUT_MS};
use crate::error::{Result, ScraperError};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherKind {
    /// Headless Chromium, for pages rendered client-side
    #[default]
    Chromium,
    /// Plain HTTP GET, for server-rendered pages
    Http,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldRule {
    pub selectors: Vec<String>,
    /// Attribute to read instead of the element text, e.g. `href` or `src`.
    #[serde(default)]
    pub attr: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldRules {
    pub title: FieldRule,
    #[serde(default)]
    pub description: Option<FieldRule>,
    #[serde(default)]
    pub date: Option<FieldRule>,
    #[serde(default)]
    pub time: Option<FieldRule>,
    #[serde(default)]
    pub location: Option<FieldRule>,
    #[serde(default)]
    pub price: Option<FieldRule>,
    #[serde(default)]
    pub image_url: Option<FieldRule>,
    #[serde(default)]
    pub source_url: Option<FieldRule>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub url: String,
    #[serde(default)]
    pub fetcher: FetcherKind,
    #[serde(default)]
    pub ready_selector: Option<String>,
    pub item_selector: String,
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,
    #[serde(default = "default_selector_timeout")]
    pub selector_timeout_ms: u64,
    pub fields: FieldRules,
}

fn default_enabled() -> bool {
    true
}

fn default_navigation_timeout() -> u64 {
    DEFAULT_NAVIGATION_TIMEOUT_MS
}

fn default_selector_timeout() -> u64 {
    DEFAULT_SELECTOR_TIMEOUT_MS
}

impl SourceConfig {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Description,
    Date,
    Time,
    Location,
    Price,
    ImageUrl,
    SourceUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFrom {
    Text,
    Attr(String),
}

#[derive(Debug, Clone)]
pub struct CompiledField {
    pub field: Field,
    pub candidates: Vec<Selector>,
    pub read: ReadFrom,
    pub required: bool,
}

/// Selectors compiled once at load time
#[derive(Debug, Clone)]
pub struct SourceRules {
    pub item: Selector,
    pub fields: Vec<CompiledField>,
}

#[derive(Debug, Clone)]
pub struct Source {
    pub config: SourceConfig,
    pub rules: SourceRules,
}

impl Source {
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| ScraperError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

fn compile_field(field: Field, rule: &FieldRule) -> Result<CompiledField> {
    if rule.selectors.is_empty() {
        return Err(ScraperError::Config(format!(
            "field {:?} has no selector candidates",
            field
        )));
    }
    let candidates = rule
        .selectors
        .iter()
        .map(|s| parse_selector(s))
        .collect::<Result<Vec<_>>>()?;
    let read = match &rule.attr {
        Some(attr) => ReadFrom::Attr(attr.clone()),
        None => ReadFrom::Text,
    };
    Ok(CompiledField {
        field,
        candidates,
        read,
        // the title is the dedup key, a listing without one is never kept
        required: rule.required || field == Field::Title,
    })
}

impl SourceRules {
    pub fn compile(config: &SourceConfig) -> Result<Self> {
        let item = parse_selector(&config.item_selector)?;
        let f = &config.fields;
        let optional = [
            (Field::Description, &f.description),
            (Field::Date, &f.date),
            (Field::Time, &f.time),
            (Field::Location, &f.location),
            (Field::Price, &f.price),
            (Field::ImageUrl, &f.image_url),
            (Field::SourceUrl, &f.source_url),
        ];

        let mut fields = vec![compile_field(Field::Title, &f.title)?];
        for (field, rule) in optional {
            if let Some(rule) = rule {
                fields.push(compile_field(field, rule)?);
            }
        }
        Ok(Self { item, fields })
    }
}

impl Source {
    pub fn compile(config: SourceConfig) -> Result<Self> {
        if let Some(ready) = &config.ready_selector {
            parse_selector(ready)?;
        }
        let rules = SourceRules::compile(&config)?;
        Ok(Self { config, rules })
    }
}

#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<Arc<Source>>,
}

impl SourceRegistry {
    pub fn from_configs(configs: Vec<SourceConfig>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut sources = Vec::with_capacity(configs.len());
        for config in configs {
            if !seen.insert(config.name.clone()) {
                return Err(ScraperError::Config(format!(
                    "duplicate source name: {}",
                    config.name
                )));
            }
            debug!("Compiling source {}", config.name);
            sources.push(Arc::new(Source::compile(config)?));
        }
        Ok(Self { sources })
    }

    /// The sources shipped with the binary
    pub fn builtin() -> Result<Self> {
        let configs = BUILTIN_SOURCES
            .iter()
            .map(|(name, doc)| {
                serde_json::from_str::<SourceConfig>(doc).map_err(|e| {
                    ScraperError::Config(format!("built-in source {} is invalid: {}", name, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_configs(configs)
    }

    /// Load every `*.json` file in `dir`, in file-name order
    pub fn load_from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ScraperError::Config(format!(
                "Registry directory does not exist: {}",
                dir.display()
            )));
        }

        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut configs = Vec::with_capacity(paths.len());
        for path in paths {
            let content = fs::read_to_string(&path)?;
            let config: SourceConfig = serde_json::from_str(&content).map_err(|e| {
                ScraperError::Config(format!(
                    "Failed to parse source config {}: {}",
                    path.display(),
                    e
                ))
            })?;
            configs.push(config);
        }
        info!("Loaded {} sources from {}", configs.len(), dir.display());
        Self::from_configs(configs)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Source>> {
        self.sources.iter().find(|s| s.name() == name).cloned()
    }

    pub fn all(&self) -> &[Arc<Source>] {
        &self.sources
    }

    pub fn enabled_sources(&self) -> Vec<Arc<Source>> {
        self.sources
            .iter()
            .filter(|s| s.config.enabled)
            .cloned()
            .collect()
    }

    /// Resolve explicit names, or every enabled source when `names` is `None`.
    /// Naming a disabled source runs it anyway.
    pub fn select(&self, names: Option<&[String]>) -> Result<Vec<Arc<Source>>> {
        match names {
            None => Ok(self.enabled_sources()),
            Some(names) => names
                .iter()
                .map(|n| self.get(n).ok_or_else(|| ScraperError::UnknownSource(n.clone())))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{EVENTBRITE_SYDNEY, TIMEOUT_SYDNEY};
    use tempfile::tempdir;

    fn minimal(name: &str) -> SourceConfig {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "url": "https://example.com/events",
            "item_selector": ".card",
            "fields": { "title": { "selectors": ["h2"] } }
        }))
        .unwrap()
    }

    #[test]
    fn test_builtin_sources_compile() {
        let registry = SourceRegistry::builtin().unwrap();
        let names: Vec<_> = registry.all().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec![TIMEOUT_SYDNEY, EVENTBRITE_SYDNEY]);

        let eventbrite = registry.get(EVENTBRITE_SYDNEY).unwrap();
        assert_eq!(eventbrite.rules.fields.len(), 7);
        assert_eq!(eventbrite.config.navigation_timeout_ms, 60_000);
        assert_eq!(eventbrite.config.selector_timeout_ms, 10_000);
    }

    #[test]
    fn test_title_is_always_required() {
        let source = Source::compile(minimal("x")).unwrap();
        let title = &source.rules.fields[0];
        assert_eq!(title.field, Field::Title);
        assert!(title.required);
        assert_eq!(source.config.fetcher, FetcherKind::Chromium);
        assert!(source.config.enabled);
    }

    #[test]
    fn test_invalid_selector_is_config_error() {
        let mut config = minimal("bad");
        config.item_selector = "div[".into();
        let err = Source::compile(config).unwrap_err();
        assert!(matches!(err, ScraperError::Selector { .. }));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = SourceRegistry::from_configs(vec![minimal("a"), minimal("a")]).unwrap_err();
        assert!(matches!(err, ScraperError::Config(_)));
    }

    #[test]
    fn test_select_unknown_and_disabled() {
        let mut off = minimal("off");
        off.enabled = false;
        let registry = SourceRegistry::from_configs(vec![minimal("on"), off]).unwrap();

        assert_eq!(registry.select(None).unwrap().len(), 1);
        let named = registry.select(Some(&["off".to_string()])).unwrap();
        assert_eq!(named[0].name(), "off");
        assert!(matches!(
            registry.select(Some(&["nope".to_string()])),
            Err(ScraperError::UnknownSource(_))
        ));
    }

    #[test]
    fn test_load_from_directory_sorted_json_only() {
        let dir = tempdir().unwrap();
        for name in ["b_source", "a_source"] {
            let doc = serde_json::to_string(&minimal(name)).unwrap();
            fs::write(dir.path().join(format!("{name}.json")), doc).unwrap();
        }
        fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let registry = SourceRegistry::load_from_directory(dir.path()).unwrap();
        let names: Vec<_> = registry.all().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["a_source", "b_source"]);
    }
}
