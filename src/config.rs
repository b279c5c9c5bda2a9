use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::catalog::{ExtractionSelectors, Source};
use crate::pipeline::Batch;

const PORTAL_BASE: &str = "https://www.magdeburg.de/Start/B%C3%BCrger-Stadt/Verwaltung-Service/Offene-Verwaltungsdaten/index.php?NavID=37.906&object=tx|";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub extraction: ExtractionSelectors,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub webhook: String,
    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,
    #[serde(default)]
    pub rules: AlertRulesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRulesConfig {
    #[serde(default = "default_true")]
    pub source_changed: bool,
    #[serde(default = "default_true")]
    pub source_failed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<String>,
    pub max_concurrency: Option<usize>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/catalog-watch/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("failed parsing TOML config: {}", path.display()))
    }

    pub fn parse(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(data_dir) = overrides.data_dir {
            self.storage.data_dir = data_dir;
        }
        if let Some(max_concurrency) = overrides.max_concurrency {
            self.runner.max_concurrency = max_concurrency;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template()?)
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    /// Validated batch of the configured sources.
    pub fn batch(&self) -> Result<Batch> {
        Batch::new(self.sources.clone()).context("invalid source configuration")
    }

    pub fn default_template() -> Result<String> {
        toml::to_string_pretty(&Self::default()).context("failed rendering config template")
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            fetch: FetchConfig::default(),
            runner: RunnerConfig::default(),
            extraction: ExtractionSelectors::default(),
            alerts: AlertsConfig::default(),
            sources: default_sources(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook: String::new(),
            enable_stdout: default_enable_stdout(),
            rules: AlertRulesConfig::default(),
        }
    }
}

impl Default for AlertRulesConfig {
    fn default() -> Self {
        Self {
            source_changed: true,
            source_failed: true,
        }
    }
}

fn default_data_dir() -> String {
    "./generated".to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_connect_timeout_secs() -> u64 {
    8
}

fn default_user_agent() -> String {
    concat!("catalog-watch/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_enable_stdout() -> bool {
    true
}

fn default_true() -> bool {
    true
}

fn portal_source(key: &str, title: &str, object: &str) -> Source {
    Source::new(key, title, format!("{PORTAL_BASE}{object}&La=1&"))
}

fn default_sources() -> Vec<Source> {
    vec![
        portal_source("bevoelkerung-demokratie", "Bevölkerung & Demographie", "37.12810.1"),
        portal_source("bildung-kultur-sport", "Bildung, Kultur & Sport", "37.12811.1"),
        portal_source("freizeit-tourismus", "Freizeit & Tourismus", "37.12814.1"),
        portal_source(
            "geographie-geobasisdaten-stadtplanung",
            "Geographie, Geobasisdaten & Stadtplanung",
            "37.12815.1",
        ),
        portal_source("gesundheit-soziales", "Gesundheit & Soziales", "37.12816.1"),
        portal_source("haushalt-steuern", "Haushalt & Steuern", "37.12812.1"),
        portal_source(
            "infrastruktur-bauen-wohnen",
            "Infrastruktur, Bauen & Wohnen",
            "37.12817.1",
        ),
        portal_source("oeffentliche-verwaltung", "Öffentliche Verwaltung", "37.12813.1"),
        portal_source("politik-wahlen", "Politik & Wahlen", "37.12818.1"),
        portal_source("transport-verkehr", "Transport & Verkehr", "37.12821.1"),
        portal_source("umwelt-klima", "Umwelt & Klima", "37.12819.1"),
        portal_source("wirtschaft-arbeit", "Wirtschaft & Arbeit", "37.12820.1"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_observe_the_portal_categories() {
        let config = Config::default();
        assert_eq!(config.sources.len(), 12);
        assert_eq!(config.sources[0].key, "bevoelkerung-demokratie");
        assert!(config.sources[0]
            .locator
            .ends_with("object=tx|37.12810.1&La=1&"));
        assert!(config.batch().is_ok());
        assert_eq!(config.extraction.entry, ".ovd_element");
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = Config::parse(
            r#"
[storage]
data_dir = "/var/lib/catalog-watch"

[[sources]]
key = "umwelt-klima"
title = "Umwelt & Klima"
locator = "https://example.org/umwelt"
"#,
        )
        .expect("parse");
        assert_eq!(config.storage.data_dir, "/var/lib/catalog-watch");
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.fetch.timeout_secs, 20);
        assert_eq!(config.runner.max_concurrency, 4);
        assert!(config.alerts.rules.source_failed);
    }

    #[test]
    fn template_parses_back() {
        let template = Config::default_template().expect("template");
        let parsed = Config::parse(&template).expect("parse template");
        assert_eq!(parsed.sources, Config::default().sources);
        assert_eq!(parsed.extraction, ExtractionSelectors::default());
    }

    #[test]
    fn overrides_replace_values() {
        let mut config = Config::default();
        config.apply_overrides(ConfigOverrides {
            data_dir: Some("/tmp/cw".to_string()),
            max_concurrency: Some(1),
        });
        assert_eq!(config.resolved_data_dir(), PathBuf::from("/tmp/cw"));
        assert_eq!(config.runner.max_concurrency, 1);
    }

    #[test]
    fn duplicate_source_keys_are_rejected() {
        let mut config = Config::default();
        config.sources.push(config.sources[0].clone());
        assert!(config.batch().is_err());
    }
}
