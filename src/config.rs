use adaptive_locator_core::fingerprint::{
    default_allowlist, default_denylist, ExtractOptions, DEFAULT_MAX_ATTRIBUTE_COUNT,
    DEFAULT_MAX_TEXT_SNIPPET_LEN,
};
use adaptive_locator_core::relocate::{DEFAULT_EXPLAIN_LIMIT, DEFAULT_THRESHOLD};
use adaptive_locator_core::score::Weights;
use adaptive_locator_core::store::{DomainAliases, DEFAULT_HISTORY_LIMIT};
use adaptive_locator_core::{Mode, Options};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
    #[serde(default)]
    pub domains: DomainsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./data/fingerprints")
}
fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_explain_limit")]
    pub explain_limit: usize,
    #[serde(default)]
    pub weights: WeightsConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            explain_limit: DEFAULT_EXPLAIN_LIMIT,
            weights: WeightsConfig::default(),
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}
fn default_explain_limit() -> usize {
    DEFAULT_EXPLAIN_LIMIT
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeightsConfig {
    #[serde(default = "default_text_weight")]
    pub text: f64,
    #[serde(default = "default_attr_weight")]
    pub attr: f64,
    #[serde(default = "default_structure_weight")]
    pub structure: f64,
    #[serde(default = "default_position_weight")]
    pub position: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        let w = Weights::default();
        Self {
            text: w.text,
            attr: w.attr,
            structure: w.structure,
            position: w.position,
        }
    }
}

fn default_text_weight() -> f64 {
    Weights::default().text
}
fn default_attr_weight() -> f64 {
    Weights::default().attr
}
fn default_structure_weight() -> f64 {
    Weights::default().structure
}
fn default_position_weight() -> f64 {
    Weights::default().position
}

impl WeightsConfig {
    pub fn to_weights(&self) -> Weights {
        Weights {
            text: self.text,
            attr: self.attr,
            structure: self.structure,
            position: self.position,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FingerprintConfig {
    #[serde(default = "default_max_text_snippet_len")]
    pub max_text_snippet_len: usize,
    #[serde(default = "default_max_attribute_count")]
    pub max_attribute_count: usize,
    #[serde(default = "default_allowlist")]
    pub attribute_allowlist: Vec<String>,
    #[serde(default = "default_denylist")]
    pub value_denylist: Vec<String>,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            max_text_snippet_len: DEFAULT_MAX_TEXT_SNIPPET_LEN,
            max_attribute_count: DEFAULT_MAX_ATTRIBUTE_COUNT,
            attribute_allowlist: default_allowlist(),
            value_denylist: default_denylist(),
        }
    }
}

fn default_max_text_snippet_len() -> usize {
    DEFAULT_MAX_TEXT_SNIPPET_LEN
}
fn default_max_attribute_count() -> usize {
    DEFAULT_MAX_ATTRIBUTE_COUNT
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdaptiveConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub save: bool,
    #[serde(default)]
    pub refresh_on_relocate: bool,
    /// Relocation time budget in milliseconds; `0` disables the limit.
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            save: false,
            refresh_on_relocate: false,
            time_budget_ms: default_time_budget_ms(),
        }
    }
}

fn default_mode() -> String {
    "adaptive".to_string()
}
fn default_time_budget_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DomainsConfig {
    /// Alias host → canonical domain key.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Result<Mode> {
        Ok(self.adaptive.mode.parse::<Mode>()?)
    }

    /// Engine options described by this config.
    pub fn engine_options(&self) -> Options {
        let time_budget = match self.adaptive.time_budget_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        Options {
            weights: self.scoring.weights.to_weights(),
            threshold: self.scoring.threshold,
            explain_limit: self.scoring.explain_limit,
            extract: ExtractOptions {
                max_text_snippet_len: self.fingerprint.max_text_snippet_len,
                max_attribute_count: self.fingerprint.max_attribute_count,
                attribute_allowlist: self.fingerprint.attribute_allowlist.clone(),
                value_denylist: self.fingerprint.value_denylist.clone(),
            },
            refresh_on_relocate: self.adaptive.refresh_on_relocate,
            time_budget,
            aliases: self.domains.aliases.iter().collect::<DomainAliases>(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Like [`load_config`], but a missing file yields [`Config::minimal`].
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::minimal());
    }
    load_config(path)
}

fn validate(config: &Config) -> Result<()> {
    // Validate scoring
    if !(0.0..=1.0).contains(&config.scoring.threshold) {
        anyhow::bail!("scoring.threshold must be in [0.0, 1.0]");
    }
    if config.scoring.explain_limit < 1 {
        anyhow::bail!("scoring.explain_limit must be >= 1");
    }
    config
        .scoring
        .weights
        .to_weights()
        .validate()
        .context("Invalid [scoring.weights]")?;

    // Validate fingerprint bounds
    if config.fingerprint.max_text_snippet_len == 0 {
        anyhow::bail!("fingerprint.max_text_snippet_len must be > 0");
    }

    // Validate adaptive
    config
        .mode()
        .context("Invalid adaptive.mode (expected adaptive, literal, or literal_only)")?;

    for (alias, canonical) in &config.domains.aliases {
        if alias.trim().is_empty() || canonical.trim().is_empty() {
            anyhow::bail!("domains.aliases entries must be non-empty host names");
        }
    }

    Ok(())
}
