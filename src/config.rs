use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// SQLite database path for the relational primary.
    pub db_path: PathBuf,
    /// Root directory for the file-backed secondary.
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// External LLM collaborator used for business-type classification and
/// competitor discovery. Treated as unreliable: malformed output degrades
/// to an empty candidate list, never a failed session.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_classifier_model")]
    pub model: String,
    /// Bearer token; empty means no Authorization header.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_classifier_endpoint(),
            model: default_classifier_model(),
            api_key: String::new(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}

fn default_classifier_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_classifier_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_classifier_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Collection strategy: `browser` (headless render service) or `http`
    /// (plain GET).
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Endpoint of the headless render service (browser strategy only).
    #[serde(default = "default_render_endpoint")]
    pub render_endpoint: String,
    #[serde(default = "default_collect_timeout")]
    pub timeout_secs: u64,
    /// Hosts known to break headless rendering; collection for these goes
    /// straight to the deterministic synthetic substitute.
    #[serde(default)]
    pub known_bad_hosts: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            render_endpoint: default_render_endpoint(),
            timeout_secs: default_collect_timeout(),
            known_bad_hosts: Vec::new(),
        }
    }
}

fn default_strategy() -> String {
    "http".to_string()
}
fn default_render_endpoint() -> String {
    "http://127.0.0.1:3030/render".to_string()
}
fn default_collect_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainingConfig {
    /// Days after which a previously analyzed site becomes stale.
    #[serde(default = "default_freshness_days")]
    pub freshness_days: i64,
    /// Number of collection workers. Per-site work is sequential by
    /// default to bound concurrent render contexts.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Optional delay between pipeline steps, to pace progress reporting.
    #[serde(default)]
    pub step_delay_ms: u64,
    /// Sample count for global runs when the request omits one.
    #[serde(default = "default_sample_count")]
    pub default_sample_count: u64,
    /// Business profile used by global discovery runs.
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub business_description: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            freshness_days: default_freshness_days(),
            workers: default_workers(),
            step_delay_ms: 0,
            default_sample_count: default_sample_count(),
            business_name: String::new(),
            business_description: String::new(),
        }
    }
}

fn default_freshness_days() -> i64 {
    crate::freshness::DEFAULT_WINDOW_DAYS
}
fn default_workers() -> usize {
    1
}
fn default_sample_count() -> u64 {
    10
}

impl Config {
    /// Minimal config for tests and tooling: everything under `root`.
    pub fn minimal(root: &Path) -> Self {
        Self {
            storage: StorageConfig {
                db_path: root.join("siteminer.sqlite"),
                data_dir: root.join("data"),
            },
            server: ServerConfig {
                bind: "127.0.0.1:7430".to_string(),
            },
            classifier: ClassifierConfig::default(),
            collector: CollectorConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.collector.timeout_secs == 0 {
        anyhow::bail!("collector.timeout_secs must be > 0");
    }

    match config.collector.strategy.as_str() {
        "http" | "browser" => {}
        other => anyhow::bail!(
            "Unknown collector strategy: '{}'. Must be http or browser.",
            other
        ),
    }

    if config.training.workers == 0 {
        anyhow::bail!("training.workers must be >= 1");
    }

    if config.training.freshness_days < 1 {
        anyhow::bail!("training.freshness_days must be >= 1");
    }

    Ok(config)
}
