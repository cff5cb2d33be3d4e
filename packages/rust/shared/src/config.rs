//! Application configuration for TermForge.
//!
//! User config lives at `~/.termforge/termforge.toml`.
//! CLI flags override config file values, which override defaults.
//! Every tuning knob of the pipeline (size cutoffs, batch bounds, retry
//! and budget policy, quality thresholds) lives here rather than as
//! scattered literals.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TermForgeError};
use crate::types::ContentCategory;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "termforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".termforge";

// ---------------------------------------------------------------------------
// Config structs (matching termforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// AI backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Ingestion policies (routing cutoffs, batch bounds).
    #[serde(default)]
    pub ingest: IngestPoliciesConfig,

    /// Generation policies (concurrency, retries, budget).
    #[serde(default)]
    pub generation: GenerationPoliciesConfig,

    /// Quality scoring thresholds.
    #[serde(default)]
    pub quality: QualityConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory holding the pipeline database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Directory for convert-then-stream spool files.
    #[serde(default = "default_spool_dir")]
    pub spool_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            spool_dir: default_spool_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "~/termforge-data".into()
}
fn default_spool_dir() -> String {
    "~/termforge-data/spool".into()
}

/// `[backend]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Chat-completions endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Default model for generation jobs.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Fallback model routed on the final retry attempt.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    /// Per-model token prices used for cost accounting.
    #[serde(default = "default_prices")]
    pub prices: Vec<ModelPrice>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            endpoint: default_endpoint(),
            default_model: default_model(),
            fallback_model: default_fallback_model(),
            prices: default_prices(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1/chat/completions".into()
}
fn default_model() -> String {
    "openai/gpt-4.1-nano".into()
}
fn default_fallback_model() -> String {
    "openai/gpt-3.5-turbo".into()
}
fn default_prices() -> Vec<ModelPrice> {
    vec![
        ModelPrice {
            model: default_model(),
            input_usd_per_mtok: 0.10,
            output_usd_per_mtok: 0.40,
        },
        ModelPrice {
            model: default_fallback_model(),
            input_usd_per_mtok: 0.50,
            output_usd_per_mtok: 1.50,
        },
    ]
}

/// `[[backend.prices]]` entry — USD per million tokens for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPrice {
    pub model: String,
    pub input_usd_per_mtok: f64,
    pub output_usd_per_mtok: f64,
}

impl BackendConfig {
    /// Price entry for a model, if configured.
    pub fn price_for(&self, model: &str) -> Option<&ModelPrice> {
        self.prices.iter().find(|p| p.model == model)
    }
}

/// `[ingest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPoliciesConfig {
    /// Below this size (MB) the file is parsed directly in memory.
    #[serde(default = "default_direct_max_mb")]
    pub direct_max_mb: u64,

    /// At or above this size (MB) the native parser is skipped entirely
    /// and the file is converted to delimited text first.
    #[serde(default = "default_convert_max_mb")]
    pub convert_max_mb: u64,

    /// Flush the batch writer after this many buffered records.
    #[serde(default = "default_batch_max_records")]
    pub batch_max_records: usize,

    /// Flush the batch writer after this many buffered megabytes.
    #[serde(default = "default_batch_max_mb")]
    pub batch_max_mb: u64,
}

impl Default for IngestPoliciesConfig {
    fn default() -> Self {
        Self {
            direct_max_mb: default_direct_max_mb(),
            convert_max_mb: default_convert_max_mb(),
            batch_max_records: default_batch_max_records(),
            batch_max_mb: default_batch_max_mb(),
        }
    }
}

fn default_direct_max_mb() -> u64 {
    50
}
fn default_convert_max_mb() -> u64 {
    200
}
fn default_batch_max_records() -> usize {
    100
}
fn default_batch_max_mb() -> u64 {
    8
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationPoliciesConfig {
    /// Maximum in-flight backend calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempt cap per job (including the first attempt).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds; doubles per retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Hard spend ceiling per generation run, in USD.
    #[serde(default = "default_budget_ceiling_usd")]
    pub budget_ceiling_usd: f64,

    /// Projected cost of one call, used for budget admission before the
    /// real cost is known.
    #[serde(default = "default_estimated_call_cost_usd")]
    pub estimated_call_cost_usd: f64,

    /// Gap processing order: "topdown" or "bottomup".
    #[serde(default = "default_order")]
    pub order: String,
}

impl Default for GenerationPoliciesConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            budget_ceiling_usd: default_budget_ceiling_usd(),
            estimated_call_cost_usd: default_estimated_call_cost_usd(),
            order: default_order(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    2000
}
fn default_budget_ceiling_usd() -> f64 {
    25.0
}
fn default_estimated_call_cost_usd() -> f64 {
    0.002
}
fn default_order() -> String {
    "topdown".into()
}

/// `[quality]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Below this score content is flagged for human review instead of
    /// retried.
    #[serde(default = "default_salvage_floor")]
    pub salvage_floor: f64,

    /// Verify threshold for conceptual sections.
    #[serde(default = "default_threshold_conceptual")]
    pub threshold_conceptual: f64,

    /// Verify threshold for practical sections.
    #[serde(default = "default_threshold_practical")]
    pub threshold_practical: f64,

    /// Verify threshold for reference sections.
    #[serde(default = "default_threshold_reference")]
    pub threshold_reference: f64,

    /// Verify threshold for interactive sections.
    #[serde(default = "default_threshold_interactive")]
    pub threshold_interactive: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            salvage_floor: default_salvage_floor(),
            threshold_conceptual: default_threshold_conceptual(),
            threshold_practical: default_threshold_practical(),
            threshold_reference: default_threshold_reference(),
            threshold_interactive: default_threshold_interactive(),
        }
    }
}

fn default_salvage_floor() -> f64 {
    40.0
}
fn default_threshold_conceptual() -> f64 {
    70.0
}
fn default_threshold_practical() -> f64 {
    70.0
}
fn default_threshold_reference() -> f64 {
    60.0
}
fn default_threshold_interactive() -> f64 {
    60.0
}

impl QualityConfig {
    /// Verify threshold for a section's semantic category.
    pub fn threshold_for(&self, category: ContentCategory) -> f64 {
        match category {
            ContentCategory::Conceptual => self.threshold_conceptual,
            ContentCategory::Practical => self.threshold_practical,
            ContentCategory::Reference => self.threshold_reference,
            ContentCategory::Interactive => self.threshold_interactive,
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config file + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime ingestion configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Below this many bytes: direct in-memory parse.
    pub direct_max_bytes: u64,
    /// At or above this many bytes: always convert-then-stream.
    pub convert_max_bytes: u64,
    /// Batch writer record bound.
    pub batch_max_records: usize,
    /// Batch writer byte bound.
    pub batch_max_bytes: u64,
    /// Spool directory for converted delimited files.
    pub spool_dir: PathBuf,
}

impl From<&AppConfig> for IngestConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            direct_max_bytes: config.ingest.direct_max_mb * 1024 * 1024,
            convert_max_bytes: config.ingest.convert_max_mb * 1024 * 1024,
            batch_max_records: config.ingest.batch_max_records,
            batch_max_bytes: config.ingest.batch_max_mb * 1024 * 1024,
            spool_dir: expand_home(&config.defaults.spool_dir),
        }
    }
}

/// Gap processing order for the generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapOrder {
    TopDown,
    BottomUp,
}

/// Runtime generation configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub budget_ceiling_usd: f64,
    pub estimated_call_cost_usd: f64,
    pub order: GapOrder,
    pub default_model: String,
    pub fallback_model: String,
}

impl From<&AppConfig> for GenerationConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.generation.concurrency.max(1),
            max_attempts: config.generation.max_attempts.max(1),
            backoff_base_ms: config.generation.backoff_base_ms,
            budget_ceiling_usd: config.generation.budget_ceiling_usd,
            estimated_call_cost_usd: config.generation.estimated_call_cost_usd,
            order: if config.generation.order == "bottomup" {
                GapOrder::BottomUp
            } else {
                GapOrder::TopDown
            },
            default_model: config.backend.default_model.clone(),
            fallback_model: config.backend.fallback_model.clone(),
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.termforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TermForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.termforge/termforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TermForgeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| TermForgeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TermForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TermForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TermForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the backend API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.backend.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(TermForgeError::config(format!(
            "backend API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("direct_max_mb"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("budget_ceiling_usd"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.ingest.direct_max_mb, 50);
        assert_eq!(parsed.ingest.convert_max_mb, 200);
        assert_eq!(parsed.generation.max_attempts, 3);
        assert_eq!(parsed.backend.api_key_env, "OPENROUTER_API_KEY");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[generation]
budget_ceiling_usd = 5.0
concurrency = 2
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.generation.budget_ceiling_usd, 5.0);
        assert_eq!(config.generation.concurrency, 2);
        // Untouched sections keep defaults
        assert_eq!(config.generation.max_attempts, 3);
        assert_eq!(config.ingest.batch_max_records, 100);
        assert_eq!(config.quality.salvage_floor, 40.0);
    }

    #[test]
    fn ingest_config_from_app_config() {
        let app = AppConfig::default();
        let ingest = IngestConfig::from(&app);
        assert_eq!(ingest.direct_max_bytes, 50 * 1024 * 1024);
        assert_eq!(ingest.convert_max_bytes, 200 * 1024 * 1024);
        assert_eq!(ingest.batch_max_records, 100);
    }

    #[test]
    fn generation_config_order_parsing() {
        let mut app = AppConfig::default();
        app.generation.order = "bottomup".into();
        assert_eq!(GenerationConfig::from(&app).order, GapOrder::BottomUp);
        app.generation.order = "topdown".into();
        assert_eq!(GenerationConfig::from(&app).order, GapOrder::TopDown);
    }

    #[test]
    fn quality_thresholds_by_category() {
        let quality = QualityConfig::default();
        assert_eq!(quality.threshold_for(ContentCategory::Conceptual), 70.0);
        assert_eq!(quality.threshold_for(ContentCategory::Reference), 60.0);
        assert!(quality.salvage_floor < quality.threshold_for(ContentCategory::Interactive));
    }

    #[test]
    fn model_price_lookup() {
        let backend = BackendConfig::default();
        assert!(backend.price_for("openai/gpt-4.1-nano").is_some());
        assert!(backend.price_for("unknown/model").is_none());
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.backend.api_key_env = "TF_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
