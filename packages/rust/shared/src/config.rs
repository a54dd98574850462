//! Application configuration for Courier.
//!
//! User config lives at `~/.courier/courier.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! Secrets are never stored in the config file, only the names of the
//! environment variables that point at them. At runtime a secret is read
//! from `<NAME>_FILE` (Docker-secret style file indirection).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CourierError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "courier.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".courier";

// ---------------------------------------------------------------------------
// Config structs (matching courier.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Job tuning knobs.
    #[serde(default)]
    pub job: JobSection,

    /// Contact source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Messaging gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// CRM settings.
    #[serde(default)]
    pub crm: CrmConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// `[job]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSection {
    /// Contacts fetched per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Maximum concurrent workers per page.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retry ceiling for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in ms (doubled per attempt).
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

impl Default for JobSection {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

fn default_page_size() -> u32 {
    100
}
fn default_concurrency() -> usize {
    8
}
fn default_max_retries() -> u32 {
    4
}
fn default_base_backoff_ms() -> u64 {
    500
}

/// `[source]` section — where follow-up contacts are paged from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the internal contact source.
    #[serde(default = "default_source_url")]
    pub base_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_url(),
        }
    }
}

fn default_source_url() -> String {
    "http://localhost:3000".into()
}

/// `[gateway]` section — the outbound messaging gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the messaging gateway.
    #[serde(default = "default_gateway_url")]
    pub base_url: String,

    /// Name of the env var pointing at the gateway token (never the token).
    #[serde(default = "default_gateway_token_env")]
    pub api_token_env: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            api_token_env: default_gateway_token_env(),
        }
    }
}

fn default_gateway_url() -> String {
    "http://localhost:3000".into()
}
fn default_gateway_token_env() -> String {
    "GATEWAY_API_TOKEN".into()
}

/// `[crm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Base URL of the CRM instance.
    #[serde(default = "default_crm_url")]
    pub base_url: String,

    /// CRM account identifier.
    #[serde(default = "default_account_id")]
    pub account_id: u64,

    /// Name of the env var pointing at the CRM access token.
    #[serde(default = "default_crm_token_env")]
    pub api_token_env: String,

    /// Inbox ids eligible for follow-up notes. Empty means "filter by
    /// channel type instead".
    #[serde(default)]
    pub allowed_inbox_ids: Vec<i64>,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: default_crm_url(),
            account_id: default_account_id(),
            api_token_env: default_crm_token_env(),
            allowed_inbox_ids: Vec::new(),
        }
    }
}

fn default_crm_url() -> String {
    "http://localhost:3000".into()
}
fn default_account_id() -> u64 {
    1
}
fn default_crm_token_env() -> String {
    "CRM_API_TOKEN".into()
}

/// `[observability]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Path of the append-only JSONL results file.
    #[serde(default = "default_results_file")]
    pub results_file: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            results_file: default_results_file(),
        }
    }
}

fn default_results_file() -> String {
    "followup-results.jsonl".into()
}

// ---------------------------------------------------------------------------
// Job config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime job configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Contacts fetched per page.
    pub page_size: u32,
    /// Maximum concurrent workers per page.
    pub concurrency: usize,
    /// Retry ceiling for transient failures.
    pub max_retries: u32,
    /// Base backoff delay in ms.
    pub base_backoff_ms: u64,
    /// Path of the append-only results file.
    pub results_file: PathBuf,
    /// Inbox ids eligible for follow-up notes.
    pub allowed_inbox_ids: Vec<i64>,
}

impl From<&AppConfig> for JobConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            page_size: config.job.page_size,
            concurrency: config.job.concurrency,
            max_retries: config.job.max_retries,
            base_backoff_ms: config.job.base_backoff_ms,
            results_file: PathBuf::from(&config.observability.results_file),
            allowed_inbox_ids: config.crm.allowed_inbox_ids.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.courier/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CourierError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.courier/courier.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| CourierError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CourierError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CourierError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CourierError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CourierError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

// ---------------------------------------------------------------------------
// Secret resolution
// ---------------------------------------------------------------------------

/// Resolve a secret named by `var_name`.
///
/// Reads `<var_name>_FILE` and loads the secret from that file (Docker
/// secrets). A value supplied through the plain environment variable is
/// rejected so tokens never live in process environments or shell history.
pub fn resolve_secret(var_name: &str) -> Result<String> {
    let file_var = format!("{var_name}_FILE");

    if let Ok(path) = std::env::var(&file_var) {
        let secret = std::fs::read_to_string(&path)
            .map_err(|e| CourierError::config(format!("secret file {path} unreadable: {e}")))?;
        let trimmed = secret.trim();
        if trimmed.is_empty() {
            return Err(CourierError::config(format!("secret file {path} is empty")));
        }
        return Ok(trimmed.to_string());
    }

    if std::env::var(var_name).is_ok() {
        return Err(CourierError::config(format!(
            "{var_name} was provided via plain environment variable. Use {file_var} with a secret file."
        )));
    }

    Err(CourierError::config(format!("missing secret: {file_var}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("page_size"));
        assert!(toml_str.contains("CRM_API_TOKEN"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.job.page_size, 100);
        assert_eq!(parsed.job.concurrency, 8);
        assert_eq!(parsed.gateway.api_token_env, "GATEWAY_API_TOKEN");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[job]
concurrency = 2

[crm]
base_url = "https://crm.example.com"
account_id = 7
allowed_inbox_ids = [3, 5]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.job.concurrency, 2);
        assert_eq!(config.job.max_retries, 4);
        assert_eq!(config.crm.account_id, 7);
        assert_eq!(config.crm.allowed_inbox_ids, vec![3, 5]);
    }

    #[test]
    fn job_config_from_app_config() {
        let app = AppConfig::default();
        let job = JobConfig::from(&app);
        assert_eq!(job.page_size, 100);
        assert_eq!(job.max_retries, 4);
        assert_eq!(job.base_backoff_ms, 500);
        assert!(job.allowed_inbox_ids.is_empty());
    }

    #[test]
    fn secret_from_file_indirection() {
        let path = std::env::temp_dir().join(format!("courier-secret-{}", uuid::Uuid::now_v7()));
        std::fs::write(&path, "tok-123\n").expect("write secret file");

        // Use a unique env var name to avoid interfering with other tests
        let var = "COURIER_TEST_SECRET_A";
        unsafe { std::env::set_var(format!("{var}_FILE"), &path) };

        let secret = resolve_secret(var).expect("resolve");
        assert_eq!(secret, "tok-123");

        unsafe { std::env::remove_var(format!("{var}_FILE")) };
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn secret_rejects_plain_env() {
        let var = "COURIER_TEST_SECRET_B";
        unsafe { std::env::set_var(var, "tok-plain") };

        let result = resolve_secret(var);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("plain environment variable")
        );

        unsafe { std::env::remove_var(var) };
    }

    #[test]
    fn secret_missing_entirely() {
        let result = resolve_secret("COURIER_TEST_SECRET_C");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("missing secret"));
    }
}
