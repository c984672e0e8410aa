//! TOML configuration for the `sguard` binary.
//!
//! Every section is optional; a missing section takes its defaults. When no
//! config file exists, commands that allow it fall back to
//! [`Config::minimal`].
//!
//! ```toml
//! [registry]
//! rejection_threshold = 0.9
//! warning_threshold = 0.8
//!
//! [scan]
//! root = "./src"
//!
//! [audit]
//! sink = "sqlite"
//! path = "./data/audit.sqlite"
//!
//! [schema.tables]
//! users = ["id", "email", "created_at"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use stability_guard_core::catalog::DEFAULT_SIMILAR_THRESHOLD;
use stability_guard_core::gateway::{GatewayConfig, SchemaTables};
use stability_guard_core::registry::{
    RegistryConfig, DEFAULT_REJECTION_THRESHOLD, DEFAULT_WARNING_THRESHOLD,
};
use stability_guard_core::similarity::SimilarityWeights;

pub const DEFAULT_CONFIG_PATH: &str = "./config/sguard.toml";

/// Top-level configuration, one field per TOML section.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Registry thresholds and the startup snapshot.
    #[serde(default)]
    pub registry: RegistrySection,
    /// Catalog similarity threshold and weights.
    #[serde(default)]
    pub catalog: CatalogSection,
    /// Gateway thresholds for the creation decision.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Source tree scanned by `sguard scan` and `--scan`.
    #[serde(default)]
    pub scan: ScanConfig,
    /// Where decisions are recorded.
    #[serde(default)]
    pub audit: AuditConfig,
    /// HTTP tool server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Known tables for table and column requests.
    #[serde(default)]
    pub schema: SchemaConfig,
}

/// `[registry]` section.
#[derive(Debug, Deserialize, Clone)]
pub struct RegistrySection {
    /// Similarity at or above which a registration is rejected.
    #[serde(default = "default_rejection_threshold")]
    pub rejection_threshold: f64,
    /// Similarity at or above which a registration carries a warning.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
    /// JSON snapshot loaded into the registry at startup.
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            rejection_threshold: DEFAULT_REJECTION_THRESHOLD,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            snapshot: None,
        }
    }
}

impl RegistrySection {
    /// The core registry's view of this section.
    pub fn thresholds(&self) -> RegistryConfig {
        RegistryConfig {
            rejection_threshold: self.rejection_threshold,
            warning_threshold: self.warning_threshold,
        }
    }
}

fn default_rejection_threshold() -> f64 {
    DEFAULT_REJECTION_THRESHOLD
}
fn default_warning_threshold() -> f64 {
    DEFAULT_WARNING_THRESHOLD
}

/// `[catalog]` section.
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogSection {
    /// Default threshold for `similar` lookups.
    #[serde(default = "default_similar_threshold")]
    pub similar_threshold: f64,
    /// Per-field blend used by catalog similarity.
    #[serde(default)]
    pub weights: SimilarityWeights,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            similar_threshold: DEFAULT_SIMILAR_THRESHOLD,
            weights: SimilarityWeights::CATALOG,
        }
    }
}

fn default_similar_threshold() -> f64 {
    DEFAULT_SIMILAR_THRESHOLD
}

/// `[scan]` section.
#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Directory walked when no path is given on the command line.
    #[serde(default = "default_scan_root")]
    pub root: PathBuf,
    /// Glob patterns for files to include (e.g., `["**/*.tsx"]`).
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Glob patterns for files to exclude, on top of the built-in ones.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Whether to follow symbolic links during traversal.
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Skip `*.test.*`, `*.spec.*`, `__tests__/` and `__mocks__/`.
    #[serde(default = "default_true")]
    pub skip_tests: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: default_scan_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            skip_tests: true,
        }
    }
}

fn default_scan_root() -> PathBuf {
    PathBuf::from("./src")
}

fn default_include_globs() -> Vec<String> {
    ["**/*.ts", "**/*.tsx", "**/*.js", "**/*.jsx"]
        .iter()
        .map(|g| g.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

/// `[audit]` section.
#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    /// `disabled`, `sqlite` or `supabase`.
    #[serde(default = "default_sink")]
    pub sink: String,
    /// SQLite database path (sqlite sink).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Project URL (supabase sink).
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the service key (supabase sink).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Destination table name.
    #[serde(default = "default_audit_table")]
    pub table: String,
    /// HTTP request timeout in seconds (supabase sink).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: default_sink(),
            path: None,
            url: None,
            api_key_env: default_api_key_env(),
            table: default_audit_table(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AuditConfig {
    /// False for the `disabled` sink.
    pub fn is_enabled(&self) -> bool {
        self.sink != "disabled"
    }
}

fn default_sink() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "SUPABASE_SERVICE_KEY".to_string()
}
fn default_audit_table() -> String {
    "issue_fixes".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

/// `[server]` section.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Socket address to bind (e.g., `"127.0.0.1:7341"`).
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// `[schema]` section.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SchemaConfig {
    /// Table name to column names.
    #[serde(default)]
    pub tables: SchemaTables,
}

impl Config {
    /// Defaults for every section, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

/// Load, parse and validate the config file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        log::debug!(
            "config file {} not found, using built-in defaults",
            path.display()
        );
        Ok(Config::minimal())
    }
}

/// Check threshold ranges, threshold order, sink keys and include globs.
pub fn validate(config: &Config) -> Result<()> {
    let unit = |name: &str, value: f64| -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
        Ok(())
    };

    unit("registry.rejection_threshold", config.registry.rejection_threshold)?;
    unit("registry.warning_threshold", config.registry.warning_threshold)?;
    if config.registry.warning_threshold > config.registry.rejection_threshold {
        anyhow::bail!("registry.warning_threshold must not exceed registry.rejection_threshold");
    }
    unit("catalog.similar_threshold", config.catalog.similar_threshold)?;
    unit("gateway.functional_threshold", config.gateway.functional_threshold)?;

    let w = &config.catalog.weights;
    if [w.category, w.tags, w.functionality, w.members]
        .iter()
        .any(|v| *v < 0.0)
    {
        anyhow::bail!("catalog.weights must be non-negative");
    }

    for (name, value) in [
        ("gateway.max_risk", config.gateway.max_risk),
        ("gateway.min_type_safety", config.gateway.min_type_safety),
        ("gateway.min_database_usage", config.gateway.min_database_usage),
    ] {
        if value > 100 {
            anyhow::bail!("{} must be <= 100", name);
        }
    }

    if config.scan.include_globs.is_empty() {
        anyhow::bail!("scan.include_globs must not be empty");
    }

    match config.audit.sink.as_str() {
        "disabled" => {}
        "sqlite" => {
            if config.audit.path.is_none() {
                anyhow::bail!("audit.path must be set when sink is 'sqlite'");
            }
        }
        "supabase" => {
            if config.audit.url.is_none() {
                anyhow::bail!("audit.url must be set when sink is 'supabase'");
            }
            if config.audit.timeout_secs == 0 {
                anyhow::bail!("audit.timeout_secs must be > 0");
            }
        }
        other => anyhow::bail!(
            "Unknown audit sink: '{}'. Must be disabled, sqlite, or supabase.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Config> {
        let config: Config = toml::from_str(text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.registry.rejection_threshold, 0.9);
        assert_eq!(config.gateway.max_risk, 70);
        assert_eq!(config.server.bind, "127.0.0.1:7341");
        assert_eq!(config.scan.include_globs.len(), 4);
        assert!(config.scan.skip_tests);
        assert!(!config.audit.is_enabled());
    }

    #[test]
    fn test_sections_parse() {
        let config = parse(
            r#"
[registry]
rejection_threshold = 0.95

[catalog.weights]
category = 0.5
functionality = 0.5

[gateway]
max_risk = 50

[audit]
sink = "sqlite"
path = "audit.sqlite"

[schema.tables]
users = ["id", "email"]
"#,
        )
        .unwrap();
        assert_eq!(config.registry.rejection_threshold, 0.95);
        assert_eq!(config.registry.warning_threshold, 0.8);
        assert_eq!(config.catalog.weights.tags, 0.0);
        assert_eq!(config.gateway.max_risk, 50);
        assert_eq!(config.gateway.min_type_safety, 70);
        assert_eq!(config.schema.tables["users"], vec!["id", "email"]);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let err = parse("[registry]\nrejection_threshold = 0.5\nwarning_threshold = 0.8\n")
            .unwrap_err();
        assert!(err.to_string().contains("warning_threshold"));
    }

    #[test]
    fn test_rejects_incomplete_sinks() {
        assert!(parse("[audit]\nsink = \"sqlite\"\n").is_err());
        assert!(parse("[audit]\nsink = \"supabase\"\n").is_err());
        assert!(parse("[audit]\nsink = \"kafka\"\n").is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = load_or_minimal(Path::new("/nonexistent/sguard.toml")).unwrap();
        assert_eq!(config.catalog.similar_threshold, DEFAULT_SIMILAR_THRESHOLD);
    }
}
