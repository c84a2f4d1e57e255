//! Federation server configuration settings

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub instance: InstanceSettings,
    pub server: ServerSettings,
    pub federation: FederationSettings,
    pub database: DatabaseSettings,
    pub metrics: MetricsSettings,
}

/// Instance identity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSettings {
    /// Human-readable instance name
    #[serde(default = "default_instance_name")]
    pub name: String,
    /// Public URL overriding the one derived from request headers
    #[serde(default)]
    pub canonical_url: Option<String>,
}

fn default_instance_name() -> String {
    "repo-federation".to_string()
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Federation protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationSettings {
    /// Master switch for the federation endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Instance secret all federation tokens derive from; empty disables federation
    #[serde(default)]
    pub uuid: String,
    /// Accept proposals from unregistered instances
    #[serde(default)]
    pub allow_proposals: bool,
    /// Named repository sets, each with its own repositories-tier token
    #[serde(default)]
    pub sets: Vec<String>,
    /// Frequency given to registrations created from approved proposals
    #[serde(default = "default_frequency")]
    pub default_frequency: String,
    /// Folder given to registrations created from approved proposals
    #[serde(default = "default_folder")]
    pub default_folder: String,
    /// Webhook receiving proposal notifications
    #[serde(default)]
    pub notify_url: Option<String>,
    /// Bearer token for the operator API; the API is closed when unset
    #[serde(default)]
    pub admin_token: Option<String>,
}

fn default_frequency() -> String {
    "60 mins".to_string()
}

fn default_folder() -> String {
    "federated".to_string()
}

impl Default for FederationSettings {
    fn default() -> Self {
        FederationSettings {
            enabled: true,
            uuid: String::new(),
            allow_proposals: false,
            sets: Vec::new(),
            default_frequency: default_frequency(),
            default_folder: default_folder(),
            notify_url: None,
            admin_token: None,
        }
    }
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// RocksDB data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Enable compression
    #[serde(default = "default_true")]
    pub compression: bool,
    /// Cache size in MB
    #[serde(default = "default_cache_size")]
    pub cache_size_mb: usize,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_cache_size() -> usize {
    64
}

fn default_true() -> bool {
    true
}

/// Metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Environment variable naming an alternate config file
pub const CONFIG_PATH_ENV: &str = "REPO_FEDERATION_CONFIG";

impl Settings {
    /// Load settings from file and environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config".to_string());
        Self::load_from(path)
    }

    /// Load settings from a specific config file path (without extension)
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref();

        let builder = Config::builder()
            .set_default("instance.name", default_instance_name())?
            .set_default("server.host", default_host())?
            .set_default("server.http_port", default_http_port() as i64)?
            .set_default("server.workers", default_workers() as i64)?
            .set_default("federation.enabled", true)?
            .set_default("federation.uuid", "")?
            .set_default("federation.allow_proposals", false)?
            .set_default("federation.default_frequency", default_frequency())?
            .set_default("federation.default_folder", default_folder())?
            .set_default("database.data_dir", default_data_dir())?
            .set_default("database.compression", true)?
            .set_default("database.cache_size_mb", default_cache_size() as i64)?
            .set_default("metrics.enabled", true)?
            .add_source(File::with_name(config_path.to_str().unwrap_or("config")).required(false))
            // REPO_FEDERATION__FEDERATION__UUID=... style overrides
            .add_source(
                Environment::with_prefix("REPO_FEDERATION")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("federation.sets")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Every setting as a dotted key mapped to its string value.
    ///
    /// Lists are space separated and unset values are empty strings.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Ok(value) = serde_json::to_value(self) {
            flatten_value("", &value, &mut out);
        }
        out
    }
}

fn flatten_value(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_value(&path, child, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), scalar_string(other));
        }
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(scalar_string)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            instance: InstanceSettings {
                name: default_instance_name(),
                canonical_url: None,
            },
            server: ServerSettings {
                host: default_host(),
                http_port: default_http_port(),
                workers: default_workers(),
            },
            federation: FederationSettings::default(),
            database: DatabaseSettings {
                data_dir: default_data_dir(),
                compression: true,
                cache_size_mb: default_cache_size(),
            },
            metrics: MetricsSettings { enabled: true },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.http_port, 8080);
        assert!(settings.federation.enabled);
        assert!(!settings.federation.allow_proposals);
        assert!(settings.federation.uuid.is_empty());
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path().join("absent")).unwrap();
        assert_eq!(settings.federation.default_frequency, "60 mins");
        assert_eq!(settings.database.data_dir, "./data");
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("federation.toml");
        std::fs::write(
            &path,
            "[federation]\nuuid = \"abc\"\nallow_proposals = true\nsets = [\"mobile\"]\n",
        )
        .unwrap();

        let settings = Settings::load_from(dir.path().join("federation")).unwrap();
        assert_eq!(settings.federation.uuid, "abc");
        assert!(settings.federation.allow_proposals);
        assert_eq!(settings.federation.sets, vec!["mobile".to_string()]);
    }

    #[test]
    fn test_flatten() {
        let mut settings = Settings::default();
        settings.federation.sets = vec!["a".to_string(), "b".to_string()];

        let flat = settings.flatten();
        assert_eq!(flat.get("server.http_port").map(String::as_str), Some("8080"));
        assert_eq!(flat.get("federation.sets").map(String::as_str), Some("a b"));
        assert_eq!(flat.get("instance.canonical_url").map(String::as_str), Some(""));
        assert_eq!(flat.get("federation.enabled").map(String::as_str), Some("true"));
    }
}
