//! Raw configuration sources
//!
//! Raw configuration can come from an explicit JSON value, a JSON document on
//! disk, or environment variables. Nothing here validates; see
//! [`validate`](super::validate).

use std::env;
use std::fs;
use std::path::Path;

use serde_json::{Map, Number, Value};

use crate::clients::ServiceKind;
use crate::error::{Result, SdkError};

/// Default prefix for environment variables
pub const DEFAULT_ENV_PREFIX: &str = "INFRA";

/// Unvalidated configuration input
#[derive(Debug, Clone, PartialEq)]
pub struct RawConfig(Value);

impl RawConfig {
    /// Wrap an explicit JSON value
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map(Self)
            .map_err(|e| SdkError::configuration(format!("Invalid JSON configuration: {}", e)).with_source(e))
    }

    /// Read and parse a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            SdkError::configuration(format!("Failed to read configuration file {}: {}", path.display(), e))
                .with_source(e)
        })?;
        Self::from_json_str(&contents)
    }

    /// Collect configuration from the process environment using the default prefix
    pub fn from_env() -> Self {
        EnvConfigSource::new().load()
    }

    /// The underlying JSON value
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for RawConfig {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Environment variable based configuration source.
///
/// Variables follow `<PREFIX>_<SERVICE>_<FIELD>`:
///
/// - `INFRA_DATABASE_ENDPOINT`, `INFRA_DATABASE_TIMEOUT_SECONDS`
/// - `INFRA_DATABASE_USERNAME` / `INFRA_DATABASE_PASSWORD` or `INFRA_DATABASE_TOKEN`
/// - `INFRA_DATABASE_OPTION_<KEY>` for options (key lowercased)
#[derive(Debug, Clone)]
pub struct EnvConfigSource {
    prefix: String,
}

impl Default for EnvConfigSource {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }
}

impl EnvConfigSource {
    /// Create a source with the default prefix
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the variable prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Format the variable name of a service field
    pub fn format_key(&self, service: ServiceKind, field: &str) -> String {
        format!(
            "{}_{}_{}",
            self.prefix,
            service.as_str().to_uppercase(),
            field.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_")
        )
    }

    /// Load from the process environment
    pub fn load(&self) -> RawConfig {
        self.load_from(env::vars())
    }

    /// Load from an explicit set of variables
    pub fn load_from<I, K, V>(&self, vars: I) -> RawConfig
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut root = Map::new();

        for (key, value) in vars {
            let Some((service, field)) = self.split_key(key.as_ref()) else {
                continue;
            };
            let value = value.into();

            let section = root
                .entry(service.as_str())
                .or_insert_with(|| Value::Object(Map::new()));
            let Value::Object(section) = section else {
                continue;
            };

            match field.as_str() {
                "ENDPOINT" => {
                    section.insert("endpoint".into(), Value::String(value));
                }
                "TIMEOUT_SECONDS" => {
                    section.insert("timeout_seconds".into(), parse_scalar(&value));
                }
                "USERNAME" | "PASSWORD" | "TOKEN" => {
                    let credentials = section
                        .entry("credentials")
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(credentials) = credentials {
                        credentials.insert(field.to_lowercase(), Value::String(value));
                    }
                }
                other => {
                    if let Some(option) = other.strip_prefix("OPTION_").filter(|o| !o.is_empty()) {
                        let options = section
                            .entry("options")
                            .or_insert_with(|| Value::Object(Map::new()));
                        if let Value::Object(options) = options {
                            options.insert(option.to_lowercase(), parse_scalar(&value));
                        }
                    } else {
                        log::debug!("Ignoring unrecognised configuration variable {}", key.as_ref());
                    }
                }
            }
        }

        RawConfig(Value::Object(root))
    }

    fn split_key(&self, key: &str) -> Option<(ServiceKind, String)> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix('_')?;
        ServiceKind::ALL.into_iter().find_map(|service| {
            let field = rest
                .strip_prefix(&service.as_str().to_uppercase())?
                .strip_prefix('_')?;
            Some((service, field.to_string()))
        })
    }
}

/// Interpret an environment value as a JSON scalar
fn parse_scalar(value: &str) -> Value {
    let trimmed = value.trim();
    match trimmed.to_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(value.to_string())
}
