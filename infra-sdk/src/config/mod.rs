//! Configuration management for the SDK
//!
//! Raw configuration is a mapping with one section per backend service
//! (`database`, `files`, `messages`, `search`, `config`). [`validate`] turns it
//! into an immutable [`SdkConfig`], reporting every violated field at once.

mod source;

pub use source::{EnvConfigSource, RawConfig, DEFAULT_ENV_PREFIX};

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::clients::ServiceKind;
use crate::error::{Result, SdkError};

/// Credentials for a backend service
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credentials {
    /// Username/password pair
    Basic {
        username: String,
        #[serde(skip_serializing)]
        password: String,
    },
    /// Opaque access token
    Token {
        #[serde(skip_serializing)]
        token: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Credentials::Token { .. } => f.debug_struct("Token").field("token", &"[REDACTED]").finish(),
        }
    }
}

/// Validated settings of one backend service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSettings {
    /// Service these settings belong to
    pub service: ServiceKind,

    /// Endpoint or address of the backend
    pub endpoint: String,

    /// Optional credentials
    pub credentials: Option<Credentials>,

    /// Connection timeout in seconds, positive and representable as a `Duration`
    pub timeout_seconds: f64,

    /// Service-specific options and feature flags
    pub options: BTreeMap<String, Value>,
}

impl ServiceSettings {
    /// Create settings with no credentials and no options.
    ///
    /// The values are not validated here; handles run [`ServiceSettings::check`]
    /// when the settings are bound.
    pub fn new(service: ServiceKind, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            service,
            endpoint: endpoint.into(),
            credentials: None,
            timeout_seconds: timeout.as_secs_f64(),
            options: BTreeMap::new(),
        }
    }

    /// Set credentials
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set an option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Connection timeout, saturating to `Duration::MAX` when out of range
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds).unwrap_or(Duration::MAX)
    }

    /// Check the field invariants that [`validate`] guarantees.
    ///
    /// Used for settings built in code; every violation is reported in one
    /// `Configuration` error.
    pub fn check(&self) -> Result<()> {
        let name = self.service.as_str();
        let mut errors = ValidationErrors::default();

        if self.endpoint.trim().is_empty() {
            errors.push(format!("{}.endpoint", name), "must not be empty");
        }
        if let Some(problem) = timeout_problem(self.timeout_seconds) {
            errors.push(format!("{}.timeout_seconds", name), problem);
        }
        match &self.credentials {
            Some(Credentials::Token { token }) if token.is_empty() => {
                errors.push(format!("{}.credentials.token", name), "must be a non-empty string");
            }
            Some(Credentials::Basic { username, .. }) if username.is_empty() => {
                errors.push(format!("{}.credentials.username", name), "must be a non-empty string");
            }
            _ => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(invalid(errors))
        }
    }

    /// Raw option value
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// String option
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// Boolean option, accepting JSON booleans and the usual string spellings
    pub fn option_bool(&self, key: &str) -> Option<bool> {
        match self.options.get(key)? {
            Value::Bool(flag) => Some(*flag),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Some(true),
                "false" | "no" | "0" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Unsigned integer option, accepting numbers and numeric strings
    pub fn option_u64(&self, key: &str) -> Option<u64> {
        match self.options.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Validated, immutable configuration of every backend service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SdkConfig {
    database: ServiceSettings,
    files: ServiceSettings,
    messages: ServiceSettings,
    search: ServiceSettings,
    config: ServiceSettings,
}

impl SdkConfig {
    /// Validate raw configuration; same as [`validate`]
    pub fn from_raw(raw: &RawConfig) -> Result<Self> {
        validate(raw)
    }

    /// Settings of one service
    pub fn settings(&self, service: ServiceKind) -> &ServiceSettings {
        match service {
            ServiceKind::Database => &self.database,
            ServiceKind::Files => &self.files,
            ServiceKind::Messages => &self.messages,
            ServiceKind::Search => &self.search,
            ServiceKind::Config => &self.config,
        }
    }

    /// Settings of a service looked up by its configuration key
    pub fn for_service(&self, name: &str) -> Result<&ServiceSettings> {
        let service: ServiceKind = name.parse()?;
        Ok(self.settings(service))
    }

    /// Iterate over every service's settings
    pub fn iter(&self) -> impl Iterator<Item = &ServiceSettings> {
        ServiceKind::ALL.into_iter().map(move |service| self.settings(service))
    }
}

/// One violated configuration field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the field, e.g. `database.endpoint`
    pub field: String,

    /// What is wrong with it
    pub problem: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.problem)
    }
}

/// Every violation found while validating a raw configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors {
    violations: Vec<Violation>,
}

impl ValidationErrors {
    fn push(&mut self, field: impl Into<String>, problem: impl Into<String>) {
        self.violations.push(Violation {
            field: field.into(),
            problem: problem.into(),
        });
    }

    /// The violations in the order they were found
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Dotted paths of the violated fields
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a raw configuration.
///
/// Checks every service section and fails with one `Configuration` error
/// listing all violated fields. Unknown keys are ignored.
pub fn validate(raw: &RawConfig) -> Result<SdkConfig> {
    let mut errors = ValidationErrors::default();

    let root = match raw.as_value() {
        Value::Object(map) => map,
        other => {
            errors.push("configuration", format!("must be a mapping, found {}", type_name(other)));
            return Err(invalid(errors));
        }
    };

    let mut parsed = BTreeMap::new();
    for service in ServiceKind::ALL {
        if let Some(settings) = validate_service(service, root.get(service.as_str()), &mut errors) {
            parsed.insert(service, settings);
        }
    }

    if !errors.is_empty() {
        return Err(invalid(errors));
    }

    let mut take = |service: ServiceKind| {
        parsed
            .remove(&service)
            .ok_or_else(|| SdkError::configuration(format!("{} section is required", service)))
    };

    Ok(SdkConfig {
        database: take(ServiceKind::Database)?,
        files: take(ServiceKind::Files)?,
        messages: take(ServiceKind::Messages)?,
        search: take(ServiceKind::Search)?,
        config: take(ServiceKind::Config)?,
    })
}

fn invalid(errors: ValidationErrors) -> SdkError {
    SdkError::configuration(format!("invalid configuration: {}", errors)).with_source(errors)
}

fn validate_service(
    service: ServiceKind,
    section: Option<&Value>,
    errors: &mut ValidationErrors,
) -> Option<ServiceSettings> {
    let name = service.as_str();
    let section = match section {
        None | Some(Value::Null) => {
            errors.push(name, "section is required");
            return None;
        }
        Some(Value::Object(map)) => map,
        Some(other) => {
            errors.push(name, format!("must be a mapping, found {}", type_name(other)));
            return None;
        }
    };

    let before = errors.violations.len();

    let endpoint = match section.get("endpoint") {
        None | Some(Value::Null) => {
            errors.push(format!("{}.endpoint", name), "is required");
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.push(format!("{}.endpoint", name), "must not be empty");
            None
        }
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(other) => {
            errors.push(format!("{}.endpoint", name), format!("must be a string, found {}", type_name(other)));
            None
        }
    };

    let timeout_seconds = match section.get("timeout_seconds") {
        None | Some(Value::Null) => {
            errors.push(format!("{}.timeout_seconds", name), "is required");
            None
        }
        Some(Value::Number(n)) => {
            let secs = n.as_f64().unwrap_or(f64::NAN);
            match timeout_problem(secs) {
                None => Some(secs),
                Some(problem) => {
                    errors.push(format!("{}.timeout_seconds", name), problem);
                    None
                }
            }
        }
        Some(other) => {
            errors.push(
                format!("{}.timeout_seconds", name),
                format!("must be a number, found {}", type_name(other)),
            );
            None
        }
    };

    let credentials = match section.get("credentials") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => validate_credentials(name, map, errors),
        Some(other) => {
            errors.push(format!("{}.credentials", name), format!("must be a mapping, found {}", type_name(other)));
            None
        }
    };

    let options = match section.get("options") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(other) => {
            errors.push(format!("{}.options", name), format!("must be a mapping, found {}", type_name(other)));
            BTreeMap::new()
        }
    };

    if errors.violations.len() > before {
        return None;
    }

    Some(ServiceSettings {
        service,
        endpoint: endpoint?,
        credentials,
        timeout_seconds: timeout_seconds?,
        options,
    })
}

fn timeout_problem(secs: f64) -> Option<&'static str> {
    if !(secs.is_finite() && secs > 0.0) {
        Some("must be positive")
    } else if Duration::try_from_secs_f64(secs).is_err() {
        Some("must be a positive duration")
    } else {
        None
    }
}

fn validate_credentials(
    name: &str,
    map: &Map<String, Value>,
    errors: &mut ValidationErrors,
) -> Option<Credentials> {
    let field = |key: &str| format!("{}.credentials.{}", name, key);

    if let Some(token) = map.get("token").filter(|v| !v.is_null()) {
        return match token.as_str() {
            Some(token) if !token.is_empty() => Some(Credentials::Token {
                token: token.to_string(),
            }),
            _ => {
                errors.push(field("token"), "must be a non-empty string");
                None
            }
        };
    }

    let username = match map.get("username") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        None | Some(Value::Null) => {
            errors.push(field("username"), "is required when no token is given");
            None
        }
        Some(_) => {
            errors.push(field("username"), "must be a non-empty string");
            None
        }
    };

    let password = match map.get("password") {
        Some(Value::String(s)) => Some(s.clone()),
        None | Some(Value::Null) => {
            errors.push(field("password"), "is required when no token is given");
            None
        }
        Some(_) => {
            errors.push(field("password"), "must be a string");
            None
        }
    };

    Some(Credentials::Basic {
        username: username?,
        password: password?,
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}
