//! Tests for configuration validation and sources
//!
//! These tests verify that raw configuration is validated as a whole and that
//! every source produces the same raw shape.

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use serde_json::json;
    use tokio_test::assert_err;

    use crate::clients::ServiceKind;
    use crate::config::{validate, Credentials, EnvConfigSource, RawConfig, SdkConfig, ValidationErrors};
    use crate::error::ErrorKind;
    use crate::tests::common::memory_config;

    fn raw(value: serde_json::Value) -> RawConfig {
        RawConfig::from_value(value)
    }

    #[test]
    fn test_valid_configuration() {
        let config = validate(&raw(memory_config())).unwrap();

        let database = config.settings(ServiceKind::Database);
        assert_eq!(database.endpoint, "memory://db");
        assert_eq!(database.timeout(), Duration::from_secs(2));
        assert_eq!(database.option_str("driver"), Some("memory"));
        assert!(database.credentials.is_none());

        let services: Vec<ServiceKind> = config.iter().map(|s| s.service).collect();
        assert_eq!(services, ServiceKind::ALL.to_vec());
    }

    #[test]
    fn test_missing_fields_are_aggregated() {
        let mut value = memory_config();
        value["database"].as_object_mut().unwrap().remove("endpoint");
        value["search"].as_object_mut().unwrap().remove("timeout_seconds");

        let err = assert_err!(validate(&raw(value)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            err.message(),
            "invalid configuration: database.endpoint is required; search.timeout_seconds is required"
        );

        let violations = std::error::Error::source(&err)
            .and_then(|source| source.downcast_ref::<ValidationErrors>())
            .unwrap();
        assert_eq!(violations.fields(), vec!["database.endpoint", "search.timeout_seconds"]);
    }

    #[test]
    fn test_missing_sections_and_bad_values() {
        let value = json!({
            "database": { "endpoint": "   ", "timeout_seconds": 0 },
            "files": { "endpoint": 7, "timeout_seconds": "soon" },
            "messages": "memory",
            "search": { "endpoint": "http://es:9200", "timeout_seconds": -1.5, "options": [] },
        });

        let err = assert_err!(validate(&raw(value)));
        let message = err.message();
        assert!(message.contains("database.endpoint must not be empty"));
        assert!(message.contains("database.timeout_seconds must be positive"));
        assert!(message.contains("files.endpoint must be a string, found a number"));
        assert!(message.contains("files.timeout_seconds must be a number, found a string"));
        assert!(message.contains("messages must be a mapping, found a string"));
        assert!(message.contains("search.timeout_seconds must be positive"));
        assert!(message.contains("search.options must be a mapping, found an array"));
        assert!(message.contains("config section is required"));
    }

    #[test]
    fn test_timeout_must_fit_a_duration() {
        let mut value = memory_config();
        value["database"]["timeout_seconds"] = json!(1e20);

        let err = assert_err!(validate(&raw(value)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            err.message(),
            "invalid configuration: database.timeout_seconds must be a positive duration"
        );

        let mut value = memory_config();
        value["search"]["timeout_seconds"] = json!(0.25);
        let config = validate(&raw(value)).unwrap();
        assert_eq!(config.settings(ServiceKind::Search).timeout(), Duration::from_millis(250));
        assert!(config.iter().all(|settings| settings.check().is_ok()));
    }

    #[test]
    fn test_non_mapping_root() {
        let err = assert_err!(validate(&raw(json!(["database"]))));
        assert_eq!(err.message(), "invalid configuration: configuration must be a mapping, found an array");
    }

    #[test]
    fn test_credentials() {
        let mut value = memory_config();
        value["database"]["credentials"] = json!({ "username": "app", "password": "s3cret" });
        value["config"]["credentials"] = json!({ "token": "acl-token" });

        let config = validate(&raw(value)).unwrap();
        assert_eq!(
            config.settings(ServiceKind::Database).credentials,
            Some(Credentials::Basic {
                username: "app".to_string(),
                password: "s3cret".to_string()
            })
        );
        let token = config.settings(ServiceKind::Config).credentials.clone().unwrap();
        assert_eq!(
            token,
            Credentials::Token {
                token: "acl-token".to_string()
            }
        );

        // Secrets stay out of debug output and serialization
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("acl-token"));
        let serialized = serde_json::to_string(&config).unwrap();
        assert!(!serialized.contains("s3cret"));
        assert!(serialized.contains("\"username\":\"app\""));
    }

    #[test]
    fn test_malformed_credentials() {
        let mut value = memory_config();
        value["database"]["credentials"] = json!({ "username": "app" });
        value["files"]["credentials"] = json!({ "token": "" });

        let err = assert_err!(validate(&raw(value)));
        assert_eq!(
            err.message(),
            "invalid configuration: database.credentials.password is required when no token is given; \
             files.credentials.token must be a non-empty string"
        );
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let mut value = memory_config();
        value["telemetry"] = json!({ "enabled": true });
        value["database"]["pool_size"] = json!(8);

        let with_extras = validate(&raw(value)).unwrap();
        let plain = validate(&raw(memory_config())).unwrap();
        assert_eq!(with_extras, plain);
    }

    #[test]
    fn test_validation_is_deterministic() {
        assert_eq!(
            SdkConfig::from_raw(&raw(memory_config())).unwrap(),
            SdkConfig::from_raw(&raw(memory_config())).unwrap()
        );

        let broken = json!({ "database": {} });
        let first = validate(&raw(broken.clone())).unwrap_err();
        let second = validate(&raw(broken)).unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_for_service() {
        let config = validate(&raw(memory_config())).unwrap();
        assert_eq!(config.for_service("search").unwrap().endpoint, "memory://search");

        let err = assert_err!(config.for_service("cache"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.message(), "unknown service: cache");
    }

    #[test]
    fn test_option_lookups() {
        let mut value = memory_config();
        value["messages"]["options"] = json!({ "capacity": "64", "durable": "yes", "ack": false });
        let config = validate(&raw(value)).unwrap();

        let messages = config.settings(ServiceKind::Messages);
        assert_eq!(messages.option_u64("capacity"), Some(64));
        assert_eq!(messages.option_bool("durable"), Some(true));
        assert_eq!(messages.option_bool("ack"), Some(false));
        assert_eq!(messages.option_bool("capacity"), None);
        assert_eq!(messages.option_str("missing"), None);
    }

    #[test]
    fn test_env_source() {
        let source = EnvConfigSource::new().with_prefix("TEST_INFRA");
        assert_eq!(source.format_key(ServiceKind::Database, "timeout-seconds"), "TEST_INFRA_DATABASE_TIMEOUT_SECONDS");

        let vars = vec![
            ("TEST_INFRA_DATABASE_ENDPOINT", "postgres://db:5432/app"),
            ("TEST_INFRA_DATABASE_TIMEOUT_SECONDS", "2.5"),
            ("TEST_INFRA_DATABASE_USERNAME", "app"),
            ("TEST_INFRA_DATABASE_PASSWORD", "hunter2"),
            ("TEST_INFRA_FILES_ENDPOINT", "/var/lib/blobs"),
            ("TEST_INFRA_FILES_TIMEOUT_SECONDS", "5"),
            ("TEST_INFRA_FILES_OPTION_CREATE_ROOT", "false"),
            ("TEST_INFRA_MESSAGES_ENDPOINT", "memory://"),
            ("TEST_INFRA_MESSAGES_TIMEOUT_SECONDS", "1"),
            ("TEST_INFRA_SEARCH_ENDPOINT", "http://es:9200"),
            ("TEST_INFRA_SEARCH_TIMEOUT_SECONDS", "3"),
            ("TEST_INFRA_CONFIG_ENDPOINT", "http://consul:8500"),
            ("TEST_INFRA_CONFIG_TIMEOUT_SECONDS", "3"),
            ("TEST_INFRA_CONFIG_TOKEN", "acl"),
            ("TEST_INFRA_CONFIG_UNKNOWN", "ignored"),
            ("PATH", "/usr/bin"),
        ];

        let config = validate(&source.load_from(vars)).unwrap();
        let database = config.settings(ServiceKind::Database);
        assert_eq!(database.endpoint, "postgres://db:5432/app");
        assert_eq!(database.timeout(), Duration::from_millis(2500));
        assert!(matches!(database.credentials, Some(Credentials::Basic { .. })));

        let files = config.settings(ServiceKind::Files);
        assert_eq!(files.option_bool("create_root"), Some(false));

        let discovery = config.settings(ServiceKind::Config);
        assert!(matches!(discovery.credentials, Some(Credentials::Token { .. })));
    }

    #[test]
    fn test_env_source_reports_missing_fields() {
        let source = EnvConfigSource::new().with_prefix("EMPTY_PREFIX");
        let err = assert_err!(validate(&source.load_from(Vec::<(String, String)>::new())));
        assert!(err.message().contains("database section is required"));
    }

    #[test]
    fn test_raw_config_from_json() {
        let json = serde_json::to_string(&memory_config()).unwrap();
        let parsed = RawConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, raw(memory_config()));

        let err = assert_err!(RawConfig::from_json_str("{ not json"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_raw_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", memory_config()).unwrap();

        let parsed = RawConfig::from_file(file.path()).unwrap();
        assert!(validate(&parsed).is_ok());

        let err = assert_err!(RawConfig::from_file("/nonexistent/infra.json"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().contains("Failed to read configuration file"));
    }
}
