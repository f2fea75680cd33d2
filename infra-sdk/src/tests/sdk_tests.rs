//! Tests for the SDK facade
//!
//! These tests exercise construction, lifecycle coordination and error
//! aggregation across all five services.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use crate::clients::{ServiceInstance, ServiceKind};
    use crate::core::{Capability, HealthStatus, LifecycleState};
    use crate::error::ErrorKind;
    use crate::sdk::{Sdk, SdkBuilder};
    use crate::tests::common::{init_logging, memory_config, memory_raw, StubDriver};

    struct Stubs {
        database: StubDriver,
        files: StubDriver,
        messages: StubDriver,
        search: StubDriver,
        service: StubDriver,
    }

    impl Stubs {
        fn healthy() -> Self {
            Self {
                database: StubDriver::new(),
                files: StubDriver::new(),
                messages: StubDriver::new(),
                search: StubDriver::new(),
                service: StubDriver::new(),
            }
        }

        fn builder(&self) -> SdkBuilder {
            Sdk::builder()
                .database_driver(Arc::new(self.database.clone()))
                .files_driver(Arc::new(self.files.clone()))
                .messages_driver(Arc::new(self.messages.clone()))
                .search_driver(Arc::new(self.search.clone()))
                .service_driver(Arc::new(self.service.clone()))
        }

        fn all(&self) -> [&StubDriver; 5] {
            [&self.database, &self.files, &self.messages, &self.search, &self.service]
        }
    }

    #[tokio::test]
    async fn test_all_services_healthy_end_to_end() {
        init_logging();
        let sdk = Sdk::new(memory_raw()).unwrap();
        for state in sdk.states().values() {
            assert_eq!(*state, LifecycleState::Configured);
        }

        assert_ok!(sdk.connect_all().await);

        let health = sdk.health_summary().await;
        assert_eq!(health.len(), 5);
        assert!(health.is_healthy());
        for service in ServiceKind::ALL {
            assert_eq!(health.get(service), Some(&HealthStatus::Healthy));
        }

        assert_ok!(sdk.close_all().await);
        for state in sdk.states().values() {
            assert_eq!(*state, LifecycleState::Closed);
        }
    }

    #[tokio::test]
    async fn test_service_operations_through_facade() {
        let sdk = Sdk::new(memory_raw()).unwrap();
        sdk.connect_all().await.unwrap();

        let id = sdk.database().insert("users", json!({ "name": "ada" })).await.unwrap();
        let stored = sdk.database().get("users", &id).await.unwrap().unwrap();
        assert_eq!(stored["name"], "ada");

        sdk.files().put("reports/2024.csv", "a,b\n1,2\n").await.unwrap();
        assert_eq!(sdk.files().list("reports/").await.unwrap(), vec!["reports/2024.csv"]);

        let mut subscription = sdk.messages().subscribe("events").await.unwrap();
        let message_id = sdk.messages().publish("events", "created").await.unwrap();
        let received = subscription.recv().await.unwrap().unwrap();
        assert_eq!(received.id, message_id);
        assert_eq!(&received.payload[..], b"created");

        sdk.search().index("docs", "1", json!({ "title": "rust lifecycles" })).await.unwrap();
        let hits = sdk.search().query("docs", "rust").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");

        sdk.service().put_value("app/mode", "active").await.unwrap();
        assert_eq!(sdk.service().get_value("app/mode").await.unwrap().as_deref(), Some("active"));
        sdk.service()
            .register(&ServiceInstance::new("api-1", "api", "10.0.0.5", 8080))
            .await
            .unwrap();
        assert_eq!(sdk.service().discover("api").await.unwrap().len(), 1);

        sdk.close_all().await.unwrap();
        let err = assert_err!(sdk.database().get("users", &id).await);
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_unreachable_messages_is_isolated() {
        init_logging();
        let stubs = Stubs {
            messages: StubDriver::unreachable(),
            ..Stubs::healthy()
        };
        let sdk = stubs.builder().build(memory_raw()).unwrap();

        let err = assert_err!(sdk.connect_all().await);
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.failed_services(), vec![ServiceKind::Messages]);
        assert!(err.message().contains("messages"));
        assert!(!err.message().contains("database:"));

        let failure = err.failures().unwrap().get(ServiceKind::Messages).unwrap();
        assert_eq!(failure.kind(), ErrorKind::Connection);

        assert_eq!(sdk.messages().state(), LifecycleState::Failed);
        assert_eq!(sdk.database().state(), LifecycleState::Connected);

        let health = sdk.health_summary().await;
        assert!(!health.is_healthy());
        assert_eq!(health.unhealthy_services(), vec![ServiceKind::Messages]);
        for service in [ServiceKind::Database, ServiceKind::Files, ServiceKind::Search, ServiceKind::Config] {
            assert!(health.get(service).unwrap().is_healthy());
        }

        // The failed handle stays accessible and reports its state
        let err = assert_err!(sdk.messages().publish("events", "x").await);
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.message().contains("failed state"));
    }

    #[tokio::test]
    async fn test_connect_all_names_every_failure() {
        let stubs = Stubs {
            database: StubDriver::unreachable(),
            search: StubDriver::unreachable(),
            ..Stubs::healthy()
        };
        let sdk = stubs.builder().build(memory_raw()).unwrap();

        let err = assert_err!(sdk.connect_all().await);
        assert_eq!(err.failed_services(), vec![ServiceKind::Database, ServiceKind::Search]);

        // Every handle was attempted despite the failures
        for stub in stubs.all() {
            assert_eq!(stub.opens(), 1);
        }

        assert_ok!(sdk.close_all().await);
        assert_eq!(stubs.files.closes(), 1);
        assert_eq!(stubs.messages.closes(), 1);
        assert_eq!(stubs.service.closes(), 1);
        assert_eq!(stubs.database.closes(), 0);
        assert_eq!(sdk.database().state(), LifecycleState::Failed);
        for stub in stubs.all() {
            assert_eq!(stub.live(), 0);
        }
    }

    #[tokio::test]
    async fn test_close_all_attempts_every_handle() {
        let stubs = Stubs {
            files: StubDriver::failing_close(),
            service: StubDriver::failing_close(),
            ..Stubs::healthy()
        };
        let sdk = stubs.builder().build(memory_raw()).unwrap();
        sdk.connect_all().await.unwrap();

        let err = assert_err!(sdk.close_all().await);
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.failed_services(), vec![ServiceKind::Files, ServiceKind::Config]);

        let failures = err.failures().unwrap();
        assert_eq!(failures.get(ServiceKind::Files).unwrap().kind(), ErrorKind::FileStorage);
        assert_eq!(failures.get(ServiceKind::Config).unwrap().kind(), ErrorKind::ServiceDiscovery);

        for stub in stubs.all() {
            assert_eq!(stub.closes(), 1);
            assert_eq!(stub.live(), 0);
        }

        // Second close is a no-op
        assert_ok!(sdk.close_all().await);
        for stub in stubs.all() {
            assert_eq!(stub.closes(), 1);
        }
    }

    #[tokio::test]
    async fn test_connect_all_is_idempotent() {
        let stubs = Stubs::healthy();
        let sdk = stubs.builder().build(memory_raw()).unwrap();

        sdk.connect_all().await.unwrap();
        sdk.connect_all().await.unwrap();
        for stub in stubs.all() {
            assert_eq!(stub.opens(), 1);
        }
    }

    #[tokio::test]
    async fn test_lifecycle_operations_are_exclusive() {
        let stubs = Stubs {
            database: StubDriver::new().with_open_delay(Duration::from_millis(200)),
            ..Stubs::healthy()
        };
        let sdk = stubs.builder().build(memory_raw()).unwrap();

        let (connected, closed) = tokio::join!(sdk.connect_all(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sdk.close_all().await
        });

        assert_ok!(connected);
        let err = assert_err!(closed);
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.message(), "lifecycle operation already in progress");
        assert_eq!(sdk.database().state(), LifecycleState::Connected);

        // Health probes do not take the lifecycle lock
        assert!(sdk.health_summary().await.is_healthy());
    }

    #[test]
    fn test_construction_fails_atomically() {
        let mut raw = memory_config();
        raw["files"]["options"]["driver"] = json!("ftp");
        raw["search"]["options"]["driver"] = json!(42);

        let err = assert_err!(Sdk::new(raw));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.failed_services(), vec![ServiceKind::Files, ServiceKind::Search]);
        assert!(err.message().starts_with("failed to configure services"));
        assert!(err.message().contains("unknown driver 'ftp'"));
    }

    #[test]
    fn test_construction_reports_validation_errors() {
        let mut raw = memory_config();
        raw["database"].as_object_mut().unwrap().remove("endpoint");
        raw["search"].as_object_mut().unwrap().remove("timeout_seconds");

        let err = assert_err!(Sdk::new(raw));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            err.to_string(),
            "Configuration error: invalid configuration: database.endpoint is required; search.timeout_seconds is required"
        );
    }

    #[tokio::test]
    async fn test_oversized_timeout_never_reaches_a_handle() {
        let mut raw = memory_config();
        raw["database"]["timeout_seconds"] = json!(1e20);
        let err = assert_err!(Sdk::new(raw));
        assert!(err.message().contains("database.timeout_seconds must be a positive duration"));

        let sdk = Sdk::new(memory_raw()).unwrap();
        let mut settings = sdk.config().settings(ServiceKind::Database).clone();
        settings.endpoint = String::new();
        settings.timeout_seconds = -1.0;
        let err = assert_err!(sdk.database().configure(settings));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(sdk.database().state(), LifecycleState::Configured);

        assert_ok!(sdk.connect_all().await);
        assert!(sdk.health_summary().await.is_healthy());
        assert_ok!(sdk.close_all().await);
    }

    #[test]
    fn test_repeated_construction_is_deterministic() {
        let first = Sdk::new(memory_raw()).unwrap();
        let second = Sdk::new(memory_raw()).unwrap();
        assert_eq!(first.config(), second.config());
        assert_eq!(first.states(), second.states());
    }

    #[test]
    fn test_default_drivers_from_registry() {
        let dir = tempfile::tempdir().unwrap();
        let sdk = Sdk::new(json!({
            "database": { "endpoint": "memory://", "timeout_seconds": 1 },
            "files": { "endpoint": dir.path().to_str().unwrap(), "timeout_seconds": 1 },
            "messages": { "endpoint": "memory://", "timeout_seconds": 1 },
            "search": { "endpoint": "http://localhost:9200", "timeout_seconds": 1 },
            "config": { "endpoint": "localhost:8500", "timeout_seconds": 1 },
        }))
        .unwrap();

        assert_eq!(sdk.database().handle().driver_name(), "memory");
        assert_eq!(sdk.files().handle().driver_name(), "local");
        assert_eq!(sdk.messages().handle().driver_name(), "memory");
        assert_eq!(sdk.search().handle().driver_name(), "http");
        assert_eq!(sdk.service().handle().driver_name(), "http");
        assert_eq!(sdk.service().service(), ServiceKind::Config);
    }

    #[tokio::test]
    async fn test_health_report_serializes_by_service() {
        let stubs = Stubs::healthy();
        let sdk = stubs.builder().build(memory_raw()).unwrap();
        sdk.connect_all().await.unwrap();
        stubs.search.set_fail_ping(true);

        let report = sdk.health_summary().await;
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["database"], json!({ "status": "healthy" }));
        assert_eq!(value["search"]["status"], "unhealthy");
        assert!(value["search"]["reason"].as_str().unwrap().starts_with("probe failed"));
    }
}
