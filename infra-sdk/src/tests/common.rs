//! Shared test fixtures
//!
//! `StubDriver` is a driver for every service whose behavior is switched by
//! flags and whose acquisitions, closes and probes are counted.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use serde_json::{json, Value};

use crate::clients::messages::MessageStream;
use crate::clients::{
    DatabaseSession, DiscoverySession, FileSession, Message, MessageSession, SearchHit, SearchSession,
    ServiceInstance,
};
use crate::config::{RawConfig, ServiceSettings};
use crate::core::{Driver, Session};
use crate::error::BoxError;

/// Install a test logger; safe to call from every test
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A complete configuration using in-memory drivers for every service
pub fn memory_config() -> Value {
    json!({
        "database": { "endpoint": "memory://db", "timeout_seconds": 2, "options": { "driver": "memory" } },
        "files": { "endpoint": "memory://files", "timeout_seconds": 2, "options": { "driver": "memory" } },
        "messages": { "endpoint": "memory://mq", "timeout_seconds": 2, "options": { "driver": "memory" } },
        "search": { "endpoint": "memory://search", "timeout_seconds": 2, "options": { "driver": "memory" } },
        "config": { "endpoint": "memory://config", "timeout_seconds": 2, "options": { "driver": "memory" } },
    })
}

pub fn memory_raw() -> RawConfig {
    RawConfig::from_value(memory_config())
}

#[derive(Debug, Default)]
pub struct StubState {
    opens: AtomicUsize,
    closes: AtomicUsize,
    pings: AtomicUsize,
    live: AtomicUsize,
    fail_open: AtomicBool,
    fail_close: AtomicBool,
    fail_ping: AtomicBool,
    hang_ping: AtomicBool,
    open_delay_ms: AtomicU64,
}

/// Counts a resource as held until dropped
struct Lease {
    state: Arc<StubState>,
}

impl Lease {
    fn acquire(state: &Arc<StubState>) -> Self {
        state.live.fetch_add(1, Ordering::SeqCst);
        Self {
            state: Arc::clone(state),
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.state.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
pub struct StubDriver {
    state: Arc<StubState>,
}

impl StubDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        let driver = Self::new();
        driver.set_fail_open(true);
        driver
    }

    pub fn failing_close() -> Self {
        let driver = Self::new();
        driver.state.fail_close.store(true, Ordering::SeqCst);
        driver
    }

    pub fn with_open_delay(self, delay: Duration) -> Self {
        self.state.open_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_ping(&self, fail: bool) {
        self.state.fail_ping.store(fail, Ordering::SeqCst);
    }

    pub fn set_hang_ping(&self, hang: bool) {
        self.state.hang_ping.store(hang, Ordering::SeqCst);
    }

    /// Number of `open` calls
    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Number of session `close` calls
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }

    /// Resources currently held by sessions or in-flight opens
    pub fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    async fn open_session(&self) -> Result<Arc<StubSession>, BoxError> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        let lease = Lease::acquire(&self.state);

        let delay = self.state.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused").into());
        }

        Ok(Arc::new(StubSession {
            state: Arc::clone(&self.state),
            _lease: lease,
        }))
    }
}

macro_rules! stub_driver {
    ($session:ty) => {
        #[async_trait]
        impl Driver<$session> for StubDriver {
            fn name(&self) -> &str {
                "stub"
            }

            async fn open(&self, _settings: &ServiceSettings) -> Result<Arc<$session>, BoxError> {
                let session: Arc<$session> = self.open_session().await?;
                Ok(session)
            }
        }
    };
}

stub_driver!(dyn DatabaseSession);
stub_driver!(dyn FileSession);
stub_driver!(dyn MessageSession);
stub_driver!(dyn SearchSession);
stub_driver!(dyn DiscoverySession);

pub struct StubSession {
    state: Arc<StubState>,
    _lease: Lease,
}

#[async_trait]
impl Session for StubSession {
    async fn ping(&self) -> Result<(), BoxError> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        if self.state.hang_ping.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.state.fail_ping.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer").into());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe while closing").into());
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseSession for StubSession {
    async fn insert(&self, _collection: &str, _document: Value) -> Result<String, BoxError> {
        Ok("stub".to_string())
    }

    async fn get(&self, _collection: &str, _id: &str) -> Result<Option<Value>, BoxError> {
        Ok(None)
    }

    async fn delete(&self, _collection: &str, _id: &str) -> Result<bool, BoxError> {
        Ok(false)
    }

    async fn find(&self, _collection: &str, _field: &str, _value: &Value) -> Result<Vec<Value>, BoxError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl FileSession for StubSession {
    async fn put(&self, _key: &str, _data: Bytes) -> Result<(), BoxError> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> Result<Option<Bytes>, BoxError> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> Result<bool, BoxError> {
        Ok(false)
    }

    async fn list(&self, _prefix: &str) -> Result<Vec<String>, BoxError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl MessageSession for StubSession {
    async fn publish(&self, _message: Message) -> Result<(), BoxError> {
        Ok(())
    }

    async fn subscribe(&self, _topic: &str) -> Result<MessageStream, BoxError> {
        Ok(Box::pin(stream::empty()))
    }
}

#[async_trait]
impl SearchSession for StubSession {
    async fn index(&self, _index: &str, _id: &str, _document: Value) -> Result<(), BoxError> {
        Ok(())
    }

    async fn query(&self, _index: &str, _text: &str, _limit: usize) -> Result<Vec<SearchHit>, BoxError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl DiscoverySession for StubSession {
    async fn get_value(&self, _key: &str) -> Result<Option<String>, BoxError> {
        Ok(None)
    }

    async fn put_value(&self, _key: &str, _value: &str) -> Result<(), BoxError> {
        Ok(())
    }

    async fn register(&self, _instance: &ServiceInstance) -> Result<(), BoxError> {
        Ok(())
    }

    async fn deregister(&self, _instance_id: &str) -> Result<(), BoxError> {
        Ok(())
    }

    async fn discover(&self, _name: &str) -> Result<Vec<ServiceInstance>, BoxError> {
        Ok(Vec::new())
    }
}
