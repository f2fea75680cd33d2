//! In-process drivers
//!
//! Each driver instance is one isolated backend: sessions opened from the same
//! driver share its state, so data survives a close/reconnect cycle. Used for
//! local development and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::clients::database::ID_FIELD;
use crate::clients::messages::MessageStream;
use crate::clients::{
    DatabaseSession, DiscoverySession, FileSession, Message, MessageSession, SearchHit, SearchSession,
    ServiceInstance,
};
use crate::config::ServiceSettings;
use crate::core::{Driver, Session};
use crate::error::BoxError;

/// Default per-topic buffer of the in-memory broker
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// Errors raised by the in-memory backends
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("session is closed")]
    SessionClosed,

    #[error("subscriber lagged behind and missed {0} messages")]
    Lagged(u64),

    #[error("document field {0} must be a string")]
    InvalidId(&'static str),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Open/closed flag shared by every in-memory session.
///
/// Streams handed out by a session watch the flag and end once it closes.
#[derive(Debug)]
struct Liveness {
    closed: watch::Sender<bool>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self {
            closed: watch::channel(false).0,
        }
    }
}

impl Liveness {
    fn check(&self) -> Result<(), BoxError> {
        if *self.closed.borrow() {
            Err(MemoryError::SessionClosed.into())
        } else {
            Ok(())
        }
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

macro_rules! memory_session {
    ($session:ty) => {
        #[async_trait]
        impl Session for $session {
            async fn ping(&self) -> Result<(), BoxError> {
                self.liveness.check()
            }

            async fn close(&self) -> Result<(), BoxError> {
                self.liveness.close();
                Ok(())
            }
        }
    };
}

// Database

type Collections = HashMap<String, BTreeMap<String, Value>>;

/// In-memory document database
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    collections: Arc<Mutex<Collections>>,
}

pub struct MemoryDatabaseSession {
    collections: Arc<Mutex<Collections>>,
    liveness: Liveness,
}

#[async_trait]
impl Driver<dyn DatabaseSession> for MemoryDatabase {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, _settings: &ServiceSettings) -> Result<Arc<dyn DatabaseSession>, BoxError> {
        Ok(Arc::new(MemoryDatabaseSession {
            collections: Arc::clone(&self.collections),
            liveness: Liveness::default(),
        }))
    }
}

memory_session!(MemoryDatabaseSession);

#[async_trait]
impl DatabaseSession for MemoryDatabaseSession {
    async fn insert(&self, collection: &str, mut document: Value) -> Result<String, BoxError> {
        self.liveness.check()?;
        let id = match document.get(ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            Some(_) => return Err(MemoryError::InvalidId(ID_FIELD).into()),
            None => uuid::Uuid::new_v4().to_string(),
        };
        if let Value::Object(map) = &mut document {
            map.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        }
        lock(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), document);
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, BoxError> {
        self.liveness.check()?;
        Ok(lock(&self.collections)
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, BoxError> {
        self.liveness.check()?;
        Ok(lock(&self.collections)
            .get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn find(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Value>, BoxError> {
        self.liveness.check()?;
        Ok(lock(&self.collections)
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| doc.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

// Files

/// In-memory blob store
#[derive(Debug, Default)]
pub struct MemoryFiles {
    blobs: Arc<Mutex<BTreeMap<String, Bytes>>>,
}

pub struct MemoryFileSession {
    blobs: Arc<Mutex<BTreeMap<String, Bytes>>>,
    liveness: Liveness,
}

#[async_trait]
impl Driver<dyn FileSession> for MemoryFiles {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, _settings: &ServiceSettings) -> Result<Arc<dyn FileSession>, BoxError> {
        Ok(Arc::new(MemoryFileSession {
            blobs: Arc::clone(&self.blobs),
            liveness: Liveness::default(),
        }))
    }
}

memory_session!(MemoryFileSession);

#[async_trait]
impl FileSession for MemoryFileSession {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BoxError> {
        self.liveness.check()?;
        lock(&self.blobs).insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, BoxError> {
        self.liveness.check()?;
        Ok(lock(&self.blobs).get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, BoxError> {
        self.liveness.check()?;
        Ok(lock(&self.blobs).remove(key).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BoxError> {
        self.liveness.check()?;
        Ok(lock(&self.blobs)
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

// Messages

/// In-memory topic broker built on broadcast channels
#[derive(Debug)]
pub struct MemoryBroker {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Message>>>>,
    capacity: usize,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }
}

impl MemoryBroker {
    /// Broker whose topics buffer `capacity` messages per subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Reads the `capacity` option
    pub fn from_settings(settings: &ServiceSettings) -> Self {
        let capacity = settings
            .option_u64("capacity")
            .and_then(|c| usize::try_from(c).ok())
            .unwrap_or(DEFAULT_TOPIC_CAPACITY);
        Self::with_capacity(capacity)
    }
}

pub struct MemoryMessageSession {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Message>>>>,
    capacity: usize,
    liveness: Liveness,
}

impl MemoryMessageSession {
    fn sender(&self, topic: &str) -> broadcast::Sender<Message> {
        lock(&self.topics)
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

#[async_trait]
impl Driver<dyn MessageSession> for MemoryBroker {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, _settings: &ServiceSettings) -> Result<Arc<dyn MessageSession>, BoxError> {
        Ok(Arc::new(MemoryMessageSession {
            topics: Arc::clone(&self.topics),
            capacity: self.capacity,
            liveness: Liveness::default(),
        }))
    }
}

memory_session!(MemoryMessageSession);

#[async_trait]
impl MessageSession for MemoryMessageSession {
    async fn publish(&self, message: Message) -> Result<(), BoxError> {
        self.liveness.check()?;
        let topic = message.topic.clone();
        if self.sender(&topic).send(message).is_err() {
            log::debug!("No subscribers on topic {}, message dropped", topic);
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream, BoxError> {
        self.liveness.check()?;
        let receiver = self.sender(topic).subscribe();
        let closed = self.liveness.watch();
        // Ends when the topic or the session closes
        let stream = stream::unfold((receiver, closed), |(mut receiver, mut closed)| async move {
            let received = tokio::select! {
                biased;
                _ = closed.wait_for(|closed| *closed) => None,
                received = receiver.recv() => Some(received),
            };
            let item = match received? {
                Ok(message) => Ok(message),
                Err(broadcast::error::RecvError::Lagged(missed)) => Err(BoxError::from(MemoryError::Lagged(missed))),
                Err(broadcast::error::RecvError::Closed) => return None,
            };
            Some((item, (receiver, closed)))
        });
        Ok(Box::pin(stream))
    }
}

// Search

type Indices = HashMap<String, BTreeMap<String, Value>>;

/// In-memory search index with naive term scoring
#[derive(Debug, Default)]
pub struct MemorySearch {
    indices: Arc<Mutex<Indices>>,
}

pub struct MemorySearchSession {
    indices: Arc<Mutex<Indices>>,
    liveness: Liveness,
}

#[async_trait]
impl Driver<dyn SearchSession> for MemorySearch {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, _settings: &ServiceSettings) -> Result<Arc<dyn SearchSession>, BoxError> {
        Ok(Arc::new(MemorySearchSession {
            indices: Arc::clone(&self.indices),
            liveness: Liveness::default(),
        }))
    }
}

memory_session!(MemorySearchSession);

#[async_trait]
impl SearchSession for MemorySearchSession {
    async fn index(&self, index: &str, id: &str, document: Value) -> Result<(), BoxError> {
        self.liveness.check()?;
        lock(&self.indices)
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn query(&self, index: &str, text: &str, limit: usize) -> Result<Vec<SearchHit>, BoxError> {
        self.liveness.check()?;
        let terms: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();

        let mut hits: Vec<SearchHit> = lock(&self.indices)
            .get(index)
            .map(|docs| {
                docs.iter()
                    .filter_map(|(id, document)| {
                        let score = term_score(&terms, document);
                        (score > 0.0).then(|| SearchHit {
                            id: id.clone(),
                            score,
                            document: document.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Number of term occurrences in the document's text; an empty query matches everything
fn term_score(terms: &[String], document: &Value) -> f64 {
    if terms.is_empty() {
        return 1.0;
    }
    let text = document.to_string().to_lowercase();
    terms
        .iter()
        .map(|term| text.matches(term.as_str()).count() as f64)
        .sum()
}

// Service discovery

#[derive(Debug, Default)]
struct Catalog {
    values: BTreeMap<String, String>,
    instances: BTreeMap<String, ServiceInstance>,
}

/// In-memory configuration store and service catalog
#[derive(Debug, Default)]
pub struct MemoryDiscovery {
    catalog: Arc<Mutex<Catalog>>,
}

pub struct MemoryDiscoverySession {
    catalog: Arc<Mutex<Catalog>>,
    liveness: Liveness,
}

#[async_trait]
impl Driver<dyn DiscoverySession> for MemoryDiscovery {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, _settings: &ServiceSettings) -> Result<Arc<dyn DiscoverySession>, BoxError> {
        Ok(Arc::new(MemoryDiscoverySession {
            catalog: Arc::clone(&self.catalog),
            liveness: Liveness::default(),
        }))
    }
}

memory_session!(MemoryDiscoverySession);

#[async_trait]
impl DiscoverySession for MemoryDiscoverySession {
    async fn get_value(&self, key: &str) -> Result<Option<String>, BoxError> {
        self.liveness.check()?;
        Ok(lock(&self.catalog).values.get(key).cloned())
    }

    async fn put_value(&self, key: &str, value: &str) -> Result<(), BoxError> {
        self.liveness.check()?;
        lock(&self.catalog).values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn register(&self, instance: &ServiceInstance) -> Result<(), BoxError> {
        self.liveness.check()?;
        lock(&self.catalog)
            .instances
            .insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> Result<(), BoxError> {
        self.liveness.check()?;
        lock(&self.catalog).instances.remove(instance_id);
        Ok(())
    }

    async fn discover(&self, name: &str) -> Result<Vec<ServiceInstance>, BoxError> {
        self.liveness.check()?;
        Ok(lock(&self.catalog)
            .instances
            .values()
            .filter(|instance| instance.name == name)
            .cloned()
            .collect())
    }
}
