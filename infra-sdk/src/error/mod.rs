//! Error handling for the Infra SDK
//!
//! Every failure that crosses a client handle or the facade is an [`SdkError`].
//! The error system:
//! - Categorizes errors into seven kinds (configuration, connection and one per backend)
//! - Keeps the backend-native failure as the error source
//! - Aggregates per-service failures into a single report
//! - Provides a convenient Result type alias

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::clients::ServiceKind;

pub mod mapping;

/// Result type for Infra SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;

/// Boxed backend-native error as returned by drivers and sessions
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The closed set of error kinds surfaced by the SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Invalid or incomplete configuration
    Configuration,
    /// Connect/close lifecycle failures
    Connection,
    /// Database operation failures
    Database,
    /// Blob/file storage failures
    FileStorage,
    /// Message queue failures
    MessageQueue,
    /// Search index failures
    Search,
    /// Configuration store / service discovery failures
    ServiceDiscovery,
}

impl ErrorKind {
    /// The error kind used for in-service failures of the given backend
    pub fn for_service(service: ServiceKind) -> Self {
        match service {
            ServiceKind::Database => ErrorKind::Database,
            ServiceKind::Files => ErrorKind::FileStorage,
            ServiceKind::Messages => ErrorKind::MessageQueue,
            ServiceKind::Search => ErrorKind::Search,
            ServiceKind::Config => ErrorKind::ServiceDiscovery,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Connection => write!(f, "connection"),
            ErrorKind::Database => write!(f, "database"),
            ErrorKind::FileStorage => write!(f, "file storage"),
            ErrorKind::MessageQueue => write!(f, "message queue"),
            ErrorKind::Search => write!(f, "search"),
            ErrorKind::ServiceDiscovery => write!(f, "service discovery"),
        }
    }
}

/// Main error type for the Infra SDK
#[derive(Error, Debug)]
pub enum SdkError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Connection lifecycle errors
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// File storage errors
    #[error("File storage error: {message}")]
    FileStorage {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Message queue errors
    #[error("Message queue error: {message}")]
    MessageQueue {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Search errors
    #[error("Search error: {message}")]
    Search {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Service discovery errors
    #[error("Service discovery error: {message}")]
    ServiceDiscovery {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl SdkError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Configuration => SdkError::Configuration { message, source: None },
            ErrorKind::Connection => SdkError::Connection { message, source: None },
            ErrorKind::Database => SdkError::Database { message, source: None },
            ErrorKind::FileStorage => SdkError::FileStorage { message, source: None },
            ErrorKind::MessageQueue => SdkError::MessageQueue { message, source: None },
            ErrorKind::Search => SdkError::Search { message, source: None },
            ErrorKind::ServiceDiscovery => SdkError::ServiceDiscovery { message, source: None },
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// Create a file storage error
    pub fn file_storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FileStorage, message)
    }

    /// Create a message queue error
    pub fn message_queue(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MessageQueue, message)
    }

    /// Create a search error
    pub fn search(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Search, message)
    }

    /// Create a service discovery error
    pub fn service_discovery(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceDiscovery, message)
    }

    /// Create an error of the kind owned by a backend service
    pub fn for_service(service: ServiceKind, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::for_service(service), message)
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, cause: impl Into<BoxError>) -> Self {
        *self.source_slot() = Some(cause.into());
        self
    }

    /// Build an aggregated error naming every failing service.
    ///
    /// The message lists each service with its error; the individual errors stay
    /// reachable through [`SdkError::failures`].
    pub fn aggregate(kind: ErrorKind, headline: impl fmt::Display, failures: ServiceFailures) -> Self {
        Self::new(kind, format!("{}: {}", headline, failures)).with_source(failures)
    }

    /// The kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SdkError::Configuration { .. } => ErrorKind::Configuration,
            SdkError::Connection { .. } => ErrorKind::Connection,
            SdkError::Database { .. } => ErrorKind::Database,
            SdkError::FileStorage { .. } => ErrorKind::FileStorage,
            SdkError::MessageQueue { .. } => ErrorKind::MessageQueue,
            SdkError::Search { .. } => ErrorKind::Search,
            SdkError::ServiceDiscovery { .. } => ErrorKind::ServiceDiscovery,
        }
    }

    /// The human-readable message, without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            SdkError::Configuration { message, .. }
            | SdkError::Connection { message, .. }
            | SdkError::Database { message, .. }
            | SdkError::FileStorage { message, .. }
            | SdkError::MessageQueue { message, .. }
            | SdkError::Search { message, .. }
            | SdkError::ServiceDiscovery { message, .. } => message,
        }
    }

    /// Per-service failures if this is an aggregated error
    pub fn failures(&self) -> Option<&ServiceFailures> {
        self.source()
            .and_then(|source| source.downcast_ref::<ServiceFailures>())
    }

    /// Names of the services contributing to an aggregated error, empty otherwise
    pub fn failed_services(&self) -> Vec<ServiceKind> {
        self.failures()
            .map(|failures| failures.services().collect())
            .unwrap_or_default()
    }

    fn source_slot(&mut self) -> &mut Option<BoxError> {
        match self {
            SdkError::Configuration { source, .. }
            | SdkError::Connection { source, .. }
            | SdkError::Database { source, .. }
            | SdkError::FileStorage { source, .. }
            | SdkError::MessageQueue { source, .. }
            | SdkError::Search { source, .. }
            | SdkError::ServiceDiscovery { source, .. } => source,
        }
    }
}

/// Failures collected per service, keyed by service name.
///
/// Each service owns exactly one slot, so concurrent lifecycle calls never
/// interleave their results.
#[derive(Debug, Default)]
pub struct ServiceFailures {
    failures: BTreeMap<ServiceKind, SdkError>,
}

impl ServiceFailures {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the failure of a service, replacing any earlier one
    pub fn insert(&mut self, service: ServiceKind, error: SdkError) {
        self.failures.insert(service, error);
    }

    /// Whether no service failed
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failing services
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// The failing services in name order
    pub fn services(&self) -> impl Iterator<Item = ServiceKind> + '_ {
        self.failures.keys().copied()
    }

    /// The failure recorded for a service
    pub fn get(&self, service: ServiceKind) -> Option<&SdkError> {
        self.failures.get(&service)
    }

    /// Iterate over (service, error) pairs
    pub fn iter(&self) -> impl Iterator<Item = (ServiceKind, &SdkError)> {
        self.failures.iter().map(|(service, error)| (*service, error))
    }

    /// Convert into an aggregated error, or `Ok(())` when nothing failed
    pub fn into_result(self, kind: ErrorKind, headline: impl fmt::Display) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(SdkError::aggregate(kind, headline, self))
        }
    }
}

impl FromIterator<(ServiceKind, SdkError)> for ServiceFailures {
    fn from_iter<I: IntoIterator<Item = (ServiceKind, SdkError)>>(iter: I) -> Self {
        Self {
            failures: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ServiceFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (service, error)) in self.failures.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", service, error)?;
            if let Some(cause) = error.source() {
                if cause.downcast_ref::<ServiceFailures>().is_none() {
                    write!(f, " (caused by: {})", cause)?;
                }
            }
        }
        Ok(())
    }
}

impl StdError for ServiceFailures {}
