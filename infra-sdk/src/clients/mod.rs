//! Service-specific client handles
//!
//! Each client binds one backend service to the shared lifecycle core and adds
//! the operations of that service. Backend failures are translated into the
//! service's error kind before they leave the client.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// The backend services fronted by the SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Relational/document database
    Database,
    /// Blob/file store
    Files,
    /// Message queue
    Messages,
    /// Search index
    Search,
    /// Configuration store and service discovery
    Config,
}

impl ServiceKind {
    /// Every supported service, in configuration order
    pub const ALL: [ServiceKind; 5] = [
        ServiceKind::Database,
        ServiceKind::Files,
        ServiceKind::Messages,
        ServiceKind::Search,
        ServiceKind::Config,
    ];

    /// The configuration key of this service
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Database => "database",
            ServiceKind::Files => "files",
            ServiceKind::Messages => "messages",
            ServiceKind::Search => "search",
            ServiceKind::Config => "config",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SdkError::configuration(format!("unknown service: {}", s)))
    }
}

/// Implement [`Capability`](crate::core::Capability) for a client by delegating to its handle
macro_rules! delegate_capability {
    ($client:ty) => {
        #[async_trait::async_trait]
        impl $crate::core::Capability for $client {
            fn service(&self) -> $crate::clients::ServiceKind {
                self.handle.service()
            }

            fn state(&self) -> $crate::core::LifecycleState {
                self.handle.state()
            }

            fn configure(&self, settings: $crate::config::ServiceSettings) -> $crate::error::Result<()> {
                self.handle.configure(settings)
            }

            async fn connect(&self) -> $crate::error::Result<()> {
                self.handle.connect().await
            }

            async fn healthcheck(&self) -> $crate::core::HealthStatus {
                self.handle.healthcheck().await
            }

            async fn close(&self) -> $crate::error::Result<()> {
                self.handle.close().await
            }
        }
    };
}

pub mod database;
pub mod discovery;
pub mod files;
pub mod messages;
pub mod search;

pub use database::{DatabaseClient, DatabaseSession};
pub use discovery::{DiscoveryClient, DiscoverySession, ServiceInstance};
pub use files::{FileClient, FileSession};
pub use messages::{Message, MessageClient, MessageSession, Subscription};
pub use search::{SearchClient, SearchHit, SearchSession};
