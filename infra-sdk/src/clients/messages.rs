//! Message queue client
//!
//! Topic-based publish/subscribe. A subscription only sees messages published
//! after it was created.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, Fuse};
use futures::StreamExt;
use uuid::Uuid;

use super::ServiceKind;
use crate::core::{Driver, Handle, Session};
use crate::error::{mapping, BoxError, Result, SdkError};

/// A message on a topic
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Unique message id
    pub id: Uuid,

    /// Topic the message was published on
    pub topic: String,

    pub payload: Bytes,

    /// Free-form headers
    pub headers: BTreeMap<String, String>,

    /// Publication time
    pub published_at: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with a fresh id and the current time
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload: payload.into(),
            headers: BTreeMap::new(),
            published_at: Utc::now(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Stream of messages as delivered by a driver
pub type MessageStream = BoxStream<'static, std::result::Result<Message, BoxError>>;

/// Session operations a message queue driver provides
#[async_trait]
pub trait MessageSession: Session {
    async fn publish(&self, message: Message) -> std::result::Result<(), BoxError>;

    async fn subscribe(&self, topic: &str) -> std::result::Result<MessageStream, BoxError>;
}

/// An active subscription to one topic
pub struct Subscription {
    topic: String,
    stream: Fuse<MessageStream>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next message; `Ok(None)` once the topic or session is closed
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        match self.stream.next().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(err)) => Err(mapping::translate(ServiceKind::Messages, "receive", err)),
            None => Ok(None),
        }
    }
}

/// Message queue client handle
pub struct MessageClient {
    handle: Handle<dyn MessageSession>,
}

delegate_capability!(MessageClient);

impl MessageClient {
    pub fn new(driver: Arc<dyn Driver<dyn MessageSession>>) -> Self {
        Self {
            handle: Handle::new(ServiceKind::Messages, driver),
        }
    }

    pub fn handle(&self) -> &Handle<dyn MessageSession> {
        &self.handle
    }

    /// Publish a payload on `topic`, returning the message id
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> Result<Uuid> {
        self.publish_message(Message::new(topic, payload)).await
    }

    /// Publish a prepared message, returning its id
    pub async fn publish_message(&self, message: Message) -> Result<Uuid> {
        validate_topic(&message.topic)?;
        let session = self.handle.session()?;
        let id = message.id;
        session
            .publish(message)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Messages, "publish", e))?;
        Ok(id)
    }

    /// Subscribe to `topic`
    pub async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        validate_topic(topic)?;
        let session = self.handle.session()?;
        let stream = session
            .subscribe(topic)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Messages, "subscribe", e))?;
        Ok(Subscription {
            topic: topic.to_string(),
            stream: stream.fuse(),
        })
    }
}

fn validate_topic(topic: &str) -> Result<()> {
    if topic.trim().is_empty() {
        return Err(SdkError::message_queue("topic must not be empty"));
    }
    Ok(())
}
