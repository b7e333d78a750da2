//! Change and usage notifications
//!
//! The registry and the reference tracker never talk to a transport
//! directly. They go through `EventPublisher`, which formats payloads, knows
//! the configured topics, and stops emitting once the discovery instance is
//! closed. The transport itself is the `Notifier` trait.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::debug;

use crate::model::{Record, Status};

/// Publish-only message channel
pub trait Notifier: Send + Sync {
    /// Fire-and-forget delivery of `payload` on `topic`
    fn publish(&self, topic: &str, payload: Value);
}

/// Notifier that drops everything
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn publish(&self, _topic: &str, _payload: Value) {}
}

/// A message delivered by `BroadcastNotifier`
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub topic: String,
    pub payload: Value,
}

/// In-process notifier backed by a `tokio::sync::broadcast` channel
///
/// Messages published with no live subscriber are dropped.
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, topic: &str, payload: Value) {
        let _ = self.sender.send(Notification {
            topic: topic.to_string(),
            payload,
        });
    }
}

/// Usage event kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Bind,
    Release,
}

impl UsageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::Release => "release",
        }
    }
}

/// Topic-aware, closable front of a `Notifier`
pub struct EventPublisher {
    notifier: Arc<dyn Notifier>,
    announce_topic: String,
    /// `None` disables usage events
    usage_topic: Option<String>,
    holder: String,
    closed: AtomicBool,
}

impl EventPublisher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        announce_topic: impl Into<String>,
        usage_topic: Option<String>,
        holder: impl Into<String>,
    ) -> Self {
        Self {
            notifier,
            announce_topic: announce_topic.into(),
            usage_topic: usage_topic.filter(|topic| !topic.is_empty()),
            holder: holder.into(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn usage_enabled(&self) -> bool {
        self.usage_topic.is_some()
    }

    /// Emit `{record, status}` on the announce topic
    pub fn announce(&self, record: &Record, status: Status) {
        if self.is_closed() {
            return;
        }
        debug!(
            topic = %self.announce_topic,
            name = %record.name,
            status = %status,
            "Announcing record"
        );
        self.notifier.publish(
            &self.announce_topic,
            json!({
                "record": record.to_json(),
                "status": status.as_str(),
            }),
        );
    }

    /// Emit `{record, type, id}` on the usage topic, if enabled
    pub fn usage(&self, record: &Record, kind: UsageKind) {
        if self.is_closed() {
            return;
        }
        let Some(topic) = &self.usage_topic else {
            return;
        };
        self.notifier.publish(
            topic,
            json!({
                "record": record.to_json(),
                "type": kind.as_str(),
                "id": self.holder,
            }),
        );
    }

    /// Stop emitting; idempotent
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
