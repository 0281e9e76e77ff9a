//! Envelope model and hierarchical topic addressing
//!
//! An [`Envelope`] is the unit of bus traffic: a caller-supplied [`Message`]
//! stamped with a topic, a process-unique id, a timestamp and a sequence
//! number. Sequence numbers come from an [`EnvelopeFactory`] rather than a
//! global, so independent producers (and tests) get independent counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Board finding shared between tasks.
pub const BOARD_DISCOVERY: &str = "board.discovery";
/// Board warning. Never dropped by board retention.
pub const BOARD_WARNING: &str = "board.warning";
/// Board announcement of what a task is about to do.
pub const BOARD_INTENT: &str = "board.intent";
/// Board background context.
pub const BOARD_CONTEXT: &str = "board.context";

/// Caller-supplied message, before it is addressed to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub sender: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Message {
    pub fn new(
        msg_type: impl Into<String>,
        sender: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            msg_type: msg_type.into(),
            sender: sender.into(),
            payload,
        }
    }

    /// Message with a `{"text": ...}` payload, the shape the board renders.
    pub fn text(
        msg_type: impl Into<String>,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(
            msg_type,
            sender,
            serde_json::json!({ "text": text.into() }),
        )
    }
}

/// Timestamped, sequenced, topic-addressed message.
///
/// `seq` is the only total-order guarantee; timestamps may tie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub topic: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub sender: String,
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// The `text` field of the payload, if present.
    pub fn text(&self) -> Option<&str> {
        self.payload.get("text").and_then(|v| v.as_str())
    }
}

/// Shared reference to an EnvelopeFactory
pub type SharedEnvelopeFactory = Arc<EnvelopeFactory>;

/// Owns the sequence counter and id prefix for one producer context.
#[derive(Debug)]
pub struct EnvelopeFactory {
    seq: AtomicU64,
    id_prefix: String,
}

impl EnvelopeFactory {
    /// Create a factory whose ids carry the current process id.
    pub fn new() -> Self {
        Self::with_prefix(std::process::id().to_string())
    }

    /// Create a factory with an explicit id prefix.
    pub fn with_prefix(id_prefix: impl Into<String>) -> Self {
        Self {
            seq: AtomicU64::new(0),
            id_prefix: id_prefix.into(),
        }
    }

    /// Create a shared reference to this factory
    pub fn shared(self) -> SharedEnvelopeFactory {
        Arc::new(self)
    }

    /// Address `message` to `topic`.
    ///
    /// For two envelopes from the same factory, `a.seq < b.seq` iff `a` was
    /// built first.
    pub fn envelope(&self, topic: impl Into<String>, message: Message) -> Envelope {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        Envelope {
            id: format!("{}-{}", self.id_prefix, Uuid::new_v4().simple()),
            topic: topic.into(),
            msg_type: message.msg_type,
            sender: message.sender,
            seq,
            timestamp: Utc::now(),
            payload: message.payload,
        }
    }

    /// Last sequence number handed out (0 before the first envelope).
    pub fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}

impl Default for EnvelopeFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Hierarchical topic match.
///
/// `pattern` matches when it is empty, equal to `topic`, or a dot-delimited
/// ancestor of it. Matching is segment aligned, so `consensus.s1` does not
/// match `consensus.s10.x`.
pub fn topic_match(pattern: &str, topic: &str) -> bool {
    if pattern.is_empty() || pattern == topic {
        return true;
    }
    topic
        .strip_prefix(pattern)
        .is_some_and(|rest| rest.starts_with('.'))
}
