//! Correlation identifiers for sessions and contexts.
//!
//! Ids only tie log lines and artifacts together across interleaved runs.
//! Production uses random ids; tests inject [`SequentialIds`] so logs are
//! reproducible.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Opaque correlation tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wrap an existing tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Tag as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of correlation ids
pub trait IdSource: Send + Sync + fmt::Debug {
    /// Produce the next id
    fn next_id(&self) -> CorrelationId;
}

/// Random 8-hex-digit tags derived from a v4 UUID
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&self) -> CorrelationId {
        let mut tag = Uuid::new_v4().simple().to_string();
        tag.truncate(8);
        CorrelationId(tag)
    }
}

/// Deterministic `<prefix><n>` tags
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    /// Start counting at `start`
    #[must_use]
    pub fn new(prefix: impl Into<String>, start: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(start),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new("", 1)
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> CorrelationId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        CorrelationId(format!("{}{n}", self.prefix))
    }
}
