//! Identifier generation for correlation ids and callback refs

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of fresh ids for operations and callback references
///
/// Ids only need to be unique among the operations outstanding on one
/// channel.
pub trait CorrelationIds: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs in their simple form
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl CorrelationIds for RandomIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Deterministic ids with a fixed prefix, handy for traces and fixtures
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl CorrelationIds for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }
}
