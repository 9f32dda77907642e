//! Timestamps and analysis identifiers.
//!
//! The pipeline never reads ambient time directly; it asks the injected
//! [`Clock`]. Production uses [`SystemClock`], tests use [`FixedClock`] so
//! records (and therefore rendered reports) are reproducible.

use chrono::{DateTime, Utc};

/// Source of the creation timestamp and identifier of an analysis.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Identifier for an analysis created at `at`.
    ///
    /// Must be safe to call from many requests at once without shared
    /// mutable state.
    fn analysis_id(&self, at: DateTime<Utc>) -> String;
}

/// Wall-clock time plus a random suffix.
///
/// Ids look like `analysis_1718000000000_3fa85f64`: unique within a process
/// even when two uploads land in the same millisecond.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn analysis_id(&self, at: DateTime<Utc>) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("analysis_{}_{}", at.timestamp_millis(), &suffix[..8])
    }
}

/// Always returns the same instant and id.
#[derive(Debug, Clone)]
pub struct FixedClock {
    at: DateTime<Utc>,
    id: String,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self { at, id: id.into() }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }

    fn analysis_id(&self, _at: DateTime<Utc>) -> String {
        self.id.clone()
    }
}
