//! Opaque identifiers and the runtime clock.
//!
//! Every timestamp and identifier elsewhere in the crate is produced through
//! this module rather than calling `Uuid::new_v4()` / `chrono::Utc::now()`
//! directly at the call site, so a fixed clock can be substituted in tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A source of wall-clock time and monotonically increasing identifiers.
///
/// The default implementation, [`SystemClock`], uses the OS clock. Tests
/// that need deterministic `createdAt` ordering substitute [`FixedClock`].
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always returns the same instant, advanced manually.
///
/// Useful for asserting total ordering invariants (spec §8 property 2)
/// without depending on wall-clock resolution.
#[derive(Debug, Clone)]
pub struct FixedClock {
    inner: Arc<parking_lot::Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(parking_lot::Mutex::new(at)),
        }
    }

    /// Advance the clock and return the new instant.
    pub fn advance(&self, millis: i64) -> DateTime<Utc> {
        let mut guard = self.inner.lock();
        *guard += chrono::Duration::milliseconds(millis);
        *guard
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.lock()
    }
}

/// Generates identifiers that are globally unique within a process lifetime
/// and lexically sortable by creation order: a hex-padded millisecond
/// timestamp prefix followed by a UUIDv4 suffix for uniqueness within the
/// same millisecond.
fn new_sortable_id(clock: &dyn Clock, prefix: &str) -> String {
    let millis = clock.now_millis().max(0) as u64;
    format!("{prefix}_{millis:016x}_{}", Uuid::new_v4().simple())
}

macro_rules! opaque_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(clock: &dyn Clock) -> Self {
                Self(new_sortable_id(clock, $prefix))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(RunId, "run");
opaque_id!(ThreadId, "thr");
opaque_id!(WorkflowRunId, "wfr");
opaque_id!(ToolCallId, "call");
opaque_id!(NodeId, "node");

/// Deadline math shared by the engine (§5): every run/operation carries a
/// deadline derived from a configured duration and the clock that created it.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: DateTime<Utc>,
}

impl Deadline {
    pub fn after(clock: &dyn Clock, duration: std::time::Duration) -> Self {
        Self {
            at: clock.now() + chrono::Duration::from_std(duration).unwrap_or_default(),
        }
    }

    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        clock.now() >= self.at
    }

    pub fn remaining(&self, clock: &dyn Clock) -> std::time::Duration {
        (self.at - clock.now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_lexically_sortable_by_creation_order() {
        let clock = SystemClock;
        let first = RunId::new(&clock);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = RunId::new(&clock);
        assert!(first.as_str() < second.as_str());
    }

    #[test]
    fn fixed_clock_advances_deterministically() {
        let clock = FixedClock::new(Utc::now());
        let t0 = clock.now();
        let t1 = clock.advance(1000);
        assert!(t1 > t0);
    }

    #[test]
    fn deadline_expires_after_duration() {
        let clock = FixedClock::new(Utc::now());
        let deadline = Deadline::after(&clock, std::time::Duration::from_millis(500));
        assert!(!deadline.is_expired(&clock));
        clock.advance(600);
        assert!(deadline.is_expired(&clock));
    }
}
