//! Session entries held by the session store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::ClientIdentity;

/// The integer accumulator kept for each client.
pub type SessionValue = i64;

/// Parses a session value from client input.
///
/// Surrounding whitespace is ignored and a leading `+` or `-` is accepted.
/// Anything else that is not a base-10 integer in range is rejected.
pub fn parse_value(text: &str) -> DomainResult<SessionValue> {
    text.trim()
        .parse::<SessionValue>()
        .map_err(|e| DomainError::InvalidValue {
            value: text.to_string(),
            reason: e.to_string(),
        })
}

/// One client's accumulated value plus bookkeeping.
///
/// Created lazily on the first number a client sends and dropped when the
/// client disconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    /// Who owns this entry
    pub identity: ClientIdentity,

    /// Current accumulated value
    pub value: SessionValue,

    /// When the first number arrived
    pub created_at: DateTime<Utc>,

    /// When the value last changed
    pub updated_at: DateTime<Utc>,

    /// Number of additions applied, including the initial one
    pub updates: u64,
}

impl SessionEntry {
    /// Creates an entry holding `initial`.
    pub fn new(identity: ClientIdentity, initial: SessionValue) -> Self {
        let now = Utc::now();
        Self {
            identity,
            value: initial,
            created_at: now,
            updated_at: now,
            updates: 1,
        }
    }

    /// Adds `delta` to the value and returns the result.
    ///
    /// Wraps on overflow so the operation is total.
    pub fn apply(&mut self, delta: SessionValue) -> SessionValue {
        self.value = self.value.wrapping_add(delta);
        self.updated_at = Utc::now();
        self.updates = self.updates.saturating_add(1);
        self.value
    }

    /// Time since the entry was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.created_at)
    }
}
