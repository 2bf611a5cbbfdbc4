//! Session store commands and errors.
//!
//! This module defines the message types for talking to the `SessionStoreActor`:
//! - `StoreCommand`: Commands sent to the actor
//! - `StoreError`: Errors that can occur while talking to the actor
//!
//! The store itself has no failure modes: every command is total. The only
//! error is the actor being gone.

use tally_core::{ClientIdentity, SessionEntry, SessionValue};
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Store Commands
// ============================================================================

/// Commands sent to the session store actor.
///
/// Each command carries a oneshot channel for the reply, so callers can
/// await the result without sharing any lock.
#[derive(Debug)]
pub enum StoreCommand {
    /// Add `delta` to the client's total, creating the entry if needed.
    ///
    /// Replies with the resulting value.
    AddOrUpdate {
        /// Whose total to change
        identity: ClientIdentity,
        /// Amount to add
        delta: SessionValue,
        /// Channel to send the new value
        respond_to: oneshot::Sender<SessionValue>,
    },

    /// Remove the client's entry if present.
    ///
    /// Replies with the removed entry, or `None` if there was nothing to
    /// remove.
    Remove {
        /// Whose entry to drop
        identity: ClientIdentity,
        /// Channel to send the removed entry
        respond_to: oneshot::Sender<Option<SessionEntry>>,
    },

    /// Get a single client's current value.
    Get {
        /// Whose value to read
        identity: ClientIdentity,
        /// Channel to send the value
        respond_to: oneshot::Sender<Option<SessionValue>>,
    },

    /// List all entries, ordered by identity.
    Snapshot {
        /// Channel to send the entries
        respond_to: oneshot::Sender<Vec<SessionEntry>>,
    },

    /// Count entries.
    Len {
        /// Channel to send the count
        respond_to: oneshot::Sender<usize>,
    },
}

// ============================================================================
// Store Errors
// ============================================================================

/// Errors that can occur when talking to the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The actor stopped before answering.
    ///
    /// Only happens if the actor task died; handles keep it alive otherwise.
    #[error("session store channel closed")]
    ChannelClosed,
}
