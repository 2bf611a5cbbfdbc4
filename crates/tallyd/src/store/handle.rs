//! Client interface for interacting with the SessionStoreActor.
//!
//! The `SessionStoreHandle` is a cheap-to-clone interface for sending
//! commands to the store actor. Every connection handler owns a clone.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `StoreError::ChannelClosed`

use tokio::sync::{mpsc, oneshot};

use tally_core::{ClientIdentity, SessionEntry, SessionValue};

use super::commands::{StoreCommand, StoreError};

// ============================================================================
// Session Store Handle
// ============================================================================

/// Handle for interacting with the session store actor.
///
/// # Usage
///
/// ```ignore
/// let store = spawn_session_store();
///
/// let value = store.add_or_update(identity, 5).await?;
/// for entry in store.snapshot().await {
///     println!("{} = {}", entry.identity, entry.value);
/// }
/// store.remove(identity).await;
/// ```
#[derive(Clone)]
pub struct SessionStoreHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<StoreCommand>,
}

impl SessionStoreHandle {
    /// Create a new store handle.
    pub fn new(sender: mpsc::Sender<StoreCommand>) -> Self {
        Self { sender }
    }

    /// Add `delta` to the client's total and return the new total.
    ///
    /// Creates the entry holding `delta` if the client has none yet.
    ///
    /// # Errors
    ///
    /// - `StoreError::ChannelClosed` if the actor has shut down
    pub async fn add_or_update(
        &self,
        identity: ClientIdentity,
        delta: SessionValue,
    ) -> Result<SessionValue, StoreError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(StoreCommand::AddOrUpdate {
                identity,
                delta,
                respond_to: tx,
            })
            .await
            .map_err(|_| StoreError::ChannelClosed)?;

        rx.await.map_err(|_| StoreError::ChannelClosed)
    }

    /// Remove the client's entry.
    ///
    /// Waits until the actor has applied the removal, so the entry is gone
    /// once this returns. Returns the removed entry, or `None` if the client
    /// had none (or the actor is gone).
    pub async fn remove(&self, identity: ClientIdentity) -> Option<SessionEntry> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(StoreCommand::Remove {
                identity,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Get a single client's current total.
    pub async fn get(&self, identity: ClientIdentity) -> Option<SessionValue> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(StoreCommand::Get {
                identity,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// List all entries, ordered by identity.
    ///
    /// The listing is taken in one step of the actor, but clients active
    /// at the same time may change their totals right after it is taken.
    /// Returns an empty vector if the actor is gone.
    pub async fn snapshot(&self) -> Vec<SessionEntry> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(StoreCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Number of entries in the store.
    pub async fn len(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(StoreCommand::Len { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or_default()
    }

    /// Whether the store has no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
