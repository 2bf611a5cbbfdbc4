//! Session store actor - owns every client's running total.
//!
//! The SessionStoreActor is the single owner of session state. It receives
//! commands over an mpsc channel and answers each on its oneshot.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Reply send failures are ignored (the caller went away)

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info};

use tally_core::{ClientIdentity, SessionEntry, SessionValue};

use super::commands::StoreCommand;

// ============================================================================
// Session Store Actor
// ============================================================================

/// The session store actor.
///
/// Commands are processed strictly one at a time inside a single task, so
/// every add-or-update is a complete read-modify-write with nothing
/// interleaved. Two clients adding to the same key can never lose an
/// update, and a snapshot always reflects a single point in the command
/// sequence.
pub struct SessionStoreActor {
    /// Command receiver
    receiver: mpsc::Receiver<StoreCommand>,

    /// Entries keyed by the owning client
    sessions: HashMap<ClientIdentity, SessionEntry>,
}

impl SessionStoreActor {
    /// Creates a new, empty store actor.
    pub fn new(receiver: mpsc::Receiver<StoreCommand>) -> Self {
        Self {
            receiver,
            sessions: HashMap::new(),
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until every handle has been dropped.
    pub async fn run(mut self) {
        info!("Session store starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(sessions = self.sessions.len(), "Session store stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: StoreCommand) {
        match cmd {
            StoreCommand::AddOrUpdate {
                identity,
                delta,
                respond_to,
            } => {
                let value = self.handle_add_or_update(identity, delta);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(value);
            }
            StoreCommand::Remove {
                identity,
                respond_to,
            } => {
                let removed = self.handle_remove(&identity);
                let _ = respond_to.send(removed);
            }
            StoreCommand::Get {
                identity,
                respond_to,
            } => {
                let value = self.sessions.get(&identity).map(|entry| entry.value);
                let _ = respond_to.send(value);
            }
            StoreCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.handle_snapshot());
            }
            StoreCommand::Len { respond_to } => {
                let _ = respond_to.send(self.sessions.len());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_add_or_update(&mut self, identity: ClientIdentity, delta: SessionValue) -> SessionValue {
        match self.sessions.get_mut(&identity) {
            Some(entry) => {
                let value = entry.apply(delta);
                debug!(peer = %identity, delta, value, "Session updated");
                value
            }
            None => {
                self.sessions
                    .insert(identity, SessionEntry::new(identity, delta));
                debug!(
                    peer = %identity,
                    value = delta,
                    total_sessions = self.sessions.len(),
                    "Session created"
                );
                delta
            }
        }
    }

    fn handle_remove(&mut self, identity: &ClientIdentity) -> Option<SessionEntry> {
        let removed = self.sessions.remove(identity);
        if let Some(ref entry) = removed {
            debug!(
                peer = %identity,
                value = entry.value,
                updates = entry.updates,
                age_secs = entry.age().num_seconds(),
                total_sessions = self.sessions.len(),
                "Session removed"
            );
        }
        removed
    }

    fn handle_snapshot(&self) -> Vec<SessionEntry> {
        let mut entries: Vec<SessionEntry> = self.sessions.values().cloned().collect();
        entries.sort_by_key(|entry| entry.identity);
        entries
    }

    /// Returns the number of entries (for testing).
    #[cfg(test)]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
