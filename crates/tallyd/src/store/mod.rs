//! Session store using the Actor pattern.
//!
//! The store holds every connected client's running total. A single actor
//! task owns the map; connection handlers talk to it through a cloned
//! `SessionStoreHandle` over a tokio mpsc channel.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐                      ┌───────────────────┐
//! │ConnectionHandler 1│──┐                   │ SessionStoreActor │
//! └───────────────────┘  │   StoreCommand    │                   │
//! ┌───────────────────┐  ├──────────────────▶│ HashMap<Client-   │
//! │ConnectionHandler 2│──┤  (mpsc channel)   │  Identity, Entry> │
//! └───────────────────┘  │                   └─────────┬─────────┘
//! ┌───────────────────┐  │                             │
//! │ConnectionHandler n│──┘◀────────────────────────────┘
//! └───────────────────┘      reply (oneshot)
//! ```
//!
//! Commands are applied one at a time, which serializes the whole store:
//! add-or-update is atomic per key and never loses an update.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::SessionStoreActor;
pub use commands::{StoreCommand, StoreError};
pub use handle::SessionStoreHandle;

/// Command channel buffer size
const COMMAND_BUFFER: usize = 256;

/// Spawn the session store actor and return a handle for interaction.
///
/// The actor runs until every clone of the returned handle is dropped.
///
/// # Example
///
/// ```no_run
/// use tallyd::store::spawn_session_store;
///
/// #[tokio::main]
/// async fn main() {
///     let store = spawn_session_store();
///     let entries = store.snapshot().await;
///     assert!(entries.is_empty());
/// }
/// ```
pub fn spawn_session_store() -> SessionStoreHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = SessionStoreActor::new(cmd_rx);
    tokio::spawn(actor.run());

    SessionStoreHandle::new(cmd_tx)
}
