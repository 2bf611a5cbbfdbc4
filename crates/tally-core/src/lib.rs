//! Tally Core - Shared types for the tally server
//!
//! This crate provides the domain types shared between the line
//! protocol (`tally-protocol`) and the daemon (`tallyd`).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod identity;
pub mod session;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use identity::ClientIdentity;
pub use session::{parse_value, SessionEntry, SessionValue};
