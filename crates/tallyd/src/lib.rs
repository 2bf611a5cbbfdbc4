//! tally daemon - concurrent TCP session server
//!
//! This crate provides the infrastructure for the tally daemon:
//! - `store` - Session store actor holding every client's running total
//! - `server` - TCP listener and per-client connection handlers
//! - `shutdown` - Shared shutdown signal and handler tracking
//! - `config` - Layered configuration (defaults, file, env, CLI)
//! - `pidfile` - PID file used by `tallyd stop` and `tallyd status`
//! - `cli` - Command-line entry point
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        tallyd daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │   BoundServer   │     │     SessionStoreActor       │    │
//! │  │ (TCP listener)  │     │  (session value owner)      │    │
//! │  └────────┬────────┘     └──────────────▲──────────────┘    │
//! │           │                             │                   │
//! │           │ accept                      │ StoreCommand      │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐                    │                   │
//! │  │ConnectionHandler│────────────────────┘                   │
//! │  │  (per client)   │                                        │
//! │  └─────────────────┘                                        │
//! │           ▲                                                 │
//! │           │ cancelled()                                     │
//! │  ┌────────┴────────┐                                        │
//! │  │    Shutdown     │◀──── SIGTERM / SIGINT                  │
//! │  └─────────────────┘                                        │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod cli;
pub mod config;
pub mod pidfile;
pub mod server;
pub mod shutdown;
pub mod store;
