//! Tally Protocol - Line protocol spoken over client connections
//!
//! Clients send newline-terminated UTF-8 lines. Each line classifies to a
//! [`Command`]; the server answers with zero or more [`Reply`] lines.
//!
//! ```text
//! client                          server
//!   |  <connect>                    |
//!   |<----------------- Welcome ----|
//!   |  "5"  ---------------------->|
//!   |<------- SessionValue(5) ------|
//!   |  "list" -------------------->|
//!   |<------- ListEntry * n --------|
//!   |  "exit" -------------------->|  (connection closed)
//! ```

pub mod command;
pub mod reply;

pub use command::{parse_line, Command};
pub use reply::{Reply, LINE_TERMINATOR};
