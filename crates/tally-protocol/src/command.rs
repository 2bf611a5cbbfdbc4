//! Client commands and line classification.

use tally_core::{parse_value, SessionValue};

/// Keyword that ends the session.
pub const EXIT_KEYWORD: &str = "exit";

/// Keyword that lists every active session.
pub const LIST_KEYWORD: &str = "list";

/// A classified client line.
///
/// Every line maps to exactly one command; input the server does not
/// understand becomes [`Command::Unrecognized`] rather than an error so the
/// session can carry on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank or whitespace-only line; ignored without a reply
    Empty,

    /// `exit` (any case): close the session
    Exit,

    /// `list` (any case): dump all sessions
    List,

    /// An integer to add to the client's running total
    Add(SessionValue),

    /// Anything else, kept for logging
    Unrecognized(String),
}

/// Classifies one line of client input.
///
/// The line is trimmed first (this also strips a trailing `\r\n` or `\n`).
/// Keywords match case-insensitively.
pub fn parse_line(line: &str) -> Command {
    let text = line.trim();

    if text.is_empty() {
        return Command::Empty;
    }
    if text.eq_ignore_ascii_case(EXIT_KEYWORD) {
        return Command::Exit;
    }
    if text.eq_ignore_ascii_case(LIST_KEYWORD) {
        return Command::List;
    }

    match parse_value(text) {
        Ok(value) => Command::Add(value),
        Err(_) => Command::Unrecognized(text.to_string()),
    }
}
