//! Server replies and their text rendering.

use std::fmt;

use tally_core::{ClientIdentity, SessionValue};

/// Terminator appended to every reply line.
///
/// CRLF keeps raw telnet clients happy and still ends in `\n` for
/// line-oriented readers.
pub const LINE_TERMINATOR: &str = "\r\n";

/// A single line sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Sent once right after the connection is accepted
    Welcome,

    /// The sender's running total after a number was applied
    SessionValue(SessionValue),

    /// One active session, sent once per entry for `list`
    ListEntry {
        /// Owner of the session
        identity: ClientIdentity,
        /// Its current total
        value: SessionValue,
    },

    /// Input was neither a command nor an integer
    NotUnderstood,
}

impl Reply {
    /// Creates a session value reply.
    pub fn session_value(value: SessionValue) -> Self {
        Self::SessionValue(value)
    }

    /// Creates a list entry reply.
    pub fn list_entry(identity: ClientIdentity, value: SessionValue) -> Self {
        Self::ListEntry { identity, value }
    }

    /// Renders the reply as a terminated wire line.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{self}{LINE_TERMINATOR}")
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welcome => write!(
                f,
                "Welcome to the Telnet server. Enter messages or commands 'list' 'exit'."
            ),
            Self::SessionValue(value) => write!(f, "Client session value is: {value}"),
            Self::ListEntry { identity, value } => {
                write!(f, "Client: {identity} has the value: {value}.")
            }
            Self::NotUnderstood => write!(
                f,
                "Incorrect message value received. Enter the number or the command."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_mentions_commands() {
        let text = Reply::Welcome.to_string();
        assert!(text.contains("'list'"));
        assert!(text.contains("'exit'"));
    }

    #[test]
    fn test_session_value_text() {
        assert_eq!(
            Reply::session_value(8).to_string(),
            "Client session value is: 8"
        );
        assert_eq!(
            Reply::session_value(-3).to_string(),
            "Client session value is: -3"
        );
    }

    #[test]
    fn test_list_entry_text() {
        let identity: ClientIdentity = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(
            Reply::list_entry(identity, 10).to_string(),
            "Client: 127.0.0.1:5000 has the value: 10."
        );
    }

    #[test]
    fn test_to_line_is_crlf_terminated() {
        let line = Reply::NotUnderstood.to_line();
        assert!(line.ends_with("\r\n"));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
