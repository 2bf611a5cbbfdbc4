//! Connection handler for individual client connections.
//!
//! Each accepted connection gets its own `ConnectionHandler`, which walks
//! through a small state machine:
//!
//! ```text
//! Greeting ─▶ AwaitLine ─▶ Processing ─┐
//!                 ▲                    │
//!                 └────────────────────┤
//!                                      ▼
//!                                   Closing ─▶ Closed
//! ```
//!
//! A read or write failure or EOF moves straight to `Closing`, which removes
//! the client's entry from the session store. Shutdown is observed while
//! waiting for the next line, so a command already being processed still
//! gets its reply.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use tally_core::ClientIdentity;
use tally_protocol::{parse_line, Command, Reply};

use crate::config::ServerConfig;
use crate::shutdown::Shutdown;
use crate::store::{SessionStoreHandle, StoreError};

/// Maximum accepted line length in bytes, excluding the `\n` or `\r\n`
pub const MAX_LINE_SIZE: usize = 64 * 1024;

/// Most bytes buffered for one line: the content plus a `\r\n` terminator
const LINE_WINDOW: u64 = MAX_LINE_SIZE as u64 + 2;

/// Per-connection timeouts, taken from the server configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Close the connection after this long without input
    pub idle_timeout: Option<Duration>,

    /// Give up on a single response write after this long
    pub write_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for ConnectionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
            write_timeout: config.write_timeout,
        }
    }
}

/// Where the handler is in its lifecycle.
#[derive(Debug)]
enum State {
    Greeting,
    AwaitLine,
    Processing(Command),
    Closing(CloseReason),
}

/// Why a connection ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The client sent `exit`
    ClientExit,

    /// The client closed its side of the connection
    PeerClosed,

    /// The server is shutting down
    Shutdown,

    /// A transport or store failure
    Failed(ConnectionError),
}

impl CloseReason {
    /// Whether the connection ended without any failure.
    #[must_use]
    pub fn is_graceful(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

impl From<ConnectionError> for CloseReason {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Eof => Self::PeerClosed,
            ConnectionError::Cancelled => Self::Shutdown,
            other => Self::Failed(other),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientExit => write!(f, "client sent exit"),
            Self::PeerClosed => write!(f, "peer closed connection"),
            Self::Shutdown => write!(f, "server shutting down"),
            Self::Failed(e) => write!(f, "{e}"),
        }
    }
}

/// Connection handler for a single client.
///
/// Owns both halves of the connection; no other task ever touches them, so
/// replies are written in the order commands arrive.
pub struct ConnectionHandler<R, W> {
    /// Buffered reader for incoming lines
    reader: BufReader<R>,

    /// Buffered writer for replies
    writer: BufWriter<W>,

    /// Remote endpoint, used as the session key
    identity: ClientIdentity,

    /// Handle to the shared session store
    store: SessionStoreHandle,

    /// Shared shutdown signal
    shutdown: Shutdown,

    /// Timeouts
    settings: ConnectionSettings,
}

impl<R, W> ConnectionHandler<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read half of the client stream
    /// * `writer` - Write half of the client stream
    /// * `identity` - The client's remote endpoint
    /// * `store` - Handle to the session store
    /// * `shutdown` - Shared shutdown signal
    /// * `settings` - Timeouts for this connection
    pub fn new(
        reader: R,
        writer: W,
        identity: ClientIdentity,
        store: SessionStoreHandle,
        shutdown: Shutdown,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            identity,
            store,
            shutdown,
            settings,
        }
    }

    /// Runs the connection until it closes.
    ///
    /// Consumes the handler: both stream halves are dropped on return, on
    /// every path.
    pub async fn run(mut self) -> CloseReason {
        info!(peer = %self.identity, "Client connected");

        let mut state = State::Greeting;
        loop {
            state = match state {
                State::Greeting => match self.send(&[Reply::Welcome]).await {
                    Ok(()) => State::AwaitLine,
                    Err(e) => State::Closing(e.into()),
                },
                State::AwaitLine => match self.read_line().await {
                    Ok(line) => State::Processing(parse_line(&line)),
                    Err(e) => State::Closing(e.into()),
                },
                State::Processing(command) => self.process(command).await,
                State::Closing(reason) => {
                    self.close(&reason).await;
                    return reason;
                }
            };
        }
    }

    /// Executes one command and picks the next state.
    async fn process(&mut self, command: Command) -> State {
        let result = match command {
            Command::Empty => return State::AwaitLine,
            Command::Exit => return State::Closing(CloseReason::ClientExit),
            Command::List => {
                let replies: Vec<Reply> = self
                    .store
                    .snapshot()
                    .await
                    .into_iter()
                    .map(|entry| Reply::list_entry(entry.identity, entry.value))
                    .collect();
                debug!(peer = %self.identity, entries = replies.len(), "Listing sessions");
                self.send(&replies).await
            }
            Command::Add(delta) => match self.store.add_or_update(self.identity, delta).await {
                Ok(value) => {
                    info!(peer = %self.identity, delta, value, "Client sent number");
                    self.send(&[Reply::session_value(value)]).await
                }
                Err(e) => Err(ConnectionError::from(e)),
            },
            Command::Unrecognized(text) => {
                debug!(peer = %self.identity, input = %text, "Unrecognized input");
                self.send(&[Reply::NotUnderstood]).await
            }
        };

        match result {
            Ok(()) => State::AwaitLine,
            Err(e) => State::Closing(e.into()),
        }
    }

    /// Drops the client's session entry.
    async fn close(&mut self, reason: &CloseReason) {
        let removed = self.store.remove(self.identity).await;
        let session_secs = removed.as_ref().map(|entry| entry.age().num_seconds());

        if reason.is_graceful() {
            info!(
                peer = %self.identity,
                reason = %reason,
                final_value = ?removed.as_ref().map(|entry| entry.value),
                session_secs = ?session_secs,
                "Client disconnected"
            );
        } else {
            warn!(
                peer = %self.identity,
                reason = %reason,
                final_value = ?removed.as_ref().map(|entry| entry.value),
                "Client connection failed"
            );
        }
    }

    /// Reads one line, racing the shutdown signal.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. A final line without
    /// a trailing newline is still returned; only a read of zero bytes is
    /// EOF.
    async fn read_line(&mut self) -> Result<String, ConnectionError> {
        let mut buf = Vec::new();

        let bytes_read = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ConnectionError::Cancelled),
            result = read_bounded_line(&mut self.reader, &mut buf, self.settings.idle_timeout) => result?,
        };

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line_content(&buf).len() > MAX_LINE_SIZE {
            return Err(ConnectionError::LineTooLong { max: MAX_LINE_SIZE });
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Writes replies as one flushed batch.
    ///
    /// Not raced against shutdown: a reply for a command that already took
    /// effect is always attempted, bounded by the write timeout. Shutdown is
    /// observed at the next read.
    async fn send(&mut self, replies: &[Reply]) -> Result<(), ConnectionError> {
        if replies.is_empty() {
            return Ok(());
        }

        let payload: String = replies.iter().map(Reply::to_line).collect();
        write_flushed(&mut self.writer, payload.as_bytes(), self.settings.write_timeout).await
    }
}

/// The line without its `\n` or `\r\n` terminator.
fn line_content(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

/// Reads up to and including `\n`, never buffering more than
/// `LINE_WINDOW` bytes.
async fn read_bounded_line<B>(
    reader: &mut B,
    buf: &mut Vec<u8>,
    idle_timeout: Option<Duration>,
) -> Result<usize, ConnectionError>
where
    B: AsyncBufRead + Unpin,
{
    let mut limited = reader.take(LINE_WINDOW);
    let read = limited.read_until(b'\n', buf);

    let result = match idle_timeout {
        Some(idle) => timeout(idle, read)
            .await
            .map_err(|_| ConnectionError::IdleTimeout)?,
        None => read.await,
    };

    result.map_err(|e| ConnectionError::Io(e.to_string()))
}

async fn write_flushed<W>(
    writer: &mut W,
    bytes: &[u8],
    write_timeout: Duration,
) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    match timeout(write_timeout, async {
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Line too long (max: {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Idle timeout")]
    IdleTimeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Cancelled by shutdown")]
    Cancelled,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
