//! Shared helpers for the tallyd integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`; the panic-free policy covers
//! production code only.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tallyd::config::ServerConfig;
use tallyd::server::Server;
use tallyd::shutdown::Shutdown;
use tallyd::store::{spawn_session_store, SessionStoreHandle};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

// ============================================================================
// Constants
// ============================================================================

/// Longest a test waits for any single reply
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Greeting every client receives on connect
pub const WELCOME: &str =
    "Welcome to the Telnet server. Enter messages or commands 'list' 'exit'.";

/// Reply to input that is neither a number nor a command
pub const NOT_UNDERSTOOD: &str =
    "Incorrect message value received. Enter the number or the command.";

// ============================================================================
// Test Server
// ============================================================================

/// A server bound to an ephemeral port on loopback.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: SessionStoreHandle,
    pub shutdown: Shutdown,
    pub task: JoinHandle<()>,
}

impl TestServer {
    /// Spawns a server with default settings.
    pub async fn spawn() -> Self {
        Self::spawn_with(ServerConfig::builder()).await
    }

    /// Spawns a server from a partially configured builder.
    ///
    /// Host and port are always forced to `127.0.0.1:0`.
    pub async fn spawn_with(builder: tallyd::config::ServerConfigBuilder) -> Self {
        let config = builder
            .host("127.0.0.1")
            .port(0)
            .shutdown_grace(Duration::from_secs(1))
            .build();

        let store = spawn_session_store();
        let shutdown = Shutdown::new();

        let bound = Server::new(config, store.clone(), shutdown.clone())
            .bind()
            .await
            .expect("bind test server");
        let addr = bound.local_addr();

        let task = tokio::spawn(async move {
            let _ = bound.serve().await;
        });

        Self {
            addr,
            store,
            shutdown,
            task,
        }
    }

    /// Connects a client and consumes the greeting.
    pub async fn connect(&self) -> TestClient {
        let mut client = TestClient::connect(self.addr).await;
        assert_eq!(client.read_line().await.as_deref(), Some(WELCOME));
        client
    }

    /// Requests shutdown and waits for the accept loop to finish.
    pub async fn shutdown(self) {
        self.shutdown.request_shutdown();
        timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server stops after shutdown")
            .expect("server task did not panic");
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// Line-oriented client speaking the wire protocol.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    pub local_addr: SocketAddr,
}

impl TestClient {
    /// Connects without reading anything.
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to server");
        let local_addr = stream.local_addr().expect("client local addr");
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
            local_addr,
        }
    }

    /// Sends one line with a CRLF terminator.
    pub async fn send(&mut self, line: &str) {
        self.send_raw(format!("{line}\r\n").as_bytes()).await;
    }

    /// Sends bytes exactly as given.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write to server");
        self.writer.flush().await.expect("flush to server");
    }

    /// Reads one reply line without its terminator.
    ///
    /// Returns `None` on EOF. Panics if nothing arrives within `READ_TIMEOUT`.
    pub async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let read = timeout(READ_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("reply within timeout");
        match read {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    /// Reads one line if it arrives within `wait`.
    ///
    /// Outer `None` means nothing arrived in time.
    pub async fn try_read_line(&mut self, wait: Duration) -> Option<Option<String>> {
        let mut line = String::new();
        match timeout(wait, self.reader.read_line(&mut line)).await {
            Err(_) => None,
            Ok(Ok(0)) | Ok(Err(_)) => Some(None),
            Ok(Ok(_)) => Some(Some(line.trim_end_matches(['\r', '\n']).to_string())),
        }
    }

    /// Sends a line and returns the single reply.
    pub async fn request(&mut self, line: &str) -> String {
        self.send(line).await;
        self.read_line().await.expect("reply before EOF")
    }

    /// Sends a number and returns the running total the server reports.
    pub async fn add(&mut self, value: i64) -> i64 {
        let reply = self.request(&value.to_string()).await;
        parse_total(&reply)
    }

    /// Sends `list` followed by a sentinel `0` and collects the list lines.
    ///
    /// An empty list produces no output, so the sentinel's reply marks the
    /// end. The sentinel creates an entry for this client if it had none.
    pub async fn list(&mut self) -> Vec<String> {
        self.send("list").await;
        self.send("0").await;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await.expect("reply before EOF");
            if line.starts_with("Client session value is: ") {
                return lines;
            }
            lines.push(line);
        }
    }

    /// Waits until the server closes the connection.
    pub async fn expect_eof(&mut self) {
        assert_eq!(self.read_line().await, None);
    }
}

/// Polls the store until it holds `expected` entries.
pub async fn wait_for_store_len(store: &SessionStoreHandle, expected: usize) {
    let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
    while store.len().await != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "store never reached {expected} entries"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Extracts the total from a `Client session value is: N` reply.
pub fn parse_total(reply: &str) -> i64 {
    reply
        .strip_prefix("Client session value is: ")
        .unwrap_or_else(|| panic!("unexpected reply: {reply}"))
        .parse()
        .expect("numeric total")
}

/// Formats the list line expected for a client.
pub fn list_line(addr: SocketAddr, value: i64) -> String {
    format!("Client: {addr} has the value: {value}.")
}
