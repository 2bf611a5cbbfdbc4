//! TCP server for the tally daemon.
//!
//! The server:
//! - Binds one listening socket on the configured host and port
//! - Spawns a tracked ConnectionHandler for each accepted client and goes
//!   straight back to accepting
//! - Stops accepting when the shutdown signal fires, then waits for
//!   handlers to finish
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  BoundServer    │
//! │                 │
//! │  TcpListener    │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌────────────────────┐
//! │ConnectionHandler│────▶│ SessionStoreHandle │
//! │   (per client)  │     │                    │
//! └─────────────────┘     └────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Accept errors are logged and allow continued operation

mod connection;

pub use connection::{CloseReason, ConnectionError, ConnectionHandler, ConnectionSettings, MAX_LINE_SIZE};

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use tally_core::ClientIdentity;

use crate::config::ServerConfig;
use crate::shutdown::Shutdown;
use crate::store::SessionStoreHandle;

/// Pause after a failed accept so persistent errors (e.g. out of file
/// descriptors) do not spin the loop
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// TCP server before binding.
///
/// Holds everything the listener and the connection handlers share: the
/// configuration, the store handle and the shutdown coordinator.
pub struct Server {
    /// Resolved configuration
    config: ServerConfig,

    /// Handle to the session store
    store: SessionStoreHandle,

    /// Shutdown signal and handler tracker
    shutdown: Shutdown,
}

impl Server {
    /// Creates a new server.
    ///
    /// # Arguments
    ///
    /// * `config` - Resolved server configuration
    /// * `store` - Handle to the session store
    /// * `shutdown` - Coordinator for graceful shutdown
    pub fn new(config: ServerConfig, store: SessionStoreHandle, shutdown: Shutdown) -> Self {
        Self {
            config,
            store,
            shutdown,
        }
    }

    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// - `ServerError::Bind` if the address is in use, not permitted, or
    ///   does not resolve
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let addr = self.config.listen_addr();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                error: e.to_string(),
            })?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::LocalAddr(e.to_string()))?;

        info!(address = %local_addr, "Server listening");

        Ok(BoundServer {
            listener,
            local_addr,
            settings: ConnectionSettings::from(&self.config),
            shutdown_grace: self.config.shutdown_grace,
            connection_counter: 0,
            store: self.store,
            shutdown: self.shutdown,
        })
    }

    /// Binds and serves until shutdown.
    ///
    /// This method does not return until shutdown, except on bind failure.
    pub async fn run(self) -> Result<(), ServerError> {
        self.bind().await?.serve().await
    }
}

/// A server with its socket bound, ready to accept.
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    settings: ConnectionSettings,
    shutdown_grace: Duration,

    /// Total connections accepted so far
    connection_counter: u64,

    store: SessionStoreHandle,
    shutdown: Shutdown,
}

impl BoundServer {
    /// Returns the address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the shutdown signal fires.
    ///
    /// Each connection is handed to its own task and the loop continues at
    /// once. After shutdown the listener is closed and handlers get the
    /// configured grace period to finish.
    pub async fn serve(mut self) -> Result<(), ServerError> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                result = self.listener.accept() => match result {
                    Ok((stream, addr)) => self.handle_connection(stream, addr),
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        tokio::select! {
                            _ = self.shutdown.cancelled() => break,
                            _ = sleep(ACCEPT_ERROR_BACKOFF) => {}
                        }
                    }
                },
            }
        }

        info!(
            accepted = self.connection_counter,
            active = self.active_connections(),
            "Server shutdown requested, no longer accepting"
        );

        let Self {
            listener,
            shutdown,
            shutdown_grace,
            ..
        } = self;
        drop(listener);

        if shutdown.drain(shutdown_grace).await {
            info!("All connections closed");
        } else {
            warn!("Some connections did not close within the grace period");
        }

        Ok(())
    }

    /// Spawns a tracked handler task for an accepted connection.
    fn handle_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        self.connection_counter += 1;
        let identity = ClientIdentity::new(addr);

        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %identity, error = %e, "Failed to set TCP_NODELAY");
        }

        debug!(
            peer = %identity,
            connection = self.connection_counter,
            active = self.active_connections(),
            "Accepted connection"
        );

        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(
            reader,
            writer,
            identity,
            self.store.clone(),
            self.shutdown.clone(),
            self.settings,
        );

        self.shutdown.spawn(handler.run());
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.shutdown.active_tasks()
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Failed to read bound address: {0}")]
    LocalAddr(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:23".to_string(),
            error: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("0.0.0.0:23"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_bind_port_zero_reports_real_port() {
        let config = ServerConfig::builder().host("127.0.0.1").port(0).build();
        let server = Server::new(config, crate::store::spawn_session_store(), Shutdown::new());

        let bound = server.bind().await.unwrap();
        assert_ne!(bound.local_addr().port(), 0);
        assert_eq!(bound.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_bind_occupied_port_fails() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let config = ServerConfig::builder().host("127.0.0.1").port(port).build();
        let server = Server::new(config, crate::store::spawn_session_store(), Shutdown::new());

        let err = server.bind().await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(err.to_string().contains(&port.to_string()));
    }
}
