//! # Accept Loop
//!
//! Binds the well-known control port and spawns one session task per
//! accepted connection. The admission gate is constructed here and
//! shared by every session; everything else is per-connection.

use crate::defaults;
use crate::error::Result;
use crate::gate::AdmissionGate;
use crate::session::{ControlSession, SessionConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Server-wide settings, normally derived from the command line.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind the control listener on.
    pub host: String,
    /// Control port.
    pub port: u16,
    /// Concurrent-session cap enforced by the admission gate.
    pub max_active: usize,
    /// Settings handed to every session.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: defaults::CONTROL_PORT,
            max_active: defaults::MAX_ACTIVE_TESTS,
            session: SessionConfig::default(),
        }
    }
}

/// The NDT control server.
#[derive(Debug)]
pub struct NdtServer {
    config: ServerConfig,
    gate: Arc<AdmissionGate>,
    shutdown: CancellationToken,
}

impl NdtServer {
    /// Build a server; nothing is bound until [`NdtServer::run`].
    pub fn new(config: ServerConfig) -> Self {
        let gate = AdmissionGate::new(config.max_active);
        Self {
            config,
            gate,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the accept loop when cancelled. Sessions consult
    /// a child of it between tests.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The shared admission gate (visible for tests and monitoring).
    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// A bind failure propagates out of here and is the one error that
    /// should take the process down with a non-zero exit.
    pub async fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener. Split from
    /// [`NdtServer::run`] so tests can bind an ephemeral port first.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        info!("NDT server listening on {} (admission cap {})", local, self.gate.cap());

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("shutdown requested; accept loop exiting");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    self.spawn_session(stream, peer);
                }
            }
        }
    }

    fn spawn_session(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let gate = Arc::clone(&self.gate);
        let config = self.config.session.clone();
        let shutdown = self.shutdown.child_token();
        tokio::spawn(async move {
            info!("Control connection accepted from {}", peer);
            let session = ControlSession::new(stream, gate, config, shutdown);
            match session.run().await {
                Ok(()) => info!("Session with {} complete", peer),
                Err(e) => warn!("Session with {} aborted: {}", peer, e),
            }
        });
    }
}
