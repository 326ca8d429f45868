//! # Control Session Driver
//!
//! One [`ControlSession`] owns each accepted control connection and
//! drives it through the protocol's fixed state sequence:
//!
//! ```text
//! ReadLogin -> Kickoff -> Admit -> QueueZero -> Version
//!          -> TestList -> [tests in fixed order] -> Results -> Logout
//! ```
//!
//! Any I/O or protocol error aborts the session immediately: the error
//! propagates to the connection handler, which logs it with session
//! context, and dropping the session releases its admission slot and
//! closes the connection. The only error a client ever sees as a frame
//! is `Busy` (`SRV_QUEUE("9987")`).

use crate::error::{Error, Result};
use crate::gate::AdmissionGate;
use crate::net::DeadlineStream;
use crate::nettests::{meta, s2c, s2c::S2cConfig};
use crate::protocol::{
    Codec, MessageType, KICKOFF, SRV_QUEUE_SERVER_BUSY, SRV_QUEUE_TEST_STARTS_NOW, TEST_META,
    TEST_S2C, TEST_S2C_EXT,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// NDT protocol version announced to clients.
pub const PROTOCOL_VERSION: &str = "v3.7.0";

/// Placeholder results body. Clients tolerate this line; kernel TCP
/// counters would be injected here once a results pipeline exists.
const RESULTS_PLACEHOLDER: &str = "web100_supported: 0\n";

/// Per-session knobs, injected by the server.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Settings shared by the single- and multi-stream S2C variants.
    pub s2c: S2cConfig,
}

/// The server identification string sent after the queue-empty message.
pub fn server_greeting() -> String {
    format!("{} ({})", PROTOCOL_VERSION, env!("CARGO_PKG_NAME"))
}

/// Compose the space-separated list of test IDs the server will run,
/// filtered from the client's mask. The order is fixed: S2C_EXT, then
/// S2C, then META. MID, C2S, and SFW are not scheduled by this driver.
pub fn test_list(mask: u16) -> String {
    let mut ids = Vec::new();
    for test in [TEST_S2C_EXT, TEST_S2C, TEST_META] {
        if mask & test != 0 {
            ids.push(test.to_string());
        }
    }
    ids.join(" ")
}

/// Drives one control connection from login to logout.
#[derive(Debug)]
pub struct ControlSession<S> {
    codec: Codec<S>,
    gate: Arc<AdmissionGate>,
    config: SessionConfig,
    shutdown: CancellationToken,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ControlSession<S> {
    /// Build a session over a raw byte endpoint. The conduit and codec
    /// layers are owned by the session from here on.
    pub fn new(
        stream: S,
        gate: Arc<AdmissionGate>,
        config: SessionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            codec: Codec::new(DeadlineStream::new(stream)),
            gate,
            config,
            shutdown,
        }
    }

    /// Run the session to completion.
    pub async fn run(mut self) -> Result<()> {
        let login = self.codec.read_login().await?;
        info!("Client login: version {}, test suite {}", login.version, login.tests);

        // The kickoff is consumed unframed by the legacy client side.
        self.codec.write_raw(KICKOFF).await?;

        // Holding a permit is a precondition for running any test; the
        // drop at the end of this scope releases it on every exit path.
        let _permit = match self.gate.try_acquire() {
            Some(permit) => permit,
            None => {
                self.codec
                    .write_json_frame(MessageType::SrvQueue, SRV_QUEUE_SERVER_BUSY)
                    .await?;
                return Err(Error::Busy);
            }
        };

        self.codec
            .write_json_frame(MessageType::SrvQueue, SRV_QUEUE_TEST_STARTS_NOW)
            .await?;
        self.codec
            .write_json_frame(MessageType::Login, &server_greeting())
            .await?;
        self.codec
            .write_json_frame(MessageType::Login, &test_list(login.tests))
            .await?;

        if login.wants(TEST_S2C_EXT) {
            if self.bail_on_shutdown() {
                return Ok(());
            }
            let sample = s2c::run(&mut self.codec, &self.config.s2c, true).await?;
            info!("s2c_ext complete: {:.2} kbit/s over {} bytes", sample.kbps(), sample.bytes);
        }
        if login.wants(TEST_S2C) {
            if self.bail_on_shutdown() {
                return Ok(());
            }
            let sample = s2c::run(&mut self.codec, &self.config.s2c, false).await?;
            info!("s2c complete: {:.2} kbit/s over {} bytes", sample.kbps(), sample.bytes);
        }
        if login.wants(TEST_META) {
            if self.bail_on_shutdown() {
                return Ok(());
            }
            let transcript = meta::run(&mut self.codec).await?;
            info!("meta complete: {} metadata entries", transcript.len());
            for line in &transcript {
                debug!("Session metadata: {}", line);
            }
        }

        self.codec
            .write_json_frame(MessageType::Results, RESULTS_PLACEHOLDER)
            .await?;
        self.codec.write_json_frame(MessageType::Logout, "").await?;
        Ok(())
    }

    fn bail_on_shutdown(&self) -> bool {
        if self.shutdown.is_cancelled() {
            warn!("server shutting down; aborting session before next test");
            return true;
        }
        false
    }
}
