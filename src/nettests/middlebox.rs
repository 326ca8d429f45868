//! Middle-box detection test: a short blast of small segments.
//!
//! The segment size is clamped to 1456 bytes on the listener socket so
//! that interference with small-segment flows shows up in the kernel's
//! TCP counters, which are snapshotted and sent to the client.

use crate::defaults;
use crate::error::{Error, Result};
use crate::net::DeadlineStream;
use crate::nettests::bind_data_listener;
use crate::payload::PayloadGenerator;
use crate::protocol::{Codec, MessageType};
use crate::tcpinfo;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// Tunables for one middle-box run.
#[derive(Debug, Clone)]
pub struct MiddleboxConfig {
    /// Data port to bind; 0 (the default) requests an ephemeral port.
    pub port: u16,
    /// Length of the write window.
    pub duration: Duration,
    /// Segment size to clamp onto the listener socket, and the size of
    /// each payload block.
    pub mss: u32,
    /// Send buffer size forced on the accepted stream.
    pub send_buffer: usize,
}

impl Default for MiddleboxConfig {
    fn default() -> Self {
        Self {
            port: 0,
            duration: defaults::MIDDLEBOX_DURATION,
            mss: defaults::MIDDLEBOX_MSS,
            send_buffer: defaults::MIDDLEBOX_SEND_BUFFER,
        }
    }
}

/// Run the middle-box test on `codec` (the control connection).
///
/// Returns the number of payload blocks successfully written before the
/// write deadline closed the window.
pub async fn run<S: AsyncRead + AsyncWrite + Unpin>(
    codec: &mut Codec<S>,
    config: &MiddleboxConfig,
) -> Result<u64> {
    let accept_window = codec.stream_mut().timeout();
    let (listener, port) = bind_data_listener(config.port, accept_window).await?;

    codec
        .write_json_frame(MessageType::TestPrepare, &port.to_string())
        .await?;

    // Clamp the MSS before accepting so the accepted socket inherits it.
    let mss_applied = match tcpinfo::set_mss(listener.get_ref(), config.mss) {
        Ok(applied) => applied,
        Err(e) => {
            warn!("Failed to clamp MSS, continuing unclamped: {}", e);
            false
        }
    };

    let (conn, peer) = listener.accept().await?;
    debug!("Middlebox stream accepted from {} (mss clamped: {})", peer, mss_applied);
    socket2::SockRef::from(&conn).set_send_buffer_size(config.send_buffer)?;

    let mut payload_gen = PayloadGenerator::new();
    let payload = payload_gen.letters_fast(config.mss as usize);
    let mut stream = DeadlineStream::new(conn);

    // Absolute write deadline: the remaining window shrinks every
    // iteration until the next write fails.
    let deadline = Instant::now() + config.duration;
    let mut blocks: u64 = 0;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        stream.set_timeout(remaining);
        if stream.write_all(&payload).await.is_err() || stream.flush().await.is_err() {
            break;
        }
        blocks += 1;
    }
    debug!("Middlebox blast finished after {} blocks", blocks);

    let mut stats = tcpinfo::snapshot(stream.get_ref());
    if !mss_applied {
        stats["mss_clamp"] = serde_json::Value::String("unsupported".into());
    }
    let body = serde_json::to_vec(&stats).map_err(|e| Error::InvalidJson(e.to_string()))?;
    codec.write_frame(MessageType::TestMsg, &body).await?;

    // The blast may have left a near-zero timeout on the stream.
    stream.set_timeout(crate::net::DEFAULT_TIMEOUT);
    let (msg_type, client_msg) = codec.read_json_frame().await?;
    if msg_type != MessageType::TestMsg {
        return Err(Error::UnexpectedFrame {
            expected: MessageType::TestMsg.as_byte(),
            got: msg_type.as_byte(),
        });
    }
    debug!("Client middlebox report: {}", client_msg);

    codec.write_json_frame(MessageType::TestFinalize, "").await?;
    let _ = stream.shutdown().await;
    Ok(blocks)
}
