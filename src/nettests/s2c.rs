//! Server-to-client throughput test (S2C), single- or multi-stream.

use crate::defaults;
use crate::error::{Error, Result};
use crate::net::DeadlineStream;
use crate::nettests::{bind_data_listener, ThroughputSample, WORKER_DONE};
use crate::payload::PayloadGenerator;
use crate::protocol::{Codec, MessageType};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Tunables for one S2C run. `Default` carries the protocol's reference
/// values; tests shorten the blast window and use ephemeral ports.
#[derive(Debug, Clone)]
pub struct S2cConfig {
    /// Data port to bind; 0 requests an ephemeral port. The port
    /// announced in TEST_PREPARE is always the one actually bound.
    pub port: u16,
    /// Stream count for the extended (multi-stream) variant.
    pub streams: usize,
    /// Length of the blast window.
    pub duration: Duration,
    /// Size of each random payload block.
    pub block_size: usize,
}

impl Default for S2cConfig {
    fn default() -> Self {
        Self {
            port: defaults::S2C_PORT,
            streams: defaults::PARALLEL_STREAMS,
            duration: defaults::TEST_DURATION,
            block_size: defaults::BLAST_BLOCK_SIZE,
        }
    }
}

/// The S2C result body. Serialized as the raw JSON object the client
/// expects, with PascalCase keys and all values as strings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct S2cResult {
    throughput_value: String,
    unsent_data_amount: String,
    total_sent_byte: String,
}

/// Run the S2C test on `codec` (the control connection).
///
/// With `extended` set, `config.streams` parallel streams are accepted
/// and blasted; otherwise a single stream is used. Returns the aggregate
/// sample the server measured and reported.
///
/// Frame order on the control channel: TEST_PREPARE precedes any stream
/// accept, TEST_START precedes any worker write, then the server's
/// TEST_MSG result, one client TEST_MSG, and TEST_FINALIZE.
pub async fn run<S: AsyncRead + AsyncWrite + Unpin>(
    codec: &mut Codec<S>,
    config: &S2cConfig,
    extended: bool,
) -> Result<ThroughputSample> {
    let accept_window = codec.stream_mut().timeout();
    let (listener, port) = bind_data_listener(config.port, accept_window).await?;

    let mut prepare = port.to_string();
    if extended {
        // Rate hint, window-scale hint, two reserved values, stream
        // count. The server echoes constants; the client interprets.
        prepare.push_str(&format!(" 10000.0 1 500.0 0.0 {}", config.streams));
    }
    codec
        .write_json_frame(MessageType::TestPrepare, &prepare)
        .await?;

    let nstreams = if extended { config.streams } else { 1 };
    let mut conns = Vec::with_capacity(nstreams);
    for idx in 0..nstreams {
        let (conn, peer) = listener.accept().await?;
        debug!("s2c stream {} accepted from {}", idx, peer);
        conns.push(conn);
    }

    codec.write_json_frame(MessageType::TestStart, "").await?;

    // One payload, generated before the workers start and shared by all
    // of them.
    let payload: Arc<Vec<u8>> = Arc::new(PayloadGenerator::new().letters_fast(config.block_size));
    let (tx, mut rx) = mpsc::channel::<i64>(64);
    let start = Instant::now();

    for conn in conns {
        let payload = Arc::clone(&payload);
        let tx = tx.clone();
        let duration = config.duration;
        tokio::spawn(blast_worker(conn, payload, tx, start, duration));
    }
    drop(tx);

    let mut bytes_sent: i64 = 0;
    let mut complete = 0;
    while complete < nstreams {
        match rx.recv().await {
            Some(count) if count >= 0 => bytes_sent += count,
            Some(_) => {
                debug!("s2c stream finished");
                complete += 1;
            }
            None => break,
        }
    }
    let elapsed = start.elapsed();
    let sample = ThroughputSample { bytes: bytes_sent, elapsed };

    let result = S2cResult {
        throughput_value: sample.kbps().to_string(),
        unsent_data_amount: "0".to_string(),
        total_sent_byte: bytes_sent.to_string(),
    };
    let body = serde_json::to_vec(&result).map_err(|e| Error::InvalidJson(e.to_string()))?;
    codec.write_frame(MessageType::TestMsg, &body).await?;

    // The client reports the speed it measured; log it, don't judge it.
    let (msg_type, client_speed) = codec.read_json_frame().await?;
    if msg_type != MessageType::TestMsg {
        return Err(Error::UnexpectedFrame {
            expected: MessageType::TestMsg.as_byte(),
            got: msg_type.as_byte(),
        });
    }
    debug!("Client measured s2c speed: {}", client_speed);

    codec.write_json_frame(MessageType::TestFinalize, "").await?;
    Ok(sample)
}

/// Blast `payload` at one stream until the window closes or the stream
/// errors, posting each flushed block's size to the completion channel
/// and a sentinel on exit.
async fn blast_worker(
    conn: TcpStream,
    payload: Arc<Vec<u8>>,
    tx: mpsc::Sender<i64>,
    start: Instant,
    duration: Duration,
) {
    let mut stream = DeadlineStream::new(conn);
    loop {
        if let Err(e) = stream.write_all(&payload).await {
            warn!("s2c stream write failed: {}", e);
            break;
        }
        if let Err(e) = stream.flush().await {
            warn!("s2c stream flush failed: {}", e);
            break;
        }
        if tx.send(payload.len() as i64).await.is_err() {
            break;
        }
        if start.elapsed() > duration {
            break;
        }
    }
    // Explicit shutdown tells the client we are done.
    let _ = stream.shutdown().await;
    let _ = tx.send(WORKER_DONE).await;
}
