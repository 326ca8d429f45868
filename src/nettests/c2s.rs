//! Client-to-server throughput test (C2S): the server absorbs what the
//! client uploads and reports the rate it observed.

use crate::defaults;
use crate::error::Result;
use crate::net::DeadlineStream;
use crate::nettests::{bind_data_listener, ThroughputSample, WORKER_DONE};
use crate::protocol::{Codec, MessageType};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

/// Tunables for one C2S run.
#[derive(Debug, Clone)]
pub struct C2sConfig {
    /// Data port to bind; 0 (the default) requests an ephemeral port.
    pub port: u16,
    /// Stream count for the extended variant.
    pub streams: usize,
    /// Length of the measured absorb window. The residual drain after
    /// reporting uses the same length.
    pub duration: Duration,
}

impl Default for C2sConfig {
    fn default() -> Self {
        Self {
            port: 0,
            streams: defaults::PARALLEL_STREAMS,
            duration: defaults::TEST_DURATION,
        }
    }
}

/// Run the C2S test on `codec` (the control connection).
///
/// Mirrors S2C with the data direction reversed: accept the stream(s),
/// TEST_START, drain for the window, report the observed kbps in a
/// TEST_MSG, finalize. The workers then keep draining for one more
/// window, ignoring errors, to absorb residual client data.
pub async fn run<S: AsyncRead + AsyncWrite + Unpin>(
    codec: &mut Codec<S>,
    config: &C2sConfig,
    extended: bool,
) -> Result<ThroughputSample> {
    let accept_window = codec.stream_mut().timeout();
    let (listener, port) = bind_data_listener(config.port, accept_window).await?;

    let mut prepare = port.to_string();
    if extended {
        prepare.push_str(&format!(" 10000.0 1 500.0 0.0 {}", config.streams));
    }
    codec
        .write_json_frame(MessageType::TestPrepare, &prepare)
        .await?;

    let nstreams = if extended { config.streams } else { 1 };
    let mut conns = Vec::with_capacity(nstreams);
    for idx in 0..nstreams {
        let (conn, peer) = listener.accept().await?;
        debug!("c2s stream {} accepted from {}", idx, peer);
        conns.push(conn);
    }

    codec.write_json_frame(MessageType::TestStart, "").await?;

    let (tx, mut rx) = mpsc::channel::<i64>(64);
    let start = Instant::now();
    let mut drainers = Vec::with_capacity(nstreams);
    for conn in conns {
        let tx = tx.clone();
        let duration = config.duration;
        drainers.push(tokio::spawn(absorb_worker(conn, tx, start, duration)));
    }
    drop(tx);

    let mut bytes_received: i64 = 0;
    let mut complete = 0;
    while complete < nstreams {
        match rx.recv().await {
            Some(count) if count >= 0 => bytes_received += count,
            Some(_) => complete += 1,
            None => break,
        }
    }
    let elapsed = start.elapsed();
    let sample = ThroughputSample {
        bytes: bytes_received,
        elapsed,
    };

    codec
        .write_json_frame(MessageType::TestMsg, &sample.kbps().to_string())
        .await?;
    codec.write_json_frame(MessageType::TestFinalize, "").await?;

    // Wait for the residual drains so the streams close before we hand
    // the control connection back to the session driver.
    for handle in drainers {
        let _ = handle.await;
    }
    Ok(sample)
}

/// Drain one stream for the measured window, posting byte counts and a
/// sentinel, then keep absorbing residual data for one more window with
/// errors ignored.
async fn absorb_worker(conn: TcpStream, tx: mpsc::Sender<i64>, start: Instant, duration: Duration) {
    let mut stream = DeadlineStream::new(conn);
    let mut buf = vec![0u8; defaults::BLAST_BLOCK_SIZE];
    let mut open = true;
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => {
                open = false;
                break;
            }
            Ok(n) => {
                if tx.send(n as i64).await.is_err() {
                    break;
                }
            }
        }
        if start.elapsed() > duration {
            break;
        }
    }
    let _ = tx.send(WORKER_DONE).await;

    // Residual drain: some clients keep writing after our report and
    // would see a reset if we closed immediately.
    if open {
        let residual_deadline = Instant::now() + duration;
        while Instant::now() < residual_deadline {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::DeadlineStream;
    use tokio::io::AsyncWriteExt;

    fn control_pair() -> (Codec<tokio::io::DuplexStream>, Codec<tokio::io::DuplexStream>) {
        let (near, far) = tokio::io::duplex(1 << 16);
        (
            Codec::new(DeadlineStream::new(near)),
            Codec::new(DeadlineStream::new(far)),
        )
    }

    #[tokio::test]
    async fn absorbs_upload_and_reports_rate() {
        let (mut server, mut client) = control_pair();
        let config = C2sConfig {
            duration: Duration::from_millis(200),
            ..C2sConfig::default()
        };

        let server_task = tokio::spawn(async move { run(&mut server, &config, false).await });

        let (msg_type, prepare) = client.read_json_frame().await.unwrap();
        assert_eq!(msg_type, MessageType::TestPrepare);
        let port: u16 = prepare.parse().unwrap();

        let uploader = tokio::spawn(async move {
            let mut conn = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            let block = vec![b'u'; 1024];
            let mut sent = 0i64;
            for _ in 0..64 {
                if conn.write_all(&block).await.is_err() {
                    break;
                }
                sent += block.len() as i64;
            }
            let _ = conn.shutdown().await;
            sent
        });

        let (msg_type, _) = client.read_json_frame().await.unwrap();
        assert_eq!(msg_type, MessageType::TestStart);

        let (msg_type, kbps) = client.read_json_frame().await.unwrap();
        assert_eq!(msg_type, MessageType::TestMsg);
        let kbps: f64 = kbps.parse().unwrap();
        assert!(kbps > 0.0);

        let (msg_type, _) = client.read_json_frame().await.unwrap();
        assert_eq!(msg_type, MessageType::TestFinalize);

        let sample = server_task.await.unwrap().unwrap();
        assert_eq!(sample.bytes, uploader.await.unwrap());
    }

    #[tokio::test]
    async fn residual_upload_after_report_is_tolerated() {
        let (mut server, mut client) = control_pair();
        let config = C2sConfig {
            duration: Duration::from_millis(100),
            ..C2sConfig::default()
        };

        let server_task = tokio::spawn(async move { run(&mut server, &config, false).await });

        let (_, prepare) = client.read_json_frame().await.unwrap();
        let port: u16 = prepare.parse().unwrap();

        let uploader = tokio::spawn(async move {
            let mut conn = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            let block = vec![b'r'; 512];
            // Keep writing past the measurement window; errors are
            // ignored because the server may close once its residual
            // window ends.
            for _ in 0..12 {
                if conn.write_all(&block).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        let (msg_type, _) = client.read_json_frame().await.unwrap();
        assert_eq!(msg_type, MessageType::TestStart);
        let (msg_type, _) = client.read_json_frame().await.unwrap();
        assert_eq!(msg_type, MessageType::TestMsg);
        let (msg_type, _) = client.read_json_frame().await.unwrap();
        assert_eq!(msg_type, MessageType::TestFinalize);

        uploader.await.unwrap();
        let sample = server_task.await.unwrap().unwrap();
        assert!(sample.bytes > 0);
    }
}
