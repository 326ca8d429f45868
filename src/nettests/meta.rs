//! Meta test: the client labels its result row with `key: value` lines.

use crate::error::{Error, Result};
use crate::protocol::{Codec, MessageType};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Run the meta test on `codec` (the control connection).
///
/// After TEST_PREPARE and TEST_START, the client sends a sequence of
/// TEST_MSG frames whose wrapped bodies are `key: value` metadata lines,
/// terminated by an empty body. Any other frame type fails the test.
/// Returns the collected transcript in arrival order.
pub async fn run<S: AsyncRead + AsyncWrite + Unpin>(codec: &mut Codec<S>) -> Result<Vec<String>> {
    codec.write_json_frame(MessageType::TestPrepare, "").await?;
    codec.write_json_frame(MessageType::TestStart, "").await?;

    let mut transcript = Vec::new();
    loop {
        let (msg_type, line) = codec.read_json_frame().await?;
        if msg_type != MessageType::TestMsg {
            return Err(Error::UnexpectedFrame {
                expected: MessageType::TestMsg.as_byte(),
                got: msg_type.as_byte(),
            });
        }
        if line.is_empty() {
            break;
        }
        debug!("Client metadata: {}", line);
        transcript.push(line);
    }

    codec.write_json_frame(MessageType::TestFinalize, "").await?;
    Ok(transcript)
}
