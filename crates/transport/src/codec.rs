//! Content-Length framing for DAP messages.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::message::{Message, OutgoingMessage};

/// Cap on a single message body (16 MiB).
const DEFAULT_MAX_BODY: usize = 16 * 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Encoder/decoder for DAP frames.
///
/// Decoding is incremental: bytes accumulate in the buffer until a full
/// header block and body are present, at which point exactly one frame is
/// consumed. Header blocks may carry headers other than `Content-Length`;
/// they are ignored. A frame that fails to parse is consumed before the
/// error is surfaced, so the decoder stays aligned on the following frame.
#[derive(Debug, Clone)]
pub struct DapCodec {
    max_body: usize,
}

impl DapCodec {
    pub fn new() -> Self {
        Self {
            max_body: DEFAULT_MAX_BODY,
        }
    }

    /// Override the maximum accepted body size.
    pub fn with_max_body(max_body: usize) -> Self {
        Self { max_body }
    }
}

impl Default for DapCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for DapCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header_end) = find_terminator(src) else {
            return Ok(None);
        };

        let content_length = match parse_content_length(&src[..header_end]) {
            Ok(len) => len,
            Err(e) => {
                // Drop the unusable header block so the next call starts
                // at the bytes that follow it.
                src.advance(header_end + HEADER_TERMINATOR.len());
                return Err(e);
            }
        };

        if content_length > self.max_body {
            src.advance(header_end + HEADER_TERMINATOR.len());
            return Err(CodecError::MessageTooLarge {
                size: content_length,
                max: self.max_body,
            });
        }

        let frame_len = header_end + HEADER_TERMINATOR.len() + content_length;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let body = &src[header_end + HEADER_TERMINATOR.len()..frame_len];
        let parsed = serde_json::from_slice::<Message>(body).map_err(CodecError::InvalidBody);

        // The frame is consumed whether or not the body parsed, keeping the
        // buffer positioned at the next frame boundary.
        src.advance(frame_len);

        parsed.map(Some)
    }
}

impl Encoder<OutgoingMessage> for DapCodec {
    type Error = CodecError;

    fn encode(&mut self, item: OutgoingMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item).map_err(CodecError::Encode)?;

        dst.reserve(32 + body.len());
        dst.put_slice(b"Content-Length: ");
        dst.put_slice(body.len().to_string().as_bytes());
        dst.put_slice(HEADER_TERMINATOR);
        dst.put_slice(&body);

        Ok(())
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

fn parse_content_length(header: &[u8]) -> Result<usize, CodecError> {
    let header = std::str::from_utf8(header).map_err(|_| CodecError::InvalidUtf8)?;

    for line in header.split("\r\n") {
        if let Some(value) = line.strip_prefix("Content-Length:") {
            return value
                .trim()
                .parse()
                .map_err(|_| CodecError::MalformedContentLength);
        }
    }

    Err(CodecError::MissingContentLength)
}
