//! Framed DAP transport over async byte streams.
//!
//! The Debug Adapter Protocol frames every message as a small text header
//! block followed by a JSON body:
//!
//! ```text
//! Content-Length: <N>\r\n
//! \r\n
//! <N bytes of JSON>
//! ```
//!
//! This crate owns exactly that concern: turning a byte stream into typed
//! [`Message`]s and typed outgoing messages back into bytes. Frames may
//! arrive coalesced or split at arbitrary byte boundaries; the decoder
//! accumulates until a complete frame is available and never loses data
//! across reads. After a malformed frame the decoder resynchronizes at the
//! byte following the bad frame so one corrupt message does not poison the
//! stream.
//!
//! Request/response correlation, event routing and session state live
//! upstream in the `debugger` crate.

mod codec;
mod error;
mod message;
mod reader;
mod writer;

pub mod testing;

pub use codec::DapCodec;
pub use error::CodecError;
pub use message::{
    Event, Message, OutgoingEvent, OutgoingMessage, OutgoingResponse, Request, Response, Seq,
};
pub use reader::DapReader;
pub use writer::DapWriter;

use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Port debugpy listens on by default when started by the user.
pub const DEFAULT_DAP_PORT: u16 = 5678;

/// Wrap an already-split pair of stream halves in DAP framing.
pub fn framed<R, W>(read: R, write: W) -> (DapReader<R>, DapWriter<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (DapReader::new(read), DapWriter::new(write))
}

/// Connect to a debug adapter over TCP and return a framed reader/writer
/// pair. The two halves can be driven from independent tasks.
pub async fn connect(
    addr: impl ToSocketAddrs,
) -> io::Result<(
    DapReader<tokio::net::tcp::OwnedReadHalf>,
    DapWriter<tokio::net::tcp::OwnedWriteHalf>,
)> {
    let stream = TcpStream::connect(addr).await?;
    let (read, write) = stream.into_split();
    Ok(framed(read, write))
}
