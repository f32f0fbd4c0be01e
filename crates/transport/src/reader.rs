//! Stream half of the framed transport.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use pin_project_lite::pin_project;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::DapCodec;
use crate::error::CodecError;
use crate::message::Message;

pin_project! {
    /// Async stream of incoming DAP messages.
    ///
    /// Yields `Ok(Message)` per decoded frame and `Err` for frames that
    /// failed to decode. Decode errors are not fatal: the underlying codec
    /// has already resynchronized, so callers may keep polling. The stream
    /// ends (`None`) when the peer closes the connection.
    #[derive(Debug)]
    pub struct DapReader<R> {
        #[pin]
        inner: FramedRead<R, DapCodec>,
    }
}

impl<R> DapReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(read: R) -> Self {
        Self {
            inner: FramedRead::new(read, DapCodec::new()),
        }
    }

    pub fn with_codec(read: R, codec: DapCodec) -> Self {
        Self {
            inner: FramedRead::new(read, codec),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R> Stream for DapReader<R>
where
    R: AsyncRead + Unpin,
{
    type Item = Result<Message, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}
