//! Sink half of the framed transport.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Sink;
use pin_project_lite::pin_project;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::codec::DapCodec;
use crate::error::CodecError;
use crate::message::OutgoingMessage;

pin_project! {
    /// Async sink for outgoing DAP messages.
    #[derive(Debug)]
    pub struct DapWriter<W> {
        #[pin]
        inner: FramedWrite<W, DapCodec>,
    }
}

impl<W> DapWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(write: W) -> Self {
        Self {
            inner: FramedWrite::new(write, DapCodec::new()),
        }
    }

    /// Encode, write and flush one message.
    pub async fn send(&mut self, msg: OutgoingMessage) -> Result<(), CodecError> {
        use futures::SinkExt;
        SinkExt::send(&mut self.inner, msg).await
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W> Sink<OutgoingMessage> for DapWriter<W>
where
    W: AsyncWrite + Unpin,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: OutgoingMessage) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{OutgoingEvent, Request};
    use std::io::Cursor;

    #[tokio::test]
    async fn frames_a_request() {
        let mut writer = DapWriter::new(Cursor::new(Vec::new()));

        writer
            .send(OutgoingMessage::Request(Request {
                seq: 1,
                command: "configurationDone".to_string(),
                arguments: None,
            }))
            .await
            .unwrap();

        let bytes = writer.into_inner().into_inner();
        let text = String::from_utf8(bytes).unwrap();

        let (header, body) = text.split_once("\r\n\r\n").unwrap();
        let expected_len: usize = header.strip_prefix("Content-Length: ").unwrap().parse().unwrap();
        assert_eq!(body.len(), expected_len);
        assert!(body.contains(r#""command":"configurationDone""#));
    }

    #[tokio::test]
    async fn consecutive_sends_stay_framed() {
        let mut writer = DapWriter::new(Cursor::new(Vec::new()));

        for seq in 1..=3 {
            writer
                .send(OutgoingMessage::Event(OutgoingEvent {
                    seq,
                    event: format!("event{seq}"),
                    body: None,
                }))
                .await
                .unwrap();
        }

        let text = String::from_utf8(writer.into_inner().into_inner()).unwrap();
        assert_eq!(text.matches("Content-Length: ").count(), 3);
    }
}
