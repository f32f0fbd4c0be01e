//! In-memory pipes for exercising the transport without a socket.

use tokio::io::{duplex, DuplexStream};

use crate::{framed, DapReader, DapWriter};

/// Create two connected in-memory endpoints, each already wrapped in DAP
/// framing. Bytes written on one endpoint arrive on the other, so one side
/// can play the client and the other a scripted adapter.
pub fn pipe() -> (
    (DapReader<DuplexStream>, DapWriter<DuplexStream>),
    (DapReader<DuplexStream>, DapWriter<DuplexStream>),
) {
    pipe_with_capacity(64 * 1024)
}

/// Same as [`pipe`] but with an explicit per-direction buffer size. Small
/// buffers are useful for forcing fragmented reads.
pub fn pipe_with_capacity(
    capacity: usize,
) -> (
    (DapReader<DuplexStream>, DapWriter<DuplexStream>),
    (DapReader<DuplexStream>, DapWriter<DuplexStream>),
) {
    let (a_to_b_write, a_to_b_read) = duplex(capacity);
    let (b_to_a_write, b_to_a_read) = duplex(capacity);

    (
        framed(b_to_a_read, a_to_b_write),
        framed(a_to_b_read, b_to_a_write),
    )
}
