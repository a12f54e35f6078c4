//! Splits a connected `TcpStream` into framed halves and provides the
//! liveness handshake (§4.6). Mirrors the teacher's `SendStream`/`RecvStream`
//! split in the deleted `streams.rs`, adapted to this system's own codec.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::FrameCodec;
use crate::protocol::Request;

/// Socket read timeout used by the liveness handshake and the receive loop (§4.6).
pub const SOCKET_READ_TIMEOUT: Duration = Duration::from_millis(500);

pub type FramedReader = FramedRead<OwnedReadHalf, FrameCodec>;
pub type FramedWriter = FramedWrite<OwnedWriteHalf, FrameCodec>;

/// Serializes concurrent senders onto one socket (§5: "the send operation
/// serializes on the socket via a mutex so concurrent senders do not
/// interleave frames").
#[derive(Clone)]
pub struct SharedSender(Arc<Mutex<FramedWriter>>);

impl SharedSender {
    #[must_use]
    pub fn new(writer: FramedWriter) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }

    pub async fn send(&self, request: Request) -> anyhow::Result<()> {
        let mut guard = self.0.lock().await;
        guard.send(request).await.context("failed sending frame")
    }
}

/// Splits a connected socket into a framed reader and a [`SharedSender`].
#[must_use]
pub fn split(stream: TcpStream) -> (FramedReader, SharedSender) {
    let (read_half, write_half) = stream.into_split();
    let reader = FramedRead::new(read_half, FrameCodec);
    let writer = FramedWrite::new(write_half, FrameCodec);
    (reader, SharedSender::new(writer))
}

/// Connects a plain TCP client to `127.0.0.1:<local_port>` (the forwarded
/// end of the SSH tunnel) and performs the dev-side liveness handshake:
/// send `PING`, expect `PONG` within [`SOCKET_READ_TIMEOUT`] (§4.6).
pub async fn connect_and_handshake(local_port: u16) -> anyhow::Result<(FramedReader, SharedSender)> {
    let stream = TcpStream::connect(("127.0.0.1", local_port))
        .await
        .context("failed to connect forwarded socket")?;
    let (mut reader, sender) = split(stream);
    sender.send(Request::Ping).await?;
    let reply = tokio::time::timeout(SOCKET_READ_TIMEOUT, reader.next())
        .await
        .context("no PONG within socket read timeout")?
        .context("connection closed while waiting for PONG")?
        .context("failed decoding PONG reply")?;
    if !matches!(reply, Request::Pong) {
        anyhow::bail!("expected PONG, got {reply:?}");
    }
    Ok((reader, sender))
}
