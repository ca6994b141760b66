//! Replaying leftover bytes in front of a stream.
//!
//! Greeting parsing reads from the decrypted stream in whole buffers, so
//! it usually pulls in some of the proxied payload along with the
//! greeting. `PrefixedStream` hands those leftover bytes back to the
//! relay before continuing with the stream itself.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Stream adapter that serves a byte prefix before the inner stream.
///
/// Writes pass straight through; only reads are affected.
pub struct PrefixedStream<S> {
    prefix: Bytes,
    inner: S,
}

impl<S> PrefixedStream<S> {
    pub fn new(prefix: Bytes, inner: S) -> Self {
        Self { prefix, inner }
    }

    /// Bytes of the prefix not yet handed to a reader.
    pub fn prefix_remaining(&self) -> usize {
        self.prefix.len()
    }

    /// Unwrap the inner stream, discarding any unread prefix.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PrefixedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if !self.prefix.is_empty() {
            let n = self.prefix.len().min(buf.remaining());
            buf.put_slice(&self.prefix[..n]);
            self.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PrefixedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn prefix_comes_before_stream_data() {
        let (mut peer, inner) = duplex(256);
        let mut stream = PrefixedStream::new(Bytes::from_static(b"left"), inner);

        peer.write_all(b"over").await.unwrap();
        drop(peer);

        let mut collected = Vec::new();
        stream.read_to_end(&mut collected).await.unwrap();
        assert_eq!(collected, b"leftover");
    }

    #[tokio::test]
    async fn short_reads_drain_the_prefix_incrementally() {
        let (_peer, inner) = duplex(256);
        let mut stream = PrefixedStream::new(Bytes::from_static(b"abcdef"), inner);
        assert_eq!(stream.prefix_remaining(), 6);

        let mut buf = [0u8; 4];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"abcd");
        assert_eq!(stream.prefix_remaining(), 2);

        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ef");
        assert_eq!(stream.prefix_remaining(), 0);
    }

    #[tokio::test]
    async fn empty_prefix_is_transparent() {
        let (mut peer, inner) = duplex(256);
        let mut stream = PrefixedStream::new(Bytes::new(), inner);

        peer.write_all(b"direct").await.unwrap();

        let mut buf = [0u8; 16];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"direct");
    }

    #[tokio::test]
    async fn writes_bypass_the_prefix() {
        let (mut peer, inner) = duplex(256);
        let mut stream = PrefixedStream::new(Bytes::from_static(b"unread"), inner);

        stream.write_all(b"reply").await.unwrap();

        let mut buf = [0u8; 16];
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"reply");
        assert_eq!(stream.prefix_remaining(), 6);
    }
}
