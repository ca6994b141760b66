//! Greeting header coalescing.
//!
//! A dialing node knows its greeting before it has any payload for it.
//! `HeaderStream` queues the greeting and sends it together with the
//! first payload write as a single downstream write, so the two share
//! one encrypted chunk on the wire. A short timer flushes the greeting
//! on its own when no payload shows up in time, which keeps
//! payload-less connections (like a command channel announcement)
//! moving. An empty write is a no-op and does not disturb the pending
//! greeting.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

use super::crypt::MAX_CHUNK_PAYLOAD;

/// Stream adapter that holds a header until the first write or a timer.
pub struct HeaderStream<S> {
    inner: S,
    pending: Option<BytesMut>,
    delay: Pin<Box<Sleep>>,
    out: BytesMut,
    needs_flush: bool,
}

impl<S> HeaderStream<S> {
    pub fn new(inner: S, header: BytesMut, delay: Duration) -> Self {
        let pending = if header.is_empty() {
            None
        } else {
            Some(header)
        };
        Self {
            inner,
            pending,
            delay: Box::pin(tokio::time::sleep(delay)),
            out: BytesMut::new(),
            needs_flush: false,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: AsyncWrite + Unpin> HeaderStream<S> {
    /// Advance the timer and push buffered bytes downstream.
    ///
    /// The timer is the only place besides the first write and shutdown
    /// that moves the header out. A timer-driven flush also flushes the
    /// inner stream, since no caller is coming to do it.
    fn poll_pump(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.pending.is_some() && self.delay.as_mut().poll(cx).is_ready() {
            if let Some(header) = self.pending.take() {
                self.out.extend_from_slice(&header);
                self.needs_flush = true;
            }
        }
        while !self.out.is_empty() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.out))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.out.advance(n);
        }
        if self.needs_flush {
            ready!(Pin::new(&mut self.inner).poll_flush(cx))?;
            self.needs_flush = false;
        }
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for HeaderStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        // Reads drive the timer too; a pump blocked on the inner write
        // side must not keep us from reading.
        if let Poll::Ready(Err(e)) = this.poll_pump(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for HeaderStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }
        ready!(this.poll_pump(cx))?;
        match this.pending.take() {
            Some(mut header) => {
                // Coalesce: header and payload leave in one write, which
                // the cipher layer seals as one chunk.
                let take = data
                    .len()
                    .min(MAX_CHUNK_PAYLOAD.saturating_sub(header.len()))
                    .max(1);
                header.extend_from_slice(&data[..take]);
                this.out = header;
                Poll::Ready(Ok(take))
            }
            None => Pin::new(&mut this.inner).poll_write(cx, data),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_pump(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        // A header that never found payload still has to reach the peer.
        if let Some(header) = this.pending.take() {
            this.out.extend_from_slice(&header);
        }
        ready!(this.poll_pump(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use crate::io::crypt::CipherStream;
    use shade_crypto::{CipherSuite, Method, ReplayGuard};

    const DELAY: Duration = Duration::from_millis(5);
    // For tests about coalescing, the timer must never win the race.
    const HOLD: Duration = Duration::from_secs(3600);

    /// Write sink that remembers each write call separately.
    #[derive(Clone, Default)]
    struct Recorder {
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        flushes: Arc<AtomicUsize>,
    }

    impl Recorder {
        fn writes(&self) -> Vec<Vec<u8>> {
            self.writes.lock().unwrap().clone()
        }

        fn flushes(&self) -> usize {
            self.flushes.load(Ordering::SeqCst)
        }
    }

    impl AsyncWrite for Recorder {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            data: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.writes.lock().unwrap().push(data.to_vec());
            Poll::Ready(Ok(data.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncRead for Recorder {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    fn header() -> BytesMut {
        BytesMut::from(&b"HDR"[..])
    }

    #[tokio::test]
    async fn first_write_carries_the_header() {
        let rec = Recorder::default();
        let mut hs = HeaderStream::new(rec.clone(), header(), HOLD);

        let n = hs.write(b"abc").await.unwrap();
        assert_eq!(n, 3);
        hs.flush().await.unwrap();

        assert_eq!(rec.writes(), vec![b"HDRabc".to_vec()]);
    }

    #[tokio::test]
    async fn later_writes_pass_straight_through() {
        let rec = Recorder::default();
        let mut hs = HeaderStream::new(rec.clone(), header(), HOLD);

        hs.write_all(b"a").await.unwrap();
        hs.flush().await.unwrap();
        hs.write_all(b"b").await.unwrap();
        hs.flush().await.unwrap();

        assert_eq!(rec.writes(), vec![b"HDRa".to_vec(), b"b".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flushes_an_unaccompanied_header() {
        let rec = Recorder::default();
        let mut hs = HeaderStream::new(rec.clone(), header(), DELAY);

        let mut buf = [0u8; 8];
        tokio::select! {
            _ = hs.read(&mut buf) => panic!("nothing should arrive"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
        }

        assert_eq!(rec.writes(), vec![b"HDR".to_vec()]);
        assert!(rec.flushes() >= 1, "timer flush must reach the wire");
    }

    #[tokio::test(start_paused = true)]
    async fn header_is_never_sent_twice() {
        let rec = Recorder::default();
        let mut hs = HeaderStream::new(rec.clone(), header(), DELAY);

        hs.write_all(b"abc").await.unwrap();
        hs.flush().await.unwrap();

        // Let the timer deadline pass, then write again.
        tokio::time::sleep(Duration::from_millis(20)).await;
        hs.write_all(b"x").await.unwrap();
        hs.flush().await.unwrap();

        assert_eq!(rec.writes(), vec![b"HDRabc".to_vec(), b"x".to_vec()]);
    }

    #[tokio::test]
    async fn empty_write_leaves_the_header_pending() {
        let rec = Recorder::default();
        let mut hs = HeaderStream::new(rec.clone(), header(), HOLD);

        let n = hs.write(b"").await.unwrap();
        assert_eq!(n, 0);
        assert!(rec.writes().is_empty());

        hs.write_all(b"data").await.unwrap();
        hs.flush().await.unwrap();
        assert_eq!(rec.writes(), vec![b"HDRdata".to_vec()]);
    }

    #[tokio::test]
    async fn shutdown_delivers_an_unsent_header() {
        let rec = Recorder::default();
        let mut hs = HeaderStream::new(rec.clone(), header(), HOLD);

        hs.shutdown().await.unwrap();
        assert_eq!(rec.writes(), vec![b"HDR".to_vec()]);
    }

    #[tokio::test]
    async fn header_and_first_payload_share_one_sealed_chunk() {
        let suite = CipherSuite::from_password(Method::Chacha20Poly1305, "pw");
        let (near, mut raw) = duplex(64 * 1024);
        let crypt = CipherStream::new(near, suite.clone(), Arc::new(ReplayGuard::disabled()));

        let greeting = BytesMut::from(&[0x01, 127, 0, 0, 1, 0x1f, 0x90][..]);
        let mut hs = HeaderStream::new(crypt, greeting.clone(), HOLD);

        let capture = tokio::spawn(async move {
            let mut wire = Vec::new();
            raw.read_to_end(&mut wire).await.unwrap();
            wire
        });

        hs.write_all(b"abc").await.unwrap();
        hs.flush().await.unwrap();
        hs.shutdown().await.unwrap();
        drop(hs);

        // salt + one sealed length + one sealed payload holding greeting
        // and payload together.
        let wire = capture.await.unwrap();
        assert_eq!(wire.len(), 32 + (2 + 16) + (7 + 3 + 16));

        // The receiving side sees the greeting immediately followed by
        // the payload.
        let (mut feed, far) = duplex(64 * 1024);
        let mut receiver =
            CipherStream::new(far, suite, Arc::new(ReplayGuard::disabled()));
        feed.write_all(&wire).await.unwrap();
        feed.shutdown().await.unwrap();
        let mut got = Vec::new();
        receiver.read_to_end(&mut got).await.unwrap();
        let mut expected = greeting.to_vec();
        expected.extend_from_slice(b"abc");
        assert_eq!(got, expected);
    }
}
