//! Bidirectional relay between two streams.
//!
//! Both directions run as independent poll-driven state machines inside
//! a single future, so back-pressure on one direction never stalls the
//! other. Each direction propagates EOF as a write-side shutdown on its
//! peer. Once the first direction finishes, the survivor gets a short
//! drain grace; when it expires the relay returns and both streams drop.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;

/// What a finished relay moved and how it ended.
#[derive(Debug, Default)]
pub struct RelayOutcome {
    /// Bytes copied from the inbound stream to the outbound stream.
    pub upstream: u64,
    /// Bytes copied from the outbound stream to the inbound stream.
    pub downstream: u64,
    /// First error observed in either direction.
    pub error: Option<io::Error>,
}

/// One direction's copy lifecycle: read a buffer, write it through,
/// flush, and on EOF shut down the write side.
enum CopyPhase {
    Read,
    Write { pos: usize, len: usize },
    Flush { len: usize },
    Shutdown,
    Closed,
}

enum CopyEvent {
    /// A buffer made it through write and flush.
    Moved(usize),
    /// EOF reached and the peer's write side shut down.
    Finished,
}

fn poll_copy<R, W>(
    cx: &mut Context<'_>,
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
    phase: &mut CopyPhase,
) -> Poll<io::Result<CopyEvent>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        match phase {
            CopyPhase::Read => {
                let mut read_buf = ReadBuf::new(buf);
                match Pin::new(&mut *reader).poll_read(cx, &mut read_buf) {
                    Poll::Ready(Ok(())) => {
                        let n = read_buf.filled().len();
                        *phase = if n == 0 {
                            CopyPhase::Shutdown
                        } else {
                            CopyPhase::Write { pos: 0, len: n }
                        };
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyPhase::Write { pos, len } => {
                match Pin::new(&mut *writer).poll_write(cx, &buf[*pos..*len]) {
                    Poll::Ready(Ok(0)) => {
                        return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                    }
                    Poll::Ready(Ok(n)) => {
                        *pos += n;
                        if *pos >= *len {
                            *phase = CopyPhase::Flush { len: *len };
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyPhase::Flush { len } => {
                let moved = *len;
                match Pin::new(&mut *writer).poll_flush(cx) {
                    Poll::Ready(Ok(())) => {
                        *phase = CopyPhase::Read;
                        return Poll::Ready(Ok(CopyEvent::Moved(moved)));
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyPhase::Shutdown => match Pin::new(&mut *writer).poll_shutdown(cx) {
                Poll::Ready(_) => {
                    *phase = CopyPhase::Closed;
                    return Poll::Ready(Ok(CopyEvent::Finished));
                }
                Poll::Pending => return Poll::Pending,
            },
            CopyPhase::Closed => return Poll::Ready(Ok(CopyEvent::Finished)),
        }
    }
}

/// Copy bytes both ways until both directions finish or the drain grace
/// expires on the last one.
///
/// A direction finishes on EOF (after shutting down its peer's write
/// side) or on error. Errors never abort the relay outright; the first
/// one is recorded in the outcome and the other direction still gets its
/// grace to drain.
pub async fn relay_bidirectional<A, B>(
    inbound: A,
    outbound: B,
    buffer_size: usize,
    drain_grace: Duration,
) -> RelayOutcome
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut in_r, mut in_w) = tokio::io::split(inbound);
    let (mut out_r, mut out_w) = tokio::io::split(outbound);

    let mut up_buf = vec![0u8; buffer_size];
    let mut down_buf = vec![0u8; buffer_size];
    let mut up_phase = CopyPhase::Read;
    let mut down_phase = CopyPhase::Read;

    let mut outcome = RelayOutcome::default();
    let mut up_done = false;
    let mut down_done = false;

    let grace = tokio::time::sleep(drain_grace);
    tokio::pin!(grace);
    let mut grace_armed = false;

    while !(up_done && down_done) {
        // Poll both directions under one task; each registers its own
        // wakeups, so a stalled write on one side leaves the other live.
        let both = std::future::poll_fn(|cx| {
            let mut any_ready = false;

            if !up_done {
                match poll_copy(cx, &mut in_r, &mut out_w, &mut up_buf, &mut up_phase) {
                    Poll::Ready(Ok(CopyEvent::Moved(n))) => {
                        outcome.upstream += n as u64;
                        any_ready = true;
                    }
                    Poll::Ready(Ok(CopyEvent::Finished)) => {
                        up_done = true;
                        any_ready = true;
                    }
                    Poll::Ready(Err(e)) => {
                        if outcome.error.is_none() {
                            outcome.error = Some(e);
                        }
                        up_done = true;
                        any_ready = true;
                    }
                    Poll::Pending => {}
                }
            }

            if !down_done {
                match poll_copy(cx, &mut out_r, &mut in_w, &mut down_buf, &mut down_phase) {
                    Poll::Ready(Ok(CopyEvent::Moved(n))) => {
                        outcome.downstream += n as u64;
                        any_ready = true;
                    }
                    Poll::Ready(Ok(CopyEvent::Finished)) => {
                        down_done = true;
                        any_ready = true;
                    }
                    Poll::Ready(Err(e)) => {
                        if outcome.error.is_none() {
                            outcome.error = Some(e);
                        }
                        down_done = true;
                        any_ready = true;
                    }
                    Poll::Pending => {}
                }
            }

            if any_ready {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        });

        tokio::select! {
            _ = both => {}
            _ = &mut grace, if grace_armed => break,
        }

        if !grace_armed && up_done != down_done {
            grace.as_mut().reset(Instant::now() + drain_grace);
            grace_armed = true;
        }
    }

    outcome
}
