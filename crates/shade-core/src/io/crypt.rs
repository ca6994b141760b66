//! Encrypted stream adapter.
//!
//! `CipherStream` wraps a byte stream with the tunnel's wire encryption.
//! Each direction opens with a plaintext salt of the method's salt
//! length. Stream ciphers then XOR a keystream over everything that
//! follows. AEAD methods derive a session subkey from the salt and carry
//! the payload in sealed chunks: a sealed 2-byte big-endian length
//! (payload at most 0x3FFF bytes) followed by the sealed payload, each
//! with its own tag, under one nonce counter per direction.
//!
//! The write side sends its salt lazily with the first payload write, so
//! a connection that never writes leaks nothing. The read side learns
//! the peer's salt before anything else and checks it against the
//! replay guard; a repeated salt poisons the stream.

use std::io;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use shade_crypto::{
    CipherSuite, CryptoError, Decrypter, Encrypter, Keystream, Opener, ReplayGuard, Sealer,
    TAG_LEN,
};

/// Largest payload carried by one AEAD chunk.
pub(crate) const MAX_CHUNK_PAYLOAD: usize = 0x3FFF;

/// Bytes accepted per write call for ciphers without chunk framing.
const STREAM_WRITE_CAP: usize = 65536;

/// Wire size of a sealed chunk length.
const SEALED_LEN_SIZE: usize = 2 + TAG_LEN;

/// Session-level failures surfaced as `InvalidData` I/O errors.
#[derive(Debug, Error)]
pub enum CipherStreamError {
    #[error("repeated session salt")]
    RepeatedSalt,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

fn invalid_data(err: CipherStreamError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

enum ReadState {
    Handshake { salt: Vec<u8>, filled: usize },
    Open(ReadCipher),
    Eof,
    Poisoned,
}

enum ReadCipher {
    Stream(Keystream),
    Aead { opener: Opener, phase: AeadPhase },
    Plain,
}

enum AeadPhase {
    Length {
        buf: [u8; SEALED_LEN_SIZE],
        filled: usize,
    },
    Payload {
        buf: Vec<u8>,
        filled: usize,
    },
    Emit {
        plain: Vec<u8>,
        pos: usize,
    },
}

enum WriteCipher {
    Stream(Keystream),
    Aead(Sealer),
    Plain,
}

/// A stream speaking the tunnel's encryption on both directions.
pub struct CipherStream<S> {
    inner: S,
    suite: CipherSuite,
    guard: Arc<ReplayGuard>,
    read: ReadState,
    write: Option<WriteCipher>,
    out: BytesMut,
}

impl<S> CipherStream<S> {
    pub fn new(inner: S, suite: CipherSuite, guard: Arc<ReplayGuard>) -> Self {
        // The plain method has no salt, so both directions open
        // immediately.
        let (read, write) = if suite.salt_len() == 0 {
            (ReadState::Open(ReadCipher::Plain), Some(WriteCipher::Plain))
        } else {
            (
                ReadState::Handshake {
                    salt: vec![0u8; suite.salt_len()],
                    filled: 0,
                },
                None,
            )
        };
        Self {
            inner,
            suite,
            guard,
            read,
            write,
            out: BytesMut::new(),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: AsyncWrite + Unpin> CipherStream<S> {
    /// Pick a fresh salt, record it, and queue it ahead of the first
    /// chunk.
    fn start_write_session(&mut self) -> io::Result<()> {
        let salt = self.suite.generate_salt();
        self.guard.add(&salt);
        let cipher = match self
            .suite
            .encrypter(&salt)
            .map_err(|e| invalid_data(e.into()))?
        {
            Encrypter::Stream(ks) => WriteCipher::Stream(ks),
            Encrypter::Aead(sealer) => WriteCipher::Aead(sealer),
            Encrypter::Plain => WriteCipher::Plain,
        };
        self.out.extend_from_slice(&salt);
        self.write = Some(cipher);
        Ok(())
    }

    /// Push buffered ciphertext into the inner stream.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.out.is_empty() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.out))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.out.advance(n);
        }
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for CipherStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            match &mut this.read {
                ReadState::Handshake { salt, filled } => {
                    let mut salt_buf = ReadBuf::new(&mut salt[*filled..]);
                    match Pin::new(&mut this.inner).poll_read(cx, &mut salt_buf) {
                        Poll::Ready(Ok(())) => {}
                        Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                        Poll::Pending => return Poll::Pending,
                    }
                    let n = salt_buf.filled().len();
                    if n == 0 {
                        if *filled == 0 {
                            // Peer closed without starting a session.
                            this.read = ReadState::Eof;
                        } else {
                            this.read = ReadState::Poisoned;
                            return Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()));
                        }
                        continue;
                    }
                    *filled += n;
                    if *filled < salt.len() {
                        continue;
                    }
                    let salt = mem::take(salt);
                    if this.guard.test(&salt) {
                        this.read = ReadState::Poisoned;
                        return Poll::Ready(Err(invalid_data(CipherStreamError::RepeatedSalt)));
                    }
                    this.guard.add(&salt);
                    match this.suite.decrypter(&salt) {
                        Ok(Decrypter::Stream(ks)) => {
                            this.read = ReadState::Open(ReadCipher::Stream(ks));
                        }
                        Ok(Decrypter::Aead(opener)) => {
                            this.read = ReadState::Open(ReadCipher::Aead {
                                opener,
                                phase: AeadPhase::Length {
                                    buf: [0u8; SEALED_LEN_SIZE],
                                    filled: 0,
                                },
                            });
                        }
                        Ok(Decrypter::Plain) => {
                            this.read = ReadState::Open(ReadCipher::Plain);
                        }
                        Err(e) => {
                            this.read = ReadState::Poisoned;
                            return Poll::Ready(Err(invalid_data(e.into())));
                        }
                    }
                }
                ReadState::Open(ReadCipher::Plain) => {
                    return Pin::new(&mut this.inner).poll_read(cx, buf);
                }
                ReadState::Open(ReadCipher::Stream(ks)) => {
                    let before = buf.filled().len();
                    match Pin::new(&mut this.inner).poll_read(cx, buf) {
                        Poll::Ready(Ok(())) => {}
                        Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                        Poll::Pending => return Poll::Pending,
                    }
                    ks.apply(&mut buf.filled_mut()[before..]);
                    return Poll::Ready(Ok(()));
                }
                ReadState::Open(ReadCipher::Aead { opener, phase }) => match phase {
                    AeadPhase::Length {
                        buf: len_buf,
                        filled,
                    } => {
                        let mut rb = ReadBuf::new(&mut len_buf[*filled..]);
                        match Pin::new(&mut this.inner).poll_read(cx, &mut rb) {
                            Poll::Ready(Ok(())) => {}
                            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                            Poll::Pending => return Poll::Pending,
                        }
                        let n = rb.filled().len();
                        if n == 0 {
                            if *filled == 0 {
                                // EOF on a chunk boundary ends the
                                // session cleanly.
                                this.read = ReadState::Eof;
                                continue;
                            }
                            this.read = ReadState::Poisoned;
                            return Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()));
                        }
                        *filled += n;
                        if *filled < SEALED_LEN_SIZE {
                            continue;
                        }
                        let sealed = *len_buf;
                        match opener.open(&sealed) {
                            Ok(plain) => {
                                let need = (u16::from_be_bytes([plain[0], plain[1]]) as usize)
                                    & MAX_CHUNK_PAYLOAD;
                                *phase = AeadPhase::Payload {
                                    buf: vec![0u8; need + TAG_LEN],
                                    filled: 0,
                                };
                            }
                            Err(_) => {
                                this.read = ReadState::Poisoned;
                                return Poll::Ready(Err(invalid_data(
                                    CryptoError::Authentication.into(),
                                )));
                            }
                        }
                    }
                    AeadPhase::Payload { buf: chunk, filled } => {
                        let mut rb = ReadBuf::new(&mut chunk[*filled..]);
                        match Pin::new(&mut this.inner).poll_read(cx, &mut rb) {
                            Poll::Ready(Ok(())) => {}
                            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                            Poll::Pending => return Poll::Pending,
                        }
                        let n = rb.filled().len();
                        if n == 0 {
                            // Truncated mid-chunk.
                            this.read = ReadState::Poisoned;
                            return Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()));
                        }
                        *filled += n;
                        if *filled < chunk.len() {
                            continue;
                        }
                        match opener.open(&chunk[..]) {
                            Ok(plain) => *phase = AeadPhase::Emit { plain, pos: 0 },
                            Err(_) => {
                                this.read = ReadState::Poisoned;
                                return Poll::Ready(Err(invalid_data(
                                    CryptoError::Authentication.into(),
                                )));
                            }
                        }
                    }
                    AeadPhase::Emit { plain, pos } => {
                        if *pos >= plain.len() {
                            *phase = AeadPhase::Length {
                                buf: [0u8; SEALED_LEN_SIZE],
                                filled: 0,
                            };
                            continue;
                        }
                        let n = (plain.len() - *pos).min(buf.remaining());
                        buf.put_slice(&plain[*pos..*pos + n]);
                        *pos += n;
                        return Poll::Ready(Ok(()));
                    }
                },
                ReadState::Eof => return Poll::Ready(Ok(())),
                ReadState::Poisoned => {
                    return Poll::Ready(Err(io::Error::other("cipher stream previously failed")));
                }
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for CipherStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        // Drain before accepting more, so reported bytes are never lost
        // to a later write error.
        ready!(this.poll_drain(cx))?;
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if this.write.is_none() {
            this.start_write_session()?;
        }
        let Some(cipher) = this.write.as_mut() else {
            return Poll::Ready(Err(io::Error::other("write session missing")));
        };
        let accepted = match cipher {
            WriteCipher::Plain => {
                let take = data.len().min(STREAM_WRITE_CAP);
                this.out.extend_from_slice(&data[..take]);
                take
            }
            WriteCipher::Stream(ks) => {
                let take = data.len().min(STREAM_WRITE_CAP);
                let start = this.out.len();
                this.out.extend_from_slice(&data[..take]);
                ks.apply(&mut this.out[start..]);
                take
            }
            WriteCipher::Aead(sealer) => {
                let take = data.len().min(MAX_CHUNK_PAYLOAD);
                let sealed_len = sealer
                    .seal(&(take as u16).to_be_bytes())
                    .map_err(|e| invalid_data(e.into()))?;
                let sealed_payload = sealer
                    .seal(&data[..take])
                    .map_err(|e| invalid_data(e.into()))?;
                this.out.reserve(sealed_len.len() + sealed_payload.len());
                this.out.extend_from_slice(&sealed_len);
                this.out.extend_from_slice(&sealed_payload);
                take
            }
        };
        Poll::Ready(Ok(accepted))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}
