//! Reading greetings and addresses off a decrypted stream.
//!
//! Greetings are parsed incrementally: whole buffers are pulled from the
//! stream, and the parser reports how much more it needs. Bytes read past
//! the greeting belong to the relayed payload and go back to the caller.

use bytes::{Buf, Bytes, BytesMut};
use shade_proto::{Address, Greeting, MAX_GREETING_LEN, ParseResult, parse_address, parse_greeting};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ServerError;

/// Read one greeting, together with any extra bytes that arrived in the
/// same buffers. Returns `None` on a clean close before the first byte.
pub(crate) async fn read_greeting<S>(
    stream: &mut S,
) -> Result<Option<(Greeting, Bytes)>, ServerError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(MAX_GREETING_LEN);
    loop {
        match parse_greeting(&buf) {
            ParseResult::Complete((greeting, consumed)) => {
                let leftover = buf.split_off(consumed).freeze();
                return Ok(Some((greeting, leftover)));
            }
            ParseResult::Incomplete(_) => {}
            ParseResult::Invalid(e) => return Err(ServerError::Greeting(e)),
        }
        if stream.read_buf(&mut buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
    }
}

/// Read the next address from a command channel, keeping extra bytes in
/// `buf` for the following call. Returns `None` when the channel closes
/// cleanly between addresses.
pub(crate) async fn next_address<S>(
    stream: &mut S,
    buf: &mut BytesMut,
) -> Result<Option<Address>, ServerError>
where
    S: AsyncRead + Unpin,
{
    loop {
        match parse_address(buf) {
            ParseResult::Complete((address, consumed)) => {
                buf.advance(consumed);
                return Ok(Some(address));
            }
            ParseResult::Incomplete(_) => {}
            ParseResult::Invalid(e) => return Err(ServerError::Greeting(e)),
        }
        if stream.read_buf(buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
    }
}
