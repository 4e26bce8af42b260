//! Newline framing for the gateway's line protocol.
//!
//! [`CubeCodec`] plugs into `tokio_util::codec::Framed`: the decoder splits
//! on `\n`, strips an optional `\r`, skips blank lines and hands each line to
//! [`decode_frame`]; the encoder writes [`Request`]s as complete lines.

mod frame;

pub use frame::{LINE_TERMINATOR, decode_frame, encode_command, encode_request};

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Error, FormatError};
use crate::message::{Message, Request};

/// Longest line accepted, terminator excluded.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

#[derive(Debug, Default)]
pub struct CubeCodec {
    // Bytes already scanned for a terminator without finding one.
    scanned: usize,
}

impl CubeCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for CubeCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(offset) = src[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = src.len();
                if src.len() > MAX_LINE_LENGTH {
                    return Err(FormatError::LineTooLong {
                        size: src.len(),
                        max: MAX_LINE_LENGTH,
                    }
                    .into());
                }
                return Ok(None);
            };

            let end = self.scanned + offset;
            let line = src.split_to(end + 1);
            self.scanned = 0;
            if end > MAX_LINE_LENGTH {
                return Err(FormatError::LineTooLong {
                    size: end,
                    max: MAX_LINE_LENGTH,
                }
                .into());
            }

            let line = std::str::from_utf8(&line).map_err(|_| FormatError::InvalidEncoding("line"))?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(decode_frame(line)?));
        }
    }
}

impl Encoder<Request> for CubeCodec {
    type Error = Error;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&encode_request(&item)?);
        Ok(())
    }
}
