use bytes::{BufMut, BytesMut};
use std::io;
use thiserror::Error as ThisError;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// Every frame on the wire, in both directions, ends with this byte.
pub const TERMINATOR: u8 = b'\0';

/// Upper bound for the terminator-free data buffered while waiting for a frame to complete.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("frame size {size} exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Splits a byte stream into UTF-8 text frames delimited by a single `\0` byte, and serializes
/// outgoing text the same way.
///
/// There is no length prefix and no escaping, so a terminator may arrive split across any number
/// of socket reads. Bytes following a terminator stay in the buffer for the next frame.
#[derive(Debug, Clone)]
pub struct NulCodec {
    max_frame_size: usize,
    // Index into the read buffer up to which we already know there is no terminator. Avoids
    // re-scanning the same prefix every time more data arrives.
    next_index: usize,
}

impl NulCodec {
    pub fn new() -> NulCodec {
        NulCodec::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> NulCodec {
        NulCodec {
            max_frame_size,
            next_index: 0,
        }
    }
}

impl Default for NulCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NulCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let read_to = src.len();
        let terminator = src[self.next_index..read_to]
            .iter()
            .position(|b| *b == TERMINATOR);

        match terminator {
            Some(offset) => {
                let index = self.next_index + offset;
                self.next_index = 0;

                // Take the frame together with its terminator, leave the rest for the next call.
                let frame = src.split_to(index + 1);
                let text = String::from_utf8_lossy(&frame[..index]).into_owned();

                Ok(Some(text))
            }
            None if read_to > self.max_frame_size => Err(Error::FrameTooLarge {
                size: read_to,
                limit: self.max_frame_size,
            }),
            None => {
                self.next_index = read_to;
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        if !src.is_empty() {
            debug!(
                "Discarding {} bytes received without a terminator before end of stream",
                src.len()
            );
            src.clear();
            self.next_index = 0;
        }

        Ok(None)
    }
}

impl Encoder<String> for NulCodec {
    type Error = Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(TERMINATOR);
        Ok(())
    }
}
