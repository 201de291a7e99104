//! RPC wire codec
//!
//! Each message is a postcard body behind a 4-byte big-endian length:
//! ```text
//! +----------------+------------------------+
//! | len: u32 (BE)  | postcard(Message)      |
//! +----------------+------------------------+
//! ```
//!
//! Decoding is incremental: a short read leaves the bytes buffered and
//! returns `Ok(None)` until the rest of the frame arrives.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::common::Error;

use super::types::Message;

/// Length prefix size in bytes
const HEADER_LEN: usize = 4;

/// Default maximum frame body (16 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Largest body the length prefix can describe
pub const FRAME_LIMIT_CEILING: usize = u32::MAX as usize;

/// Streaming frame codec for [`Message`]s
#[derive(Debug)]
pub struct MessageCodec {
    max_frame: usize,
    /// Body length of the frame currently being read, once its header is consumed
    pending: Option<usize>,
}

impl MessageCodec {
    /// Limits above what the header can carry are lowered to it
    pub fn new(max_frame: usize) -> Self {
        Self {
            max_frame: max_frame.min(FRAME_LIMIT_CEILING),
            pending: None,
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, Error> {
        let len = match self.pending {
            Some(len) => len,
            None => {
                if src.len() < HEADER_LEN {
                    return Ok(None);
                }
                let len = src.get_u32() as usize;
                if len > self.max_frame {
                    return Err(Error::Decode(format!(
                        "frame of {} bytes exceeds limit of {} bytes",
                        len, self.max_frame
                    )));
                }
                self.pending = Some(len);
                len
            }
        };

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        self.pending = None;
        let body = src.split_to(len);
        postcard::from_bytes(&body)
            .map(Some)
            .map_err(|e| Error::Decode(format!("invalid message body: {}", e)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, Error> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() && self.pending.is_none() => Ok(None),
            None => Err(Error::Decode(
                "stream ended in the middle of a frame".to_string(),
            )),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Error> {
        let body = postcard::to_allocvec(&item)
            .map_err(|e| Error::Internal(format!("failed to serialize message: {}", e)))?;

        if body.len() > self.max_frame {
            return Err(Error::invalid_args(format!(
                "message of {} bytes exceeds limit of {} bytes",
                body.len(),
                self.max_frame
            )));
        }

        let len = u32::try_from(body.len())
            .map_err(|_| Error::Internal(format!("{} bytes do not fit a frame header", body.len())))?;
        dst.reserve(HEADER_LEN + body.len());
        dst.put_u32(len);
        dst.extend_from_slice(&body);
        Ok(())
    }
}
