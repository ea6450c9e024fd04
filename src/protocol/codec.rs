//! Newline-delimited JSON framing
//!
//! Decodes a byte stream into raw lines (without the trailing `\n`) and
//! encodes JSON values as one compact document plus `\n`. Used for both the
//! client and the backend side of the proxy.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::{Error, Result};

/// Line framer for the JSON-line protocol
///
/// Only `\n` delimits messages. If the peer closes with bytes still buffered
/// and no newline, the remainder is delivered as one final line.
#[derive(Debug, Clone, Default)]
pub struct JsonLineCodec {
    /// Index in the buffer up to which no newline exists
    next_index: usize,
}

impl JsonLineCodec {
    /// Create a new codec
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for JsonLineCodec {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        let read_to = buf.len();
        match buf[self.next_index..read_to]
            .iter()
            .position(|b| *b == b'\n')
        {
            Some(offset) => {
                let newline = self.next_index + offset;
                self.next_index = 0;
                let mut line = buf.split_to(newline + 1);
                line.truncate(newline);
                Ok(Some(line.freeze()))
            }
            None => {
                self.next_index = read_to;
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            Ok(None)
        } else {
            Ok(Some(buf.split().freeze()))
        }
    }
}

impl Encoder<&Value> for JsonLineCodec {
    type Error = Error;

    fn encode(&mut self, item: &Value, dst: &mut BytesMut) -> Result<()> {
        let json = serde_json::to_vec(item)?;
        dst.reserve(json.len() + 1);
        dst.extend_from_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}
