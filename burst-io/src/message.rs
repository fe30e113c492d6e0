//! Fixed-width record carried from the relay producer to its consumer.
//!
//! Wire layout, little endian, 12 bytes:
//!
//! ```text
//! 0      2                 10      12
//! | len  | counter (u64)   | burst |
//! ```
//!
//! `len` is the body length and is always 10. The counter is the producer's
//! running packet count, `burst` the size of the burst that triggered the message.

use thiserror::Error;

pub const MESSAGE_LEN: usize = 12;

const BODY_LEN: u16 = 10;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MessageError {
    #[error("message needs {MESSAGE_LEN} bytes, got {0}")]
    Truncated(usize),
    #[error("unexpected body length {0}")]
    BadLength(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterMessage {
    pub counter: u64,
    pub burst: u16,
}

impl CounterMessage {
    pub fn new(counter: u64, burst: u16) -> Self {
        CounterMessage { counter, burst }
    }

    pub fn encode(&self) -> [u8; MESSAGE_LEN] {
        let mut out = [0u8; MESSAGE_LEN];
        out[0..2].copy_from_slice(&BODY_LEN.to_le_bytes());
        out[2..10].copy_from_slice(&self.counter.to_le_bytes());
        out[10..12].copy_from_slice(&self.burst.to_le_bytes());
        out
    }

    /// Writes the record at the start of `out` and returns the bytes written.
    pub fn encode_into(&self, out: &mut [u8]) -> Result<usize, MessageError> {
        let available = out.len();
        let dst = out
            .get_mut(..MESSAGE_LEN)
            .ok_or(MessageError::Truncated(available))?;
        dst.copy_from_slice(&self.encode());
        Ok(MESSAGE_LEN)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let Some(record) = bytes.get(..MESSAGE_LEN) else {
            return Err(MessageError::Truncated(bytes.len()));
        };
        let len = u16::from_le_bytes([record[0], record[1]]);
        if len != BODY_LEN {
            return Err(MessageError::BadLength(len));
        }
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&record[2..10]);
        Ok(CounterMessage {
            counter: u64::from_le_bytes(counter),
            burst: u16::from_le_bytes([record[10], record[11]]),
        })
    }
}
