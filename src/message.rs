//! The two message-level payload kinds: the accumulated result of a
//! (possibly fragmented) TEXT or BINARY sequence.
//!
//! Keeps the `Text`/`Binary` split and `as_binary`/`as_text` accessors of
//! the original message type; `from_frame`/`to_frames` don't carry over
//! as-is since fragmentation now lives in `sender.rs`/`assembler.rs`
//! rather than on `Message` itself, the session controller hands the
//! assembler's already-reassembled `(OpCode, Vec<u8>)` pair to
//! `Message::from_parts`.

use crate::error::{Error, ProtocolError};
use crate::frame::OpCode;

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    /// Builds a `Message` from an assembler-reassembled payload. The
    /// assembler has already validated UTF-8 for `Text`; this still
    /// returns `Result` so a caller constructing one directly (e.g. in
    /// tests) gets the same guarantee.
    pub fn from_parts(opcode: OpCode, payload: Vec<u8>) -> Result<Self, Error> {
        match opcode {
            OpCode::Text => Ok(Message::Text(
                String::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)?,
            )),
            OpCode::Binary => Ok(Message::Binary(payload)),
            _ => Err(Error::Internal("only TEXT/BINARY convert to a Message".into())),
        }
    }

    pub fn opcode(&self) -> OpCode {
        match self {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
        }
    }

    pub fn as_binary(&self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(data) => data.clone(),
        }
    }

    pub fn as_text(&self) -> Result<String, Error> {
        match self {
            Message::Text(text) => Ok(text.clone()),
            Message::Binary(data) => {
                Ok(String::from_utf8(data.clone()).map_err(|_| ProtocolError::InvalidUtf8)?)
            }
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(data) => data,
        }
    }
}
