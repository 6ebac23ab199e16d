//! Frame-level data types shared by the parser, assembler and sender.

use crate::error::{Error, ProtocolError};

/// RFC 6455 §5.2 opcodes. `Continue` is only ever valid as a non-initial
/// fragment of a data message; `Close`/`Ping`/`Pong` are control opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continue,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from_byte(byte: u8) -> Result<Self, Error> {
        match byte {
            0x0 => Ok(OpCode::Continue),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            _ => Err(ProtocolError::BadOpcode.into()),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continue => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    pub fn is_data(&self) -> bool {
        matches!(self, OpCode::Text | OpCode::Binary)
    }
}

/// Status codes relevant to the core itself. Most of RFC 6455 §7.4's range
/// is opaque to us and passed through as a raw `u16`; these are the ones
/// the core emits or specially rejects.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const UNSUPPORTED_DATA: u16 = 1003;
    pub const NO_STATUS: u16 = 1005;
    pub const ABNORMAL: u16 = 1006;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    pub const INTERNAL_ERROR: u16 = 1011;
    pub const TLS_HANDSHAKE: u16 = 1015;

    /// These three are internal-only sentinels per RFC 6455 §7.4.1; a peer
    /// that puts one on the wire has sent an invalid close frame.
    pub fn is_wire_illegal(code: u16) -> bool {
        matches!(code, NO_STATUS | ABNORMAL | TLS_HANDSHAKE)
    }
}

/// A decoded (or about-to-be-encoded) frame header, per RFC 6455 §5.2.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    pub masked: bool,
    pub payload_len: u64,
    pub mask_key: Option<[u8; 4]>,
}

impl Header {
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }
}

/// A fully assembled outbound or inbound logical frame (header already
/// interpreted, payload already unmasked on the inbound path).
#[derive(Debug, Clone)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self { fin, opcode, payload }
    }

    pub fn text(payload: Vec<u8>) -> Self {
        Self::new(true, OpCode::Text, payload)
    }

    pub fn binary(payload: Vec<u8>) -> Self {
        Self::new(true, OpCode::Binary, payload)
    }

    pub fn ping(payload: Vec<u8>) -> Self {
        Self::new(true, OpCode::Ping, payload)
    }

    pub fn pong(payload: Vec<u8>) -> Self {
        Self::new(true, OpCode::Pong, payload)
    }

    pub fn close(status: Option<u16>, reason: &str) -> Self {
        let mut payload = Vec::new();
        if let Some(status) = status {
            payload.extend_from_slice(&status.to_be_bytes());
            payload.extend_from_slice(reason.as_bytes());
        }
        Self::new(true, OpCode::Close, payload)
    }
}
