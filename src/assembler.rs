//! The message assembler: sits on top of the [`FrameParser`], tracks
//! fragmentation, dispatches control frames eagerly, and raises
//! message-level events.
//!
//! Grounded on `read.rs::poll_messages` (the `FragmentedMessage`
//! bookkeeping, the opcode `match`, the UTF-8 validation on text frames,
//! the ping/pong auto-reply split), rebuilt to run off parser events
//! instead of blocking frame reads.

use crate::error::{Error, ProtocolError};
use crate::frame::{close_code, Header, OpCode};
use crate::parser::{FrameParser, ParserEvent};

#[derive(Debug)]
pub struct CloseInfo {
    pub status: Option<u16>,
    pub reason: String,
}

#[derive(Debug)]
pub enum AssemblerEvent {
    MessageBegin(OpCode),
    /// Raw per-frame payload bytes, emitted for every data frame whether
    /// or not a message-level accumulator is active (the "stream API").
    FrameData(Vec<u8>),
    FrameEnd,
    /// Only emitted when [`MessageAssembler::set_accumulate`] is enabled.
    Message { opcode: OpCode, payload: Vec<u8> },
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(CloseInfo),
    Error(Error),
}

/// Validates UTF-8 incrementally across however many `feed` calls a TEXT
/// message's bytes arrive in, without buffering the whole message: only a
/// pending tail of at most 3 bytes (an incomplete multi-byte sequence) is
/// ever retained between calls.
#[derive(Default)]
struct Utf8Validator {
    pending: Vec<u8>,
}

impl Utf8Validator {
    /// Returns `false` the moment an invalid byte sequence is found.
    fn feed(&mut self, chunk: &[u8]) -> bool {
        self.pending.extend_from_slice(chunk);
        match std::str::from_utf8(&self.pending) {
            Ok(_) => {
                self.pending.clear();
                true
            }
            Err(e) => match e.error_len() {
                Some(_) => false,
                // Incomplete sequence at the tail end: keep only the
                // unvalidated bytes, not the whole message so far.
                None => {
                    self.pending.drain(..e.valid_up_to());
                    true
                }
            },
        }
    }

    /// Call once the message's final frame has arrived. A non-empty
    /// `pending` means a multi-byte sequence was left incomplete.
    fn finish(&self) -> bool {
        self.pending.is_empty()
    }
}

struct OpenMessage {
    opcode: OpCode,
    buf: Vec<u8>,
    utf8: Option<Utf8Validator>,
    utf8_invalid: bool,
}

enum CurrentFrame {
    Control(OpCode),
    Data,
}

pub struct MessageAssembler {
    parser: FrameParser,
    open: Option<OpenMessage>,
    current: Option<CurrentFrame>,
    current_fin: bool,
    control_accum: Vec<u8>,
    accumulate: bool,
    max_message_size: Option<u64>,
}

impl MessageAssembler {
    pub fn new(max_message_size: Option<u64>) -> Self {
        Self {
            parser: FrameParser::new(),
            open: None,
            current: None,
            current_fin: false,
            control_accum: Vec::new(),
            accumulate: false,
            max_message_size,
        }
    }

    /// Message-level accumulation is opt-in: the assembler's accumulator
    /// only materializes when the user has installed a message-level
    /// callback. Streaming-only users never pay for it.
    pub fn set_accumulate(&mut self, accumulate: bool) {
        self.accumulate = accumulate;
    }

    pub fn process(&mut self, bytes: &[u8]) -> Vec<AssemblerEvent> {
        let mut out = Vec::new();
        for ev in self.parser.feed(bytes) {
            match ev {
                ParserEvent::FrameBegin(header) => self.on_frame_begin(header, &mut out),
                ParserEvent::FramePayload(chunk) => self.on_frame_payload(chunk, &mut out),
                ParserEvent::FrameEnd => self.on_frame_end(&mut out),
                ParserEvent::Error(e) => out.push(AssemblerEvent::Error(e.into())),
            }
        }
        out
    }

    fn on_frame_begin(&mut self, header: Header, out: &mut Vec<AssemblerEvent>) {
        if header.masked {
            out.push(AssemblerEvent::Error(ProtocolError::ServerMasked.into()));
            return;
        }
        self.current_fin = header.fin;

        if header.is_control() {
            self.current = Some(CurrentFrame::Control(header.opcode));
            self.control_accum.clear();
            return;
        }

        match header.opcode {
            OpCode::Text | OpCode::Binary => {
                if self.open.is_some() {
                    out.push(AssemblerEvent::Error(ProtocolError::UnexpectedCont.into()));
                    return;
                }
                self.open = Some(OpenMessage {
                    opcode: header.opcode,
                    buf: Vec::new(),
                    utf8: (header.opcode == OpCode::Text).then(Utf8Validator::default),
                    utf8_invalid: false,
                });
                self.current = Some(CurrentFrame::Data);
                out.push(AssemblerEvent::MessageBegin(header.opcode));
            }
            OpCode::Continue => {
                if self.open.is_none() {
                    out.push(AssemblerEvent::Error(ProtocolError::MissingCont.into()));
                    return;
                }
                self.current = Some(CurrentFrame::Data);
            }
            _ => unreachable!("control opcodes handled above"),
        }
    }

    fn on_frame_payload(&mut self, chunk: Vec<u8>, out: &mut Vec<AssemblerEvent>) {
        match &self.current {
            Some(CurrentFrame::Control(_)) => self.control_accum.extend_from_slice(&chunk),
            Some(CurrentFrame::Data) => {
                if let Some(open) = &mut self.open {
                    if !open.utf8_invalid {
                        if let Some(validator) = &mut open.utf8 {
                            if !validator.feed(&chunk) {
                                open.utf8_invalid = true;
                                out.push(AssemblerEvent::Error(ProtocolError::InvalidUtf8.into()));
                            }
                        }
                    }
                    if self.accumulate {
                        open.buf.extend_from_slice(&chunk);
                        if let Some(max) = self.max_message_size {
                            if open.buf.len() as u64 > max {
                                out.push(AssemblerEvent::Error(Error::MessageTooBig));
                            }
                        }
                    }
                }
                out.push(AssemblerEvent::FrameData(chunk));
            }
            None => {}
        }
    }

    fn on_frame_end(&mut self, out: &mut Vec<AssemblerEvent>) {
        match self.current.take() {
            Some(CurrentFrame::Control(OpCode::Ping)) => {
                out.push(AssemblerEvent::Ping(std::mem::take(&mut self.control_accum)))
            }
            Some(CurrentFrame::Control(OpCode::Pong)) => {
                out.push(AssemblerEvent::Pong(std::mem::take(&mut self.control_accum)))
            }
            Some(CurrentFrame::Control(OpCode::Close)) => {
                match decode_close_payload(&self.control_accum) {
                    Ok(info) => out.push(AssemblerEvent::Close(info)),
                    Err(e) => out.push(AssemblerEvent::Error(e)),
                }
            }
            Some(CurrentFrame::Control(_)) => unreachable!("only ping/pong/close are control"),
            Some(CurrentFrame::Data) => {
                out.push(AssemblerEvent::FrameEnd);
                if self.current_fin {
                    if let Some(open) = self.open.take() {
                        let trailing_incomplete =
                            open.utf8.as_ref().is_some_and(|v| !v.finish());
                        if open.utf8_invalid || trailing_incomplete {
                            if trailing_incomplete {
                                out.push(AssemblerEvent::Error(ProtocolError::InvalidUtf8.into()));
                            }
                            return;
                        }
                        if self.accumulate {
                            out.push(AssemblerEvent::Message {
                                opcode: open.opcode,
                                payload: open.buf,
                            });
                        }
                    }
                }
            }
            None => {}
        }
    }
}

fn decode_close_payload(payload: &[u8]) -> Result<CloseInfo, Error> {
    if payload.len() < 2 {
        return Ok(CloseInfo {
            status: None,
            reason: String::new(),
        });
    }
    let status = u16::from_be_bytes([payload[0], payload[1]]);
    if close_code::is_wire_illegal(status) {
        return Err(ProtocolError::CloseReservedStatus.into());
    }
    let reason = String::from_utf8(payload[2..].to_vec())
        .map_err(|_| Error::Protocol(ProtocolError::InvalidUtf8))?;
    Ok(CloseInfo {
        status: Some(status),
        reason,
    })
}
