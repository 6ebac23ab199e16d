//! The incremental, byte-fed frame parser.
//!
//! Unlike `read.rs`/`write.rs`, which read a frame with a sequence of
//! blocking `read_exact` calls, this parser is handed whatever
//! bytes the transport currently has and returns whatever events it can
//! produce, retaining just enough state to resume on the next call. It
//! never buffers a payload in full: `feed` emits a `FramePayload` chunk as
//! soon as any payload bytes are available, bounded by
//! `min(available, payload_remaining)`.
//!
//! `feed(&[])` is a legal no-op, and `feed` may be called with arbitrarily
//! sized slices, including 1-byte-at-a-time, with no change in the
//! resulting event sequence (see the `tests` module's chunking property).

use crate::frame::Header;
use crate::header::{self, Decoded};
use crate::mask::mask_apply;

#[derive(Debug)]
pub enum ParserEvent {
    FrameBegin(Header),
    FramePayload(Vec<u8>),
    FrameEnd,
    Error(crate::error::ProtocolError),
}

struct PayloadState {
    header: Header,
    remaining: u64,
    mask_offset: usize,
}

enum State {
    WantHeader(Vec<u8>),
    WantPayload(PayloadState),
    Failed,
}

/// Given the first two header bytes, the exact total header length: no
/// guessing needed, since the length-field width and mask-key presence
/// are both fully determined by those two bytes.
fn required_header_len(first_two: [u8; 2]) -> usize {
    let masked = first_two[1] & 0b1000_0000 != 0;
    let len_field = first_two[1] & 0b0111_1111;
    let mut n = 2;
    n += match len_field {
        126 => 2,
        127 => 8,
        _ => 0,
    };
    if masked {
        n += 4;
    }
    n
}

pub struct FrameParser {
    state: State,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: State::WantHeader(Vec::with_capacity(header::MAX_HEADER_LEN)),
        }
    }

    /// Feeds more bytes from the transport, returning every event that can
    /// now be produced. Safe to call with zero bytes or with any split of
    /// a frame's bytes across multiple calls.
    pub fn feed(&mut self, mut input: &[u8]) -> Vec<ParserEvent> {
        let mut events = Vec::new();

        while !input.is_empty() {
            match &mut self.state {
                State::Failed => break,

                State::WantHeader(buf) => {
                    if buf.len() < 2 {
                        let take = (2 - buf.len()).min(input.len());
                        buf.extend_from_slice(&input[..take]);
                        input = &input[take..];
                        if buf.len() < 2 {
                            break;
                        }
                    }

                    let required = required_header_len([buf[0], buf[1]]);
                    if buf.len() < required {
                        let take = (required - buf.len()).min(input.len());
                        buf.extend_from_slice(&input[..take]);
                        input = &input[take..];
                        if buf.len() < required {
                            break;
                        }
                    }

                    match header::decode(buf) {
                        Decoded::Ok { header, consumed } => {
                            debug_assert_eq!(consumed, buf.len());
                            events.push(ParserEvent::FrameBegin(header));
                            let remaining = header.payload_len;
                            self.state = State::WantPayload(PayloadState {
                                header,
                                remaining,
                                mask_offset: 0,
                            });
                            if remaining == 0 {
                                events.push(ParserEvent::FrameEnd);
                                self.state =
                                    State::WantHeader(Vec::with_capacity(header::MAX_HEADER_LEN));
                            }
                        }
                        Decoded::Err(e) => {
                            self.state = State::Failed;
                            events.push(ParserEvent::Error(e));
                        }
                        Decoded::NeedMore(_) => {
                            unreachable!("buffer was grown to the exact required length")
                        }
                    }
                }

                State::WantPayload(ps) => {
                    let take = (ps.remaining as usize).min(input.len());
                    let mut chunk = input[..take].to_vec();
                    if let Some(key) = ps.header.mask_key {
                        mask_apply(key, ps.mask_offset, &mut chunk);
                    }
                    ps.mask_offset += take;
                    ps.remaining -= take as u64;
                    input = &input[take..];

                    events.push(ParserEvent::FramePayload(chunk));

                    if ps.remaining == 0 {
                        events.push(ParserEvent::FrameEnd);
                        self.state =
                            State::WantHeader(Vec::with_capacity(header::MAX_HEADER_LEN));
                    }
                }
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::OpCode;

    fn encode_unmasked_frame(fin: bool, opcode: OpCode, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let first = ((fin as u8) << 7) | opcode.as_u8();
        out.push(first);
        let len = payload.len();
        if len < 126 {
            out.push(len as u8);
        } else if len < 65536 {
            out.push(126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
        out.extend_from_slice(payload);
        out
    }

    fn collect_text(events: &[ParserEvent]) -> (Header, Vec<u8>) {
        let mut header = None;
        let mut payload = Vec::new();
        for ev in events {
            match ev {
                ParserEvent::FrameBegin(h) => header = Some(*h),
                ParserEvent::FramePayload(chunk) => payload.extend_from_slice(chunk),
                ParserEvent::FrameEnd => {}
                ParserEvent::Error(e) => panic!("unexpected parser error: {e:?}"),
            }
        }
        (header.expect("frame_begin"), payload)
    }

    #[test]
    fn parses_one_shot() {
        let wire = encode_unmasked_frame(true, OpCode::Text, b"Hello");
        let mut parser = FrameParser::new();
        let events = parser.feed(&wire);
        let (header, payload) = collect_text(&events);
        assert_eq!(header.opcode, OpCode::Text);
        assert_eq!(payload, b"Hello");
    }

    #[test]
    fn parses_split_byte_by_byte_identically_to_one_shot() {
        let wire = encode_unmasked_frame(true, OpCode::Binary, &vec![0xAB; 300]);

        let mut one_shot_parser = FrameParser::new();
        let one_shot_events = one_shot_parser.feed(&wire);
        let (one_shot_header, one_shot_payload) = collect_text(&one_shot_events);

        let mut split_parser = FrameParser::new();
        let mut split_events = Vec::new();
        for byte in &wire {
            split_events.extend(split_parser.feed(std::slice::from_ref(byte)));
        }
        let (split_header, split_payload) = collect_text(&split_events);

        assert_eq!(one_shot_header.opcode, split_header.opcode);
        assert_eq!(one_shot_payload, split_payload);
    }

    #[test]
    fn handles_zero_length_payload() {
        let wire = encode_unmasked_frame(true, OpCode::Ping, b"");
        let mut parser = FrameParser::new();
        let events = parser.feed(&wire);
        assert!(matches!(events[0], ParserEvent::FrameBegin(_)));
        assert!(matches!(events[1], ParserEvent::FrameEnd));
    }

    #[test]
    fn empty_feed_is_a_noop() {
        let mut parser = FrameParser::new();
        assert!(parser.feed(&[]).is_empty());
    }

    #[test]
    fn decodes_64_bit_length_frame() {
        let payload = vec![0x42u8; 65536];
        let wire = encode_unmasked_frame(true, OpCode::Binary, &payload);
        let mut parser = FrameParser::new();
        let events = parser.feed(&wire);
        let (header, got) = collect_text(&events);
        assert_eq!(header.payload_len, 65536);
        assert_eq!(got, payload);
    }

    #[test]
    fn stops_after_protocol_error() {
        let wire = [0b1100_0001u8, 0x00]; // rsv1 set
        let mut parser = FrameParser::new();
        let events = parser.feed(&wire);
        assert!(matches!(events[0], ParserEvent::Error(_)));
        // Further bytes don't resurrect the parser.
        assert!(parser.feed(&[0x01, 0x00]).is_empty());
    }

    #[test]
    fn masked_payload_is_unmasked_across_chunk_boundary() {
        let key = [1, 2, 3, 4];
        let payload = b"variable length payload data!!".to_vec();
        let mut masked_payload = payload.clone();
        mask_apply(key, 0, &mut masked_payload);

        let mut wire = Vec::new();
        wire.push(0b1000_0010); // fin, binary
        wire.push(0b1000_0000 | masked_payload.len() as u8);
        wire.extend_from_slice(&key);
        wire.extend_from_slice(&masked_payload);

        let mut parser = FrameParser::new();
        let mut events = Vec::new();
        for chunk in wire.chunks(3) {
            events.extend(parser.feed(chunk));
        }
        let (header, got) = collect_text(&events);
        assert!(header.masked);
        assert_eq!(got, payload);
    }
}
