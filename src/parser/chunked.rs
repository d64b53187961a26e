//! Chunk framing for `Transfer-Encoding: chunked` bodies.
//!
//! Grounded on the shape of this crate ancestry's own chunk-size state
//! machine (a handful of states tracking how much of the current
//! chunk's size line and body have been seen), generalized to emit
//! `Token`s directly against the connection's read buffer instead of
//! parsing out of a `netbuf::Buf` with `httparse::parse_chunk_size`.
//!
//! Unlike the header parser, this one also drives buffer compaction:
//! when a chunk body only partially fits in the buffer it reports no
//! token, but exposes `anchor()` so the session can shift the
//! already-consumed bytes out and call `rebase` to keep this parser's
//! own offsets in step with the buffer it no longer owns a fixed
//! position in.

use error::ParseError;
use token::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    Ext,
    ExpectLf1,
    Body,
    ExpectCr2,
    ExpectLf2,
    ExpectCr3,
    ExpectLf3,
    Done,
}

fn hex_value(b: u8) -> Option<u64> {
    match b {
        b'0'..=b'9' => Some(u64::from(b - b'0')),
        b'a'..=b'f' => Some(u64::from(b - b'a' + 10)),
        b'A'..=b'F' => Some(u64::from(b - b'A' + 10)),
        _ => None,
    }
}

pub struct ChunkParser {
    state: State,
    token_start: usize,
    pos: usize,
    chunk_size: u64,
    remaining: u64,
    max_token_length: usize,
}

impl ChunkParser {
    /// `start` is the buffer offset the chunked body begins at.
    pub fn new(start: usize, max_token_length: usize) -> ChunkParser {
        ChunkParser {
            state: State::Size,
            token_start: start,
            pos: start,
            chunk_size: 0,
            remaining: 0,
            max_token_length: max_token_length,
        }
    }

    /// The earliest buffer offset this parser still needs. Bytes before
    /// it belong to chunks already fully delivered and may be
    /// compacted away.
    pub fn anchor(&self) -> usize {
        self.token_start
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Shift all of this parser's internal offsets down by `shift`
    /// bytes, after the caller has compacted the underlying buffer by
    /// the same amount.
    pub fn rebase(&mut self, shift: usize) {
        self.token_start -= shift;
        self.pos -= shift;
    }

    pub fn resume(&mut self, buf: &[u8]) -> Result<Token, ParseError> {
        loop {
            if self.pos >= buf.len() {
                return Ok(Token::none());
            }
            let b = buf[self.pos];
            match self.state {
                State::Size => {
                    if let Some(v) = hex_value(b) {
                        self.chunk_size = self.chunk_size
                            .checked_mul(16)
                            .and_then(|v2| v2.checked_add(v))
                            .ok_or(ParseError::BadChunkSize)?;
                        self.pos += 1;
                        if self.pos - self.token_start > self.max_token_length {
                            return Err(ParseError::TokenTooLong);
                        }
                    } else if b == b';' {
                        self.pos += 1;
                        self.state = State::Ext;
                    } else if b == b'\r' {
                        self.pos += 1;
                        self.state = State::ExpectLf1;
                    } else {
                        return Err(ParseError::BadChunkSize);
                    }
                }
                State::Ext => {
                    if b == b'\r' {
                        self.pos += 1;
                        self.state = State::ExpectLf1;
                    } else if b == b'\n' {
                        return Err(ParseError::BadChunkSize);
                    } else {
                        self.pos += 1;
                    }
                }
                State::ExpectLf1 => {
                    if b == b'\n' {
                        self.pos += 1;
                        if self.chunk_size == 0 {
                            self.state = State::ExpectCr3;
                        } else {
                            self.remaining = self.chunk_size;
                            self.token_start = self.pos;
                            self.state = State::Body;
                        }
                    } else {
                        return Err(ParseError::BadChunkSize);
                    }
                }
                State::Body => {
                    let available = (buf.len() - self.pos) as u64;
                    if available >= self.remaining {
                        let n = self.remaining as usize;
                        // The token spans the whole chunk body, from
                        // `token_start` (set once when the chunk began),
                        // not just the bytes seen on this particular
                        // `resume` call — a straddling chunk may have
                        // delivered earlier bytes on a prior call that
                        // only advanced `pos`.
                        let start = self.token_start;
                        let len = self.pos + n - self.token_start;
                        self.pos += n;
                        self.remaining = 0;
                        self.state = State::ExpectCr2;
                        return Ok(Token { start: start, len: len, kind: TokenKind::ChunkBody });
                    } else {
                        self.pos = buf.len();
                        self.remaining -= available;
                        return Ok(Token::none());
                    }
                }
                State::ExpectCr2 => {
                    if b == b'\r' {
                        self.pos += 1;
                        self.state = State::ExpectLf2;
                    } else {
                        return Err(ParseError::BadChunkSize);
                    }
                }
                State::ExpectLf2 => {
                    if b == b'\n' {
                        self.pos += 1;
                        self.chunk_size = 0;
                        self.token_start = self.pos;
                        self.state = State::Size;
                    } else {
                        return Err(ParseError::BadChunkSize);
                    }
                }
                State::ExpectCr3 => {
                    if b == b'\r' {
                        self.pos += 1;
                        self.state = State::ExpectLf3;
                    } else {
                        return Err(ParseError::BadChunkSize);
                    }
                }
                State::ExpectLf3 => {
                    if b == b'\n' {
                        self.pos += 1;
                        let tok = Token { start: self.pos, len: 0, kind: TokenKind::ChunkBody };
                        self.state = State::Done;
                        return Ok(tok);
                    } else {
                        return Err(ParseError::BadChunkSize);
                    }
                }
                State::Done => return Ok(Token::none()),
            }
        }
    }
}
