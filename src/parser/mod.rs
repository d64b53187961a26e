//! Byte-oriented, resumable HTTP/1.1 request-line-and-header parser.
//!
//! This is the one piece of this crate deliberately *not* grounded on
//! this crate ancestry's parsing strategy: that code hands the whole
//! buffer to `httparse` and gets a fully-populated `Request` struct with
//! a header-slice back in one call. The request here is a parser that
//! never materializes that intermediate structure — it is fed whatever
//! bytes happen to be in the connection's read buffer so far and
//! returns control the moment it can report one `Token`, so a session
//! can interleave parsing with "no more bytes are available yet"
//! without the parser ever seeing the same byte twice.
//!
//! The request line and each header name/value are handled by the
//! state machine in this module; chunk framing has its own nested
//! machine in `parser::chunked`, since it has a different resumption
//! shape (a running byte countdown rather than a byte-class scan).

pub mod chunked;

use error::ParseError;
use token::{BodyLen, Token, TokenKind};

const CONTENT_LENGTH: &[u8] = b"content-length";
const TRANSFER_ENCODING: &[u8] = b"transfer-encoding";
const CHUNKED: &[u8] = b"chunked";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Method,
    Target,
    Version,
    AfterVersionCr,
    HeaderKeyOrBlank,
    HeaderBlankCr,
    HeaderKey,
    HeaderValueLws,
    HeaderValue,
    HeaderValueCr,
    Done,
}

/// Advance a rolling case-insensitive literal matcher by one (already
/// lower-cased) byte. `Some(n)` means the first `n` bytes of `literal`
/// have matched so far and the match is still alive; `None` means this
/// byte ruled it out.
fn advance_match(state: Option<usize>, b: u8, literal: &[u8]) -> Option<usize> {
    match state {
        Some(n) if n < literal.len() && literal[n] == b => Some(n + 1),
        _ => None,
    }
}

/// Tokenizes a request's method, target, version and headers directly
/// out of a connection's read buffer, one `resume` call at a time.
pub struct Parser {
    state: State,
    token_start: usize,
    pos: usize,
    header_count: usize,
    max_token_length: usize,
    max_header_count: usize,
    max_content_length: u64,

    // Rolling matchers against the current header's name.
    cl_match: Option<usize>,
    te_match: Option<usize>,
    cur_is_content_length: bool,
    cur_is_transfer_encoding: bool,

    // State accumulated while scanning the current header's value.
    content_length_accum: u64,
    chunked_match: Option<usize>,

    // State accumulated across the whole header block.
    saw_content_length: bool,
    saw_transfer_encoding: bool,
    content_length: u64,
    is_chunked: bool,
}

impl Parser {
    pub fn new(max_token_length: usize, max_header_count: usize, max_content_length: u64) -> Parser {
        Parser {
            state: State::Method,
            token_start: 0,
            pos: 0,
            header_count: 0,
            max_token_length: max_token_length,
            max_header_count: max_header_count,
            max_content_length: max_content_length,
            cl_match: None,
            te_match: None,
            cur_is_content_length: false,
            cur_is_transfer_encoding: false,
            content_length_accum: 0,
            chunked_match: None,
            saw_content_length: false,
            saw_transfer_encoding: false,
            content_length: 0,
            is_chunked: false,
        }
    }

    /// Reset to the start of a fresh request, to be reused for the next
    /// request on a keep-alive connection. `base` is the buffer offset
    /// the next request's bytes start at (0 once the previous request's
    /// bytes have been consumed out of the buffer).
    pub fn reset(&mut self, base: usize) {
        self.state = State::Method;
        self.token_start = base;
        self.pos = base;
        self.header_count = 0;
        self.cl_match = None;
        self.te_match = None;
        self.cur_is_content_length = false;
        self.cur_is_transfer_encoding = false;
        self.content_length_accum = 0;
        self.chunked_match = None;
        self.saw_content_length = false;
        self.saw_transfer_encoding = false;
        self.content_length = 0;
        self.is_chunked = false;
    }

    fn check_token_len(&self) -> Result<(), ParseError> {
        if self.pos - self.token_start > self.max_token_length {
            Err(ParseError::TokenTooLong)
        } else {
            Ok(())
        }
    }

    fn advance_key_matchers(&mut self, b: u8) {
        let lower = b.to_ascii_lowercase();
        self.cl_match = advance_match(self.cl_match, lower, CONTENT_LENGTH);
        self.te_match = advance_match(self.te_match, lower, TRANSFER_ENCODING);
    }

    fn advance_value(&mut self, b: u8) -> Result<(), ParseError> {
        if self.cur_is_content_length {
            if let b'0'..=b'9' = b {
                let digit = u64::from(b - b'0');
                self.content_length_accum = self.content_length_accum
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit))
                    .ok_or(ParseError::ContentLengthOverflow)?;
                if self.content_length_accum > self.max_content_length {
                    return Err(ParseError::ContentLengthTooLarge);
                }
            }
        }
        if self.cur_is_transfer_encoding {
            let lower = b.to_ascii_lowercase();
            self.chunked_match = advance_match(self.chunked_match, lower, CHUNKED);
        }
        Ok(())
    }

    fn finish_header_value(&mut self) {
        if self.cur_is_content_length {
            self.content_length = self.content_length_accum;
            self.saw_content_length = true;
        }
        if self.cur_is_transfer_encoding {
            self.saw_transfer_encoding = true;
            if self.chunked_match == Some(CHUNKED.len()) {
                self.is_chunked = true;
            }
        }
        self.cur_is_content_length = false;
        self.cur_is_transfer_encoding = false;
    }

    fn resolve_body_len(&self) -> Result<BodyLen, ParseError> {
        if self.is_chunked {
            Ok(BodyLen::Chunked)
        } else if self.saw_content_length {
            if self.content_length > self.max_content_length {
                Err(ParseError::ContentLengthTooLarge)
            } else if self.content_length == 0 {
                Ok(BodyLen::Empty)
            } else {
                Ok(BodyLen::Fixed(self.content_length))
            }
        } else {
            Ok(BodyLen::Empty)
        }
    }

    /// Whether `Transfer-Encoding` was present but didn't end in
    /// `chunked` — such a request has no well-defined length and must
    /// be rejected by the caller.
    pub fn saw_unrecognised_transfer_encoding(&self) -> bool {
        self.saw_transfer_encoding && !self.is_chunked
    }

    /// Feed the parser everything currently available in `buf`
    /// (`buf[..]` must be the same bytes this parser has already seen a
    /// prefix of — the session never truncates or rewrites bytes ahead
    /// of `self.pos`). Returns the next recognised token, or
    /// `Token::none()` if `buf` ran out first.
    pub fn resume(&mut self, buf: &[u8]) -> Result<Token, ParseError> {
        loop {
            if self.pos >= buf.len() {
                return Ok(Token::none());
            }
            let b = buf[self.pos];
            match self.state {
                State::Method => {
                    if b == b' ' {
                        let tok = Token {
                            start: self.token_start,
                            len: self.pos - self.token_start,
                            kind: TokenKind::Method,
                        };
                        self.pos += 1;
                        self.state = State::Target;
                        self.token_start = self.pos;
                        return Ok(tok);
                    } else if b == b'\r' || b == b'\n' {
                        return Err(ParseError::BadRequestLine);
                    } else {
                        self.pos += 1;
                        self.check_token_len()?;
                    }
                }
                State::Target => {
                    if b == b' ' {
                        let tok = Token {
                            start: self.token_start,
                            len: self.pos - self.token_start,
                            kind: TokenKind::Target,
                        };
                        self.pos += 1;
                        self.state = State::Version;
                        self.token_start = self.pos;
                        return Ok(tok);
                    } else if b == b'\r' || b == b'\n' {
                        return Err(ParseError::BadRequestLine);
                    } else {
                        self.pos += 1;
                        self.check_token_len()?;
                    }
                }
                State::Version => {
                    if b == b'\r' {
                        let tok = Token {
                            start: self.token_start,
                            len: self.pos - self.token_start,
                            kind: TokenKind::Version,
                        };
                        self.pos += 1;
                        self.state = State::AfterVersionCr;
                        return Ok(tok);
                    } else if b == b' ' || b == b'\n' {
                        return Err(ParseError::BadRequestLine);
                    } else {
                        self.pos += 1;
                        self.check_token_len()?;
                    }
                }
                State::AfterVersionCr => {
                    if b == b'\n' {
                        self.pos += 1;
                        self.state = State::HeaderKeyOrBlank;
                        self.token_start = self.pos;
                    } else {
                        return Err(ParseError::BadRequestLine);
                    }
                }
                State::HeaderKeyOrBlank => {
                    if b == b'\r' {
                        self.pos += 1;
                        self.state = State::HeaderBlankCr;
                    } else {
                        self.cl_match = Some(0);
                        self.te_match = Some(0);
                        self.state = State::HeaderKey;
                        // don't advance pos: re-dispatch this byte as the
                        // first byte of the header name below
                    }
                }
                State::HeaderBlankCr => {
                    if b == b'\n' {
                        self.pos += 1;
                        let body = self.resolve_body_len()?;
                        let tok = Token { start: self.pos, len: 0, kind: TokenKind::Body(body) };
                        self.state = State::Done;
                        return Ok(tok);
                    } else {
                        return Err(ParseError::BadRequestLine);
                    }
                }
                State::HeaderKey => {
                    if b == b':' {
                        self.header_count += 1;
                        if self.header_count > self.max_header_count {
                            return Err(ParseError::TooManyHeaders);
                        }
                        self.cur_is_content_length = self.cl_match == Some(CONTENT_LENGTH.len());
                        self.cur_is_transfer_encoding = self.te_match == Some(TRANSFER_ENCODING.len());
                        let tok = Token {
                            start: self.token_start,
                            len: self.pos - self.token_start,
                            kind: TokenKind::HeaderKey,
                        };
                        self.pos += 1;
                        self.state = State::HeaderValueLws;
                        self.token_start = self.pos;
                        return Ok(tok);
                    } else if b == b'\r' || b == b'\n' {
                        return Err(ParseError::BadRequestLine);
                    } else {
                        self.advance_key_matchers(b);
                        self.pos += 1;
                        self.check_token_len()?;
                    }
                }
                State::HeaderValueLws => {
                    if b == b' ' || b == b'\t' {
                        self.pos += 1;
                        self.token_start = self.pos;
                    } else {
                        self.content_length_accum = 0;
                        self.chunked_match = Some(0);
                        self.state = State::HeaderValue;
                        // re-dispatch this byte as the first value byte
                    }
                }
                State::HeaderValue => {
                    if b == b'\r' {
                        let tok = Token {
                            start: self.token_start,
                            len: self.pos - self.token_start,
                            kind: TokenKind::HeaderValue,
                        };
                        self.finish_header_value();
                        self.pos += 1;
                        self.state = State::HeaderValueCr;
                        return Ok(tok);
                    } else if b == b'\n' {
                        return Err(ParseError::BadRequestLine);
                    } else {
                        self.advance_value(b)?;
                        self.pos += 1;
                        self.check_token_len()?;
                    }
                }
                State::HeaderValueCr => {
                    if b == b'\n' {
                        self.pos += 1;
                        self.state = State::HeaderKeyOrBlank;
                        self.token_start = self.pos;
                    } else {
                        return Err(ParseError::BadRequestLine);
                    }
                }
                State::Done => {
                    return Ok(Token::none());
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use token::{BodyLen, TokenKind};
    use super::Parser;

    fn new_parser() -> Parser {
        Parser::new(8 * 1024, 127, 8 * 1024 * 1024)
    }

    #[test]
    fn simple_get_with_no_body() {
        let mut p = new_parser();
        let buf = b"GET /hello HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let method = p.resume(buf).unwrap();
        assert_eq!(method.kind, TokenKind::Method);
        assert_eq!(&buf[method.start..method.end()], b"GET");

        let target = p.resume(buf).unwrap();
        assert_eq!(target.kind, TokenKind::Target);
        assert_eq!(&buf[target.start..target.end()], b"/hello");

        let version = p.resume(buf).unwrap();
        assert_eq!(version.kind, TokenKind::Version);
        assert_eq!(&buf[version.start..version.end()], b"HTTP/1.1");

        let key = p.resume(buf).unwrap();
        assert_eq!(key.kind, TokenKind::HeaderKey);
        assert_eq!(&buf[key.start..key.end()], b"Host");

        let value = p.resume(buf).unwrap();
        assert_eq!(value.kind, TokenKind::HeaderValue);
        assert_eq!(&buf[value.start..value.end()], b"example.com");

        let body = p.resume(buf).unwrap();
        assert_eq!(body.kind, TokenKind::Body(BodyLen::Empty));
    }

    #[test]
    fn resumes_across_a_split_buffer() {
        let mut p = new_parser();
        let first = b"GET /x HTTP/1.1\r\nHo";
        let tok = p.resume(first).unwrap();
        assert_eq!(tok.kind, TokenKind::Method);
        let tok = p.resume(first).unwrap();
        assert_eq!(tok.kind, TokenKind::Target);
        let tok = p.resume(first).unwrap();
        assert_eq!(tok.kind, TokenKind::Version);
        // header name is incomplete, buffer exhausted
        let tok = p.resume(first).unwrap();
        assert!(tok.is_none());

        let full = b"GET /x HTTP/1.1\r\nHost: x\r\n\r\n";
        let tok = p.resume(full).unwrap();
        assert_eq!(tok.kind, TokenKind::HeaderKey);
        assert_eq!(&full[tok.start..tok.end()], b"Host");
    }

    #[test]
    fn content_length_is_recognised_case_insensitively() {
        let mut p = new_parser();
        let buf = b"POST / HTTP/1.1\r\nConTENT-length: 5\r\n\r\nhello";
        let _ = p.resume(buf).unwrap(); // method
        let _ = p.resume(buf).unwrap(); // target
        let _ = p.resume(buf).unwrap(); // version
        let _ = p.resume(buf).unwrap(); // header key
        let _ = p.resume(buf).unwrap(); // header value
        let body = p.resume(buf).unwrap();
        assert_eq!(body.kind, TokenKind::Body(BodyLen::Fixed(5)));
    }

    #[test]
    fn chunked_transfer_encoding_is_detected() {
        let mut p = new_parser();
        let buf = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
        let _ = p.resume(buf).unwrap();
        let _ = p.resume(buf).unwrap();
        let _ = p.resume(buf).unwrap();
        let _ = p.resume(buf).unwrap();
        let _ = p.resume(buf).unwrap();
        let body = p.resume(buf).unwrap();
        assert_eq!(body.kind, TokenKind::Body(BodyLen::Chunked));
    }

    #[test]
    fn oversized_header_value_is_rejected() {
        let mut p = Parser::new(8, 127, 8 * 1024 * 1024);
        let mut req = Vec::new();
        req.extend_from_slice(b"GET / HTTP/1.1\r\nX: ");
        req.extend_from_slice(&vec![b'a'; 64]);
        req.extend_from_slice(b"\r\n\r\n");
        let _ = p.resume(&req).unwrap();
        let _ = p.resume(&req).unwrap();
        let _ = p.resume(&req).unwrap();
        let _ = p.resume(&req).unwrap();
        let err = p.resume(&req).unwrap_err();
        assert_eq!(err, ::error::ParseError::TokenTooLong);
    }

    #[test]
    fn too_many_headers_is_rejected() {
        let mut p = Parser::new(8 * 1024, 1, 8 * 1024 * 1024);
        let buf = b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\n\r\n";
        let _ = p.resume(buf).unwrap();
        let _ = p.resume(buf).unwrap();
        let _ = p.resume(buf).unwrap();
        let _ = p.resume(buf).unwrap(); // A key
        let _ = p.resume(buf).unwrap(); // A value
        let err = p.resume(buf).unwrap_err();
        assert_eq!(err, ::error::ParseError::TooManyHeaders);
    }
}
