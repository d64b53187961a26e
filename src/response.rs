//! The outgoing half of a session: an explicit state machine over a
//! response's status line, headers and body, writing straight into the
//! connection's write buffer as each piece is supplied.
//!
//! The shape follows this crate ancestry's `MessageState`/`HeaderError`
//! pair closely — same states, same "headers are buffered immediately,
//! body framing is locked in once you pick `add_length` or
//! `add_chunked`" rules — adapted to write into this crate's own
//! `Buffer` instead of a generic stream's write half, and to responses
//! only (no request-line / 100-continue support, since this crate never
//! issues requests).

use std::fmt::Display;
use std::io::Write;

use buffer::Buffer;
use status::{is_bodyless, reason_phrase};
use version::Version;

quick_error! {
    #[derive(Debug)]
    pub enum HeaderError {
        DuplicateContentLength {
            description("Content-Length is added twice")
        }
        DuplicateTransferEncoding {
            description("Transfer-Encoding is added twice")
        }
        InvalidHeaderName {
            description("header name contains invalid characters")
        }
        InvalidHeaderValue {
            description("header value contains invalid characters")
        }
        TransferEncodingAfterContentLength {
            description("transfer encoding added when Content-Length is \
                already specified")
        }
        ContentLengthAfterTransferEncoding {
            description("Content-Length added after Transfer-Encoding")
        }
        CantDetermineBodySize {
            description("neither Content-Length nor Transfer-Encoding \
                is present in the headers")
        }
        BodyLengthHeader {
            description("Content-Length and Transfer-Encoding must be set \
                using add_length/add_chunked")
        }
        RequireBodyless {
            description("this response must not contain body length fields")
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Body {
    /// May contain a body, length not yet decided.
    Normal,
    /// Body is suppressed: response to a HEAD request.
    Head,
    /// Must not have a body: 1xx, 204, 304.
    Denied,
}

#[derive(Debug)]
enum State {
    Start { version: Version, body: Body, close: bool, date: String },
    Headers { body: Body, close: bool },
    FixedHeaders { is_head: bool, close: bool, content_length: u64 },
    ChunkedHeaders { is_head: bool, close: bool },
    Bodyless,
    FixedBody { is_head: bool, content_length: u64 },
    ChunkedBody { is_head: bool, trailers: Vec<(String, Vec<u8>)> },
    Done,
}

fn invalid_header(value: &[u8]) -> bool {
    value.iter().any(|&x| x == b'\r' || x == b'\n')
}

/// A response being assembled for one request.
///
/// Construct with `Response::new`, then call methods in the order the
/// wire format requires them: `status`, any number of `add_header`/
/// `format_header`, exactly one of `add_length`/`add_chunked` (unless
/// the status forbids a body), `done_headers`, any number of
/// `write_body`, then `done`. Calling a method out of order panics,
/// matching the expectation that a response's own state machine never
/// does that — this is an assertion, not a recoverable condition.
pub struct Response {
    state: State,
}

impl Response {
    /// `date` is the current RFC 1123 `Date:` header value (see
    /// `server::DateCache`); it's captured once per response rather
    /// than re-read on every call since the session already refreshes
    /// it only once a second.
    pub fn new(version: Version, is_head_request: bool, close: bool, date: String) -> Response {
        let body = if is_head_request { Body::Head } else { Body::Normal };
        Response { state: State::Start { version: version, body: body, close: close, date: date } }
    }

    /// Write the status line and the mandatory `Date:` header. `code`
    /// must not be 100 (Continue is never a final status).
    pub fn status(&mut self, buf: &mut Buffer, code: u16) {
        match self.state {
            State::Start { version, mut body, close, ref date } => {
                assert!(code != 100, "100 is not a valid final status code");
                write!(buf, "{} {} {}\r\n", version, code, reason_phrase(code)).unwrap();
                write!(buf, "Date: {}\r\n", date).unwrap();
                if is_bodyless(code) {
                    body = Body::Denied;
                }
                self.state = State::Headers { body: body, close: close };
            }
            ref other => panic!("status() called on response in state {:?}", other),
        }
    }

    fn write_header(&mut self, buf: &mut Buffer, name: &str, value: &[u8])
        -> Result<(), HeaderError>
    {
        if invalid_header(name.as_bytes()) {
            return Err(HeaderError::InvalidHeaderName);
        }
        let start = buf.filled();
        buf.write_all(name.as_bytes()).unwrap();
        buf.write_all(b": ").unwrap();
        let value_start = buf.filled();
        buf.write_all(value).unwrap();
        if invalid_header(&buf.data()[value_start..]) {
            buf.clear_from(start);
            return Err(HeaderError::InvalidHeaderValue);
        }
        buf.write_all(b"\r\n").unwrap();
        Ok(())
    }

    fn write_formatted<D: Display>(&mut self, buf: &mut Buffer, name: &str, value: D)
        -> Result<(), HeaderError>
    {
        if invalid_header(name.as_bytes()) {
            return Err(HeaderError::InvalidHeaderName);
        }
        let start = buf.filled();
        buf.write_all(name.as_bytes()).unwrap();
        buf.write_all(b": ").unwrap();
        let value_start = buf.filled();
        write!(buf, "{}", value).unwrap();
        if invalid_header(&buf.data()[value_start..]) {
            buf.clear_from(start);
            return Err(HeaderError::InvalidHeaderValue);
        }
        buf.write_all(b"\r\n").unwrap();
        Ok(())
    }

    /// Add an arbitrary header. `Content-Length` and `Transfer-Encoding`
    /// must go through `add_length`/`add_chunked` instead, since those
    /// two are load-bearing for how the body gets framed.
    pub fn add_header(&mut self, buf: &mut Buffer, name: &str, value: &[u8])
        -> Result<(), HeaderError>
    {
        if name.eq_ignore_ascii_case("Content-Length")
            || name.eq_ignore_ascii_case("Transfer-Encoding")
        {
            return Err(HeaderError::BodyLengthHeader);
        }
        match self.state {
            State::Headers { .. } | State::FixedHeaders { .. } | State::ChunkedHeaders { .. } => {
                self.write_header(buf, name, value)
            }
            ref other => panic!("add_header() called on response in state {:?}", other),
        }
    }

    /// Same as `add_header`, but formats `value` directly into the
    /// buffer instead of requiring a pre-rendered byte slice.
    pub fn format_header<D: Display>(&mut self, buf: &mut Buffer, name: &str, value: D)
        -> Result<(), HeaderError>
    {
        if name.eq_ignore_ascii_case("Content-Length")
            || name.eq_ignore_ascii_case("Transfer-Encoding")
        {
            return Err(HeaderError::BodyLengthHeader);
        }
        match self.state {
            State::Headers { .. } | State::FixedHeaders { .. } | State::ChunkedHeaders { .. } => {
                self.write_formatted(buf, name, value)
            }
            ref other => panic!("format_header() called on response in state {:?}", other),
        }
    }

    /// Declare a fixed-length body and write its `Content-Length`
    /// header.
    pub fn add_length(&mut self, buf: &mut Buffer, n: u64) -> Result<(), HeaderError> {
        match self.state {
            State::FixedHeaders { .. } => Err(HeaderError::DuplicateContentLength),
            State::ChunkedHeaders { .. } => Err(HeaderError::ContentLengthAfterTransferEncoding),
            State::Headers { body: Body::Denied, .. } => Err(HeaderError::RequireBodyless),
            State::Headers { body, close } => {
                self.write_formatted(buf, "Content-Length", n)?;
                self.state = State::FixedHeaders {
                    is_head: body == Body::Head,
                    close: close,
                    content_length: n,
                };
                Ok(())
            }
            ref other => panic!("add_length() called on response in state {:?}", other),
        }
    }

    /// Declare a chunked body and write `Transfer-Encoding: chunked`.
    pub fn add_chunked(&mut self, buf: &mut Buffer) -> Result<(), HeaderError> {
        match self.state {
            State::FixedHeaders { .. } => Err(HeaderError::TransferEncodingAfterContentLength),
            State::ChunkedHeaders { .. } => Err(HeaderError::DuplicateTransferEncoding),
            State::Headers { body: Body::Denied, .. } => Err(HeaderError::RequireBodyless),
            State::Headers { body, close } => {
                self.write_header(buf, "Transfer-Encoding", b"chunked")?;
                self.state = State::ChunkedHeaders { is_head: body == Body::Head, close: close };
                Ok(())
            }
            ref other => panic!("add_chunked() called on response in state {:?}", other),
        }
    }

    pub fn is_started(&self) -> bool {
        !matches!(self.state, State::Start { .. })
    }

    /// Close out the header block. Returns whether a body is expected
    /// to follow (false for 1xx/204/304 and for HEAD responses).
    pub fn done_headers(&mut self, buf: &mut Buffer) -> Result<bool, HeaderError> {
        let close = matches!(self.state,
            State::Headers { close: true, .. } |
            State::FixedHeaders { close: true, .. } |
            State::ChunkedHeaders { close: true, .. });
        let value: &[u8] = if close { b"close" } else { b"keep-alive" };
        self.add_header(buf, "Connection", value).unwrap();
        let expect_body = match self.state {
            State::Headers { body: Body::Denied, .. } => {
                self.state = State::Bodyless;
                false
            }
            State::Headers { body: Body::Normal, .. } | State::Headers { body: Body::Head, .. } => {
                return Err(HeaderError::CantDetermineBodySize);
            }
            State::FixedHeaders { is_head, content_length, .. } => {
                self.state = State::FixedBody { is_head: is_head, content_length: content_length };
                !is_head
            }
            State::ChunkedHeaders { is_head, .. } => {
                self.state = State::ChunkedBody { is_head: is_head, trailers: Vec::new() };
                !is_head
            }
            ref other => panic!("done_headers() called on response in state {:?}", other),
        };
        buf.write_all(b"\r\n").unwrap();
        Ok(expect_body)
    }

    /// Append a chunk of the body. Works for both fixed-length and
    /// chunked framing; in chunked mode this writes the chunk-size
    /// prefix and trailing CRLF too. A HEAD response's body is dropped
    /// on the floor but still validated against the declared length.
    pub fn write_body(&mut self, buf: &mut Buffer, data: &[u8]) {
        match self.state {
            State::Bodyless => panic!("this response must not contain a body"),
            State::FixedBody { is_head, ref mut content_length } => {
                assert!(data.len() as u64 <= *content_length,
                    "fixed-size response overrun: {} bytes left, got {} more",
                    content_length, data.len());
                if !is_head {
                    buf.write_all(data).unwrap();
                }
                *content_length -= data.len() as u64;
            }
            State::ChunkedBody { is_head, .. } => {
                if !is_head && !data.is_empty() {
                    write!(buf, "{:x}\r\n", data.len()).unwrap();
                    buf.write_all(data).unwrap();
                    buf.write_all(b"\r\n").unwrap();
                }
            }
            ref other => panic!("write_body() called on response in state {:?}", other),
        }
    }

    pub fn is_after_headers(&self) -> bool {
        matches!(self.state,
            State::Bodyless | State::Done | State::FixedBody { .. } | State::ChunkedBody { .. })
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Queue a trailer to be emitted after the terminating zero-size
    /// chunk. Only valid for a chunked body, any time before `done`.
    pub fn add_trailer(&mut self, name: &str, value: &[u8]) -> Result<(), HeaderError> {
        if invalid_header(name.as_bytes()) {
            return Err(HeaderError::InvalidHeaderName);
        }
        if invalid_header(value) {
            return Err(HeaderError::InvalidHeaderValue);
        }
        match self.state {
            State::ChunkedBody { ref mut trailers, .. } => {
                trailers.push((name.to_string(), value.to_vec()));
                Ok(())
            }
            ref other => panic!("add_trailer() called on response in state {:?}", other),
        }
    }

    /// Finalize the response. For a fixed-length body this asserts the
    /// declared length was fully written; for chunked it appends the
    /// terminating zero-size chunk followed by any trailers queued with
    /// `add_trailer`.
    pub fn done(&mut self, buf: &mut Buffer) {
        match self.state {
            State::Bodyless => {}
            State::FixedBody { content_length, .. } => {
                assert_eq!(content_length, 0,
                    "fixed-size response ended {} bytes short", content_length);
            }
            State::ChunkedBody { is_head, ref trailers } => {
                if !is_head {
                    buf.write_all(b"0\r\n").unwrap();
                    for &(ref name, ref value) in trailers {
                        buf.write_all(name.as_bytes()).unwrap();
                        buf.write_all(b": ").unwrap();
                        buf.write_all(value).unwrap();
                        buf.write_all(b"\r\n").unwrap();
                    }
                    buf.write_all(b"\r\n").unwrap();
                }
            }
            ref other => panic!("done() called on response in state {:?}", other),
        }
        self.state = State::Done;
    }
}
