//! Error types for the parser and the session machine.
//!
//! Follows the same `quick_error!` shape the rest of this crate's ancestry
//! uses: one enum per concern, `description()` for the short form.

use std::io;

quick_error! {
    /// Errors raised while tokenizing a request.
    ///
    /// These map to wire-level responses (400 or 413) at the session layer;
    /// see `ParseError::is_payload_too_large`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ParseError {
        BadRequestLine {
            description("malformed request line or header syntax")
        }
        TokenTooLong {
            description("a method, target, version, header name or \
                value exceeded the configured token length limit")
        }
        TooManyHeaders {
            description("request has more headers than the configured limit")
        }
        BadChunkSize {
            description("invalid chunk size line")
        }
        ContentLengthOverflow {
            description("Content-Length value overflowed while parsing")
        }
        ContentLengthTooLarge {
            description("declared Content-Length exceeds the configured limit")
        }
    }
}

impl ParseError {
    /// Whether this error should be reported to the client as
    /// `413 Payload Too Large` instead of `400 Bad Request`.
    pub fn is_payload_too_large(&self) -> bool {
        matches!(*self,
            ParseError::ContentLengthOverflow |
            ParseError::ContentLengthTooLarge)
    }
}

quick_error! {
    /// Errors that can terminate a session outright.
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            description("I/O error")
            display("I/O error: {}", err)
            from()
        }
        Parse(err: ParseError) {
            description("parse error")
            display("parse error: {}", err)
            from()
        }
        /// The global memory cap was already exceeded when this
        /// connection was accepted.
        Overloaded {
            description("server is over the configured memory cap")
        }
        /// The handler dropped its `oneshot::Sender` without ever
        /// completing the paused response.
        HandlerDropped {
            description("handler was dropped before resuming a paused response")
        }
    }
}
