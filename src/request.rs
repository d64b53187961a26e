//! A read-only view over one request's tokens.
//!
//! Unlike `buffered::Request` in this crate's ancestry, nothing here is
//! copied out of the connection buffer into owned `String`/`Vec<u8>`
//! fields: a `Request` just remembers the spans the parser already
//! found and slices the buffer lazily on each accessor call. It stays
//! valid for as long as the session's read buffer isn't compacted out
//! from under the header region, which only ever happens to bytes past
//! the start of the body.
//!
//! A handful of operations spec.md documents on the request view
//! (`connection`, `set_userdata`/`get_userdata`, `free_request_buffer`)
//! actually reach back into the owning session's state. `Request` holds
//! `Cell`/`RefCell` handles for those rather than `&mut Session`,
//! because it's handed to the handler as a shared reference alongside
//! the response buffer the handler is simultaneously writing into.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::str;

use headers;
use request_target::RequestTarget;
use token::BodyLen;
use version::Version;

/// One header's key/value spans, recorded as the parser produces them.
#[derive(Debug, Clone, Copy)]
pub struct HeaderToken {
    pub key_start: usize,
    pub key_len: usize,
    pub val_start: usize,
    pub val_len: usize,
}

/// Host override for the auto keep-alive rule, set via `Request::connection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    KeepAlive,
    Close,
}

/// Per-request mutable state a `Request` reaches through. Owned by the
/// `Session`, re-created fresh for every request; `Session::dispatch`
/// reads it back out once the handler returns.
pub struct RequestControl {
    connection_override: Cell<Option<Directive>>,
    free_requested: Cell<bool>,
}

impl RequestControl {
    pub fn new() -> RequestControl {
        RequestControl {
            connection_override: Cell::new(None),
            free_requested: Cell::new(false),
        }
    }

    fn set_connection(&self, directive: Directive) {
        self.connection_override.set(Some(directive));
    }

    fn request_free(&self) {
        self.free_requested.set(true);
    }

    /// Consumed once by the session after the handler returns.
    pub fn connection_override(&self) -> Option<Directive> {
        self.connection_override.get()
    }

    /// Consumed once by the session after the handler returns.
    pub fn free_requested(&self) -> bool {
        self.free_requested.get()
    }
}

/// A read-only, borrowing view over one fully-parsed request.
///
/// `body()` returns the whole body up front (fixed-length bodies are
/// sliced straight out of the connection buffer; chunked bodies are
/// reassembled into an owned buffer as their chunks arrive, since
/// earlier chunk tokens are invalidated by buffer compaction — see
/// `parser::chunked`). `read_chunk`/`current_chunk` replay that
/// reassembly one chunk at a time for handlers that want to process a
/// chunked body incrementally instead of via `body()`.
pub struct Request<'a> {
    buf: &'a [u8],
    method: (usize, usize),
    target: (usize, usize),
    version: Version,
    headers: &'a [HeaderToken],
    body: &'a [u8],
    body_len: BodyLen,
    chunks: &'a [(usize, usize)],
    chunk_cursor: Cell<usize>,
    control: &'a RequestControl,
    userdata: &'a RefCell<Option<Box<Any>>>,
}

impl<'a> Request<'a> {
    pub fn new(
        buf: &'a [u8],
        method: (usize, usize),
        target: (usize, usize),
        version: Version,
        headers: &'a [HeaderToken],
        body: &'a [u8],
        body_len: BodyLen,
        chunks: &'a [(usize, usize)],
        control: &'a RequestControl,
        userdata: &'a RefCell<Option<Box<Any>>>,
    ) -> Request<'a> {
        Request {
            buf, method, target, version, headers, body, body_len, chunks,
            chunk_cursor: Cell::new(0),
            control,
            userdata,
        }
    }

    /// How the body's length was declared on the wire.
    pub fn body_len(&self) -> BodyLen {
        self.body_len
    }

    pub fn method(&self) -> &'a str {
        str::from_utf8(&self.buf[self.method.0..self.method.0 + self.method.1]).unwrap_or("")
    }

    pub fn target_str(&self) -> &'a str {
        str::from_utf8(&self.buf[self.target.0..self.target.0 + self.target.1]).unwrap_or("")
    }

    /// The request-target, decomposed into its origin/absolute/
    /// authority/asterisk form.
    pub fn request_target(&self) -> Option<RequestTarget<'a>> {
        RequestTarget::parse(self.target_str())
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The full request body. For chunked requests this is the
    /// reassembled payload with chunk framing stripped, not the raw
    /// wire bytes.
    pub fn body(&self) -> &'a [u8] {
        self.body
    }

    fn header_value_bytes(&self, tok: &HeaderToken) -> &'a [u8] {
        &self.buf[tok.val_start..tok.val_start + tok.val_len]
    }

    fn header_key_bytes(&self, tok: &HeaderToken) -> &'a [u8] {
        &self.buf[tok.key_start..tok.key_start + tok.key_len]
    }

    /// First header matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&'a [u8]> {
        self.headers.iter()
            .find(|tok| self.header_key_bytes(tok).eq_ignore_ascii_case(name.as_bytes()))
            .map(|tok| self.header_value_bytes(tok))
    }

    /// Iterate every header in the order it appeared on the wire.
    pub fn iterate_headers(&self) -> impl Iterator<Item = (&'a str, &'a [u8])> + '_ {
        self.headers.iter().map(move |tok| {
            let key = str::from_utf8(self.header_key_bytes(tok)).unwrap_or("");
            (key, self.header_value_bytes(tok))
        })
    }

    /// Deliver the next reassembled chunk of a chunked body, if any
    /// remain. Since this session buffers a chunked body fully before
    /// invoking the handler (see `session::ReadState::Body`), the
    /// callback always fires synchronously here — there's never a
    /// pending socket read to wait on from inside a handler. Does
    /// nothing once every chunk has been delivered, or for a
    /// non-chunked request.
    pub fn read_chunk<F: FnOnce(&'a [u8])>(&self, f: F) {
        let idx = self.chunk_cursor.get();
        if let Some(&(start, len)) = self.chunks.get(idx) {
            self.chunk_cursor.set(idx + 1);
            f(&self.body[start..start + len]);
        }
    }

    /// The chunk most recently delivered by `read_chunk`. Empty before
    /// the first call, or for a non-chunked request.
    pub fn current_chunk(&self) -> &'a [u8] {
        let idx = self.chunk_cursor.get();
        if idx == 0 {
            return &[];
        }
        let (start, len) = self.chunks[idx - 1];
        &self.body[start..start + len]
    }

    /// Stash an opaque value on the connection for later requests on
    /// the same keep-alive socket to retrieve with `get_userdata`.
    pub fn set_userdata<T: Any>(&self, value: T) {
        *self.userdata.borrow_mut() = Some(Box::new(value));
    }

    /// Borrow the value previously stashed with `set_userdata`, if one
    /// is present and has the requested type.
    pub fn get_userdata<T: Any>(&self) -> Option<Ref<T>> {
        Ref::filter_map(self.userdata.borrow(), |slot| {
            slot.as_ref().and_then(|b| b.downcast_ref::<T>())
        }).ok()
    }

    /// Explicitly release the connection's read buffer early, for
    /// handlers that are done with the request but expect to keep
    /// running (e.g. an `Action::Paused` continuation) before
    /// responding.
    pub fn free_request_buffer(&self) {
        self.control.request_free();
    }

    /// Force the connection to be kept alive or closed after this
    /// response, overriding the default `Connection`-header-based
    /// auto-detection.
    pub fn connection(&self, directive: Directive) {
        self.control.set_connection(directive);
    }

    /// Whether `Connection: close` is present, or the request is
    /// HTTP/1.0 with no `Connection` header at all (see spec.md §4.4's
    /// "auto keep-alive rule"). Overridden by a prior call to
    /// `connection()`.
    pub fn wants_keep_alive(&self) -> bool {
        if let Some(directive) = self.control.connection_override() {
            return directive == Directive::KeepAlive;
        }
        if let Some(v) = self.header("Connection") {
            if headers::is_close(v) {
                return false;
            }
            true
        } else {
            self.version != Version::Http10
        }
    }

    pub fn expects_continue(&self) -> bool {
        self.header("Expect").map(headers::is_continue).unwrap_or(false)
    }
}
