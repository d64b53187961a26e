//! The per-connection state machine.
//!
//! A `Session` is the `futures::Future` that drives one connection from
//! accept to close: it owns the read and write buffers, resumes the
//! parser as bytes arrive, hands a `Request`/`Response` pair to the
//! handler once headers (and, for buffered bodies, the whole body) are
//! complete, and flushes the response before either looping back for
//! the next request (keep-alive) or shutting down. This mirrors the
//! role `server::proto::Proto` plays in this crate's ancestry, but as a
//! single self-contained `Future` instead of a `Codec`/`Dispatcher`
//! pair threaded through a generic protocol driver — there's exactly
//! one wire protocol here, so there's nothing to abstract over.
//!
//! `Session` is generic over its socket type (`io::Read + io::Write`,
//! the same bound `Proto<S: Io, C>` uses in spirit) rather than hardwired
//! to `tokio_core::net::TcpStream`, so it can be driven directly against
//! an in-memory duplex stream in tests without a running reactor. The
//! per-connection inactivity timer — which does need a reactor `Handle`
//! — lives one layer up, in `server::Watchdog`; `Session` only tracks
//! *when* it was last active and *how long* it's currently allowed to
//! stay idle, exactly the two facts spec.md's "inactivity countdown"
//! needs from the protocol layer.

use std::any::Any;
use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Async, Future, Poll};
use futures::sync::oneshot;

use buffer::Buffer;
use config::Config;
use error::{Error, ParseError};
use memory::MemoryCounter;
use parser::Parser;
use parser::chunked::ChunkParser;
use request::{Directive, HeaderToken, Request, RequestControl};
use response::Response;
use server::DateCache;
use token::{BodyLen, TokenKind};
use version::Version;

/// Outcome of handing a fully-parsed request to the handler.
pub enum Action {
    /// The response is fully written into the session's write buffer
    /// already; proceed straight to flushing it.
    Ready,
    /// The handler needs to do work off the reactor (a blocking
    /// computation, an upstream call) before the response can be
    /// completed. The session parks until `completion` fires, at which
    /// point `Handler::resume` is called to let it finish the response.
    Paused(oneshot::Receiver<()>),
}

/// Supplies responses. Implemented by the embedding application.
pub trait Handler {
    /// Called once a request's headers and body are available. `resp`
    /// already has its status line slot open; `out` is the write buffer
    /// to compose the body into.
    fn handle(&mut self, req: &Request, resp: &mut Response, out: &mut Buffer) -> Action;

    /// Called again after a `Paused` completion fires, to let the
    /// handler finish writing the response it started in `handle`.
    fn resume(&mut self, resp: &mut Response, out: &mut Buffer) {
        let _ = (resp, out);
    }
}

#[derive(Debug, Clone, Copy)]
struct ParsedHead {
    method: (usize, usize),
    target: (usize, usize),
    version: Version,
}

/// Where a dispatched request's body bytes live.
enum BodySource {
    /// Fixed-length (or empty) body, sliced straight out of the read
    /// buffer — no copy needed since nothing compacts it mid-request.
    Buffered { start: usize, end: usize },
    /// Chunked body, reassembled with its chunk framing stripped as
    /// chunks arrived, since buffer compaction invalidates earlier
    /// chunk tokens (see `parser::chunked`). `spans` indexes into
    /// `data`, one `(start, len)` per chunk, in arrival order.
    Chunked { data: Vec<u8>, spans: Vec<(usize, usize)> },
}

enum ReadState {
    /// Parsing the request line and headers.
    Headers {
        head: Option<ParsedHead>,
        headers: Vec<HeaderToken>,
        pending_key: Option<(usize, usize)>,
    },
    /// Buffering a fixed-length or chunked body before dispatch. This
    /// session always buffers a request's whole body before invoking
    /// the handler (spec.md's "NOP state, chunks fetched on host
    /// demand" describes delivering chunks to the handler as they
    /// arrive off the wire; here they've all already arrived by the
    /// time `Request::read_chunk` can be called — see DESIGN.md).
    Body {
        head: ParsedHead,
        headers: Vec<HeaderToken>,
        body_start: usize,
        remaining_fixed: Option<u64>,
        chunked: Option<ChunkParser>,
        chunk_data: Vec<u8>,
        chunk_spans: Vec<(usize, usize)>,
        chunk_total: u64,
    },
    /// Headers and body are both ready; waiting for the handler.
    Dispatch {
        head: ParsedHead,
        headers: Vec<HeaderToken>,
        body: BodySource,
        consumed_upto: usize,
    },
    /// Handler returned `Paused`; waiting on its completion handle.
    Waiting(oneshot::Receiver<()>),
    /// Nothing more to read until the response for the in-flight
    /// request has been flushed (pipelining is not supported — see
    /// spec.md's Non-goals).
    Idle,
}

enum WriteState {
    Idle,
    Flushing,
}

/// Drives one accepted connection to completion.
pub struct Session<S, H: Handler> {
    io: S,
    config: Arc<Config>,
    date: DateCache,
    mem: MemoryCounter,
    read_buf: Buffer,
    write_buf: Buffer,
    parser: Parser,
    read_state: ReadState,
    write_state: WriteState,
    response: Option<Response>,
    handler: H,
    keep_alive: bool,
    closing: bool,
    error_written: bool,
    request_control: RequestControl,
    userdata: Rc<RefCell<Option<Box<Any>>>>,
    last_activity: Instant,
    current_timeout: Duration,
}

impl<S: Read + Write, H: Handler> Session<S, H> {
    pub fn new(io: S, config: Arc<Config>, date: DateCache, mem: MemoryCounter, handler: H) -> Session<S, H> {
        let parser = Parser::new(
            config.get_max_token_length(),
            config.get_max_header_count(),
            config.get_max_content_length(),
        );
        let request_timeout = config.get_request_timeout();
        Session {
            read_buf: Buffer::with_capacity(config.get_request_buf_size(), mem.clone()),
            write_buf: Buffer::with_capacity(config.get_response_buf_size(), mem.clone()),
            io: io,
            config: config,
            date: date,
            mem: mem,
            parser: parser,
            read_state: ReadState::Headers {
                head: None,
                headers: Vec::new(),
                pending_key: None,
            },
            write_state: WriteState::Idle,
            response: None,
            handler: handler,
            keep_alive: true,
            closing: false,
            error_written: false,
            request_control: RequestControl::new(),
            userdata: Rc::new(RefCell::new(None)),
            last_activity: Instant::now(),
            current_timeout: request_timeout,
        }
    }

    /// When this connection last made forward progress. Read by
    /// `server::Watchdog` to decide whether `current_timeout` has
    /// elapsed.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// How long this connection may stay idle right now —
    /// `REQUEST_TIMEOUT` while a request is in flight, or
    /// `KEEP_ALIVE_TIMEOUT` while idle between requests.
    pub fn current_timeout(&self) -> Duration {
        self.current_timeout
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn fill_read_buf(&mut self) -> io::Result<bool> {
        loop {
            match self.read_buf.read_from(&mut self.io) {
                Ok(0) => return Ok(false),
                Ok(_) => {
                    self.touch();
                    continue;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) => return Err(e),
            }
        }
    }

    fn advance_headers(&mut self) -> Result<Option<()>, ParseError> {
        loop {
            let (head, headers, pending_key) = match self.read_state {
                ReadState::Headers { ref mut head, ref mut headers, ref mut pending_key } =>
                    (head, headers, pending_key),
                _ => unreachable!(),
            };
            let tok = self.parser.resume(self.read_buf.data())?;
            if tok.is_none() {
                return Ok(None);
            }
            match tok.kind {
                TokenKind::Method => {
                    *head = Some(ParsedHead {
                        method: (tok.start, tok.len),
                        target: (0, 0),
                        version: Version::Http10,
                    });
                }
                TokenKind::Target => {
                    if let Some(h) = head.as_mut() {
                        h.target = (tok.start, tok.len);
                    }
                }
                TokenKind::Version => {
                    if let Some(h) = head.as_mut() {
                        h.version = if &self.read_buf.data()[tok.start..tok.end()] == b"HTTP/1.0" {
                            Version::Http10
                        } else {
                            Version::Http11
                        };
                    }
                }
                TokenKind::HeaderKey => {
                    *pending_key = Some((tok.start, tok.len));
                }
                TokenKind::HeaderValue => {
                    if let Some((ks, kl)) = pending_key.take() {
                        headers.push(HeaderToken {
                            key_start: ks,
                            key_len: kl,
                            val_start: tok.start,
                            val_len: tok.len,
                        });
                    }
                }
                TokenKind::Body(body_len) => {
                    if self.parser.saw_unrecognised_transfer_encoding() {
                        return Err(ParseError::BadRequestLine);
                    }
                    let head = head.expect("Body token without a parsed request line");
                    let headers = ::std::mem::replace(headers, Vec::new());
                    let body_start = tok.start;
                    self.read_state = match body_len {
                        BodyLen::Empty => ReadState::Dispatch {
                            head: head,
                            headers: headers,
                            body: BodySource::Buffered { start: body_start, end: body_start },
                            consumed_upto: body_start,
                        },
                        BodyLen::Fixed(n) => ReadState::Body {
                            head: head,
                            headers: headers,
                            body_start: body_start,
                            remaining_fixed: Some(n),
                            chunked: None,
                            chunk_data: Vec::new(),
                            chunk_spans: Vec::new(),
                            chunk_total: 0,
                        },
                        BodyLen::Chunked => ReadState::Body {
                            head: head,
                            headers: headers,
                            body_start: body_start,
                            remaining_fixed: None,
                            chunked: Some(ChunkParser::new(body_start, self.config.get_max_token_length())),
                            chunk_data: Vec::new(),
                            chunk_spans: Vec::new(),
                            chunk_total: 0,
                        },
                    };
                    return Ok(Some(()));
                }
                TokenKind::ChunkBody | TokenKind::None => unreachable!(),
            }
        }
    }

    fn advance_body(&mut self) -> Result<Option<()>, ParseError> {
        // `Some(end)` once the body (and, for chunked bodies, the
        // terminating "0\r\n\r\n") is fully buffered, where `end` is the
        // buffer offset just past it.
        let mut finished: Option<usize> = None;
        {
            let (head, headers, body_start, remaining_fixed, chunked, chunk_data, chunk_spans, chunk_total) = match self.read_state {
                ReadState::Body {
                    ref mut head, ref mut headers, body_start, ref mut remaining_fixed, ref mut chunked,
                    ref mut chunk_data, ref mut chunk_spans, ref mut chunk_total, ..
                } => (head, headers, body_start, remaining_fixed, chunked, chunk_data, chunk_spans, chunk_total),
                _ => unreachable!(),
            };
            if let Some(remaining) = *remaining_fixed {
                let available = (self.read_buf.filled() - body_start) as u64;
                if available >= remaining {
                    finished = Some(body_start + remaining as usize);
                }
            } else if let Some(ref mut cp) = *chunked {
                loop {
                    let tok = cp.resume(self.read_buf.data())?;
                    if tok.is_none() {
                        let anchor = cp.anchor();
                        if anchor > 0 {
                            self.read_buf.consume(anchor);
                            cp.rebase(anchor);
                            // The request-line and header spans captured
                            // before the body started also index into
                            // this buffer; they must shift down by the
                            // same amount or every accessor on the
                            // eventual `Request` slices the wrong bytes.
                            head.method.0 -= anchor;
                            head.target.0 -= anchor;
                            for h in headers.iter_mut() {
                                h.key_start -= anchor;
                                h.val_start -= anchor;
                            }
                        }
                        break;
                    }
                    if tok.len > 0 {
                        *chunk_total += tok.len as u64;
                        if *chunk_total > self.config.get_max_content_length() {
                            return Err(ParseError::ContentLengthTooLarge);
                        }
                        let offset = chunk_data.len();
                        chunk_data.extend_from_slice(&self.read_buf.data()[tok.start..tok.end()]);
                        chunk_spans.push((offset, tok.len));
                    }
                    if cp.is_done() {
                        finished = Some(tok.end());
                        break;
                    }
                }
            } else {
                unreachable!()
            }
        }
        let body_end = match finished {
            Some(end) => end,
            None => return Ok(None),
        };
        let old = ::std::mem::replace(&mut self.read_state, ReadState::Idle);
        if let ReadState::Body { head, headers, body_start, remaining_fixed, chunk_data, chunk_spans, .. } = old {
            let body = if remaining_fixed.is_some() {
                BodySource::Buffered { start: body_start, end: body_end }
            } else {
                BodySource::Chunked { data: chunk_data, spans: chunk_spans }
            };
            self.read_state = ReadState::Dispatch { head: head, headers: headers, body: body, consumed_upto: body_end };
            Ok(Some(()))
        } else {
            unreachable!()
        }
    }

    fn dispatch(&mut self) {
        let (head, headers, body, consumed_upto) = match ::std::mem::replace(&mut self.read_state, ReadState::Idle) {
            ReadState::Dispatch { head, headers, body, consumed_upto } => (head, headers, body, consumed_upto),
            other => {
                self.read_state = other;
                return;
            }
        };
        let (body_slice, chunk_spans, body_len): (&[u8], &[(usize, usize)], BodyLen) = match &body {
            BodySource::Buffered { start, end } =>
                (&self.read_buf.data()[*start..*end], &[][..], BodyLen::Fixed((*end - *start) as u64)),
            BodySource::Chunked { data, spans } =>
                (&data[..], &spans[..], BodyLen::Chunked),
        };
        self.request_control = RequestControl::new();
        let req = Request::new(
            self.read_buf.data(),
            head.method,
            head.target,
            head.version,
            &headers,
            body_slice,
            body_len,
            chunk_spans,
            &self.request_control,
            &self.userdata,
        );
        let wants_keep_alive = req.wants_keep_alive();
        self.keep_alive = wants_keep_alive;
        let close = !wants_keep_alive;
        let mut resp = Response::new(head.version, req.method() == "HEAD", close, self.date.get());
        let action = self.handler.handle(&req, &mut resp, &mut self.write_buf);
        if let Some(directive) = self.request_control.connection_override() {
            self.keep_alive = directive == Directive::KeepAlive;
        }
        let free_early = self.request_control.free_requested();
        self.response = Some(resp);
        self.read_buf.consume(consumed_upto);
        if free_early {
            self.read_buf = Buffer::new(self.mem.clone());
        }
        self.parser.reset(0);
        match action {
            Action::Ready => {
                self.read_state = ReadState::Idle;
                self.write_state = WriteState::Flushing;
            }
            Action::Paused(rx) => {
                self.read_state = ReadState::Waiting(rx);
            }
        }
    }

    /// Writes a self-contained error response (400/413) and arranges for
    /// the connection to close once it's flushed. Used when the parser
    /// rejects a request outright — spec.md §7 requires the connection
    /// to close afterward rather than attempt to resynchronise on the
    /// next byte of a request the client thinks it already sent.
    fn write_error_response(&mut self, err: ParseError) {
        if self.error_written {
            return;
        }
        self.error_written = true;
        let code = if err.is_payload_too_large() { 413 } else { 400 };
        let mut resp = Response::new(Version::Http11, false, true, self.date.get());
        resp.status(&mut self.write_buf, code);
        resp.add_header(&mut self.write_buf, "Content-Type", b"text/plain").unwrap();
        let body = format!("{}\n", err);
        resp.add_length(&mut self.write_buf, body.len() as u64).unwrap();
        resp.done_headers(&mut self.write_buf).unwrap();
        resp.write_body(&mut self.write_buf, body.as_bytes());
        resp.done(&mut self.write_buf);
        self.keep_alive = false;
        self.read_state = ReadState::Idle;
        self.write_state = WriteState::Flushing;
    }

    fn flush_write_buf(&mut self) -> io::Result<bool> {
        while self.write_buf.filled() > 0 {
            match self.io.write(self.write_buf.data()) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.write_buf.consume(n);
                    self.touch();
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

impl<S: Read + Write, H: Handler> Future for Session<S, H> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        loop {
            if self.closing {
                if self.flush_write_buf()? {
                    return Ok(Async::Ready(()));
                }
                return Ok(Async::NotReady);
            }

            if let ReadState::Waiting(ref mut rx) = self.read_state {
                match rx.poll() {
                    Ok(Async::Ready(())) => {}
                    Ok(Async::NotReady) => return Ok(Async::NotReady),
                    Err(_) => return Err(Error::HandlerDropped),
                }
                if let Some(mut resp) = self.response.take() {
                    self.handler.resume(&mut resp, &mut self.write_buf);
                    self.response = Some(resp);
                }
                self.read_state = ReadState::Idle;
                self.write_state = WriteState::Flushing;
                continue;
            }

            if let WriteState::Flushing = self.write_state {
                if !self.flush_write_buf()? {
                    return Ok(Async::NotReady);
                }
                self.write_state = WriteState::Idle;
                self.response = None;
                if !self.keep_alive {
                    self.closing = true;
                    continue;
                }
                // A request or response that grew the buffers past their
                // configured baseline must not keep that capacity for the
                // rest of the connection's life.
                self.read_buf.shrink_to(self.config.get_request_buf_size());
                self.write_buf.shrink_to(self.config.get_response_buf_size());
                self.read_state = ReadState::Headers { head: None, headers: Vec::new(), pending_key: None };
                self.current_timeout = self.config.get_keep_alive_timeout();
                self.touch();
                continue;
            }

            match self.read_state {
                ReadState::Headers { .. } => {
                    match self.advance_headers() {
                        Ok(Some(())) => {
                            self.current_timeout = self.config.get_request_timeout();
                            continue;
                        }
                        Ok(None) => {
                            if !self.fill_read_buf()? {
                                return Ok(Async::Ready(()));
                            }
                            return Ok(Async::NotReady);
                        }
                        Err(e) => {
                            self.write_error_response(e);
                            continue;
                        }
                    }
                }
                ReadState::Body { .. } => {
                    match self.advance_body() {
                        Ok(Some(())) => continue,
                        Ok(None) => {
                            if !self.fill_read_buf()? {
                                return Err(Error::Io(io::Error::new(
                                    io::ErrorKind::UnexpectedEof, "connection closed mid-body")));
                            }
                            return Ok(Async::NotReady);
                        }
                        Err(e) => {
                            self.write_error_response(e);
                            continue;
                        }
                    }
                }
                ReadState::Dispatch { .. } => {
                    self.dispatch();
                    continue;
                }
                ReadState::Idle => return Ok(Async::NotReady),
                ReadState::Waiting(_) => unreachable!(),
            }
        }
    }
}
