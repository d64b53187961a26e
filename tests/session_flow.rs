//! Drives `Session` directly against an in-memory duplex stream, the
//! same way `tk_bufstream::MockData` lets this crate's ancestry drive
//! `Proto` without a reactor (see `tests/server_simple.rs` there):
//! push bytes in, call `poll`, inspect what came out.

extern crate evhttp;
extern crate futures;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

use futures::{Async, Future};

use evhttp::buffer::Buffer;
use evhttp::config::Config;
use evhttp::memory::MemoryCounter;
use evhttp::request::Request;
use evhttp::response::Response;
use evhttp::server::DateCache;
use evhttp::session::{Action, Handler, Session};

#[derive(Clone)]
struct MockHandle {
    input: Rc<RefCell<VecDeque<u8>>>,
    output: Rc<RefCell<Vec<u8>>>,
}

impl MockHandle {
    fn new() -> MockHandle {
        MockHandle { input: Rc::new(RefCell::new(VecDeque::new())), output: Rc::new(RefCell::new(Vec::new())) }
    }

    fn push(&self, bytes: &[u8]) {
        self.input.borrow_mut().extend(bytes.iter().cloned());
    }

    fn output(&self) -> Vec<u8> {
        self.output.borrow().clone()
    }
}

impl Read for MockHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut input = self.input.borrow_mut();
        if input.is_empty() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "no data queued"));
        }
        let n = buf.len().min(input.len());
        for slot in buf.iter_mut().take(n) {
            *slot = input.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for MockHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Echoes the request body back as the response body, and records the
/// last request's method/headers for assertions.
struct Echo {
    seen_methods: Rc<RefCell<Vec<String>>>,
}

impl Handler for Echo {
    fn handle(&mut self, req: &Request, resp: &mut Response, out: &mut Buffer) -> Action {
        self.seen_methods.borrow_mut().push(req.method().to_string());
        resp.status(out, 200);
        let body = req.body().to_vec();
        resp.add_length(out, body.len() as u64).unwrap();
        resp.done_headers(out).unwrap();
        resp.write_body(out, &body);
        resp.done(out);
        Action::Ready
    }
}

fn session(handle: MockHandle, handler: Echo) -> Session<MockHandle, Echo> {
    let config = Config::new().done();
    Session::new(handle, config, DateCache::new(), MemoryCounter::new(), handler)
}

fn drive<H: Handler>(s: &mut Session<MockHandle, H>) {
    match s.poll() {
        Ok(Async::Ready(())) | Ok(Async::NotReady) => {}
        Err(e) => panic!("session ended with an unexpected error: {}", e),
    }
}

#[test]
fn simple_get_gets_a_200_with_date_and_keep_alive() {
    let io = MockHandle::new();
    let methods = Rc::new(RefCell::new(Vec::new()));
    let mut s = session(io.clone(), Echo { seen_methods: methods.clone() });

    io.push(b"GET /hello HTTP/1.1\r\nHost: example.com\r\n\r\n");
    drive(&mut s);

    let out = io.output();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{}", text);
    assert!(text.contains("Date: "), "{}", text);
    assert!(text.contains("Content-Length: 0\r\n"), "{}", text);
    assert!(text.contains("Connection: keep-alive\r\n"), "{}", text);
    assert_eq!(*methods.borrow(), vec!["GET".to_string()]);
}

#[test]
fn keep_alive_connection_serves_a_second_request() {
    let io = MockHandle::new();
    let methods = Rc::new(RefCell::new(Vec::new()));
    let mut s = session(io.clone(), Echo { seen_methods: methods.clone() });

    io.push(b"GET /one HTTP/1.1\r\nHost: x\r\n\r\n");
    drive(&mut s);
    io.output.borrow_mut().clear();

    io.push(b"GET /two HTTP/1.1\r\nHost: x\r\n\r\n");
    drive(&mut s);

    let text = String::from_utf8(io.output()).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{}", text);
    assert_eq!(*methods.borrow(), vec!["GET".to_string(), "GET".to_string()]);
}

#[test]
fn http10_request_with_no_connection_header_closes_after_response() {
    let io = MockHandle::new();
    let methods = Rc::new(RefCell::new(Vec::new()));
    let mut s = session(io.clone(), Echo { seen_methods: methods.clone() });

    io.push(b"GET / HTTP/1.0\r\n\r\n");
    // First poll dispatches and starts flushing; a second poll drains
    // the write buffer (the mock never blocks on writes) and then
    // notices `keep_alive` is false and moves to closing.
    drive(&mut s);
    drive(&mut s);

    let text = String::from_utf8(io.output()).unwrap();
    assert!(text.contains("Connection: close\r\n"), "{}", text);
    match s.poll() {
        Ok(Async::Ready(())) => {}
        other => panic!("expected the connection to finish closing, got {:?}", other.map_err(|e| e.to_string())),
    }
}

#[test]
fn chunked_request_body_is_reassembled_without_chunk_framing() {
    let io = MockHandle::new();
    let methods = Rc::new(RefCell::new(Vec::new()));
    let mut s = session(io.clone(), Echo { seen_methods: methods.clone() });

    io.push(b"POST /upload HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n");
    io.push(b"4\r\nWiki\r\n");
    io.push(b"5\r\npedia\r\n");
    io.push(b"0\r\n\r\n");
    drive(&mut s);

    let text = String::from_utf8(io.output()).unwrap();
    assert!(text.contains("Content-Length: 9\r\n"), "{}", text);
    assert!(text.ends_with("Wikipedia"), "{}", text);
    assert_eq!(*methods.borrow(), vec!["POST".to_string()]);
}

#[test]
fn chunked_request_body_arriving_in_tiny_pieces_still_reassembles() {
    let io = MockHandle::new();
    let methods = Rc::new(RefCell::new(Vec::new()));
    let mut s = session(io.clone(), Echo { seen_methods: methods.clone() });

    let whole = b"POST / HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
        3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n";
    for byte in whole.iter() {
        io.push(&[*byte]);
        drive(&mut s);
    }

    let text = String::from_utf8(io.output()).unwrap();
    assert!(text.contains("Content-Length: 5\r\n"), "{}", text);
    assert!(text.ends_with("abcde"), "{}", text);
}

#[test]
fn malformed_request_line_gets_a_400_and_the_connection_closes() {
    let io = MockHandle::new();
    let methods = Rc::new(RefCell::new(Vec::new()));
    let mut s = session(io.clone(), Echo { seen_methods: methods.clone() });

    io.push(b"NOTAMETHODWITHNOSPACES\r\n\r\n");
    drive(&mut s);
    drive(&mut s);

    let text = String::from_utf8(io.output()).unwrap();
    assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{}", text);
    assert!(methods.borrow().is_empty(), "handler must not run for a request that never parsed");
}

#[test]
fn connection_override_forces_close_despite_keep_alive_request() {
    struct CloseAfterOne;
    impl Handler for CloseAfterOne {
        fn handle(&mut self, req: &Request, resp: &mut Response, out: &mut Buffer) -> Action {
            req.connection(evhttp::Directive::Close);
            resp.status(out, 200);
            resp.add_length(out, 0).unwrap();
            resp.done_headers(out).unwrap();
            resp.done(out);
            Action::Ready
        }
    }

    let io = MockHandle::new();
    let config = Config::new().done();
    let mut s = Session::new(io.clone(), config, DateCache::new(), MemoryCounter::new(), CloseAfterOne);

    io.push(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    drive(&mut s);
    drive(&mut s);

    let text = String::from_utf8(io.output()).unwrap();
    assert!(text.contains("Connection: close\r\n"), "{}", text);
    match s.poll() {
        Ok(Async::Ready(())) => {}
        other => panic!("expected the override to close the connection, got {:?}", other.map_err(|e| e.to_string())),
    }
}
