//! Confirms the parser produces the same tokens regardless of how the
//! input bytes are split across `resume` calls — the property the
//! whole byte-oriented design exists to guarantee.

extern crate evhttp;

use evhttp::parser::Parser;
use evhttp::token::{BodyLen, TokenKind};

fn new_parser() -> Parser {
    Parser::new(8 * 1024, 127, 8 * 1024 * 1024)
}

fn collect_tokens(buf: &[u8]) -> Vec<(TokenKind, Vec<u8>)> {
    let mut p = new_parser();
    let mut out = Vec::new();
    loop {
        let tok = p.resume(buf).unwrap();
        if tok.is_none() {
            break;
        }
        out.push((tok.kind, buf[tok.start..tok.end()].to_vec()));
        if let TokenKind::Body(_) = tok.kind {
            break;
        }
    }
    out
}

#[test]
fn byte_at_a_time_matches_whole_buffer() {
    let request = b"GET /a/b?c=d HTTP/1.1\r\nHost: test\r\nX-Foo: bar\r\n\r\n";

    let whole = collect_tokens(request);

    let mut p = new_parser();
    let mut incremental = Vec::new();
    for end in 1..=request.len() {
        loop {
            let tok = p.resume(&request[..end]).unwrap();
            if tok.is_none() {
                break;
            }
            incremental.push((tok.kind, request[tok.start..tok.end()].to_vec()));
        }
    }

    assert_eq!(whole.len(), incremental.len());
    for (a, b) in whole.iter().zip(incremental.iter()) {
        assert_eq!(a.0, b.0);
        assert_eq!(a.1, b.1);
    }
}

#[test]
fn fixed_length_body_is_resolved_after_headers() {
    let request = b"POST /submit HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello world";
    let tokens = collect_tokens(request);
    let body = tokens.last().unwrap();
    assert_eq!(body.0, TokenKind::Body(BodyLen::Fixed(11)));
}

#[test]
fn chunked_body_is_detected() {
    let request = b"POST /submit HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
    let tokens = collect_tokens(request);
    let body = tokens.last().unwrap();
    assert_eq!(body.0, TokenKind::Body(BodyLen::Chunked));
}

#[test]
fn payload_too_large_is_reported_distinctly() {
    let mut p = Parser::new(8 * 1024, 127, 10);
    let request = b"POST / HTTP/1.1\r\nContent-Length: 999999\r\n\r\n";
    let err = loop {
        match p.resume(request) {
            Ok(tok) if tok.is_none() => panic!("expected an error before buffer exhaustion"),
            Ok(_) => continue,
            Err(e) => break e,
        }
    };
    assert!(err.is_payload_too_large());
}
