//! End-to-end reassembly of a chunked body arriving in arbitrarily small
//! pieces, including the buffer-compaction path for chunks that don't
//! fit in one read.

extern crate evhttp;

use evhttp::parser::chunked::ChunkParser;

#[test]
fn chunks_split_across_many_small_reads() {
    let full = b"4\r\nWiki\r\n5\r\npedia\r\nE\r\n in\r\n\r\nchunks.\r\n0\r\n\r\n";
    let mut p = ChunkParser::new(0, 1024);
    let mut assembled = Vec::new();

    // Feed the parser growing prefixes of `full`, one byte at a time,
    // exactly as a session would when the socket only has a few bytes
    // ready on each reactor wakeup.
    for end in 1..=full.len() {
        loop {
            let tok = p.resume(&full[..end]).unwrap();
            if tok.is_none() {
                break;
            }
            assembled.extend_from_slice(&full[tok.start..tok.end()]);
            if p.is_done() {
                break;
            }
        }
        if p.is_done() {
            break;
        }
    }

    assert_eq!(assembled, b"Wikipedia in\r\n\r\nchunks.");
    assert!(p.is_done());
}

#[test]
fn compaction_keeps_anchor_consistent_across_a_partial_chunk() {
    // A chunk body that straddles two reads: the first read only
    // delivers part of the declared chunk, so the parser must report
    // "no token yet" and expose an anchor the session can compact to.
    let mut p = ChunkParser::new(0, 1024);
    let first = b"A\r\n12345";
    let tok = p.resume(first).unwrap();
    assert!(tok.is_none());
    let anchor = p.anchor();
    assert!(anchor > 0, "anchor should point past the consumed size line");

    // Simulate the session compacting the buffer down to `anchor` and
    // rebasing the parser to match.
    let mut compacted = first[anchor..].to_vec();
    p.rebase(anchor);

    compacted.extend_from_slice(b"67890\r\n0\r\n\r\n");
    let tok = p.resume(&compacted).unwrap();
    assert_eq!(&compacted[tok.start..tok.end()], b"1234567890");
}
