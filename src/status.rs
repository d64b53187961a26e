//! Fixed status code -> reason phrase table.
//!
//! Response framing only ever needs the numeric code and its reason
//! phrase, not a typed enum of every status a handler might choose, so
//! unlike this crate's ancestry this is a plain lookup rather than a
//! `Status` enum with a variant per code. Codes outside the table still
//! get a response line; they just fall back to an empty reason phrase,
//! which is legal HTTP.

/// Look up the standard reason phrase for `code`, if this table has one.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        426 => "Upgrade Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        // Some widely-deployed HTTP stacks ship this reason phrase with
        // the comma dropped ("Gateway Timeout" became "GatewayTimeout").
        // We're not replicating that bug here.
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "",
    }
}

/// Whether a response with this status code must not carry a body,
/// regardless of what the handler asked for (RFC 7230 3.3.3).
pub fn is_bodyless(code: u16) -> bool {
    match code {
        100..=199 | 204 | 304 => true,
        _ => false,
    }
}
