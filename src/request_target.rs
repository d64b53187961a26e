//! Opaque parsing of the request-line's request-target.
//!
//! The target is never percent-decoded, normalised or matched against
//! routes here — that's a host concern. This just tells apart the four
//! shapes RFC 7230 §5.3 allows so the session and the request view can
//! hand callers something typed instead of a bare string.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget<'a> {
    /// Usual form, e.g. `/hello?name=world`.
    Origin(&'a str),
    /// Full URL, e.g. `http://example.com:8080/hello`.
    ///
    /// Unlike `Origin`, `path` here may be empty rather than starting
    /// with a slash.
    Absolute { scheme: &'a str, authority: &'a str, path: &'a str },
    /// Bare `host:port`, only meaningful for `CONNECT`.
    Authority(&'a str),
    /// `*`, only meaningful for `OPTIONS`.
    Asterisk,
}

// Authority can't contain `/`, `?`, `#` or `@` (user/password isn't
// supported in HTTP); otherwise the rules are permissive enough that we
// just accept anything up to the next one of those.
fn authority_end_char(&x: &u8) -> bool {
    x == b'/' || x == b'?' || x == b'#' || x == b'@'
}

impl<'a> RequestTarget<'a> {
    pub fn parse(s: &'a str) -> Option<RequestTarget<'a>> {
        use self::RequestTarget::*;

        if s.is_empty() {
            return None;
        }
        if s.starts_with('/') {
            return Some(Origin(s));
        }
        if let Some(rest) = s.strip_prefix("http://") {
            let auth_end = rest.as_bytes().iter()
                .position(authority_end_char)
                .unwrap_or(rest.len());
            return Some(Absolute {
                scheme: "http",
                authority: &rest[..auth_end],
                path: &rest[auth_end..],
            });
        }
        if let Some(rest) = s.strip_prefix("https://") {
            let auth_end = rest.as_bytes().iter()
                .position(authority_end_char)
                .unwrap_or(rest.len());
            return Some(Absolute {
                scheme: "https",
                authority: &rest[..auth_end],
                path: &rest[auth_end..],
            });
        }
        if s == "*" {
            return Some(Asterisk);
        }
        if s.as_bytes().iter().position(authority_end_char).is_none() {
            return Some(Authority(s));
        }

        None
    }
}

#[cfg(test)]
mod test {
    use super::RequestTarget;
    use super::RequestTarget::*;

    #[test]
    fn empty_is_rejected() {
        assert_eq!(RequestTarget::parse(""), None);
    }

    #[test]
    fn plain_path() {
        assert_eq!(RequestTarget::parse("/hello"), Some(Origin("/hello")));
    }

    #[test]
    fn path_with_query() {
        assert_eq!(RequestTarget::parse("/hello?xxx"), Some(Origin("/hello?xxx")));
    }

    #[test]
    fn asterisk() {
        assert_eq!(RequestTarget::parse("*"), Some(Asterisk));
    }

    #[test]
    fn a_url_look_alike_path_is_still_origin_form() {
        assert_eq!(RequestTarget::parse("/http://x"), Some(Origin("/http://x")));
    }

    #[test]
    fn bare_authority() {
        assert_eq!(RequestTarget::parse("http://x"),
            Some(Absolute { scheme: "http", authority: "x", path: "" }));
    }

    #[test]
    fn authority_with_path() {
        assert_eq!(RequestTarget::parse("http://x/"),
            Some(Absolute { scheme: "http", authority: "x", path: "/" }));
    }

    #[test]
    fn https_scheme_is_preserved() {
        assert_eq!(RequestTarget::parse("https://x:932/hello?world"),
            Some(Absolute { scheme: "https", authority: "x:932", path: "/hello?world" }));
    }

    #[test]
    fn connect_style_authority() {
        assert_eq!(RequestTarget::parse("example.com:443"),
            Some(Authority("example.com:443")));
    }
}
