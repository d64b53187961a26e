//! A single-threaded, non-blocking HTTP/1.1 server engine meant to be
//! embedded in another program.
//!
//! This crate owns I/O multiplexing (via `tokio_core`), connection
//! lifecycle, request parsing and response framing. It never decides
//! what a request means: the host supplies a `session::Handler` and
//! gets a `request::Request`/`response::Response` pair to answer with.
//! TLS, HTTP/2, routing, multipart and compression all live above this
//! layer, not in it.
#![recursion_limit = "100"]

extern crate futures;
extern crate tokio_core;
#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate matches;
#[macro_use] extern crate log;
extern crate httpdate;

#[cfg(unix)]
extern crate libc;

pub mod buffer;
pub mod config;
pub mod error;
pub mod memory;
pub mod parser;
pub mod reactor;
pub mod request;
pub mod request_target;
pub mod response;
pub mod server;
pub mod session;
pub mod status;
pub mod token;
pub mod version;

mod headers;

pub use config::Config;
pub use error::{Error, ParseError};
pub use reactor::Reactor;
pub use request::{Directive, Request};
pub use response::Response;
pub use server::Server;
pub use session::{Action, Handler, Session};
pub use version::Version;
