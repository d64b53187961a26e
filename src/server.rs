//! Binds a listening socket and spawns a `Session` for every accepted
//! connection, enforcing the global memory cap at accept time and an
//! inactivity timeout for the life of the connection.

use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Async, Future, Poll, Stream};
use httpdate;
#[cfg(unix)]
use libc;
use tokio_core::io::write_all;
use tokio_core::net::{TcpListener, TcpStream};
use tokio_core::reactor::{Handle, Interval, Timeout};

use buffer::Buffer;
use config::Config;
use error::Error;
use memory::MemoryCounter;
use response::Response;
use session::{Handler, Session};

#[cfg(unix)]
fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn ignore_sigpipe() {}

/// Shared, cheaply-clonable cache of the current RFC 1123 `Date` header
/// value. Refreshed once a second off an `Interval`, rather than
/// formatting a timestamp for every response — the clock only needs
/// second resolution here.
#[derive(Clone)]
pub struct DateCache(Rc<RefCell<String>>);

impl DateCache {
    /// A cache seeded with the current time. Used by `Server::new`
    /// internally and available here for building a `Session` directly
    /// (e.g. against a mock stream in tests) without going through a
    /// `Server` and its accept loop.
    pub fn new() -> DateCache {
        DateCache(Rc::new(RefCell::new(format_date())))
    }

    pub fn get(&self) -> String {
        self.0.borrow().clone()
    }

    fn refresh(&self) {
        *self.0.borrow_mut() = format_date();
    }
}

fn format_date() -> String {
    httpdate::fmt_http_date(::std::time::SystemTime::now())
}

/// Writes a `503 Service Unavailable` and drops the socket, used when
/// the accept loop finds the server already over its configured memory
/// cap. Grounded on `simple_error_page.rs`'s "build a `Response`, write
/// it, discard the connection" shape; there's no keep-alive to offer a
/// client that was refused before its request was even read.
fn reject_overloaded(socket: TcpStream, date: String) -> Box<Future<Item = (), Error = ()>> {
    let mem = MemoryCounter::new();
    let mut buf = Buffer::new(mem);
    let mut resp = Response::new(::version::Version::Http11, false, true, date);
    resp.status(&mut buf, 503);
    resp.add_header(&mut buf, "Content-Type", b"text/plain").unwrap();
    let body = b"503 Service Unavailable: server is over its configured memory limit\n";
    resp.add_length(&mut buf, body.len() as u64).unwrap();
    resp.done_headers(&mut buf).unwrap();
    resp.write_body(&mut buf, body);
    resp.done(&mut buf);
    let bytes = buf.data().to_vec();
    Box::new(write_all(socket, bytes)
        .map(|_| ())
        .map_err(|e| warn!("failed writing 503 response to an overloaded connection: {}", e)))
}

/// Wraps a `Session` with the reactor-backed inactivity timer spec.md's
/// watchdog describes. `Session` itself only tracks *when* it last made
/// progress and *how long* it may currently stay idle (see
/// `Session::last_activity`/`current_timeout`) — it has no `Handle` and
/// needs none, which is what lets it be driven directly in tests without
/// a reactor. This is the thin layer that turns those two facts into an
/// actual `tokio_core::reactor::Timeout`, grounded on `server/proto.rs`
/// having no timer logic of its own: in the teacher this concern simply
/// doesn't exist, so there's nothing to adapt beyond the general
/// single-threaded `Rc`/`Handle`-holding style the rest of this crate's
/// ancestry uses for reactor-registered resources.
struct Watched<S, H: Handler> {
    session: Session<S, H>,
    handle: Handle,
    timeout: Timeout,
    armed_deadline: Instant,
}

impl<S: io::Read + io::Write, H: Handler> Watched<S, H> {
    fn new(session: Session<S, H>, handle: Handle) -> io::Result<Watched<S, H>> {
        let deadline = session.last_activity() + session.current_timeout();
        let timeout = Timeout::new_at(deadline, &handle)?;
        Ok(Watched { session: session, handle: handle, timeout: timeout, armed_deadline: deadline })
    }
}

impl<S: io::Read + io::Write, H: Handler> Future for Watched<S, H> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        if let Async::Ready(()) = self.session.poll()? {
            return Ok(Async::Ready(()));
        }
        let deadline = self.session.last_activity() + self.session.current_timeout();
        if Instant::now() >= deadline {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::TimedOut, "connection exceeded its inactivity timeout")));
        }
        if deadline != self.armed_deadline {
            self.timeout = Timeout::new_at(deadline, &self.handle)?;
            self.armed_deadline = deadline;
        }
        match self.timeout.poll()? {
            Async::Ready(()) => {
                // The timer fired at the deadline that was armed when it
                // was last (re)created; re-check against the session's
                // current deadline in case it moved forward in the
                // meantime (e.g. a byte arrived right as the timer fired).
                let deadline = self.session.last_activity() + self.session.current_timeout();
                if Instant::now() >= deadline {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::TimedOut, "connection exceeded its inactivity timeout")));
                }
                self.timeout = Timeout::new_at(deadline, &self.handle)?;
                self.armed_deadline = deadline;
                let _ = self.timeout.poll()?;
                Ok(Async::NotReady)
            }
            Async::NotReady => Ok(Async::NotReady),
        }
    }
}

/// Accepts connections on a listening socket and spawns a `Session` per
/// connection onto the reactor `Handle` it was built with.
pub struct Server<F> {
    listener: TcpListener,
    handle: Handle,
    config: Arc<Config>,
    mem: MemoryCounter,
    date: DateCache,
    make_handler: F,
}

impl<F, H> Server<F>
where
    F: FnMut() -> H + 'static,
    H: Handler + 'static,
{
    pub fn new(addr: &SocketAddr, handle: Handle, config: Arc<Config>, make_handler: F)
        -> io::Result<Server<F>>
    {
        ignore_sigpipe();
        let listener = TcpListener::bind(addr, &handle)?;
        Ok(Server {
            listener: listener,
            handle: handle,
            config: config,
            mem: MemoryCounter::new(),
            date: DateCache::new(),
            make_handler: make_handler,
        })
    }

    pub fn memory_counter(&self) -> MemoryCounter {
        self.mem.clone()
    }

    pub fn date_cache(&self) -> DateCache {
        self.date.clone()
    }

    /// Returns a future that accepts connections forever. The caller
    /// drives it with `Reactor::run`.
    pub fn serve(self) -> impl Future<Item = (), Error = io::Error> {
        let Server { listener, handle, config, mem, date, mut make_handler } = self;

        let ticker_date = date.clone();
        let ticker = Interval::new(Duration::from_secs(1), &handle)
            .expect("failed to create date-refresh timer")
            .for_each(move |_| {
                ticker_date.refresh();
                Ok(())
            })
            .map_err(|_| ());
        handle.spawn(ticker);

        let accept_handle = handle.clone();
        listener.incoming().for_each(move |(socket, _peer_addr)| {
            let additional = config.get_request_buf_size() as i64
                + config.get_response_buf_size() as i64;
            if mem.would_exceed(additional, config.get_max_total_est_mem_usage()) {
                // Over the configured memory cap: refuse the connection
                // with an honest 503 rather than accepting it only to
                // tear it down once its buffers are allocated, or
                // silently dropping it and leaving the client to time
                // out guessing why.
                accept_handle.spawn(reject_overloaded(socket, date.get()));
                return Ok(());
            }
            let handler = make_handler();
            let inner = Session::new(socket, config.clone(), date.clone(), mem.clone(), handler);
            let watched = match Watched::new(inner, accept_handle.clone()) {
                Ok(w) => w,
                Err(e) => {
                    warn!("failed to arm connection timeout: {}", e);
                    return Ok(());
                }
            };
            accept_handle.spawn(watched.map_err(|e| warn!("session ended with error: {}", e)));
            Ok(())
        })
    }

}
