//! Thin wrapper around the event loop.
//!
//! The embedding application owns the process's main loop: it calls
//! `Reactor::run` to block forever, or drives `Reactor::poll` itself
//! from inside a larger loop that also services other event sources.
//! Both map directly onto
//! `tokio_core::reactor::Core`, which already distinguishes "run a
//! future to completion" from "do one non-blocking pass over ready
//! events" via `Core::run` and `Core::turn`.

use std::io;
use std::time::Duration;

use futures::Future;
use tokio_core::reactor::{Core, Handle};

/// Owns the event loop a `Server` is registered on.
pub struct Reactor {
    core: Core,
}

impl Reactor {
    pub fn new() -> io::Result<Reactor> {
        Ok(Reactor { core: Core::new()? })
    }

    pub fn handle(&self) -> Handle {
        self.core.handle()
    }

    /// Block the calling thread, servicing connections until `until`
    /// completes.
    pub fn run<F: Future<Item = (), Error = E>, E>(&mut self, until: F) -> Result<(), E> {
        self.core.run(until)
    }

    /// Make one non-blocking pass over whatever's ready right now, for
    /// callers that interleave this reactor with other work instead of
    /// handing it the whole thread via `run`.
    pub fn poll(&mut self) {
        self.core.turn(Some(Duration::new(0, 0)));
    }
}
