//! Minimal demonstration handler: answers every request with a fixed
//! `200 OK` body, wired up with the same `env_logger`/`argparse`
//! combination this crate's ancestry uses for its own demos.

extern crate argparse;
extern crate env_logger;
extern crate evhttp;
#[macro_use]
extern crate log;

use std::net::SocketAddr;

use argparse::{ArgumentParser, Store};
use evhttp::buffer::Buffer;
use evhttp::config::Config;
use evhttp::reactor::Reactor;
use evhttp::request::Request;
use evhttp::response::Response;
use evhttp::server::Server;
use evhttp::session::{Action, Handler};

struct HelloWorld;

impl Handler for HelloWorld {
    fn handle(&mut self, _req: &Request, resp: &mut Response, out: &mut Buffer) -> Action {
        resp.status(out, 200);
        let body = b"Hello, world!\n";
        resp.add_length(out, body.len() as u64).unwrap();
        resp.done_headers(out).unwrap();
        resp.write_body(out, body);
        resp.done(out);
        Action::Ready
    }
}

fn main() {
    env_logger::init();

    let mut addr: String = "127.0.0.1:8080".to_string();
    {
        let mut parser = ArgumentParser::new();
        parser.set_description("Answers every request with a fixed greeting.");
        parser.refer(&mut addr)
            .add_option(&["-l", "--listen"], Store, "address to listen on");
        parser.parse_args_or_exit();
    }
    let addr: SocketAddr = addr.parse().expect("invalid listen address");

    let mut reactor = Reactor::new().expect("failed to create the reactor");
    let config = Config::new().done();
    let server = Server::new(&addr, reactor.handle(), config, || HelloWorld)
        .expect("failed to bind listener");

    info!("listening on {}", addr);
    reactor.run(server.serve()).expect("server loop failed");
}
