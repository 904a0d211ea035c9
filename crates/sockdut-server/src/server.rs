//! TCP transport.
//!
//! One thread per connection reads request lines; every parsed request is
//! then run on its own thread so a blocked `Accept` or `Recv` never holds up
//! other calls, whether on the same connection or another one. Responses go
//! through a per-connection writer behind a mutex, one whole line at a time.

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use sockdut_core::WireAddress;
use sockdut_core::socket::family_name;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::protocol::{RpcRequest, RpcResponse};
use crate::router;
use crate::structured_log::{LogEntry, LogLevel, Logger};

type SharedWriter = Arc<Mutex<BufWriter<TcpStream>>>;

/// Bound RPC listener.
pub struct PosixServer {
    listener: TcpListener,
    log: Logger,
}

impl PosixServer {
    pub fn bind(config: &ServerConfig, log: Logger) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind)?;
        let local = listener.local_addr()?;
        log.log(
            LogEntry::new(LogLevel::Info, "server_listening")
                .with_details(serde_json::json!({ "addr": local.to_string() })),
        );
        Ok(Self { listener, log })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves connections until the process is terminated.
    pub fn serve(self) -> Result<(), ServerError> {
        accept_loop(self.listener.incoming(), &self.log, spawn_connection);
        Ok(())
    }
}

/// Hands every accepted stream to `spawn`. Neither a failed accept nor a
/// failed spawn ends the loop.
fn accept_loop<S>(incoming: impl Iterator<Item = io::Result<TcpStream>>, log: &Logger, mut spawn: S)
where
    S: FnMut(TcpStream, Logger) -> io::Result<()>,
{
    for stream in incoming {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                log.log(
                    LogEntry::new(LogLevel::Warn, "accept_failed")
                        .with_details(serde_json::json!({ "error": err.to_string() })),
                );
                continue;
            }
        };
        let peer = peer_name(&stream);
        if let Err(err) = spawn(stream, log.clone()) {
            log.log(
                LogEntry::new(LogLevel::Error, "connection_spawn_failed")
                    .with_peer(peer)
                    .with_details(serde_json::json!({ "error": err.to_string() })),
            );
        }
    }
}

fn spawn_connection(stream: TcpStream, log: Logger) -> io::Result<()> {
    thread::Builder::new()
        .name("posix-conn".to_string())
        .spawn(move || serve_connection(stream, log))
        .map(drop)
}

fn peer_name(stream: &TcpStream) -> String {
    stream
        .peer_addr()
        .map_or_else(|_| "unknown".to_string(), |a| a.to_string())
}

/// One request line as read off the wire.
#[derive(Debug, PartialEq, Eq)]
enum RequestLine {
    Text(String),
    NotUtf8,
    /// Longer than [`MAX_REQUEST_LINE`]; the rest of it has been discarded.
    TooLong,
    Eof,
}

/// Upper bound on one request line, newline excluded.
const MAX_REQUEST_LINE: usize = 1 << 20;

fn read_request_line(reader: &mut impl BufRead, buf: &mut Vec<u8>) -> io::Result<RequestLine> {
    buf.clear();
    let limit = MAX_REQUEST_LINE as u64 + 1;
    let n = reader.by_ref().take(limit).read_until(b'\n', buf)?;
    if n == 0 {
        return Ok(RequestLine::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > MAX_REQUEST_LINE {
        reader.skip_until(b'\n')?;
        return Ok(RequestLine::TooLong);
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    match String::from_utf8(std::mem::take(buf)) {
        Ok(text) => Ok(RequestLine::Text(text)),
        Err(_) => Ok(RequestLine::NotUtf8),
    }
}

fn serve_connection(stream: TcpStream, log: Logger) {
    let peer = peer_name(&stream);
    log.log(LogEntry::new(LogLevel::Info, "connection_opened").with_peer(&peer));

    let writer: SharedWriter = match stream.try_clone() {
        Ok(w) => Arc::new(Mutex::new(BufWriter::new(w))),
        Err(err) => {
            log.log(
                LogEntry::new(LogLevel::Error, "connection_setup_failed")
                    .with_peer(&peer)
                    .with_details(serde_json::json!({ "error": err.to_string() })),
            );
            return;
        }
    };

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        let line = match read_request_line(&mut reader, &mut buf) {
            Ok(RequestLine::Text(line)) => line,
            Ok(RequestLine::Eof) => break,
            Ok(RequestLine::NotUtf8) => {
                reject_line(&writer, &log, &peer, "request line is not valid UTF-8");
                continue;
            }
            Ok(RequestLine::TooLong) => {
                let message = format!("request line exceeds {MAX_REQUEST_LINE} bytes");
                reject_line(&writer, &log, &peer, &message);
                continue;
            }
            Err(err) => {
                log.log(
                    LogEntry::new(LogLevel::Warn, "read_failed")
                        .with_peer(&peer)
                        .with_details(serde_json::json!({ "error": err.to_string() })),
                );
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = match RpcRequest::parse(&line) {
            Ok(request) => request,
            Err(rejected) => {
                let message = rejected.error.to_string();
                let mut entry = LogEntry::new(LogLevel::Warn, "request_rejected")
                    .with_peer(&peer)
                    .with_details(serde_json::json!({ "message": message }));
                if let Some(id) = rejected.id {
                    entry = entry.with_request_id(id);
                }
                log.log(entry);
                reply(&writer, &RpcResponse::invalid_argument(rejected.id, message), &log, &peer);
                continue;
            }
        };

        let id = request.id;
        let call_writer = Arc::clone(&writer);
        let call_log = log.clone();
        let call_peer = peer.clone();
        let spawned = thread::Builder::new()
            .name(format!("posix-{}", request.call.method()))
            .spawn(move || run_call(&request, &call_writer, &call_log, &call_peer));
        if let Err(err) = spawned {
            log.log(
                LogEntry::new(LogLevel::Error, "call_spawn_failed")
                    .with_peer(&peer)
                    .with_request_id(id)
                    .with_details(serde_json::json!({ "error": err.to_string() })),
            );
            reply(&writer, &RpcResponse::unavailable(id, err.to_string()), &log, &peer);
        }
    }

    log.log(LogEntry::new(LogLevel::Info, "connection_closed").with_peer(&peer));
}

/// Answers a line that never got as far as JSON parsing.
fn reject_line(writer: &SharedWriter, log: &Logger, peer: &str, message: &str) {
    log.log(
        LogEntry::new(LogLevel::Warn, "request_rejected")
            .with_peer(peer)
            .with_details(serde_json::json!({ "message": message })),
    );
    reply(writer, &RpcResponse::invalid_argument(None, message), log, peer);
}

fn run_call(request: &RpcRequest, writer: &SharedWriter, log: &Logger, peer: &str) {
    let method = request.call.method();
    if request.call.may_block() {
        log.log(
            LogEntry::new(LogLevel::Debug, "call_started")
                .with_method(method)
                .with_request_id(request.id)
                .with_peer(peer),
        );
    }

    let started = Instant::now();
    let response = router::respond(request);
    let latency_ns = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);

    let mut entry = match &response.result {
        Some(result) => LogEntry::new(LogLevel::Info, "call").with_result(result),
        None => LogEntry::new(LogLevel::Warn, "call_rejected").with_details(
            serde_json::json!({ "message": response.message.as_deref().unwrap_or_default() }),
        ),
    }
    .with_method(method)
    .with_request_id(request.id)
    .with_peer(peer)
    .with_latency_ns(latency_ns);
    if let Some(fd) = request.call.sockfd() {
        entry = entry.with_sockfd(fd);
    }
    let addr = request
        .call
        .address()
        .or_else(|| response.result.as_ref().and_then(|r| r.addr.as_ref()));
    if let Some(af) = addr.and_then(WireAddress::af) {
        entry = entry.with_family(family_name(af));
    }
    log.log(entry);

    reply(writer, &response, log, peer);
}

fn reply(writer: &SharedWriter, response: &RpcResponse, log: &Logger, peer: &str) {
    if let Err(err) = write_response(writer, response) {
        log.log(
            LogEntry::new(LogLevel::Warn, "write_failed")
                .with_peer(peer)
                .with_details(serde_json::json!({ "error": err.to_string() })),
        );
    }
}

fn write_response(writer: &SharedWriter, response: &RpcResponse) -> io::Result<()> {
    let line = response.to_line().map_err(io::Error::other)?;
    let mut w = writer.lock();
    writeln!(w, "{line}")?;
    w.flush()
}
