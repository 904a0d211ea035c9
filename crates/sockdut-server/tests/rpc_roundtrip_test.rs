//! End-to-end: a driver talking JSON lines to a live server over loopback.

#![cfg(target_os = "linux")]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use serde_json::json;
use sockdut_core::WireAddress;
use sockdut_core::socket::{AF_INET, AF_UNIX, SOCK_STREAM};
use sockdut_server::structured_log::{LogEmitter, LogLevel, Logger, MemorySink, validate_log_text};
use sockdut_server::{PosixServer, RpcResponse, ServerConfig, Status};

fn start_server() -> (SocketAddr, MemorySink) {
    let config = ServerConfig::new("127.0.0.1", 0, None, "debug").unwrap();
    let sink = MemorySink::new();
    let log = Logger::new(LogEmitter::to_writer(sink.clone(), "e2e", LogLevel::Debug));
    let server = PosixServer::bind(&config, log).unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || server.serve());
    (addr, sink)
}

/// Driver connection that tolerates out-of-order responses.
struct Driver {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    pending: HashMap<Option<u64>, RpcResponse>,
}

impl Driver {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self {
            stream,
            reader,
            pending: HashMap::new(),
        }
    }

    fn send_raw(&mut self, line: &str) {
        self.send_bytes(line.as_bytes());
    }

    fn send_bytes(&mut self, line: &[u8]) {
        self.stream.write_all(line).unwrap();
        self.stream.write_all(b"\n").unwrap();
        self.stream.flush().unwrap();
    }

    fn send(&mut self, id: u64, method: &str, params: serde_json::Value) {
        let line = json!({ "id": id, "method": method, "params": params }).to_string();
        self.send_raw(&line);
    }

    fn next(&mut self) -> RpcResponse {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("response line");
        serde_json::from_str(&line).expect("response json")
    }

    fn wait(&mut self, id: Option<u64>) -> RpcResponse {
        if let Some(found) = self.pending.remove(&id) {
            return found;
        }
        loop {
            let response = self.next();
            if response.id == id {
                return response;
            }
            self.pending.insert(response.id, response);
        }
    }

    fn call(&mut self, id: u64, method: &str, params: serde_json::Value) -> RpcResponse {
        self.send(id, method, params);
        self.wait(Some(id))
    }

    fn ok(&mut self, id: u64, method: &str, params: serde_json::Value) -> sockdut_core::SyscallResult {
        let response = self.call(id, method, params);
        assert_eq!(response.status, Status::Ok, "{method}: {response:?}");
        response.result.expect("ok response carries a result")
    }
}

fn loopback(port: u16) -> serde_json::Value {
    serde_json::to_value(WireAddress::v4(Ipv4Addr::LOCALHOST, port)).unwrap()
}

#[test]
fn socket_bind_listen_getsockname_close() {
    let (addr, _) = start_server();
    let mut driver = Driver::connect(addr);

    let fd = driver
        .ok(1, "Socket", json!({"domain": AF_INET, "type": SOCK_STREAM, "protocol": 0}))
        .ret;
    assert!(fd >= 0);

    let bound = driver.ok(2, "Bind", json!({"sockfd": fd, "addr": loopback(0)}));
    assert_eq!((bound.ret, bound.errno), (0, 0));
    assert_eq!(
        driver.ok(3, "Listen", json!({"sockfd": fd, "backlog": 4})).ret,
        0
    );

    let name = driver.ok(4, "GetSockName", json!({"sockfd": fd}));
    let WireAddress::In(local) = name.addr.expect("IPv4 name") else {
        panic!("expected IPv4 variant");
    };
    assert_eq!(local.addr, vec![127, 0, 0, 1]);
    assert_ne!(local.port, 0);

    assert_eq!(driver.ok(5, "Close", json!({"fd": fd})).ret, 0);
    let again = driver.ok(6, "Close", json!({"fd": fd}));
    assert_eq!(again.ret, -1);
    assert_eq!(again.errno, libc::EBADF);
}

#[test]
fn malformed_requests_are_invalid_argument() {
    let (addr, _) = start_server();
    let mut driver = Driver::connect(addr);

    let missing = driver.call(1, "Bind", json!({"sockfd": 3}));
    assert_eq!(missing.status, Status::InvalidArgument);
    assert_eq!(missing.message.as_deref(), Some("Missing address"));

    let short = driver.call(
        2,
        "Bind",
        json!({"sockfd": 3, "addr": {"kind": "in6", "family": 10, "port": 1, "flowinfo": 0, "addr": [0, 1], "scope_id": 0}}),
    );
    assert_eq!(short.status, Status::InvalidArgument);
    assert_eq!(short.message.as_deref(), Some("IPv6 address must be 16 bytes"));

    let no_field = driver.call(3, "Recv", json!({"sockfd": 3}));
    assert_eq!(no_field.status, Status::InvalidArgument);
    assert!(no_field.result.is_none());

    let unknown = driver.call(4, "Fcntl", json!({}));
    assert_eq!(unknown.status, Status::InvalidArgument);

    driver.send_raw("this is not json");
    let garbage = driver.wait(None);
    assert_eq!(garbage.status, Status::InvalidArgument);

    // The connection keeps working after rejections.
    let closed = driver.ok(5, "Close", json!({"fd": -1}));
    assert_eq!(closed.errno, libc::EBADF);
}

#[test]
fn non_utf8_line_is_rejected_and_connection_survives() {
    let (addr, _) = start_server();
    let mut driver = Driver::connect(addr);

    driver.send_bytes(b"{\"id\":1,\"method\":\"Close\",\"params\":{\"fd\":\xff}}");
    let rejected = driver.wait(None);
    assert_eq!(rejected.status, Status::InvalidArgument);
    assert!(rejected.result.is_none());
    assert!(rejected.message.unwrap().contains("UTF-8"));

    let closed = driver.ok(2, "Close", json!({"fd": -1}));
    assert_eq!(closed.errno, libc::EBADF);
}

#[test]
fn overlong_line_is_rejected_and_connection_survives() {
    let (addr, _) = start_server();
    let mut driver = Driver::connect(addr);

    let mut huge = br#"{"id":1,"method":"Send","params":{"sockfd":-1,"flags":0,"buf":["#.to_vec();
    while huge.len() < (2 << 20) {
        huge.extend_from_slice(b"0,");
    }
    huge.extend_from_slice(b"0]}}");
    driver.send_bytes(&huge);

    let rejected = driver.wait(None);
    assert_eq!(rejected.status, Status::InvalidArgument);
    assert!(rejected.message.unwrap().contains("exceeds"));

    let closed = driver.ok(2, "Close", json!({"fd": -1}));
    assert_eq!(closed.errno, libc::EBADF);
}

#[test]
fn blocked_accept_does_not_delay_other_calls() {
    let (addr, _) = start_server();
    let mut driver = Driver::connect(addr);

    let fd = driver
        .ok(1, "Socket", json!({"domain": AF_INET, "type": SOCK_STREAM, "protocol": 0}))
        .ret;
    driver.ok(2, "Bind", json!({"sockfd": fd, "addr": loopback(0)}));
    driver.ok(3, "Listen", json!({"sockfd": fd, "backlog": 4}));
    let port = driver
        .ok(4, "GetSockName", json!({"sockfd": fd}))
        .addr
        .and_then(|a| a.port())
        .unwrap();

    driver.send(10, "Accept", json!({"sockfd": fd}));
    let name = driver.call(11, "GetSockName", json!({"sockfd": fd}));
    assert_eq!(name.status, Status::Ok);
    assert!(
        !driver.pending.contains_key(&Some(10)),
        "accept must still be blocked"
    );

    let mut peer = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
    let accepted = driver.wait(Some(10));
    assert_eq!(accepted.status, Status::Ok);
    let accepted = accepted.result.unwrap();
    assert!(accepted.ret >= 0);
    assert_eq!(
        accepted.addr.unwrap().port(),
        Some(peer.local_addr().unwrap().port())
    );

    peer.write_all(b"abc").unwrap();
    let received = driver.ok(12, "Recv", json!({"sockfd": accepted.ret, "len": 1024, "flags": 0}));
    assert_eq!(received.ret, 3);
    assert_eq!(received.data.as_deref(), Some(&b"abc"[..]));
}

#[test]
fn unix_getsockname_reports_result_without_address() {
    let (addr, _) = start_server();
    let mut driver = Driver::connect(addr);

    let fd = driver
        .ok(1, "Socket", json!({"domain": AF_UNIX, "type": SOCK_STREAM, "protocol": 0}))
        .ret;
    let name = driver.ok(2, "GetSockName", json!({"sockfd": fd}));
    assert_eq!((name.ret, name.errno), (0, 0));
    assert!(name.addr.is_none());
    assert!(name.addr_error.is_some());
    driver.ok(3, "Close", json!({"fd": fd}));
}

#[test]
fn calls_are_logged_as_valid_jsonl() {
    let (addr, sink) = start_server();
    let mut driver = Driver::connect(addr);
    driver.ok(1, "Close", json!({"fd": -1}));
    driver.call(2, "Bind", json!({"sockfd": 3}));
    driver.ok(3, "Bind", json!({"sockfd": -1, "addr": loopback(0)}));
    drop(driver);

    let entries = validate_log_text(&sink.contents()).expect("log lines match the schema");
    assert!(entries.iter().any(|e| e.event == "server_listening"));

    let close = entries
        .iter()
        .find(|e| e.event == "call" && e.method.as_deref() == Some("Close"))
        .expect("close call logged");
    assert_eq!(close.ret, Some(-1));
    assert_eq!(close.errno, Some(libc::EBADF));
    assert_eq!(close.sockfd, Some(-1));
    assert_eq!(close.request_id, Some(1));
    assert!(close.family.is_none());

    let bind = entries
        .iter()
        .find(|e| e.event == "call" && e.request_id == Some(3))
        .expect("bind call logged");
    assert_eq!(bind.errno, Some(libc::EBADF));
    assert_eq!(bind.family.as_deref(), Some("AF_INET"));

    assert!(
        entries
            .iter()
            .any(|e| e.event == "call_rejected" && e.request_id == Some(2))
    );
}
