use broadside::{Handler, ServerBuilder};

use std::io::Write;
use std::net::{SocketAddrV6, TcpStream};
use std::sync::{Arc, Mutex};

/// Records every (peer, payload) chunk the dispatcher hands over.
#[derive(Clone, Default)]
struct Capture {
    chunks: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl Handler for Capture {
    fn on_data(&mut self, peer: &str, payload: &[u8]) {
        self.chunks
            .lock()
            .unwrap()
            .push((peer.to_string(), payload.to_vec()));
    }
}

fn connect(port: u16) -> TcpStream {
    TcpStream::connect(("::1", port)).expect("connect")
}

#[test]
fn accepts_and_reads_a_payload() {
    let capture = Capture::default();
    let chunks = capture.chunks.clone();

    let mut server = ServerBuilder::new()
        .port(0)
        .bind_with(capture)
        .expect("bind");
    let port = server.local_port().expect("local port");

    let mut client = connect(port);
    server.poll().expect("accept cycle");

    assert_eq!(server.clients(), 1);
    assert_eq!(server.event_slots(), 2);

    client.write_all(b"hello").expect("send");
    server.poll().expect("read cycle");

    let recorded = chunks.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].1, b"hello");

    let peer: SocketAddrV6 = recorded[0].0.parse().expect("peer address parses");
    assert!(peer.ip().is_loopback());
}

#[test]
fn chunks_arrive_per_readiness_event() {
    let capture = Capture::default();
    let chunks = capture.chunks.clone();

    let mut server = ServerBuilder::new()
        .port(0)
        .bind_with(capture)
        .expect("bind");
    let port = server.local_port().expect("local port");

    let mut client = connect(port);
    server.poll().expect("accept cycle");

    client.write_all(b"ab").expect("send first");
    server.poll().expect("first read cycle");
    client.write_all(b"cd").expect("send second");
    server.poll().expect("second read cycle");

    let recorded = chunks.lock().unwrap();
    let payloads: Vec<&[u8]> = recorded.iter().map(|(_, chunk)| chunk.as_slice()).collect();
    assert_eq!(payloads, [b"ab".as_slice(), b"cd".as_slice()]);
}

#[test]
fn clean_close_removes_the_client() {
    let mut server = ServerBuilder::new().port(0).bind().expect("bind");
    let port = server.local_port().expect("local port");

    let client = connect(port);
    server.poll().expect("accept cycle");
    assert_eq!(server.clients(), 1);
    assert_eq!(server.event_slots(), 2);

    drop(client);
    server.poll().expect("eof cycle");

    assert_eq!(server.clients(), 0);
    assert_eq!(server.event_slots(), 1);
}

#[test]
fn disconnect_leaves_other_clients_untouched() {
    let capture = Capture::default();
    let chunks = capture.chunks.clone();

    let mut server = ServerBuilder::new()
        .port(0)
        .bind_with(capture)
        .expect("bind");
    let port = server.local_port().expect("local port");

    let first = connect(port);
    server.poll().expect("accept first");
    let mut second = connect(port);
    server.poll().expect("accept second");

    assert_eq!(server.clients(), 2);
    assert_eq!(server.event_slots(), 3);

    // Zero-byte readiness followed by EOF; only the closing client goes.
    drop(first);
    server.poll().expect("eof cycle");

    assert_eq!(server.clients(), 1);
    assert_eq!(server.event_slots(), 2);

    second.write_all(b"still here").expect("send");
    server.poll().expect("read cycle");

    let recorded = chunks.lock().unwrap();
    assert_eq!(recorded.last().expect("a recorded chunk").1, b"still here");
}

#[test]
fn bind_conflict_fails_before_running() {
    let server = ServerBuilder::new()
        .port(0)
        .reuse_address(true)
        .bind()
        .expect("first bind");
    let port = server.local_port().expect("local port");

    let error = ServerBuilder::new()
        .port(port)
        .reuse_address(false)
        .bind()
        .expect_err("second bind must fail");

    assert!(error.to_string().starts_with("bind"));
}
