//! End-to-end tests against local TCP peers.
//!
//! Most peers are plain TCP servers that answer with garbage or stay silent,
//! which drives the real collaborators through DNS, connect and a failing
//! handshake. One peer is a rustls server with a self-signed certificate
//! that echoes a multi-record payload back.

use std::{
    cell::RefCell,
    io::{Read, Write},
    net::{Ipv4Addr, TcpListener},
    rc::Rc,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use rustls::{
    ServerConfig, ServerConnection, StreamOwned,
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
};
use tlsio_core::{Completion, ConnectionState, TlsIoConfig};
use tlsio_net::{ConnectorConfig, NetConnection, RustlsConfig, tls::MAX_PLAINTEXT_PER_WRITE};

fn poll_until_settled(conn: &mut NetConnection, opened: &Rc<RefCell<Vec<Completion>>>) {
    let started = Instant::now();
    while opened.borrow().is_empty() {
        assert!(started.elapsed() < Duration::from_secs(20), "open never completed");
        conn.do_work();
        thread::sleep(Duration::from_millis(1));
    }
}

fn open(conn: &mut NetConnection) -> Rc<RefCell<Vec<Completion>>> {
    let opened = Rc::new(RefCell::new(Vec::new()));
    let log = opened.clone();
    conn.open(move |r| log.borrow_mut().push(r), |_| {}, |_| {}).unwrap();
    opened
}

#[test]
fn handshake_with_non_tls_peer_fails() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut hello = [0u8; 512];
        let _ = stream.read(&mut hello);
        let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n");
    });

    let config = TlsIoConfig::new("127.0.0.1", port);
    let mut conn =
        tlsio_net::connection(config, RustlsConfig::default(), ConnectorConfig::default())
            .unwrap();
    let opened = open(&mut conn);

    poll_until_settled(&mut conn, &opened);

    assert_eq!(*opened.borrow(), vec![Completion::Error]);
    assert_eq!(conn.state(), ConnectionState::Error);
    conn.close(|| {}).unwrap();
    server.join().unwrap();
}

#[test]
fn silent_peer_hits_open_timeout() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = TlsIoConfig::new("127.0.0.1", port)
        .with_operation_timeout(Duration::from_millis(200));
    let mut conn =
        tlsio_net::connection(config, RustlsConfig::default(), ConnectorConfig::default())
            .unwrap();
    let opened = open(&mut conn);

    poll_until_settled(&mut conn, &opened);

    assert_eq!(*opened.borrow(), vec![Completion::Error]);
    assert_eq!(conn.state(), ConnectionState::Error);
    conn.close(|| {}).unwrap();
    drop(listener);
}

#[test]
fn close_while_connecting_cancels_open() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = TlsIoConfig::new("127.0.0.1", port);
    let mut conn =
        tlsio_net::connection(config, RustlsConfig::default(), ConnectorConfig::default())
            .unwrap();
    let opened = open(&mut conn);
    conn.do_work();

    conn.close(|| {}).unwrap();

    assert_eq!(*opened.borrow(), vec![Completion::Cancelled]);
    assert_eq!(conn.state(), ConnectionState::NotOpen);
    drop(listener);
}

fn self_signed() -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert = rcgen::CertificateParams::new(vec!["127.0.0.1".to_string()])
        .unwrap()
        .self_signed(&key_pair)
        .unwrap();
    let key = PrivatePkcs8KeyDer::from(key_pair.serialize_der());
    (cert.der().clone(), key.into())
}

fn server_config(cert: CertificateDer<'static>, key: PrivateKeyDer<'static>) -> Arc<ServerConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .unwrap();
    Arc::new(config)
}

/// Echo server that reads slowly so the client's socket fills up.
///
/// Returns the bytes it read and whether the client ended with close_notify.
fn spawn_slow_echo(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    len: usize,
) -> thread::JoinHandle<(Vec<u8>, bool)> {
    thread::spawn(move || {
        let (sock, _) = listener.accept().unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(20))).unwrap();
        let mut tls = StreamOwned::new(ServerConnection::new(config).unwrap(), sock);

        let mut received = Vec::with_capacity(len);
        let mut buf = [0u8; 4096];
        while received.len() < len {
            match tls.read(&mut buf) {
                Ok(0) | Err(_) => return (received, false),
                Ok(n) => received.extend_from_slice(&buf[..n]),
            }
            thread::sleep(Duration::from_millis(1));
        }

        tls.write_all(&received).unwrap();
        tls.flush().unwrap();

        let clean_close = matches!(tls.read(&mut buf), Ok(0));
        (received, clean_close)
    })
}

#[test]
fn multi_record_payload_round_trips_over_tls() {
    let (cert, key) = self_signed();
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();

    let payload: Vec<u8> =
        (0..64 * MAX_PLAINTEXT_PER_WRITE + 1000).map(|i| (i % 251) as u8).collect();
    let server = spawn_slow_echo(listener, server_config(cert.clone(), key), payload.len());

    let config = TlsIoConfig::new("127.0.0.1", port).with_read_chunk_size(4096);
    let mut conn = tlsio_net::connection(
        config,
        RustlsConfig::default().with_root(cert),
        ConnectorConfig::default(),
    )
    .unwrap();

    let opened = Rc::new(RefCell::new(Vec::new()));
    let received = Rc::new(RefCell::new(Vec::new()));
    let io_errors = Rc::new(RefCell::new(0usize));
    let (open_log, bytes_log, error_log) = (opened.clone(), received.clone(), io_errors.clone());
    conn.open(
        move |r| open_log.borrow_mut().push(r),
        move |bytes| bytes_log.borrow_mut().extend_from_slice(bytes),
        move |_| *error_log.borrow_mut() += 1,
    )
    .unwrap();

    poll_until_settled(&mut conn, &opened);
    assert_eq!(*opened.borrow(), vec![Completion::Ok]);
    assert_eq!(conn.state(), ConnectionState::Open);

    let sent = Rc::new(RefCell::new(Vec::new()));
    let sent_log = sent.clone();
    conn.send(&payload, move |r| sent_log.borrow_mut().push(r)).unwrap();

    let started = Instant::now();
    while sent.borrow().is_empty() || received.borrow().len() < payload.len() {
        assert!(
            started.elapsed() < Duration::from_secs(30),
            "echo stalled: sent {:?}, received {} of {}",
            sent.borrow(),
            received.borrow().len(),
            payload.len()
        );
        assert_eq!(conn.state(), ConnectionState::Open);
        conn.do_work();
    }

    assert_eq!(*sent.borrow(), vec![Completion::Ok]);
    assert!(*received.borrow() == payload, "echo differs from payload");
    assert_eq!(*io_errors.borrow(), 0);

    let closed = Rc::new(RefCell::new(false));
    let close_log = closed.clone();
    conn.close(move || *close_log.borrow_mut() = true).unwrap();
    assert!(*closed.borrow());
    assert_eq!(conn.state(), ConnectionState::NotOpen);

    let (echoed, clean_close) = server.join().unwrap();
    assert!(echoed == payload, "server saw a different payload");
    assert!(clean_close, "server did not see close_notify");
}
