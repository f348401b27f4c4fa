//! Send and receive path tests.
//!
//! Covers partial writes, zero-length sends, per-send deadlines, write and
//! read failures, and how queued sends complete on close.

use std::{io, time::Duration};

use tlsio_core::{Completion, ConnectionState, TlsIoConfig, TlsIoError};
use tlsio_harness::{
    SimClock, SimNetwork, WriteMode,
    scenario::{ClientActor, Event},
    sim_connection,
};

fn open_client(config: TlsIoConfig, net: &SimNetwork) -> (SimClock, ClientActor) {
    let clock = SimClock::new();
    let connection = sim_connection(config, &clock, net).unwrap();
    let mut client = ClientActor::new("client".to_string(), connection);
    client.open().unwrap();
    client.poll_until(ConnectionState::Open, 3).unwrap();
    (clock, client)
}

fn send_results(client: &ClientActor) -> Vec<(usize, Completion)> {
    client
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::SendComplete { id, result } => Some((id, result)),
            _ => None,
        })
        .collect()
}

fn io_errors(client: &ClientActor) -> Vec<TlsIoError> {
    client
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::IoError(err) => Some(err),
            _ => None,
        })
        .collect()
}

#[test]
fn partial_write_keeps_remainder_queued() {
    let net = SimNetwork::new();
    net.write_mode(WriteMode::Chunked(12));
    let (_clock, mut client) = open_client(TlsIoConfig::new("x", 443), &net);

    let payload: Vec<u8> = (0..20).collect();
    client.send(&payload).unwrap();

    client.poll();
    assert_eq!(net.write_calls(), vec![(20, 12)]);
    assert_eq!(client.connection().pending_sends(), 1);
    assert!(send_results(&client).is_empty());

    client.poll();
    assert_eq!(net.write_calls(), vec![(20, 12), (8, 8)]);
    assert_eq!(send_results(&client), vec![(0, Completion::Ok)]);
    assert_eq!(client.connection().pending_sends(), 0);
    assert_eq!(net.written(), payload);

    client.poll();
    assert_eq!(send_results(&client).len(), 1);
}

#[test]
fn zero_length_send_completes_without_write() {
    let net = SimNetwork::new();
    let (_clock, mut client) = open_client(TlsIoConfig::new("x", 443), &net);

    client.send(&[]).unwrap();
    client.poll();

    assert_eq!(send_results(&client), vec![(0, Completion::Ok)]);
    assert!(net.write_calls().is_empty());
}

#[test]
fn sends_complete_in_fifo_order() {
    let net = SimNetwork::new();
    net.write_mode(WriteMode::Chunked(5));
    let (_clock, mut client) = open_client(TlsIoConfig::new("fifo.test", 443), &net);

    let messages: [&[u8]; 4] = [b"first message", b"", b"second", b"a much longer third message"];
    for message in messages {
        client.send(message).unwrap();
    }
    for _ in 0..20 {
        client.poll();
    }

    let expected: Vec<_> = (0..4).map(|id| (id, Completion::Ok)).collect();
    assert_eq!(send_results(&client), expected);
    assert_eq!(net.written(), messages.concat());
    // only the head is ever offered to the session
    let offered: Vec<usize> = net.write_calls().iter().map(|(offered, _)| *offered).collect();
    assert_eq!(&offered[..3], [13, 8, 3]);
}

#[test]
fn close_cancels_queue_before_close_callback() {
    let net = SimNetwork::new();
    net.write_mode(WriteMode::Blocked);
    let (_clock, mut client) = open_client(TlsIoConfig::new("x", 443), &net);

    for _ in 0..3 {
        client.send(b"stuck").unwrap();
    }
    client.poll();
    client.close().unwrap();

    let events = client.events();
    assert_eq!(&events[1..], [
        Event::SendComplete { id: 0, result: Completion::Cancelled },
        Event::SendComplete { id: 1, result: Completion::Cancelled },
        Event::SendComplete { id: 2, result: Completion::Cancelled },
        Event::CloseComplete,
    ]);
    assert_eq!(events[0], Event::OpenComplete(Completion::Ok));
    assert!(net.stats().all_released());
}

#[test]
fn send_deadline_arms_when_entry_reaches_head() {
    let net = SimNetwork::new();
    net.write_mode(WriteMode::Blocked);
    let config = TlsIoConfig::new("x", 443).with_send_timeout(Duration::from_secs(10));
    let (clock, mut client) = open_client(config, &net);

    client.send(b"first").unwrap();
    client.send(b"second").unwrap();
    client.poll();

    clock.advance(Duration::from_secs(10));
    client.poll();
    assert!(send_results(&client).is_empty(), "not expired at the boundary");

    clock.advance(Duration::from_millis(1));
    client.poll();
    assert_eq!(send_results(&client), vec![(0, Completion::Error)]);
    assert_eq!(io_errors(&client), vec![TlsIoError::SendTimeout {
        elapsed: Duration::from_millis(10_001),
        unsent: 5,
    }]);
    client.expect_state(ConnectionState::Open).unwrap();

    // The second send's window starts when it is first serviced.
    client.poll();
    clock.advance(Duration::from_secs(9));
    net.write_mode(WriteMode::Unlimited);
    client.poll();

    assert_eq!(send_results(&client), vec![(0, Completion::Error), (1, Completion::Ok)]);
    assert_eq!(net.written(), b"second");
}

#[test]
fn send_timeout_after_partial_progress_reports_unsent() {
    let net = SimNetwork::new();
    net.write_mode(WriteMode::Chunked(4));
    let config = TlsIoConfig::new("x", 443).with_send_timeout(Duration::from_secs(1));
    let (clock, mut client) = open_client(config, &net);

    client.send(b"0123456789").unwrap();
    client.poll();
    net.write_mode(WriteMode::Blocked);
    clock.advance(Duration::from_secs(2));
    client.poll();

    assert_eq!(send_results(&client), vec![(0, Completion::Error)]);
    assert!(matches!(io_errors(&client)[..], [TlsIoError::SendTimeout { unsent: 6, .. }]));
    assert_eq!(net.written(), b"0123");
}

#[test]
fn write_failure_moves_to_error() {
    let net = SimNetwork::new();
    let (_clock, mut client) = open_client(TlsIoConfig::new("x", 443), &net);

    client.send(b"doomed").unwrap();
    client.send(b"never sent").unwrap();
    net.fail_next_write(io::ErrorKind::BrokenPipe);
    client.poll();

    client.expect_state(ConnectionState::Error).unwrap();
    assert_eq!(send_results(&client), vec![(0, Completion::Error)]);
    assert!(matches!(io_errors(&client)[..], [TlsIoError::Io(_)]));
    assert!(matches!(client.send(b"more"), Err(TlsIoError::InvalidState { .. })));

    client.poll();
    assert_eq!(send_results(&client).len(), 1);

    client.close().unwrap();
    assert_eq!(send_results(&client), vec![(0, Completion::Error), (1, Completion::Cancelled)]);
    assert!(net.stats().all_released());
}

#[test]
fn read_failure_skips_send_step() {
    let net = SimNetwork::new();
    let (_clock, mut client) = open_client(TlsIoConfig::new("x", 443), &net);

    client.send(b"pending").unwrap();
    net.fail_next_read(io::ErrorKind::ConnectionReset);
    client.poll();

    client.expect_state(ConnectionState::Error).unwrap();
    assert!(net.write_calls().is_empty());
    assert!(send_results(&client).is_empty());
    assert_eq!(client.connection().pending_sends(), 1);
    assert!(matches!(io_errors(&client)[..], [TlsIoError::Io(_)]));

    client.close().unwrap();
    assert_eq!(send_results(&client), vec![(0, Completion::Cancelled)]);
}

#[test]
fn reads_are_bounded_by_chunk_size() {
    let net = SimNetwork::new();
    let (_clock, mut client) = open_client(TlsIoConfig::new("x", 443), &net);

    let inbound: Vec<u8> = (0..100).collect();
    net.deliver(&inbound);
    client.poll();
    client.poll();
    client.poll();

    let chunks: Vec<Vec<u8>> = client
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::BytesReceived(bytes) => Some(bytes),
            _ => None,
        })
        .collect();
    assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![64, 36]);
    assert_eq!(chunks.concat(), inbound);
    assert_eq!(net.undelivered(), 0);
}

#[test]
fn read_and_write_share_one_poll() {
    let net = SimNetwork::new();
    let config = TlsIoConfig::new("x", 443).with_read_chunk_size(8);
    let (_clock, mut client) = open_client(config, &net);

    net.deliver(b"ping");
    client.send(b"pong").unwrap();
    client.poll();

    assert_eq!(client.events()[1..], [
        Event::BytesReceived(b"ping".to_vec()),
        Event::SendComplete { id: 0, result: Completion::Ok },
    ]);
}
