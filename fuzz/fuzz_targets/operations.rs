//! Operation sequence fuzzer for the connection state machine
//!
//! Each input byte selects one operation (open, close, send, poll, time
//! jump, delivery, fault or write-mode change) against a simulated
//! connection. Whatever the sequence, the connection must never panic, and
//! after a final close every callback must have fired exactly once and every
//! simulated resource must be released.

#![no_main]

use std::{cell::Cell, io, rc::Rc, time::Duration};

use libfuzzer_sys::fuzz_target;
use tlsio_core::{ConnectionState, TlsIoConfig};
use tlsio_harness::{SimClock, SimNetwork, WriteMode, sim_connection};

#[derive(Default)]
struct Counters {
    opens: Cell<usize>,
    opens_completed: Cell<usize>,
    sends: Cell<usize>,
    sends_completed: Cell<usize>,
}

fn bump(cell: &Cell<usize>) {
    cell.set(cell.get() + 1);
}

fuzz_target!(|data: &[u8]| {
    let Some((&seed, ops)) = data.split_first() else {
        return;
    };

    let clock = SimClock::new();
    let net = SimNetwork::with_seed(u64::from(seed));
    net.dns_delay(u32::from(seed & 3))
        .connect_delay(u32::from((seed >> 2) & 3))
        .handshake_delay(u32::from((seed >> 4) & 3));
    let config = TlsIoConfig::new("fuzz.test", 443)
        .with_operation_timeout(Duration::from_millis(500))
        .with_send_timeout(Duration::from_millis(500))
        .with_read_chunk_size(16);
    let Ok(mut conn) = sim_connection(config, &clock, &net) else {
        return;
    };
    let counters = Rc::new(Counters::default());

    for &byte in ops {
        let arg = usize::from(byte >> 4);
        match byte & 0x0f {
            0 => {
                bump(&counters.opens);
                let c = counters.clone();
                let _ = conn.open(move |_| bump(&c.opens_completed), |_| {}, |_| {});
            },
            1 => {
                let _ = conn.close(|| {});
            },
            2 | 3 => {
                let c = counters.clone();
                let payload = vec![byte; arg * 7];
                if conn.send(&payload, move |_| bump(&c.sends_completed)).is_ok() {
                    bump(&counters.sends);
                }
            },
            4 => clock.advance(Duration::from_millis(arg as u64 * 50)),
            5 => {
                net.deliver(&vec![byte; arg + 1]);
            },
            6 => {
                net.fail_next_read(io::ErrorKind::ConnectionReset);
            },
            7 => {
                net.fail_next_write(io::ErrorKind::BrokenPipe);
            },
            8 => {
                let mode = match arg % 4 {
                    0 => WriteMode::Unlimited,
                    1 => WriteMode::Blocked,
                    2 => WriteMode::Random { max: arg },
                    _ => WriteMode::Chunked(arg),
                };
                net.write_mode(mode);
            },
            _ => {
                let before = conn.state();
                conn.do_work();
                if matches!(before, ConnectionState::NotOpen | ConnectionState::Error) {
                    assert_eq!(conn.state(), before);
                }
            },
        }
    }

    let _ = conn.close(|| {});
    assert_eq!(conn.state(), ConnectionState::NotOpen);
    assert_eq!(counters.opens_completed.get(), counters.opens.get());
    assert_eq!(counters.sends_completed.get(), counters.sends.get());
    assert!(net.stats().all_released());
});
