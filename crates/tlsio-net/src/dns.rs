//! Hostname resolution on a helper thread.
//!
//! `getaddrinfo` blocks, so each lookup runs on its own short-lived thread
//! and reports back over a one-shot channel. Polling is a `try_recv`.
//! Dropping a lookup drops the receiver; the thread finishes its query and
//! its send fails quietly.

use std::{
    net::{Ipv4Addr, SocketAddr, ToSocketAddrs},
    thread,
};

use crossbeam_channel::{Receiver, TryRecvError};
use tlsio_core::{
    TlsIoError,
    resolver::{DnsLookup, DnsPrimitive},
};

use crate::error::NetError;

/// DNS primitive backed by the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadedDns;

impl ThreadedDns {
    /// Create a resolver.
    pub fn new() -> Self {
        Self
    }
}

/// One in-flight system lookup.
#[derive(Debug)]
pub struct ThreadedLookup {
    rx: Receiver<Option<Ipv4Addr>>,
    outcome: Option<Option<Ipv4Addr>>,
}

fn first_ipv4(hostname: &str) -> Option<Ipv4Addr> {
    let mut addrs = match (hostname, 0).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            tracing::debug!(hostname, error = %e, "getaddrinfo failed");
            return None;
        },
    };

    addrs.find_map(|addr| match addr {
        SocketAddr::V4(v4) => Some(*v4.ip()),
        SocketAddr::V6(_) => None,
    })
}

impl DnsPrimitive for ThreadedDns {
    type Lookup = ThreadedLookup;

    fn begin_lookup(&mut self, hostname: &str) -> tlsio_core::Result<ThreadedLookup> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let host = hostname.to_string();

        thread::Builder::new()
            .name("tlsio-dns".to_string())
            .spawn(move || {
                let _ = tx.send(first_ipv4(&host));
            })
            .map_err(|e| TlsIoError::from(NetError::ResolverThread(e)))?;

        Ok(ThreadedLookup { rx, outcome: None })
    }
}

impl DnsLookup for ThreadedLookup {
    fn is_complete(&mut self) -> bool {
        if self.outcome.is_some() {
            return true;
        }

        match self.rx.try_recv() {
            Ok(addr) => {
                self.outcome = Some(addr);
                true
            },
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.outcome = Some(None);
                true
            },
        }
    }

    fn result(&self) -> Option<Ipv4Addr> {
        self.outcome.flatten()
    }
}
