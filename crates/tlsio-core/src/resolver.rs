//! Hostname resolution behind a polling interface.
//!
//! The DNS primitive starts a lookup and hands back an owned handle. The
//! handle is polled with `is_complete` and released by dropping it, so a
//! lookup is released exactly once whether it finished, failed, timed out or
//! was abandoned by `close`.

use std::net::Ipv4Addr;

use crate::error::{Result, TlsIoError};

/// Asynchronous DNS capability.
pub trait DnsPrimitive {
    /// Handle for one in-flight lookup. Dropping it releases the lookup.
    type Lookup: DnsLookup;

    /// Start resolving `hostname`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup could not be started at all.
    fn begin_lookup(&mut self, hostname: &str) -> Result<Self::Lookup>;
}

/// One in-flight lookup.
pub trait DnsLookup {
    /// Whether the lookup has finished (successfully or not).
    ///
    /// Must never block.
    fn is_complete(&mut self) -> bool;

    /// Resolved IPv4 address, or `None` if resolution failed.
    ///
    /// Only meaningful after `is_complete` returned true.
    fn result(&self) -> Option<Ipv4Addr>;
}

/// Result of polling a [`Resolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePoll {
    /// Lookup still in flight
    Pending,
    /// Lookup finished with an address
    Resolved(Ipv4Addr),
    /// Lookup finished without an address
    Failed,
}

/// Owns one lookup and reports its progress.
pub struct Resolution<L> {
    hostname: String,
    lookup: L,
}

impl<L: DnsLookup> Resolution<L> {
    /// Start resolving `hostname` with `dns`.
    ///
    /// # Errors
    ///
    /// Returns `Dns` if the primitive refuses to start the lookup.
    pub fn begin<D>(dns: &mut D, hostname: &str) -> Result<Self>
    where
        D: DnsPrimitive<Lookup = L>,
    {
        let lookup = dns.begin_lookup(hostname).map_err(|e| match e {
            TlsIoError::Dns(_) => e,
            other => TlsIoError::Dns(other.to_string()),
        })?;

        tracing::trace!(hostname, "dns lookup started");
        Ok(Self { hostname: hostname.to_string(), lookup })
    }

    /// Poll the lookup once.
    pub fn poll(&mut self) -> ResolvePoll {
        if !self.lookup.is_complete() {
            return ResolvePoll::Pending;
        }

        match self.lookup.result() {
            Some(addr) if !addr.is_unspecified() => ResolvePoll::Resolved(addr),
            _ => ResolvePoll::Failed,
        }
    }

    /// Hostname being resolved.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}
