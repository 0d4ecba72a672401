//! Reverse-DNS lookups, remembered for the life of the cache.

use std::collections::HashMap;
use std::net::IpAddr;
use parking_lot::Mutex;
use crate::error::{Result, SlpError};

/// The `ip -> hostname` primitive the cache sits in front of.
pub trait ReverseResolver: Send + Sync {
    fn reverse(&self, ip: IpAddr) -> std::io::Result<String>;
}

/// Resolves through the system resolver (getnameinfo).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl ReverseResolver for SystemResolver {
    fn reverse(&self, ip: IpAddr) -> std::io::Result<String> {
        dns_lookup::lookup_addr(&ip)
    }
}

/// Unbounded `ip -> hostname` cache. Entries are never evicted and
/// failures are never stored, so an unresolvable address is retried on
/// every call.
pub struct DnsReverseCache {
    resolver: Box<dyn ReverseResolver>,
    entries: Mutex<HashMap<String, String>>,
}

impl DnsReverseCache {
    pub fn new() -> Self {
        Self::with_resolver(SystemResolver)
    }

    pub fn with_resolver(resolver: impl ReverseResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, ip: &str) -> Result<String> {
        if let Some(host) = self.entries.lock().get(ip) {
            return Ok(host.clone());
        }

        // Lock is not held across the lookup; two callers racing on the
        // same address both resolve and the last insert wins.
        let addr: IpAddr = ip.parse().map_err(|e| SlpError::DnsResolutionFailure {
            ip: ip.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        })?;
        let host = self
            .resolver
            .reverse(addr)
            .map_err(|source| SlpError::DnsResolutionFailure {
                ip: ip.to_string(),
                source,
            })?;

        tracing::debug!("Resolved {} to {}", ip, host);
        self.entries.lock().insert(ip.to_string(), host.clone());
        Ok(host)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for DnsReverseCache {
    fn default() -> Self {
        Self::new()
    }
}
