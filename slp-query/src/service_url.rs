//! SLP service URLs: `service:printer:lpr://10.0.0.1:515/queue`.

use shared::types::RawDiscoveryRecord;
use crate::error::{Result, SlpError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrl<'a> {
    pub srv_type: &'a str,
    /// Host part without IPv6 brackets
    pub host: &'a str,
    /// 0 when the URL names no port
    pub port: u16,
    pub path: &'a str,
}

impl<'a> ServiceUrl<'a> {
    pub fn parse(url: &'a str) -> Result<Self> {
        let malformed = |reason: &str| SlpError::MalformedServiceUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let (srv_type, rest) = url
            .split_once("://")
            .ok_or_else(|| malformed("missing '://'"))?;
        if srv_type.is_empty() {
            return Err(malformed("empty service type"));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        // Drop any user info
        let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| malformed("unterminated IPv6 literal"))?;
            let port = match after.strip_prefix(':') {
                Some(port) => Some(port),
                None if after.is_empty() => None,
                None => return Err(malformed("unexpected text after IPv6 literal")),
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(malformed("empty host"));
        }

        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|_| malformed("invalid port"))?,
            None => 0,
        };

        Ok(ServiceUrl { srv_type, host, port, path })
    }

    pub fn into_record(self, srv_url: &str, lifetime: u16) -> RawDiscoveryRecord {
        RawDiscoveryRecord {
            ip: self.host.to_string(),
            port: self.port,
            srv_type: self.srv_type.to_string(),
            srv_url: srv_url.to_string(),
            lifetime,
        }
    }
}

/// Raw record for a service URL as reported by the provider.
pub fn raw_record(url: &str, lifetime: u16) -> Result<RawDiscoveryRecord> {
    Ok(ServiceUrl::parse(url)?.into_record(url, lifetime))
}
