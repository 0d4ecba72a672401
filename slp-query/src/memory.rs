//! In-memory `DiscoveryClient` with a fixed set of registrations.
//!
//! Records every request it serves, so callers can check which services
//! were asked for and which instances had their attributes fetched.

use std::collections::HashMap;
use anyhow::{bail, Result};
use parking_lot::Mutex;
use shared::protocol::ALL_TYPES_PATTERN;
use shared::types::RawDiscoveryRecord;
use crate::discovery::DiscoveryClient;
use crate::service_url;

/// Lifetime given to registrations that don't name one
pub const DEFAULT_LIFETIME: u16 = 65535;

#[derive(Debug, Clone)]
struct Registration {
    url: String,
    scope: String,
    lifetime: u16,
    attributes: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct MemoryDiscovery {
    registrations: Vec<Registration>,
    extra_types: Vec<String>,
    fail_services: bool,
    fail_attributes: bool,
    service_queries: Mutex<Vec<(String, String)>>,
    attribute_fetches: Mutex<Vec<String>>,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service in the default scope.
    pub fn with_service(self, url: &str, attributes: &[(&str, &str)]) -> Self {
        self.with_scoped_service("", url, attributes)
    }

    pub fn with_scoped_service(mut self, scope: &str, url: &str, attributes: &[(&str, &str)]) -> Self {
        self.registrations.push(Registration {
            url: url.to_string(),
            scope: scope.to_string(),
            lifetime: DEFAULT_LIFETIME,
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        self
    }

    /// Report a service type with no registrations behind it.
    pub fn with_type(mut self, service_type: &str) -> Self {
        self.extra_types.push(service_type.to_string());
        self
    }

    /// Make every `find_services` call fail.
    pub fn failing_services(mut self) -> Self {
        self.fail_services = true;
        self
    }

    /// Make every `get_attributes` call fail.
    pub fn failing_attributes(mut self) -> Self {
        self.fail_attributes = true;
        self
    }

    /// `(service_type, scope)` of every `find_services` call so far
    pub fn service_queries(&self) -> Vec<(String, String)> {
        self.service_queries.lock().clone()
    }

    /// Address of every `get_attributes` call so far, in call order
    pub fn attribute_fetches(&self) -> Vec<String> {
        self.attribute_fetches.lock().clone()
    }

    fn in_scope(registration: &Registration, scope: &str) -> bool {
        scope.is_empty() || registration.scope == scope
    }
}

/// An abstract query ("service:printer") also finds its concrete types.
fn type_matches(registered: &str, requested: &str) -> bool {
    registered == requested
        || registered
            .strip_prefix(requested)
            .is_some_and(|rest| rest.starts_with(':'))
}

/// `*` matches everything, `""` matches IANA types (no naming authority),
/// anything else matches types registered under that authority.
fn authority_matches(service_type: &str, pattern: &str) -> bool {
    let name = service_type.split(':').nth(1).unwrap_or_default();
    match pattern {
        ALL_TYPES_PATTERN => true,
        "" => !name.contains('.'),
        authority => name
            .rsplit_once('.')
            .is_some_and(|(_, na)| na.eq_ignore_ascii_case(authority)),
    }
}

impl DiscoveryClient for MemoryDiscovery {
    fn find_services(&self, service_type: &str, scope: &str) -> Result<Vec<RawDiscoveryRecord>> {
        self.service_queries
            .lock()
            .push((service_type.to_string(), scope.to_string()));
        if self.fail_services {
            bail!("service request for {} failed", service_type);
        }

        let mut records = Vec::new();
        for registration in self.registrations.iter().filter(|r| Self::in_scope(r, scope)) {
            let raw = service_url::raw_record(&registration.url, registration.lifetime)?;
            if type_matches(&raw.srv_type, service_type) {
                records.push(raw);
            }
        }
        Ok(records)
    }

    fn find_service_types(&self, pattern: &str, scope: &str) -> Result<Vec<String>> {
        let mut types: Vec<String> = Vec::new();
        let registered = self
            .registrations
            .iter()
            .filter(|r| Self::in_scope(r, scope))
            .filter_map(|r| r.url.split_once("://").map(|(t, _)| t.to_string()));

        for service_type in registered.chain(self.extra_types.iter().cloned()) {
            if authority_matches(&service_type, pattern) && !types.contains(&service_type) {
                types.push(service_type);
            }
        }
        Ok(types)
    }

    fn get_attributes(&self, url: &str, ip: &str) -> Result<HashMap<String, String>> {
        self.attribute_fetches.lock().push(ip.to_string());
        if self.fail_attributes {
            bail!("attribute request for {} failed", url);
        }

        Ok(self
            .registrations
            .iter()
            .find(|r| r.url == url)
            .map(|r| r.attributes.clone())
            .unwrap_or_default())
    }
}
