//! Query entry point: build the type, discover, decorate, filter.

use std::sync::Arc;
use serde::Deserialize;
use shared::protocol::{ALL_TYPES_PATTERN, DEFAULT_SCOPE};
use shared::types::{RawDiscoveryRecord, ServiceRecord, TypeDescriptor};
use crate::discovery::DiscoveryClient;
use crate::dns::DnsReverseCache;
use crate::error::{Result, SlpError};
use crate::matcher::Matcher;
use crate::params::QueryParams;
use crate::{record, service_type};

/// What to do when a discovered address has no reverse-DNS name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsFailurePolicy {
    /// Fail the whole query
    #[default]
    Abort,
    /// Drop the record and keep going
    Skip,
}

impl DnsFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsFailurePolicy::Abort => "abort",
            DnsFailurePolicy::Skip => "skip",
        }
    }
}

pub struct SlpServices<C> {
    client: C,
    dns: Arc<DnsReverseCache>,
    dns_policy: DnsFailurePolicy,
}

impl<C: DiscoveryClient> SlpServices<C> {
    pub fn new(client: C, dns: Arc<DnsReverseCache>) -> Self {
        Self {
            client,
            dns,
            dns_policy: DnsFailurePolicy::default(),
        }
    }

    pub fn with_dns_failure_policy(mut self, policy: DnsFailurePolicy) -> Self {
        self.dns_policy = policy;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn dns_cache(&self) -> &Arc<DnsReverseCache> {
        &self.dns
    }

    /// First record, in discovery order, that satisfies every criterion.
    /// Records after the match are never decorated.
    pub fn find(&self, service_name: &str, params: &QueryParams) -> Result<Option<ServiceRecord>> {
        let matcher = Matcher::compile(&params.criteria)?;
        for raw in self.discover(service_name, params)? {
            if let Some(record) = self.consider(service_name, &raw, params, &matcher)? {
                tracing::info!("Found {} at {}", service_name, record.slp_url);
                return Ok(Some(record));
            }
        }
        tracing::info!("No {} service matched", service_name);
        Ok(None)
    }

    /// Every record that satisfies every criterion, in discovery order.
    pub fn all(&self, service_name: &str, params: &QueryParams) -> Result<Vec<ServiceRecord>> {
        let matcher = Matcher::compile(&params.criteria)?;
        let raws = self.discover(service_name, params)?;
        let considered = raws.len();

        let mut records = Vec::new();
        for raw in &raws {
            if let Some(record) = self.consider(service_name, raw, params, &matcher)? {
                records.push(record);
            }
        }

        tracing::info!(
            "{} of {} {} services matched",
            records.len(),
            considered,
            service_name
        );
        Ok(records)
    }

    /// Every service type known to the provider.
    pub fn types(&self) -> Result<Vec<TypeDescriptor>> {
        self.client
            .find_service_types(ALL_TYPES_PATTERN, DEFAULT_SCOPE)
            .map_err(|e| SlpError::discovery("find_service_types", e))?
            .iter()
            .map(|t| service_type::parse(t))
            .collect()
    }

    fn discover(&self, service_name: &str, params: &QueryParams) -> Result<Vec<RawDiscoveryRecord>> {
        let service_type = service_type::build(service_name, params.protocol.as_deref());
        tracing::debug!("Finding {} in scope '{}'", service_type, params.scope);

        self.client
            .find_services(&service_type, &params.scope)
            .map_err(|e| SlpError::discovery("find_services", e))
    }

    fn consider(
        &self,
        service_name: &str,
        raw: &RawDiscoveryRecord,
        params: &QueryParams,
        matcher: &Matcher,
    ) -> Result<Option<ServiceRecord>> {
        let record = match record::construct(service_name, raw, &params.criteria, &self.dns, &self.client) {
            Ok(record) => record,
            Err(e @ SlpError::DnsResolutionFailure { .. })
                if self.dns_policy == DnsFailurePolicy::Skip =>
            {
                tracing::warn!("Skipping {}: {}", raw.srv_url, e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let verified = matcher.verify(&record);
        tracing::debug!("Considered {} (matched: {})", record.slp_url, verified);
        Ok(verified.then_some(record))
    }
}
