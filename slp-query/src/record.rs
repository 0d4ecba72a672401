use std::collections::BTreeMap;
use chrono::Utc;
use shared::types::{Attributes, RawDiscoveryRecord, ServiceRecord};
use crate::discovery::DiscoveryClient;
use crate::dns::DnsReverseCache;
use crate::error::{Result, SlpError};
use crate::service_type;

/// Build a `ServiceRecord` from one raw reply.
///
/// Resolves the host name and fetches attributes for every record, matched
/// or not: attributes have to be present before criteria can be checked.
pub fn construct(
    name: &str,
    raw: &RawDiscoveryRecord,
    match_params: &BTreeMap<String, String>,
    dns: &DnsReverseCache,
    client: &impl DiscoveryClient,
) -> Result<ServiceRecord> {
    let protocol = service_type::protocol_of(&raw.srv_type).to_string();
    let host = dns.resolve(&raw.ip)?;
    let mut fetched: Vec<(String, String)> = client
        .get_attributes(&raw.srv_url, &raw.ip)
        .map_err(|e| SlpError::discovery("get_attributes", e))?
        .into_iter()
        .collect();
    fetched.sort();

    let mut attributes = Attributes::new();
    for (key, value) in fetched {
        if !attributes.insert(&key, value) {
            tracing::debug!("Ignoring duplicate attribute {} on {}", key, raw.srv_url);
        }
    }

    Ok(ServiceRecord {
        name: name.to_string(),
        ip: raw.ip.clone(),
        port: raw.port,
        protocol,
        slp_type: raw.srv_type.clone(),
        slp_url: raw.srv_url.clone(),
        host,
        lifetime: raw.lifetime,
        attributes,
        match_params: match_params.clone(),
        discovered_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::tests::CountingResolver;
    use crate::memory::MemoryDiscovery;
    use crate::service_url::raw_record;

    #[test]
    fn test_construct_decorates_raw_record() {
        let discovery = MemoryDiscovery::new().with_service(
            "service:printer:lpr://10.0.0.5:515/queue",
            &[("Location", "3rd floor")],
        );
        let raw = raw_record("service:printer:lpr://10.0.0.5:515/queue", 65535).unwrap();
        let dns = DnsReverseCache::with_resolver(CountingResolver::default());
        let params = BTreeMap::from([("location".to_string(), "3rd".to_string())]);

        let record = construct("printer", &raw, &params, &dns, &discovery).unwrap();

        assert_eq!(record.name, "printer");
        assert_eq!(record.ip, "10.0.0.5");
        assert_eq!(record.port, 515);
        assert_eq!(record.protocol, "lpr");
        assert_eq!(record.slp_type, "service:printer:lpr");
        assert_eq!(record.host, "host-10-0-0-5.test");
        assert_eq!(record.attributes.get("location"), Some("3rd floor"));
        assert_eq!(record.match_params, params);
        assert_eq!(discovery.attribute_fetches(), vec!["10.0.0.5"]);
    }

    #[test]
    fn test_construct_resolves_colliding_attribute_keys() {
        let url = "service:printer:lpr://10.0.0.5:515/queue";
        let discovery =
            MemoryDiscovery::new().with_service(url, &[("color", "false"), ("Color", "true")]);
        let raw = raw_record(url, 65535).unwrap();
        let dns = DnsReverseCache::with_resolver(CountingResolver::default());

        let record = construct("printer", &raw, &BTreeMap::new(), &dns, &discovery).unwrap();

        assert_eq!(record.attributes.len(), 1);
        assert_eq!(record.attributes.get("color"), Some("true"));
    }

    #[test]
    fn test_construct_fails_on_attribute_error() {
        let discovery = MemoryDiscovery::new()
            .with_service("service:ldap://10.0.0.1:389", &[])
            .failing_attributes();
        let raw = raw_record("service:ldap://10.0.0.1:389", 65535).unwrap();
        let dns = DnsReverseCache::with_resolver(CountingResolver::default());

        match construct("ldap", &raw, &BTreeMap::new(), &dns, &discovery) {
            Err(SlpError::Discovery { operation, .. }) => assert_eq!(operation, "get_attributes"),
            other => panic!("expected Discovery error, got {:?}", other),
        }
    }

    #[test]
    fn test_dns_failure_skips_attribute_fetch() {
        let discovery = MemoryDiscovery::new().with_service("service:ldap://10.0.0.9:389", &[]);
        let raw = raw_record("service:ldap://10.0.0.9:389", 65535).unwrap();
        let dns = DnsReverseCache::with_resolver(CountingResolver {
            failing: vec!["10.0.0.9".parse().unwrap()],
            ..Default::default()
        });

        assert!(matches!(
            construct("ldap", &raw, &BTreeMap::new(), &dns, &discovery),
            Err(SlpError::DnsResolutionFailure { .. })
        ));
        assert!(discovery.attribute_fetches().is_empty());
    }
}
