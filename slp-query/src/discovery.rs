use std::collections::HashMap;
use anyhow::Result;
use shared::types::RawDiscoveryRecord;

/// The narrow surface this crate needs from an SLP user agent.
///
/// Every call may block on the network; timeouts and retries are the
/// implementation's business.
pub trait DiscoveryClient {
    /// Services of `service_type` registered in `scope`, in provider order.
    fn find_services(&self, service_type: &str, scope: &str) -> Result<Vec<RawDiscoveryRecord>>;

    /// Service types matching a naming-authority pattern ("*" for all).
    fn find_service_types(&self, pattern: &str, scope: &str) -> Result<Vec<String>>;

    /// Unicast attribute request for a single service instance.
    fn get_attributes(&self, url: &str, ip: &str) -> Result<HashMap<String, String>>;
}

impl<T: DiscoveryClient + ?Sized> DiscoveryClient for &T {
    fn find_services(&self, service_type: &str, scope: &str) -> Result<Vec<RawDiscoveryRecord>> {
        (**self).find_services(service_type, scope)
    }

    fn find_service_types(&self, pattern: &str, scope: &str) -> Result<Vec<String>> {
        (**self).find_service_types(pattern, scope)
    }

    fn get_attributes(&self, url: &str, ip: &str) -> Result<HashMap<String, String>> {
        (**self).get_attributes(url, ip)
    }
}

impl<T: DiscoveryClient + ?Sized> DiscoveryClient for std::sync::Arc<T> {
    fn find_services(&self, service_type: &str, scope: &str) -> Result<Vec<RawDiscoveryRecord>> {
        (**self).find_services(service_type, scope)
    }

    fn find_service_types(&self, pattern: &str, scope: &str) -> Result<Vec<String>> {
        (**self).find_service_types(pattern, scope)
    }

    fn get_attributes(&self, url: &str, ip: &str) -> Result<HashMap<String, String>> {
        (**self).get_attributes(url, ip)
    }
}
