use std::collections::HashMap;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use anyhow::{Context, Result};
use shared::protocol::{
    API_PREFIX, DAEMON_SERVICE_TYPE, TXT_API, TXT_DNS_POLICY, TXT_WATCHES, TXT_WATCH_COUNT,
};
use slp_query::DnsFailurePolicy;
use crate::config::{AdvertiseConfig, WatchConfig};

/// A TXT string holds at most 255 bytes, key and '=' included.
const MAX_TXT_VALUE: usize = 200;

/// TXT payload describing what this daemon answers for. Watch names are
/// listed until they no longer fit; `watch_count` always has the total.
pub fn txt_properties(watches: &[WatchConfig], policy: DnsFailurePolicy) -> HashMap<String, String> {
    let mut names = String::new();
    let mut listed = 0;
    for watch in watches {
        let needed = watch.name.len() + usize::from(listed > 0);
        if names.len() + needed > MAX_TXT_VALUE {
            tracing::debug!("Advertising {} of {} watch names", listed, watches.len());
            break;
        }
        if listed > 0 {
            names.push(',');
        }
        names.push_str(&watch.name);
        listed += 1;
    }

    HashMap::from([
        (TXT_API.to_string(), API_PREFIX.to_string()),
        (TXT_WATCHES.to_string(), names),
        (TXT_WATCH_COUNT.to_string(), watches.len().to_string()),
        (TXT_DNS_POLICY.to_string(), policy.as_str().to_string()),
    ])
}

fn instance_name(config: &AdvertiseConfig, hostname: &str) -> String {
    config
        .instance
        .clone()
        .unwrap_or_else(|| format!("slp-query-{}", hostname))
}

pub fn register_daemon(
    daemon: &ServiceDaemon,
    config: &AdvertiseConfig,
    api_port: u16,
    properties: HashMap<String, String>,
) -> Result<ServiceInfo> {
    let hostname = hostname::get()
        .context("Failed to get system hostname")?
        .to_string_lossy()
        .to_string();
    let instance = instance_name(config, &hostname);

    let service_info = ServiceInfo::new(
        DAEMON_SERVICE_TYPE,
        &instance,
        &format!("{}.local.", hostname),
        config.address.as_str(),
        api_port,
        properties,
    )
    .context("Failed to create ServiceInfo")?;

    daemon
        .register(service_info.clone())
        .with_context(|| format!("Failed to register {} on mDNS", instance))?;

    tracing::info!("Advertising {} at {}:{}", instance, config.address, api_port);
    Ok(service_info)
}

pub fn unregister_daemon(daemon: &ServiceDaemon, service_info: &ServiceInfo) -> Result<()> {
    daemon
        .unregister(service_info.get_fullname())
        .context("Failed to unregister mDNS service")?;

    tracing::info!("Withdrew {}", service_info.get_fullname());
    Ok(())
}
