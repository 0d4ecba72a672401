/// Scheme prefix of every SLP service type (RFC 2608 §4.1)
pub const SERVICE_SCHEME: &str = "service";

/// Separator between service type segments
pub const TYPE_DELIMITER: char = ':';

/// Naming-authority pattern that enumerates every service type
pub const ALL_TYPES_PATTERN: &str = "*";

/// Scope used when the caller does not name one
pub const DEFAULT_SCOPE: &str = "";

/// Record fields that can be matched directly, checked before attributes
pub const INTRINSIC_FIELDS: [&str; 8] = [
    "name", "ip", "host", "protocol", "port", "slp_type", "slp_url", "lifetime",
];

/// mDNS service type for daemon self-advertisement
pub const DAEMON_SERVICE_TYPE: &str = "_slp-query._tcp.local.";

/// TXT record keys used in daemon self-advertisement
pub const TXT_API: &str = "api";
pub const TXT_WATCHES: &str = "watches";
pub const TXT_WATCH_COUNT: &str = "watch_count";
pub const TXT_DNS_POLICY: &str = "dns_policy";

/// API path prefix
pub const API_PREFIX: &str = "/v1";
