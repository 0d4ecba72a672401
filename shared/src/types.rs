use std::borrow::Cow;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// One service reply as handed back by the discovery provider.
/// Read-only input to record construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDiscoveryRecord {
    /// Address of the service, as text ("10.0.0.1", "fe80::1")
    pub ip: String,

    /// Service port, 0 when the URL carries none
    pub port: u16,

    /// Service type, e.g. "service:printer:lpr"
    pub srv_type: String,

    /// Full service URL, e.g. "service:printer:lpr://10.0.0.1:515/queue"
    pub srv_url: String,

    /// Registration lifetime in seconds
    pub lifetime: u16,
}

/// Protocol-specific attributes of a service instance.
///
/// Keys are lower-cased on the way in so lookups are case-insensitive no
/// matter how the provider spelled them. When two spellings of one key
/// arrive, the first value inserted is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>")]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false, leaving the stored value alone, if the key is
    /// already present under any spelling.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) -> bool {
        match self.0.entry(key.as_ref().to_lowercase()) {
            Entry::Vacant(slot) => {
                slot.insert(value.into());
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(&key.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

impl From<BTreeMap<String, String>> for Attributes {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

/// Entries are taken in key order, so colliding spellings resolve the
/// same way on every run ("Color" before "color").
impl From<HashMap<String, String>> for Attributes {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect::<BTreeMap<_, _>>().into()
    }
}

/// A discovered service, decorated with its resolved host and attributes.
/// Built once per raw record during a query and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Service name the query was made for, e.g. "ldap"
    pub name: String,

    pub ip: String,

    pub port: u16,

    /// Final segment of `slp_type`
    pub protocol: String,

    pub slp_type: String,

    pub slp_url: String,

    /// Reverse-DNS name of `ip`
    pub host: String,

    /// Registration lifetime in seconds
    pub lifetime: u16,

    pub attributes: Attributes,

    /// Residual filter criteria the record was checked against
    pub match_params: BTreeMap<String, String>,

    /// When the record was built
    pub discovered_at: DateTime<Utc>,
}

impl ServiceRecord {
    /// String value of an intrinsic field, or None if `key` names none.
    pub fn intrinsic(&self, key: &str) -> Option<Cow<'_, str>> {
        let value = match key {
            "name" => Cow::Borrowed(self.name.as_str()),
            "ip" => Cow::Borrowed(self.ip.as_str()),
            "host" => Cow::Borrowed(self.host.as_str()),
            "protocol" => Cow::Borrowed(self.protocol.as_str()),
            "port" => Cow::Owned(self.port.to_string()),
            "slp_type" => Cow::Borrowed(self.slp_type.as_str()),
            "slp_url" => Cow::Borrowed(self.slp_url.as_str()),
            "lifetime" => Cow::Owned(self.lifetime.to_string()),
            _ => return None,
        };
        Some(value)
    }
}

/// A record kept by a standing query, with its observation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedRecord {
    /// Name of the watch that found it
    pub watch: String,

    pub record: ServiceRecord,

    /// First time the watch returned this service URL
    pub first_seen: DateTime<Utc>,

    /// Last time the watch returned this service URL
    pub last_seen: DateTime<Utc>,

    /// False once the watch stops returning it
    pub alive: bool,
}

/// A service type as enumerated by the provider, split into its parts.
/// For an abstract type ("service:ldap") name and protocol are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub protocol: String,
}
