use std::collections::BTreeMap;
use serde::Deserialize;
use shared::protocol::DEFAULT_SCOPE;

/// Options for a `find`/`all` query.
///
/// `scope` and `protocol` shape the discovery request; every other key is a
/// match criterion tested against the discovered records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QueryParams {
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub criteria: BTreeMap<String, String>,
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn criterion(mut self, key: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.criteria.insert(key.into(), pattern.into());
        self
    }

    /// Lift the reserved `scope` and `protocol` keys (with or without a
    /// leading ':') out of a flat map; the rest become criteria.
    pub fn from_map<K, V>(map: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = QueryParams::new();
        for (key, value) in map {
            let key = key.as_ref();
            match key.strip_prefix(':').unwrap_or(key) {
                "scope" => params.scope = value.into(),
                "protocol" => params.protocol = Some(value.into()),
                other => {
                    params.criteria.insert(other.to_string(), value.into());
                }
            }
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let params = QueryParams::new();
        assert_eq!(params.scope, "");
        assert!(params.protocol.is_none());
        assert!(params.criteria.is_empty());
    }

    #[test]
    fn test_builder() {
        let params = QueryParams::new()
            .scope("lab")
            .protocol("lpr")
            .criterion("location", "3rd");
        assert_eq!(params.scope, "lab");
        assert_eq!(params.protocol.as_deref(), Some("lpr"));
        assert_eq!(params.criteria.get("location").map(String::as_str), Some("3rd"));
    }

    #[test]
    fn test_from_map_lifts_reserved_keys() {
        let map = HashMap::from([
            (":scope", "lab"),
            ("protocol", "lpr"),
            ("description", "Main"),
            (":host", "dir"),
        ]);
        let params = QueryParams::from_map(map);
        assert_eq!(params.scope, "lab");
        assert_eq!(params.protocol.as_deref(), Some("lpr"));
        assert_eq!(params.criteria.len(), 2);
        assert_eq!(params.criteria.get("description").map(String::as_str), Some("Main"));
        assert_eq!(params.criteria.get("host").map(String::as_str), Some("dir"));
    }
}
