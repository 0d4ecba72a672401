//! Case-insensitive pattern filtering of service records.

use std::collections::BTreeMap;
use regex::{Regex, RegexBuilder};
use shared::types::ServiceRecord;
use crate::error::{Result, SlpError};

/// Compiled match criteria.
///
/// Each criterion is a key and a pattern. A record passes when, for every
/// criterion, the pattern is found somewhere in the value the key names:
/// an intrinsic field first, then an attribute. Keys naming neither are
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    criteria: Vec<(String, Regex)>,
}

impl Matcher {
    pub fn compile(criteria: &BTreeMap<String, String>) -> Result<Self> {
        let criteria = criteria
            .iter()
            .map(|(key, pattern)| -> Result<(String, Regex)> {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| SlpError::InvalidPattern {
                        key: key.clone(),
                        source,
                    })?;
                Ok((key.to_lowercase(), regex))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { criteria })
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn verify(&self, record: &ServiceRecord) -> bool {
        self.criteria.iter().all(|(key, regex)| {
            if let Some(value) = record.intrinsic(key) {
                regex.is_match(&value)
            } else if let Some(value) = record.attributes.get(key) {
                regex.is_match(value)
            } else {
                tracing::trace!("Ignoring unknown match key '{}'", key);
                true
            }
        })
    }
}

/// Check `record` against its own `match_params`.
pub fn verify(record: &ServiceRecord) -> Result<bool> {
    Ok(Matcher::compile(&record.match_params)?.verify(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::types::Attributes;

    fn test_record() -> ServiceRecord {
        ServiceRecord {
            name: "ldap".to_string(),
            ip: "10.0.0.2".to_string(),
            port: 389,
            protocol: "ldap".to_string(),
            slp_type: "service:ldap".to_string(),
            slp_url: "service:ldap://10.0.0.2:389".to_string(),
            host: "dir.example.org".to_string(),
            lifetime: 10800,
            attributes: Attributes::from_iter([
                ("Description", "Main LDAP server"),
                ("name", "shadowed"),
            ]),
            match_params: BTreeMap::new(),
            discovered_at: Utc::now(),
        }
    }

    fn matcher(pairs: &[(&str, &str)]) -> Matcher {
        let criteria = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Matcher::compile(&criteria).unwrap()
    }

    #[test]
    fn test_intrinsic_match_is_case_insensitive() {
        assert!(matcher(&[("name", "LDAP")]).verify(&test_record()));
        assert!(matcher(&[("host", "EXAMPLE")]).verify(&test_record()));
    }

    #[test]
    fn test_attribute_match_is_substring() {
        assert!(matcher(&[("description", "Main")]).verify(&test_record()));
        assert!(matcher(&[("DESCRIPTION", "ldap serv")]).verify(&test_record()));
        assert!(!matcher(&[("description", "backup")]).verify(&test_record()));
    }

    #[test]
    fn test_numeric_fields_match_as_text() {
        assert!(matcher(&[("port", "^389$")]).verify(&test_record()));
        assert!(matcher(&[("lifetime", "108")]).verify(&test_record()));
        assert!(!matcher(&[("port", "^636$")]).verify(&test_record()));
    }

    #[test]
    fn test_unknown_key_is_vacuously_true() {
        assert!(matcher(&[("bogusKey", "x")]).verify(&test_record()));
        assert!(matcher(&[]).verify(&test_record()));
    }

    #[test]
    fn test_intrinsic_field_wins_over_attribute() {
        assert!(matcher(&[("name", "^ldap$")]).verify(&test_record()));
        assert!(!matcher(&[("name", "shadowed")]).verify(&test_record()));
    }

    #[test]
    fn test_all_criteria_must_hold() {
        assert!(matcher(&[("name", "ldap"), ("description", "main")]).verify(&test_record()));
        assert!(!matcher(&[("name", "ldap"), ("description", "backup")]).verify(&test_record()));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let criteria = BTreeMap::from([("description".to_string(), "(unclosed".to_string())]);
        match Matcher::compile(&criteria) {
            Err(SlpError::InvalidPattern { key, .. }) => assert_eq!(key, "description"),
            other => panic!("expected InvalidPattern, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_uses_record_match_params() {
        let mut record = test_record();
        record.match_params.insert("description".to_string(), "main".to_string());
        assert!(verify(&record).unwrap());
        record.match_params.insert("ip".to_string(), "10\\.0\\.0\\.1".to_string());
        assert!(!verify(&record).unwrap());
    }
}
