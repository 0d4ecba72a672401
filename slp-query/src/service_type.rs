//! Building and parsing SLP service-type strings (RFC 2608 §4.1).

use std::fmt;
use std::str::FromStr;
use shared::protocol::{SERVICE_SCHEME, TYPE_DELIMITER};
use shared::types::TypeDescriptor;
use crate::error::{Result, SlpError};

/// A service type to query for.
///
/// Serializes as `service:name` (abstract) or `service:name:protocol`
/// (concrete). A protocol equal to the name, or empty, collapses to the
/// abstract form; the provider finds nothing for `service:ldap:ldap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTypeId {
    name: String,
    protocol: Option<String>,
}

impl ServiceTypeId {
    pub fn new(name: impl Into<String>, protocol: Option<&str>) -> Self {
        let name = name.into();
        let protocol = protocol
            .filter(|p| !p.is_empty() && *p != name)
            .map(str::to_string);
        Self { name, protocol }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// None for an abstract type
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn is_abstract(&self) -> bool {
        self.protocol.is_none()
    }
}

impl fmt::Display for ServiceTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.protocol {
            Some(protocol) => write!(
                f,
                "{SERVICE_SCHEME}{TYPE_DELIMITER}{}{TYPE_DELIMITER}{protocol}",
                self.name
            ),
            None => write!(f, "{SERVICE_SCHEME}{TYPE_DELIMITER}{}", self.name),
        }
    }
}

/// Service type string for `service_name`, optionally qualified by `protocol`.
pub fn build(service_name: &str, protocol: Option<&str>) -> String {
    ServiceTypeId::new(service_name, protocol).to_string()
}

/// Split a discovered service type into name and protocol.
///
/// Anything other than 2 or 3 segments means the provider handed back
/// something that is not an RFC 2608 service type.
pub fn parse(service_type: &str) -> Result<TypeDescriptor> {
    let segments: Vec<&str> = service_type.split(TYPE_DELIMITER).collect();
    match segments.as_slice() {
        [_, name] => Ok(TypeDescriptor {
            name: name.to_string(),
            protocol: name.to_string(),
        }),
        [_, name, protocol] => Ok(TypeDescriptor {
            name: name.to_string(),
            protocol: protocol.to_string(),
        }),
        _ => Err(SlpError::MalformedServiceType {
            value: service_type.to_string(),
        }),
    }
}

/// Final segment of a service type: "service:printer:lpr" -> "lpr".
pub fn protocol_of(service_type: &str) -> &str {
    service_type
        .rsplit_once(TYPE_DELIMITER)
        .map(|(_, last)| last)
        .unwrap_or(service_type)
}

impl FromStr for ServiceTypeId {
    type Err = SlpError;

    fn from_str(s: &str) -> Result<Self> {
        let descriptor = parse(s)?;
        Ok(ServiceTypeId::new(descriptor.name, Some(descriptor.protocol.as_str())))
    }
}
