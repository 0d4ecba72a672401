use thiserror::Error;

pub type Result<T> = std::result::Result<T, SlpError>;

#[derive(Debug, Error)]
pub enum SlpError {
    /// A discovered service type has neither 2 nor 3 segments
    #[error("Malformed service type '{value}': expected service:name or service:name:protocol")]
    MalformedServiceType { value: String },

    #[error("Malformed service URL '{url}': {reason}")]
    MalformedServiceUrl { url: String, reason: String },

    /// Reverse lookup failed. Never cached.
    #[error("Failed to resolve host name for {ip}: {source}")]
    DnsResolutionFailure {
        ip: String,
        #[source]
        source: std::io::Error,
    },

    /// The discovery provider failed; no retry happens at this layer
    #[error("Discovery provider failed during {operation}: {source}")]
    Discovery {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid match pattern for '{key}': {source}")]
    InvalidPattern {
        key: String,
        #[source]
        source: regex::Error,
    },
}

impl SlpError {
    pub(crate) fn discovery(operation: &'static str, source: anyhow::Error) -> Self {
        SlpError::Discovery { operation, source }
    }
}
