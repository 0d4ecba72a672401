//! Query and filter layer over an SLP (RFC 2608) user agent.
//!
//! The crate does not speak SLP itself. It builds service-type strings,
//! hands them to a [`DiscoveryClient`], decorates each reply with its
//! reverse-DNS name and attributes, and keeps the records whose fields or
//! attributes match the caller's patterns.
//!
//! ```no_run
//! use std::sync::Arc;
//! use slp_query::{DnsReverseCache, QueryParams, SlpServices, SlptoolClient};
//!
//! # fn main() -> slp_query::Result<()> {
//! let services = SlpServices::new(SlptoolClient::new(), Arc::new(DnsReverseCache::new()));
//!
//! let params = QueryParams::new().criterion("description", "main");
//! if let Some(ldap) = services.find("ldap", &params)? {
//!     println!("{} on {}:{}", ldap.slp_url, ldap.host, ldap.port);
//! }
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod dns;
pub mod error;
pub mod matcher;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod params;
pub mod record;
pub mod service_type;
pub mod service_url;
pub mod services;
pub mod slptool;

pub use discovery::DiscoveryClient;
pub use dns::{DnsReverseCache, ReverseResolver, SystemResolver};
pub use error::{Result, SlpError};
pub use matcher::Matcher;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryDiscovery;
pub use params::QueryParams;
pub use service_type::ServiceTypeId;
pub use services::{DnsFailurePolicy, SlpServices};
pub use slptool::SlptoolClient;
pub use shared::types::{Attributes, RawDiscoveryRecord, ServiceRecord, TypeDescriptor};
