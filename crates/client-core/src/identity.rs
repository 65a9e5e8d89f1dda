//! Per-process fake identity
//!
//! A softphone advertises a made-up host in its Via headers and a made-up
//! address in its Contact headers. Both are generated once and shared by every
//! softphone in the process.

use std::fmt;

use uuid::Uuid;

/// Fake domain and contact address used in Via and Contact headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    domain: String,
    address: String,
}

impl Identity {
    /// `<uuid>.invalid` domain and `<uuid>@<domain>` address
    pub fn generate() -> Self {
        let domain = format!("{}.invalid", Uuid::new_v4());
        let address = format!("{}@{}", Uuid::new_v4(), domain);
        Self { domain, address }
    }

    pub fn new(domain: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            address: address.into(),
        }
    }

    /// Host part used in Via headers
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// `user@host` used in Contact headers
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}
