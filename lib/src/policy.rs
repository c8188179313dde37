//! Outbound access control.

use crate::error::Error;

/// Allow-lists consulted before any outgoing request touches the network.
///
/// Each dimension is independent. An empty list permits every value for that dimension; a
/// non-empty list permits exact, case-sensitive matches only. Hosts are compared against the
/// request's authority verbatim, so an entry must spell out `host:port`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Policy {
    allowed_hosts: Vec<String>,
    allowed_methods: Vec<String>,
}

impl Policy {
    /// A policy that permits every host and method.
    pub fn permit_all() -> Self {
        Self::default()
    }

    pub fn new(allowed_hosts: Vec<String>, allowed_methods: Vec<String>) -> Self {
        Self {
            allowed_hosts,
            allowed_methods,
        }
    }

    /// Set the host allow-list.
    pub fn with_allowed_hosts(self, allowed_hosts: Vec<String>) -> Self {
        Self {
            allowed_hosts,
            ..self
        }
    }

    /// Set the method allow-list.
    pub fn with_allowed_methods(self, allowed_methods: Vec<String>) -> Self {
        Self {
            allowed_methods,
            ..self
        }
    }

    pub fn allowed_hosts(&self) -> &[String] {
        &self.allowed_hosts
    }

    pub fn allowed_methods(&self) -> &[String] {
        &self.allowed_methods
    }

    pub fn is_method_allowed(&self, method: &str) -> bool {
        self.allowed_methods.is_empty() || self.allowed_methods.iter().any(|m| m == method)
    }

    pub fn is_host_allowed(&self, authority: &str) -> bool {
        self.allowed_hosts.is_empty() || self.allowed_hosts.iter().any(|h| h == authority)
    }

    /// Check both dimensions for an outgoing request, method first.
    pub fn check(&self, method: &str, authority: &str) -> Result<(), Error> {
        if !self.is_method_allowed(method) {
            return Err(Error::PolicyRefused {
                what: "method",
                value: method.to_owned(),
            });
        }
        if !self.is_host_allowed(authority) {
            return Err(Error::PolicyRefused {
                what: "host",
                value: authority.to_owned(),
            });
        }
        Ok(())
    }
}
