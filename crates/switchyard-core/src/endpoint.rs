//! Endpoints and the endpoint registry.
//!
//! A service's base URL is only known after it has been deployed, so the
//! registry distinguishes between services that are merely declared and
//! services whose URL has been registered. Triggers may only point at the
//! latter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, TopologyError};

/// Reference from a trigger edge to a path on a logical service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointRef {
    /// Logical service name.
    pub service: String,
    /// Request path on the service.
    #[serde(default = "default_path")]
    pub path: String,
}

impl EndpointRef {
    pub fn new(service: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            path: path.into(),
        }
    }
}

fn default_path() -> String {
    "/".to_string()
}

/// A resolved endpoint: service, its base URL and the path to call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub logical_name: String,
    pub base_url: String,
    pub path: String,
}

impl Endpoint {
    /// Full URL the trigger calls.
    pub fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.path.is_empty() || self.path == "/" {
            return format!("{}/", base);
        }
        if self.path.starts_with('/') {
            format!("{}{}", base, self.path)
        } else {
            format!("{}/{}", base, self.path)
        }
    }

    /// OIDC audience for tokens minted for this endpoint: the origin of the
    /// base URL, without any path prefix.
    pub fn audience(&self) -> String {
        match url::Url::parse(&self.base_url) {
            Ok(parsed) => parsed.origin().ascii_serialization(),
            Err(_) => self.base_url.clone(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.logical_name, self.url())
    }
}

/// Mapping of logical service name to base URL.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    services: BTreeMap<String, Option<String>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a service whose URL is not known yet. No-op if already present.
    pub fn declare(&mut self, logical_name: impl Into<String>) {
        self.services.entry(logical_name.into()).or_insert(None);
    }

    /// Record the base URL produced by deploying a service.
    ///
    /// Registering an undeclared service declares it. A later registration
    /// replaces the earlier URL (redeploys can move a service).
    pub fn register(&mut self, logical_name: impl Into<String>, base_url: &str) -> Result<()> {
        let logical_name = logical_name.into();
        let normalized = normalize_base_url(&logical_name, base_url)?;
        tracing::debug!(service = %logical_name, url = %normalized, "Registered endpoint");
        self.services.insert(logical_name, Some(normalized));
        Ok(())
    }

    /// Base URL for a service, or [`TopologyError::UnresolvedEndpoint`].
    pub fn resolve(&self, logical_name: &str) -> Result<&str> {
        match self.services.get(logical_name) {
            Some(Some(url)) => Ok(url.as_str()),
            _ => Err(TopologyError::UnresolvedEndpoint {
                name: logical_name.to_string(),
            }),
        }
    }

    /// Resolve a trigger's destination into a full [`Endpoint`].
    pub fn endpoint(&self, target: &EndpointRef) -> Result<Endpoint> {
        let base_url = self.resolve(&target.service)?;
        Ok(Endpoint {
            logical_name: target.service.clone(),
            base_url: base_url.to_string(),
            path: target.path.clone(),
        })
    }

    pub fn is_declared(&self, logical_name: &str) -> bool {
        self.services.contains_key(logical_name)
    }

    /// All declared services with their URL, if known.
    pub fn services(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.services
            .iter()
            .map(|(name, url)| (name.as_str(), url.as_deref()))
    }

    /// Services that are declared but have no URL yet.
    pub fn unresolved(&self) -> impl Iterator<Item = &str> {
        self.services
            .iter()
            .filter(|(_, url)| url.is_none())
            .map(|(name, _)| name.as_str())
    }
}

fn normalize_base_url(name: &str, base_url: &str) -> Result<String> {
    let invalid = |reason: String| TopologyError::InvalidUrl {
        name: name.to_string(),
        url: base_url.to_string(),
        reason,
    };

    let parsed = url::Url::parse(base_url.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid("base URL must not carry a query or fragment".to_string()));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_service_is_unresolved_until_registered() {
        let mut registry = EndpointRegistry::new();
        registry.declare("scout-service");

        assert!(registry.is_declared("scout-service"));
        assert!(matches!(
            registry.resolve("scout-service"),
            Err(TopologyError::UnresolvedEndpoint { .. })
        ));

        registry
            .register("scout-service", "https://scout.example.run/")
            .unwrap();
        assert_eq!(
            registry.resolve("scout-service").unwrap(),
            "https://scout.example.run"
        );
        assert_eq!(registry.unresolved().count(), 0);
    }

    #[test]
    fn test_unknown_service_is_unresolved() {
        let registry = EndpointRegistry::new();
        assert_eq!(
            registry.resolve("reminder-service").unwrap_err(),
            TopologyError::UnresolvedEndpoint {
                name: "reminder-service".to_string()
            }
        );
    }

    #[test]
    fn test_register_rejects_bad_urls() {
        let mut registry = EndpointRegistry::new();
        assert!(matches!(
            registry.register("a", "not a url"),
            Err(TopologyError::InvalidUrl { .. })
        ));
        assert!(matches!(
            registry.register("a", "ftp://files.example.com"),
            Err(TopologyError::InvalidUrl { .. })
        ));
        assert!(matches!(
            registry.register("a", "https://scout.example.run/?q=1"),
            Err(TopologyError::InvalidUrl { .. })
        ));
        assert!(matches!(
            registry.register("a", "https://scout.example.run#top"),
            Err(TopologyError::InvalidUrl { .. })
        ));
        assert!(!registry.is_declared("a"));
    }

    #[test]
    fn test_audience_is_service_origin() {
        let mut registry = EndpointRegistry::new();
        registry
            .register("gateway", "https://gw.example.run:8443/api/")
            .unwrap();

        let endpoint = registry
            .endpoint(&EndpointRef::new("gateway", "/scout"))
            .unwrap();
        assert_eq!(endpoint.url(), "https://gw.example.run:8443/api/scout");
        assert_eq!(endpoint.audience(), "https://gw.example.run:8443");
    }

    #[test]
    fn test_endpoint_url_joins_path() {
        let mut registry = EndpointRegistry::new();
        registry
            .register("scout-service", "https://scout.example.run")
            .unwrap();

        let endpoint = registry
            .endpoint(&EndpointRef::new(
                "scout-service",
                "/scout/process-user-fixtures",
            ))
            .unwrap();
        assert_eq!(
            endpoint.url(),
            "https://scout.example.run/scout/process-user-fixtures"
        );
        assert_eq!(endpoint.audience(), "https://scout.example.run");

        let root = registry
            .endpoint(&EndpointRef::new("scout-service", "health"))
            .unwrap();
        assert_eq!(root.url(), "https://scout.example.run/health");
    }
}
