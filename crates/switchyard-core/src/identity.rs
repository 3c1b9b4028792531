//! Identities and the identity registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, TopologyError};

/// Kind of principal backing an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// A service account (the only kind that can authenticate trigger calls).
    #[default]
    ServiceAccount,
    /// A human user account.
    User,
}

impl PrincipalKind {
    /// IAM member prefix for this kind.
    pub fn member_prefix(self) -> &'static str {
        match self {
            PrincipalKind::ServiceAccount => "serviceAccount",
            PrincipalKind::User => "user",
        }
    }
}

/// A named identity that trigger edges present when calling an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Logical name used by trigger configuration.
    pub name: String,
    /// Backing credential reference, e.g. `invoker@project.iam.gserviceaccount.com`.
    pub principal: String,
    #[serde(default)]
    pub kind: PrincipalKind,
}

impl Identity {
    pub fn new(name: impl Into<String>, principal: impl Into<String>, kind: PrincipalKind) -> Self {
        Self {
            name: name.into(),
            principal: principal.into(),
            kind,
        }
    }

    /// Shorthand for a service-account identity.
    pub fn service_account(name: impl Into<String>, principal: impl Into<String>) -> Self {
        Self::new(name, principal, PrincipalKind::ServiceAccount)
    }

    /// IAM member string, e.g. `serviceAccount:invoker@project.iam.gserviceaccount.com`.
    pub fn member(&self) -> String {
        format!("{}:{}", self.kind.member_prefix(), self.principal)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.member())
    }
}

/// Mapping of logical identity name to its backing principal.
///
/// Populated once while loading configuration and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct IdentityRegistry {
    identities: BTreeMap<String, Identity>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity. Names are unique.
    pub fn insert(&mut self, identity: Identity) -> Result<()> {
        if self.identities.contains_key(&identity.name) {
            return Err(TopologyError::DuplicateIdentity {
                name: identity.name,
            });
        }
        self.identities.insert(identity.name.clone(), identity);
        Ok(())
    }

    /// Look up an identity by logical name.
    pub fn resolve(&self, name: &str) -> Result<&Identity> {
        self.identities
            .get(name)
            .ok_or_else(|| TopologyError::UnknownIdentity {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.identities.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl FromIterator<Identity> for IdentityRegistry {
    /// Later duplicates replace earlier ones; use [`IdentityRegistry::insert`] to reject them.
    fn from_iter<T: IntoIterator<Item = Identity>>(iter: T) -> Self {
        Self {
            identities: iter
                .into_iter()
                .map(|identity| (identity.name.clone(), identity))
                .collect(),
        }
    }
}
