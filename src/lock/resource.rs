//! Resource naming, tickets, and lock requests.

use std::fmt;

/// Prefix for per-release-domain build resources.
pub const BUILD_RESOURCE_PREFIX: &str = "build-";

/// Prefix for the repository-wide publish resource.
pub const PUBLISH_RESOURCE_PREFIX: &str = "publish-";

/// Character substituted for every non-alphanumeric character of a repository
/// identifier when deriving the global resource name.
pub const RESOURCE_SEPARATOR: char = '-';

/// A named serialization domain, scoped to a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    /// Resource name as known to the lock service.
    pub name: String,
    /// Repository identifier the resource is scoped to (e.g. `org/app`).
    pub repository: String,
}

impl Resource {
    pub fn new(name: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
        }
    }

    /// Per-release-domain build resource: `build-<release name>`.
    pub fn build(release_name: &str, repository: &str) -> Self {
        Self::new(format!("{}{}", BUILD_RESOURCE_PREFIX, release_name), repository)
    }

    /// Global publish resource derived from the repository identifier.
    pub fn publish(repository: &str) -> Self {
        Self::new(global_resource_name(repository), repository)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.repository)
    }
}

/// Derive the global publish lock name from a repository identifier.
///
/// Pure and deterministic: `org/app` becomes `publish-org-app`.
pub fn global_resource_name(repository: &str) -> String {
    let normalized: String = repository
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c
            } else {
                RESOURCE_SEPARATOR
            }
        })
        .collect();
    format!("{}{}", PUBLISH_RESOURCE_PREFIX, normalized)
}

/// Opaque identifier issued by the lock service on enqueue.
///
/// Only meaningful together with the resource it was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ticket(String);

impl Ticket {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input to `enqueue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub resource: Resource,
    /// Maximum hold duration before the service expires the lease.
    pub lease_seconds: u64,
}

impl LockRequest {
    pub fn new(resource: Resource, lease_seconds: u64) -> Self {
        Self {
            resource,
            lease_seconds,
        }
    }
}
