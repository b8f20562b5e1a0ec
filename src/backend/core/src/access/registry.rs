//! Resource type to policy table.

use std::collections::HashMap;
use tracing::warn;

use crate::access::policies;
use crate::access::policy::Policy;
use crate::error::{AccessError, Result};
use crate::rbac::models::ResourceType;

/// Static mapping from resource type to its policy.
///
/// Built once at startup, then shared read-only behind an `Arc`.
#[derive(Default)]
pub struct PolicyRegistry {
    policies: HashMap<ResourceType, Box<dyn Policy>>,
}

impl PolicyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in policy.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        policies::register_all(&mut registry);
        registry
    }

    /// Register (or replace) the policy for a type.
    pub fn register<P>(&mut self, kind: ResourceType, policy: P)
    where
        P: Policy + 'static,
    {
        if let Some(previous) = self.policies.insert(kind, Box::new(policy)) {
            warn!(
                resource_type = %kind,
                replaced = previous.name(),
                "Policy replaced in registry"
            );
        }
    }

    /// The policy for a type.
    pub fn resolve(&self, kind: ResourceType) -> Result<&dyn Policy> {
        self.policies
            .get(&kind)
            .map(|policy| &**policy)
            .ok_or_else(|| AccessError::unregistered(kind))
    }

    pub fn contains(&self, kind: ResourceType) -> bool {
        self.policies.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Registered types, sorted.
    pub fn kinds(&self) -> Vec<ResourceType> {
        let mut kinds: Vec<_> = self.policies.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    struct Nothing;

    impl Policy for Nothing {
        fn name(&self) -> &'static str {
            "nothing"
        }
    }

    #[test]
    fn test_standard_registry_covers_every_type() {
        let registry = PolicyRegistry::standard();
        for kind in ResourceType::ALL {
            assert!(registry.contains(kind), "missing policy for {}", kind);
        }
        assert_eq!(registry.len(), ResourceType::ALL.len());
    }

    #[test]
    fn test_unregistered_type() {
        let registry = PolicyRegistry::new();
        let err = registry.resolve(ResourceType::Host).err().unwrap();
        assert_eq!(err.code(), ErrorCode::UnregisteredType);
        assert!(!err.is_capability_tolerant());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = PolicyRegistry::new();
        registry.register(ResourceType::Label, Nothing);
        registry.register(ResourceType::Label, Nothing);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve(ResourceType::Label).unwrap().name(), "nothing");
    }
}
