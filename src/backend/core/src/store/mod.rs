//! Resource query adapter.
//!
//! The engine never owns resource state. It reads instances, principals,
//! roles and role edges through [`ResourceStore`], which a deployment
//! implements over its own storage. [`InMemoryStore`] is the reference
//! implementation used by tests and benchmarks.

mod memory;
mod query;

pub use memory::InMemoryStore;
pub use query::{Query, QueryEvaluator};

use std::collections::HashSet;

use crate::rbac::models::{Principal, PrincipalId, Resource, ResourceId, ResourceType, Role, RoleField, RoleId};

/// Read access to resources and the role graph.
///
/// Implementations must be safe to query concurrently; every method reads
/// committed state at call time.
pub trait ResourceStore: Send + Sync {
    /// Fetch one instance. Abstract kinds search their concrete kinds.
    fn get(&self, kind: ResourceType, id: ResourceId) -> Option<Resource>;

    /// Every instance of a kind. Abstract kinds expand to their concrete kinds.
    fn all(&self, kind: ResourceType) -> Vec<Resource>;

    fn principal(&self, id: PrincipalId) -> Option<Principal>;

    fn principals(&self) -> Vec<Principal>;

    fn role(&self, id: RoleId) -> Option<Role>;

    /// The process-wide singleton role for a system field.
    fn singleton_role(&self, field: RoleField) -> Option<RoleId>;

    /// Roles directly assigned to a principal.
    fn direct_roles(&self, principal: PrincipalId) -> HashSet<RoleId>;

    /// Principals holding a role directly.
    fn direct_members(&self, role: RoleId) -> HashSet<PrincipalId>;

    /// Every role that implies `role`, excluding itself.
    fn role_ancestors(&self, role: RoleId) -> HashSet<RoleId>;

    /// Every role `role` implies, excluding itself.
    fn role_descendants(&self, role: RoleId) -> HashSet<RoleId>;

    /// Instances of `kind` satisfying `query`. Most adapters can delegate
    /// to [`filter_with`].
    fn filter(&self, kind: ResourceType, query: &Query) -> Vec<Resource>;

    // ─────────────────────────────────────────────────────────────────────────
    // Provided
    // ─────────────────────────────────────────────────────────────────────────

    /// Direct roles plus the singleton roles implied by principal flags.
    fn held_roles(&self, principal: PrincipalId) -> HashSet<RoleId> {
        let mut held = self.direct_roles(principal);
        if let Some(p) = self.principal(principal) {
            if !p.is_active {
                return HashSet::new();
            }
            if p.is_superuser {
                held.extend(self.singleton_role(RoleField::SystemAdministrator));
            }
            if p.is_system_auditor {
                held.extend(self.singleton_role(RoleField::SystemAuditor));
            }
        }
        held
    }

    /// Every role the principal is in: held roles and all their descendants.
    fn effective_roles(&self, principal: PrincipalId) -> HashSet<RoleId> {
        let held = self.held_roles(principal);
        let mut effective = HashSet::with_capacity(held.len() * 4);
        for role in held {
            if effective.insert(role) {
                effective.extend(self.role_descendants(role));
            }
        }
        effective
    }

    /// Whether the principal holds `role` or any ancestor of it.
    fn principal_in_role(&self, principal: PrincipalId, role: RoleId) -> bool {
        let held = self.held_roles(principal);
        if held.is_empty() {
            return false;
        }
        held.contains(&role) || self.role_ancestors(role).iter().any(|r| held.contains(r))
    }

    /// Principals in a role directly or through an ancestor.
    fn members(&self, role: RoleId) -> HashSet<PrincipalId> {
        let mut members = self.direct_members(role);
        for ancestor in self.role_ancestors(role) {
            members.extend(self.direct_members(ancestor));
        }
        members
    }
}

/// Scan-and-evaluate filtering over [`ResourceStore::all`].
pub fn filter_with(store: &dyn ResourceStore, kind: ResourceType, query: &Query) -> Vec<Resource> {
    match query {
        Query::None => Vec::new(),
        Query::All => store.all(kind),
        Query::Ids(ids) => ids.iter().filter_map(|id| store.get(kind, *id)).collect(),
        _ => {
            let mut evaluator = QueryEvaluator::new(store);
            store
                .all(kind)
                .into_iter()
                .filter(|resource| evaluator.matches(query, resource))
                .collect()
        }
    }
}
