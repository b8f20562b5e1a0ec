//! In-memory reference implementation of [`ResourceStore`].

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::{filter_with, Query, ResourceStore};
use crate::error::{AccessError, ErrorCode, Result};
use crate::rbac::graph::RoleGraph;
use crate::rbac::models::{
    Principal, PrincipalId, Resource, ResourceId, ResourceType, Role, RoleField, RoleId,
};
use crate::rbac::schema::{implicit_roles, ParentRole};

/// Thread-safe store holding resources, principals and the role graph.
///
/// Creating a resource materializes the roles its type owns and wires
/// them to their parents, mirroring what the platform does when a record
/// is saved.
pub struct InMemoryStore {
    records: DashMap<(ResourceType, ResourceId), Resource>,
    principals: DashMap<PrincipalId, Principal>,
    roles: DashMap<RoleId, Role>,
    assignments: DashMap<PrincipalId, HashSet<RoleId>>,
    graph: RwLock<RoleGraph>,
    singletons: BTreeMap<RoleField, RoleId>,
    next_role_id: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store seeded with the system singleton roles.
    pub fn new() -> Self {
        let roles = DashMap::new();
        let mut graph = RoleGraph::new();
        let mut singletons = BTreeMap::new();

        for (offset, field) in [RoleField::SystemAdministrator, RoleField::SystemAuditor]
            .into_iter()
            .enumerate()
        {
            let id = RoleId(offset as u64 + 1);
            roles.insert(id, Role::new(id, field, None));
            graph.add_role(id);
            singletons.insert(field, id);
        }

        Self {
            records: DashMap::new(),
            principals: DashMap::new(),
            roles,
            assignments: DashMap::new(),
            graph: RwLock::new(graph),
            next_role_id: AtomicU64::new(singletons.len() as u64 + 1),
            singletons,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resources
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a resource, creating and wiring its implicit roles.
    ///
    /// Returns the stored record with its role map filled in.
    pub fn create(&self, mut resource: Resource) -> Result<Resource> {
        if resource.kind.is_abstract() {
            return Err(AccessError::validation(format!(
                "Cannot store a resource of abstract type {}",
                resource.kind
            )));
        }
        let key = (resource.kind, resource.id);
        if self.records.contains_key(&key) {
            return Err(AccessError::new(
                ErrorCode::StateConflict,
                format!("{} already exists", resource.reference()),
            ));
        }

        let content = resource.reference();
        resource.roles.clear();
        let implicit = implicit_roles(resource.kind);
        for role in implicit {
            let id = RoleId(self.next_role_id.fetch_add(1, Ordering::SeqCst));
            resource.roles.insert(role.field, id);
        }

        // Resolve every edge before touching shared state.
        let mut edges = Vec::new();
        for role in implicit {
            let Some(child) = resource.role(role.field) else {
                continue;
            };
            for parent in role.parents {
                if let Some(parent_role) = self.resolve_parent(&resource, *parent) {
                    edges.push((parent_role, child));
                }
            }
        }

        {
            let mut graph = self.graph.write();
            for id in resource.roles.values() {
                graph.add_role(*id);
            }
            let wired = edges
                .iter()
                .try_for_each(|(parent, child)| graph.add_parent(*parent, *child));
            if let Err(err) = wired {
                for id in resource.roles.values() {
                    graph.remove_role(*id);
                }
                warn!(resource = %content, error = %err, "Role wiring failed, resource not created");
                return Err(err);
            }
        }
        for (field, id) in &resource.roles {
            self.roles.insert(*id, Role::new(*id, *field, Some(content)));
        }

        debug!(
            resource = %content,
            roles = resource.roles.len(),
            "Resource created"
        );
        self.records.insert(key, resource.clone());
        Ok(resource)
    }

    /// Replace a stored resource's relations and attributes, keeping its
    /// roles. Organization-derived role parents follow an organization change.
    pub fn update(&self, mut resource: Resource) -> Result<Resource> {
        let key = (resource.kind, resource.id);
        let previous = self
            .records
            .get(&key)
            .map(|r| r.value().clone())
            .ok_or_else(|| AccessError::bad_reference("id", resource.reference()))?;

        resource.roles = previous.roles.clone();

        if previous.organization_id() != resource.organization_id() {
            let mut graph = self.graph.write();
            for implicit in implicit_roles(resource.kind) {
                let Some(child) = resource.role(implicit.field) else {
                    continue;
                };
                for parent in implicit.parents {
                    if !matches!(parent, ParentRole::Organization(_)) {
                        continue;
                    }
                    if let Some(old) = self.resolve_parent(&previous, *parent) {
                        graph.remove_parent(old, child);
                    }
                    if let Some(new) = self.resolve_parent(&resource, *parent) {
                        graph.add_parent(new, child)?;
                    }
                }
            }
        }

        self.records.insert(key, resource.clone());
        Ok(resource)
    }

    /// Remove a resource and every role it owns.
    pub fn delete(&self, kind: ResourceType, id: ResourceId) -> Option<Resource> {
        let (_, resource) = self.records.remove(&(kind, id))?;
        let owned: HashSet<RoleId> = resource.roles.values().copied().collect();
        {
            let mut graph = self.graph.write();
            for role in &owned {
                graph.remove_role(*role);
                self.roles.remove(role);
            }
        }
        for mut entry in self.assignments.iter_mut() {
            entry.value_mut().retain(|role| !owned.contains(role));
        }
        debug!(resource = %resource.reference(), "Resource deleted");
        Some(resource)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Principals and Grants
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace a principal.
    pub fn add_principal(&self, principal: Principal) -> Principal {
        self.principals.insert(principal.id, principal.clone());
        principal
    }

    pub fn remove_principal(&self, id: PrincipalId) -> Option<Principal> {
        self.assignments.remove(&id);
        self.principals.remove(&id).map(|(_, p)| p)
    }

    /// Assign a role directly to a principal.
    pub fn grant(&self, principal: PrincipalId, role: RoleId) -> Result<()> {
        if !self.roles.contains_key(&role) {
            return Err(role_not_found(role));
        }
        self.assignments.entry(principal).or_default().insert(role);
        debug!(principal = %principal, role = %role, "Role granted");
        Ok(())
    }

    /// Assign the `field` role of a resource to a principal.
    pub fn grant_on(&self, principal: PrincipalId, resource: &Resource, field: RoleField) -> Result<()> {
        let role = resource.role(field).ok_or_else(|| {
            AccessError::with_internal(
                ErrorCode::RoleNotFound,
                "Role not found",
                format!("{} has no {}", resource.reference(), field),
            )
        })?;
        self.grant(principal, role)
    }

    pub fn revoke(&self, principal: PrincipalId, role: RoleId) -> bool {
        match self.assignments.get_mut(&principal) {
            Some(mut held) => held.remove(&role),
            None => false,
        }
    }

    /// Make every member of `parent` a member of `child`.
    pub fn add_role_parent(&self, parent: RoleId, child: RoleId) -> Result<()> {
        self.graph.write().add_parent(parent, child)
    }

    pub fn remove_role_parent(&self, parent: RoleId, child: RoleId) -> bool {
        self.graph.write().remove_parent(parent, child)
    }

    fn resolve_parent(&self, resource: &Resource, parent: ParentRole) -> Option<RoleId> {
        match parent {
            ParentRole::Local(field) => resource.role(field),
            ParentRole::Singleton(field) => self.singletons.get(&field).copied(),
            ParentRole::Organization(field) => {
                let org = resource.organization_id()?;
                match self.records.get(&(ResourceType::Organization, org)) {
                    Some(record) => record.role(field),
                    None => {
                        warn!(
                            resource = %resource.reference(),
                            organization = %org,
                            "Organization not found while wiring roles"
                        );
                        None
                    }
                }
            }
        }
    }
}

fn role_not_found(role: RoleId) -> AccessError {
    AccessError::with_internal(
        ErrorCode::RoleNotFound,
        "Role not found",
        format!("role {} does not exist", role),
    )
}

impl ResourceStore for InMemoryStore {
    fn get(&self, kind: ResourceType, id: ResourceId) -> Option<Resource> {
        match kind {
            // Users and roles are views over principals and the role table.
            ResourceType::User => self.principals.get(&PrincipalId(id.0)).map(|p| p.to_resource()),
            ResourceType::Role => self.roles.get(&RoleId(id.0)).map(|r| r.to_resource()),
            _ => kind
                .concrete_kinds()
                .into_iter()
                .find_map(|concrete| self.records.get(&(concrete, id)).map(|r| r.value().clone())),
        }
    }

    fn all(&self, kind: ResourceType) -> Vec<Resource> {
        let mut found: Vec<Resource> = match kind {
            ResourceType::User => self.principals.iter().map(|p| p.to_resource()).collect(),
            ResourceType::Role => self.roles.iter().map(|r| r.to_resource()).collect(),
            _ => self
                .records
                .iter()
                .filter(|entry| kind.admits(entry.key().0))
                .map(|entry| entry.value().clone())
                .collect(),
        };
        found.sort_by_key(|r| (r.kind, r.id));
        found
    }

    fn principal(&self, id: PrincipalId) -> Option<Principal> {
        self.principals.get(&id).map(|p| p.value().clone())
    }

    fn principals(&self) -> Vec<Principal> {
        let mut all: Vec<Principal> = self.principals.iter().map(|p| p.value().clone()).collect();
        all.sort_by_key(|p| p.id);
        all
    }

    fn role(&self, id: RoleId) -> Option<Role> {
        self.roles.get(&id).map(|r| r.value().clone())
    }

    fn singleton_role(&self, field: RoleField) -> Option<RoleId> {
        self.singletons.get(&field).copied()
    }

    fn direct_roles(&self, principal: PrincipalId) -> HashSet<RoleId> {
        self.assignments
            .get(&principal)
            .map(|held| held.value().clone())
            .unwrap_or_default()
    }

    fn direct_members(&self, role: RoleId) -> HashSet<PrincipalId> {
        self.assignments
            .iter()
            .filter(|entry| entry.value().contains(&role))
            .map(|entry| *entry.key())
            .collect()
    }

    fn role_ancestors(&self, role: RoleId) -> HashSet<RoleId> {
        self.graph.read().ancestors(role)
    }

    fn role_descendants(&self, role: RoleId) -> HashSet<RoleId> {
        self.graph.read().descendants(role)
    }

    fn filter(&self, kind: ResourceType, query: &Query) -> Vec<Resource> {
        filter_with(self, kind, query)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn org_and_inventory(store: &InMemoryStore) -> (Resource, Resource) {
        let org = store
            .create(Resource::new(ResourceType::Organization, 1, "Default"))
            .unwrap();
        let inv = store
            .create(Resource::new(ResourceType::Inventory, 1, "inv").in_organization(1))
            .unwrap();
        (org, inv)
    }

    #[test]
    fn test_create_materializes_roles() {
        let store = InMemoryStore::new();
        let (org, inv) = org_and_inventory(&store);

        assert_eq!(org.roles.len(), implicit_roles(ResourceType::Organization).len());
        assert!(inv.role(RoleField::Adhoc).is_some());

        let org_admin = org.role(RoleField::Admin).unwrap();
        let inv_read = inv.role(RoleField::Read).unwrap();
        assert!(store.role_ancestors(inv_read).contains(&org_admin));
    }

    #[test]
    fn test_failed_role_wiring_leaves_no_trace() {
        let store = InMemoryStore::new();
        let org = store
            .create(Resource::new(ResourceType::Organization, 1, "Default"))
            .unwrap();
        // The organization's roles vanish between lookup and wiring.
        store.graph.write().remove_role(org.role(RoleField::InventoryAdmin).unwrap());
        let roles_before = store.roles.len();
        let graph_before = store.graph.read().len();

        let err = store
            .create(Resource::new(ResourceType::Inventory, 1, "inv").in_organization(1))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RoleNotFound);
        assert!(store.get(ResourceType::Inventory, ResourceId(1)).is_none());
        assert_eq!(store.roles.len(), roles_before);
        assert_eq!(store.graph.read().len(), graph_before);
    }

    #[test]
    fn test_duplicate_create_conflicts() {
        let store = InMemoryStore::new();
        org_and_inventory(&store);
        let err = store
            .create(Resource::new(ResourceType::Organization, 1, "again"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::StateConflict);
    }

    #[test]
    fn test_superuser_holds_singleton() {
        let store = InMemoryStore::new();
        let (org, _) = org_and_inventory(&store);
        store.add_principal(Principal::new(1, "admin").superuser());

        let admin = org.role(RoleField::Admin).unwrap();
        assert!(store.principal_in_role(PrincipalId(1), admin));
        assert!(!store.principal_in_role(PrincipalId(2), admin));
    }

    #[test]
    fn test_inactive_principal_holds_nothing() {
        let store = InMemoryStore::new();
        let (org, _) = org_and_inventory(&store);
        let mut user = Principal::new(3, "gone");
        user.is_active = false;
        store.add_principal(user);
        store.grant_on(PrincipalId(3), &org, RoleField::Admin).unwrap();

        assert!(store.effective_roles(PrincipalId(3)).is_empty());
    }

    #[test]
    fn test_delete_removes_roles_and_assignments() {
        let store = InMemoryStore::new();
        let (_, inv) = org_and_inventory(&store);
        store.add_principal(Principal::new(5, "alice"));
        store.grant_on(PrincipalId(5), &inv, RoleField::Use).unwrap();

        store.delete(ResourceType::Inventory, inv.id).unwrap();

        assert!(store.direct_roles(PrincipalId(5)).is_empty());
        assert!(store.role(inv.role(RoleField::Use).unwrap()).is_none());
        assert!(store.get(ResourceType::Inventory, inv.id).is_none());
    }

    #[test]
    fn test_update_rewires_organization_roles() {
        let store = InMemoryStore::new();
        let (org, inv) = org_and_inventory(&store);
        let other = store
            .create(Resource::new(ResourceType::Organization, 2, "Other"))
            .unwrap();

        let moved = store
            .update(Resource::new(ResourceType::Inventory, inv.id, "inv").in_organization(2))
            .unwrap();
        let inv_admin = moved.role(RoleField::Admin).unwrap();
        let ancestors = store.role_ancestors(inv_admin);

        assert!(ancestors.contains(&other.role(RoleField::InventoryAdmin).unwrap()));
        assert!(!ancestors.contains(&org.role(RoleField::InventoryAdmin).unwrap()));
    }

    #[test]
    fn test_abstract_lookup() {
        let store = InMemoryStore::new();
        store
            .create(Resource::new(ResourceType::Project, 9, "playbooks"))
            .unwrap();
        let found = store.get(ResourceType::UnifiedJobTemplate, ResourceId(9)).unwrap();
        assert_eq!(found.kind, ResourceType::Project);
        assert_eq!(store.all(ResourceType::UnifiedJobTemplate).len(), 1);
        assert!(store.get(ResourceType::UnifiedJob, ResourceId(9)).is_none());
    }

    #[test]
    fn test_members_through_ancestors() {
        let store = InMemoryStore::new();
        let (org, inv) = org_and_inventory(&store);
        store.add_principal(Principal::new(7, "bob"));
        store.grant_on(PrincipalId(7), &org, RoleField::Admin).unwrap();

        let members = store.members(inv.role(RoleField::Read).unwrap());
        assert!(members.contains(&PrincipalId(7)));
    }
}
