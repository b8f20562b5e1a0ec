//! Per-call evaluation context.
//!
//! An [`AccessContext`] binds one principal to the collaborators a policy
//! needs (store, registry, license, settings) for the duration of a single
//! decision. It memoizes the principal's held roles and the license
//! snapshot, and optionally collects diagnostic messages.

use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::access::license::{LicenseInfo, LicenseValidator};
use crate::access::policy::{dispatch, Action, ActionArgs};
use crate::access::registry::PolicyRegistry;
use crate::config::AccessSettings;
use crate::error::{AccessError, Result};
use crate::rbac::models::{Principal, Resource, ResourceId, ResourceType, RoleField, RoleId};
use crate::store::{Query, QueryEvaluator, ResourceStore};

/// Diagnostic messages keyed by topic (`credentials`, `detail`, ...).
pub type AccessMessages = BTreeMap<String, Vec<String>>;

pub struct AccessContext<'a> {
    principal: &'a Principal,
    store: &'a dyn ResourceStore,
    registry: &'a PolicyRegistry,
    license: &'a dyn LicenseValidator,
    settings: &'a AccessSettings,
    messages: Option<RefCell<AccessMessages>>,
    held: OnceCell<HashSet<RoleId>>,
    license_info: OnceCell<LicenseInfo>,
}

impl<'a> AccessContext<'a> {
    pub fn new(
        principal: &'a Principal,
        store: &'a dyn ResourceStore,
        registry: &'a PolicyRegistry,
        license: &'a dyn LicenseValidator,
        settings: &'a AccessSettings,
    ) -> Self {
        Self {
            principal,
            store,
            registry,
            license,
            settings,
            messages: None,
            held: OnceCell::new(),
            license_info: OnceCell::new(),
        }
    }

    /// Enable message collection.
    pub fn collecting_messages(mut self) -> Self {
        self.messages = Some(RefCell::new(AccessMessages::new()));
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Principal
    // ─────────────────────────────────────────────────────────────────────────

    pub fn principal(&self) -> &Principal {
        self.principal
    }

    pub fn is_superuser(&self) -> bool {
        self.principal.is_active && self.principal.is_superuser
    }

    pub fn is_system_auditor(&self) -> bool {
        self.principal.is_active && self.principal.is_system_auditor
    }

    /// Whether the principal is in `role` directly or through an ancestor.
    pub fn has_role(&self, role: RoleId) -> bool {
        let held = self.held_roles();
        if held.is_empty() {
            return false;
        }
        held.contains(&role)
            || self
                .store
                .role_ancestors(role)
                .iter()
                .any(|ancestor| held.contains(ancestor))
    }

    /// Whether the principal is in the `field` role of `obj`.
    pub fn in_role(&self, obj: &Resource, field: RoleField) -> bool {
        obj.role(field).map(|role| self.has_role(role)).unwrap_or(false)
    }

    /// Whether the principal is in the `field` role of the object `obj`
    /// points at through `relation`.
    pub fn in_related_role(&self, obj: &Resource, relation: &str, field: RoleField) -> bool {
        self.related(obj, relation)
            .map(|related| self.in_role(&related, field))
            .unwrap_or(false)
    }

    fn held_roles(&self) -> &HashSet<RoleId> {
        self.held.get_or_init(|| {
            if !self.principal.is_active {
                return HashSet::new();
            }
            let mut held = self.store.direct_roles(self.principal.id);
            if self.principal.is_superuser {
                held.extend(self.store.singleton_role(RoleField::SystemAdministrator));
            }
            if self.principal.is_system_auditor {
                held.extend(self.store.singleton_role(RoleField::SystemAuditor));
            }
            held
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Collaborators
    // ─────────────────────────────────────────────────────────────────────────

    pub fn store(&self) -> &'a dyn ResourceStore {
        self.store
    }

    pub fn settings(&self) -> &'a AccessSettings {
        self.settings
    }

    pub fn registry(&self) -> &'a PolicyRegistry {
        self.registry
    }

    /// The license snapshot, validated once per context.
    pub fn license_info(&self) -> &LicenseInfo {
        self.license_info.get_or_init(|| self.license.validate())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Objects whose `field` role the principal holds.
    pub fn accessible(&self, field: RoleField) -> Query {
        Query::accessible(self.principal.id, field)
    }

    pub fn matches(&self, query: &Query, obj: &Resource) -> bool {
        QueryEvaluator::new(self.store).matches(query, obj)
    }

    pub fn filter(&self, kind: ResourceType, query: &Query) -> Vec<Resource> {
        self.store.filter(kind, query)
    }

    /// Ids of the `kind` objects whose `field` role the principal holds.
    pub fn accessible_ids(&self, kind: ResourceType, field: RoleField) -> Vec<ResourceId> {
        self.filter(kind, &self.accessible(field))
            .into_iter()
            .map(|r| r.id)
            .collect()
    }

    /// Whether the principal holds `field` on any object of `kind`.
    pub fn has_any(&self, kind: ResourceType, field: RoleField) -> bool {
        !self.accessible_ids(kind, field).is_empty()
    }

    /// Follow a single-valued relation.
    pub fn related(&self, obj: &Resource, relation: &str) -> Option<Resource> {
        let target = obj.relation(relation)?;
        self.store.get(target.kind, target.id)
    }

    /// Follow a chain of relations.
    pub fn follow(&self, obj: &Resource, path: &[&str]) -> Option<Resource> {
        let mut current = obj.clone();
        for relation in path {
            current = self.related(&current, relation)?;
        }
        Some(current)
    }

    /// Load every member of a collection, skipping dangling references.
    pub fn collection(&self, obj: &Resource, collection: &str) -> Vec<Resource> {
        obj.collection(collection)
            .iter()
            .filter_map(|target| self.store.get(target.kind, target.id))
            .collect()
    }

    pub fn organization_of(&self, obj: &Resource) -> Option<Resource> {
        self.related(obj, "organization")
    }

    /// Fetch an object referenced from a payload; unknown ids are a
    /// client error.
    pub fn get_or_400(&self, kind: ResourceType, id: ResourceId, field: &str) -> Result<Resource> {
        self.store
            .get(kind, id)
            .ok_or_else(|| AccessError::bad_reference(field, id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delegation
    // ─────────────────────────────────────────────────────────────────────────

    /// Run a point check through the registry.
    pub fn check(&self, kind: ResourceType, action: Action, args: ActionArgs<'_>) -> Result<bool> {
        let policy = self.registry.resolve(kind)?;
        let allowed = dispatch(policy, self, action, args)?;
        debug!(
            principal = %self.principal.id,
            policy = policy.name(),
            action = action.as_str(),
            instance = ?args.instance.map(Resource::reference),
            allowed,
            "Delegated access check"
        );
        Ok(allowed)
    }

    /// Read check on any object, using its own type's policy.
    pub fn can_read(&self, obj: &Resource) -> Result<bool> {
        self.check(obj.kind, Action::Read, ActionArgs::on(obj))
    }

    /// Change check on any object, using its own type's policy.
    pub fn can_change(&self, obj: &Resource) -> Result<bool> {
        self.check(obj.kind, Action::Change, ActionArgs::on(obj))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────────

    pub fn collects_messages(&self) -> bool {
        self.messages.is_some()
    }

    pub fn add_message(&self, topic: &str, message: impl Into<String>) {
        if let Some(messages) = &self.messages {
            messages
                .borrow_mut()
                .entry(topic.to_string())
                .or_default()
                .push(message.into());
        }
    }

    pub fn has_messages(&self) -> bool {
        self.messages
            .as_ref()
            .map(|m| !m.borrow().is_empty())
            .unwrap_or(false)
    }

    pub fn into_messages(self) -> AccessMessages {
        self.messages.map(RefCell::into_inner).unwrap_or_default()
    }
}
