//! Shared fixtures for the integration tests.
//!
//! A [`World`] owns an in-memory store and hands out principals and
//! resources with unique ids and generated names.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use access_core::access::{AccessEngine, LicenseInfo, StaticLicense};
use access_core::config::AccessSettings;
use access_core::rbac::{Principal, Resource, ResourceRef, ResourceType, RoleField};
use access_core::store::InMemoryStore;
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::Username;
use fake::Fake;

pub struct World {
    pub store: Arc<InMemoryStore>,
    next_id: AtomicU64,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            next_id: AtomicU64::new(100),
        }
    }

    /// Engine with an open license and default settings.
    pub fn engine(&self) -> AccessEngine {
        self.engine_with(LicenseInfo::open(), AccessSettings::default())
    }

    pub fn engine_with(&self, license: LicenseInfo, settings: AccessSettings) -> AccessEngine {
        AccessEngine::new(self.store.clone(), Arc::new(StaticLicense(license)), settings)
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Principals
    // ─────────────────────────────────────────────────────────────────────────

    pub fn user(&self) -> Principal {
        let name: String = Username().fake();
        let principal = Principal::new(self.next_id(), format!("{}-{}", name, self.next_id()));
        self.store.add_principal(principal)
    }

    pub fn superuser(&self) -> Principal {
        let principal = self.user().superuser();
        self.store.add_principal(principal)
    }

    pub fn system_auditor(&self) -> Principal {
        let principal = self.user().system_auditor();
        self.store.add_principal(principal)
    }

    pub fn grant(&self, principal: &Principal, resource: &Resource, field: RoleField) {
        self.store
            .grant_on(principal.id, resource, field)
            .expect("resource owns the role");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resources
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create(&self, resource: Resource) -> Resource {
        self.store.create(resource).expect("fixture resource is valid")
    }

    fn name(&self) -> String {
        let company: String = CompanyName().fake();
        format!("{} {}", company, self.next_id())
    }

    pub fn organization(&self) -> Resource {
        self.create(Resource::new(ResourceType::Organization, self.next_id(), self.name()))
    }

    pub fn team(&self, org: &Resource) -> Resource {
        self.create(Resource::new(ResourceType::Team, self.next_id(), self.name()).in_organization(org.id))
    }

    pub fn inventory(&self, org: &Resource) -> Resource {
        self.create(Resource::new(ResourceType::Inventory, self.next_id(), self.name()).in_organization(org.id))
    }

    pub fn host(&self, inventory: &Resource, name: &str) -> Resource {
        self.create(
            Resource::new(ResourceType::Host, self.next_id(), name)
                .with_relation("inventory", inventory.reference()),
        )
    }

    pub fn project(&self, org: &Resource) -> Resource {
        self.create(
            Resource::new(ResourceType::Project, self.next_id(), self.name())
                .in_organization(org.id)
                .with_attr("scm_type", "git"),
        )
    }

    pub fn credential(&self, org: &Resource) -> Resource {
        self.create(Resource::new(ResourceType::Credential, self.next_id(), self.name()).in_organization(org.id))
    }

    pub fn instance_group(&self, name: &str) -> Resource {
        self.create(Resource::new(ResourceType::InstanceGroup, self.next_id(), name))
    }

    pub fn job_template(&self, org: &Resource, inventory: &Resource, project: &Resource) -> Resource {
        self.job_template_with(org, inventory, project, Vec::new())
    }

    pub fn job_template_with(
        &self,
        org: &Resource,
        inventory: &Resource,
        project: &Resource,
        credentials: Vec<ResourceRef>,
    ) -> Resource {
        self.create(
            Resource::new(ResourceType::JobTemplate, self.next_id(), self.name())
                .in_organization(org.id)
                .with_relation("inventory", inventory.reference())
                .with_relation("project", project.reference())
                .with_collection("credentials", credentials)
                .with_attr("playbook", "site.yml"),
        )
    }

    /// A finished job that no longer has a template.
    pub fn orphaned_job(&self, inventory: &Resource) -> Resource {
        self.create(
            Resource::new(ResourceType::Job, self.next_id(), self.name())
                .with_relation("inventory", inventory.reference())
                .with_attr("status", "successful"),
        )
    }
}
