//! Public entry points of the access engine.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::access::capabilities::{self, Capabilities, Capability, CapabilityCache};
use crate::access::context::{AccessContext, AccessMessages};
use crate::access::license::{FileLicenseValidator, LicenseInfo, LicenseValidator, StaticLicense};
use crate::access::policy::{dispatch, Action, ActionArgs};
use crate::access::registry::PolicyRegistry;
use crate::config::{AccessSettings, Settings};
use crate::error::Result;
use crate::rbac::models::{Principal, Resource, ResourceType};
use crate::store::{Query, ResourceStore};
use crate::telemetry::DecisionMetrics;

/// Answers access questions for any principal.
///
/// Cheap to clone; every clone shares the same registry, store and
/// license source.
#[derive(Clone)]
pub struct AccessEngine {
    registry: Arc<PolicyRegistry>,
    store: Arc<dyn ResourceStore>,
    license: Arc<dyn LicenseValidator>,
    settings: Arc<AccessSettings>,
}

impl AccessEngine {
    /// An engine with the standard policy registry.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        license: Arc<dyn LicenseValidator>,
        settings: AccessSettings,
    ) -> Self {
        Self::with_registry(Arc::new(PolicyRegistry::standard()), store, license, settings)
    }

    pub fn with_registry(
        registry: Arc<PolicyRegistry>,
        store: Arc<dyn ResourceStore>,
        license: Arc<dyn LicenseValidator>,
        settings: AccessSettings,
    ) -> Self {
        Self {
            registry,
            store,
            license,
            settings: Arc::new(settings),
        }
    }

    /// An engine configured from loaded [`Settings`].
    ///
    /// The license comes from `license.open`, else the terms file at
    /// `license.path`, else no license at all.
    pub fn from_settings(store: Arc<dyn ResourceStore>, settings: &Settings) -> Result<Self> {
        let license: Arc<dyn LicenseValidator> = if settings.license.open {
            Arc::new(StaticLicense(LicenseInfo::open()))
        } else if let Some(path) = &settings.license.path {
            Arc::new(FileLicenseValidator::load(path, store.clone())?)
        } else {
            Arc::new(FileLicenseValidator::unlicensed(store.clone()))
        };
        info!(
            open = settings.license.open,
            license_path = ?settings.license.path,
            manage_organization_auth = settings.access.manage_organization_auth,
            "Access engine configured"
        );
        Ok(Self::new(store, license, settings.access.clone()))
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn settings(&self) -> &AccessSettings {
        &self.settings
    }

    /// A fresh evaluation context for one call.
    pub fn context<'a>(&'a self, principal: &'a Principal) -> AccessContext<'a> {
        AccessContext::new(
            principal,
            self.store.as_ref(),
            &self.registry,
            self.license.as_ref(),
            &self.settings,
        )
    }

    /// Whether `principal` may perform `action` on `kind`.
    pub fn check_access(
        &self,
        principal: &Principal,
        kind: ResourceType,
        action: Action,
        args: ActionArgs<'_>,
    ) -> Result<bool> {
        let cx = self.context(principal);
        self.decide(&cx, kind, action, args)
    }

    /// Like [`check_access`](Self::check_access), also returning the
    /// diagnostic messages collected while deciding.
    ///
    /// When the decision fails with an error, the messages are attached to
    /// the error's details under `messages`.
    pub fn check_access_with_messages(
        &self,
        principal: &Principal,
        kind: ResourceType,
        action: Action,
        args: ActionArgs<'_>,
    ) -> Result<(bool, AccessMessages)> {
        let cx = self.context(principal).collecting_messages();
        match self.decide(&cx, kind, action, args) {
            Ok(allowed) => Ok((allowed, cx.into_messages())),
            Err(err) if cx.has_messages() => Err(err.with_context("messages", cx.into_messages())),
            Err(err) => Err(err),
        }
    }

    /// The visibility filter for list endpoints.
    pub fn query_visible(&self, principal: &Principal, kind: ResourceType) -> Result<Query> {
        let cx = self.context(principal);
        let policy = self.registry.resolve(kind)?;
        policy.visibility_filter(&cx)
    }

    /// Every visible instance, evaluated through the store.
    pub fn list_visible(&self, principal: &Principal, kind: ResourceType) -> Result<Vec<Resource>> {
        let query = self.query_visible(principal, kind)?;
        Ok(self.store.filter(kind, &query))
    }

    /// UI capability bundle for one instance.
    pub fn compute_capabilities(
        &self,
        principal: &Principal,
        obj: &Resource,
        requested: &[Capability],
        sibling: Option<&Resource>,
        cache: &mut CapabilityCache,
    ) -> Result<Capabilities> {
        let cx = self.context(principal);
        capabilities::compute_capabilities(&cx, obj, requested, sibling, cache)
    }

    fn decide(
        &self,
        cx: &AccessContext<'_>,
        kind: ResourceType,
        action: Action,
        args: ActionArgs<'_>,
    ) -> Result<bool> {
        let decision_id = Uuid::new_v4();
        let started = Instant::now();
        let policy = self.registry.resolve(kind)?;
        let principal = cx.principal();

        let outcome = dispatch(policy, cx, action, args);
        DecisionMetrics::record_duration(action.as_str(), started.elapsed().as_secs_f64());

        match &outcome {
            Ok(allowed) => {
                DecisionMetrics::record(policy.name(), action.as_str(), *allowed);
                debug!(
                    %decision_id,
                    principal = %principal.id,
                    username = %principal.username,
                    policy = policy.name(),
                    action = action.as_str(),
                    instance = ?args.instance.map(Resource::reference),
                    sub_instance = ?args.sub_instance.map(Resource::reference),
                    relationship = ?args.relationship,
                    payload = ?args.payload.map(|p| p.fields()),
                    allowed = *allowed,
                    "Access decision"
                );
            }
            Err(err) => {
                DecisionMetrics::record_error(policy.name(), action.as_str());
                info!(
                    %decision_id,
                    principal = %principal.id,
                    username = %principal.username,
                    policy = policy.name(),
                    action = action.as_str(),
                    instance = ?args.instance.map(Resource::reference),
                    code = ?err.code(),
                    reason = %err.user_message(),
                    "Access denied with reason"
                );
            }
        }
        outcome
    }
}

impl std::fmt::Debug for AccessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessEngine")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::ActionArgs;
    use crate::error::ErrorCode;
    use crate::store::InMemoryStore;

    fn launchable(store: &InMemoryStore) -> Resource {
        store
            .create(Resource::new(ResourceType::Organization, 1, "Default"))
            .unwrap();
        store
            .create(Resource::new(ResourceType::JobTemplate, 2, "deploy").in_organization(1))
            .unwrap()
    }

    #[test]
    fn test_from_settings_without_license() {
        let store = Arc::new(InMemoryStore::new());
        let jt = launchable(&store);
        let admin = store.add_principal(Principal::new(1, "admin").superuser());

        let engine = AccessEngine::from_settings(store.clone(), &Settings::default()).unwrap();
        let err = engine
            .check_access(&admin, ResourceType::JobTemplate, Action::Start, ActionArgs::on(&jt))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::LicenseMissing);
    }

    #[test]
    fn test_from_settings_open_license() {
        let store = Arc::new(InMemoryStore::new());
        let jt = launchable(&store);
        let admin = store.add_principal(Principal::new(1, "admin").superuser());

        let mut settings = Settings::default();
        settings.license.open = true;
        let engine = AccessEngine::from_settings(store.clone(), &settings).unwrap();
        assert!(engine
            .check_access(&admin, ResourceType::JobTemplate, Action::Start, ActionArgs::on(&jt))
            .unwrap());
    }

    #[test]
    fn test_from_settings_missing_license_file() {
        let store = Arc::new(InMemoryStore::new());
        let mut settings = Settings::default();
        settings.license.path = Some("/nonexistent/license.json".into());
        let err = AccessEngine::from_settings(store, &settings).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
    }

    #[test]
    fn test_plain_denial_collects_no_messages() {
        let store = Arc::new(InMemoryStore::new());
        let engine = AccessEngine::new(
            store.clone(),
            Arc::new(StaticLicense(LicenseInfo::open())),
            AccessSettings::default(),
        );
        let user = store.add_principal(Principal::new(5, "alice"));
        let (allowed, messages) = engine
            .check_access_with_messages(&user, ResourceType::Organization, Action::Add, ActionArgs::new())
            .unwrap();
        assert!(!allowed);
        assert!(messages.is_empty());
    }
}
