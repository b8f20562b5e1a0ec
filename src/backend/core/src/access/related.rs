//! Cross-resource relationship validation.
//!
//! When a create or edit references another resource by field, the
//! principal needs rights on both the proposed object and, when it is
//! being replaced, the currently assigned one.

use tracing::warn;

use crate::access::context::AccessContext;
use crate::access::payload::Payload;
use crate::access::policy::{Action, ActionArgs};
use crate::error::Result;
use crate::rbac::models::{Resource, ResourceRef, ResourceType, RoleField};

/// A related field to validate and the role it requires.
#[derive(Debug, Clone, Copy)]
pub struct RelatedField<'f> {
    pub field: &'f str,
    pub kind: ResourceType,
    pub role_field: RoleField,
    pub mandatory: bool,
}

impl<'f> RelatedField<'f> {
    /// A non-mandatory field requiring `role_field` on its target.
    pub fn new(field: &'f str, kind: ResourceType, role_field: RoleField) -> Self {
        Self {
            field,
            kind,
            role_field,
            mandatory: false,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Validate the field for a create (`obj = None`) or edit.
    pub fn check(&self, cx: &AccessContext<'_>, payload: Option<&Payload>, obj: Option<&Resource>) -> Result<bool> {
        let mut changed = true;

        let new = match payload {
            Some(p) if p.is_copy() => p.reference_object().and_then(|source| cx.related(source, self.field)),
            Some(p) if p.contains(self.field) => self.resolve_from_payload(cx, p, obj)?,
            _ => {
                changed = false;
                None
            }
        };

        let current = match obj {
            Some(existing) if changed || self.mandatory => cx.related(existing, self.field),
            _ => None,
        };

        // No-op edits such as an idempotent PUT never re-validate.
        if obj.is_some() && reference(&new) == reference(&current) {
            changed = false;
        }

        if new.is_none() && obj.is_none() && self.mandatory {
            return Ok(cx.is_superuser());
        }

        if let Some(target) = &new {
            if changed && !self.has_access(cx, target)? {
                return Ok(false);
            }
        }

        if let Some(target) = &current {
            if (changed || self.mandatory) && !self.has_access(cx, target)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn resolve_from_payload(
        &self,
        cx: &AccessContext<'_>,
        payload: &Payload,
        obj: Option<&Resource>,
    ) -> Result<Option<Resource>> {
        if let Some(instance) = payload.instance(self.field) {
            return Ok(Some(instance.clone()));
        }
        let Some(id) = payload.related_id(self.field)? else {
            return Ok(None);
        };
        if let Some(existing) = obj {
            if existing.relation(self.field).map(|r| r.id) == Some(id) {
                if let Some(current) = cx.related(existing, self.field) {
                    return Ok(Some(current));
                }
            }
        }
        cx.get_or_400(self.kind, id, self.field).map(Some)
    }

    fn has_access(&self, cx: &AccessContext<'_>, target: &Resource) -> Result<bool> {
        if let Some(role) = target.role(self.role_field) {
            return Ok(cx.has_role(role));
        }
        let action = match self.role_field {
            RoleField::Admin => Action::Change,
            RoleField::Execute => Action::Start,
            other => {
                warn!(
                    field = self.field,
                    resource = %target.reference(),
                    role_field = %other,
                    "Related object has no such role and no fallback action"
                );
                return Ok(false);
            }
        };
        cx.check(target.kind, action, ActionArgs::on(target).without_license_check())
    }
}

fn reference(obj: &Option<Resource>) -> Option<ResourceRef> {
    obj.as_ref().map(Resource::reference)
}

impl AccessContext<'_> {
    /// Shorthand for [`RelatedField::check`].
    pub fn check_related(
        &self,
        field: &str,
        kind: ResourceType,
        role_field: RoleField,
        payload: Option<&Payload>,
        obj: Option<&Resource>,
    ) -> Result<bool> {
        RelatedField::new(field, kind, role_field).check(self, payload, obj)
    }

    /// Shorthand for a mandatory [`RelatedField::check`].
    pub fn check_related_mandatory(
        &self,
        field: &str,
        kind: ResourceType,
        role_field: RoleField,
        payload: Option<&Payload>,
        obj: Option<&Resource>,
    ) -> Result<bool> {
        RelatedField::new(field, kind, role_field)
            .mandatory()
            .check(self, payload, obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::license::{LicenseInfo, StaticLicense};
    use crate::access::registry::PolicyRegistry;
    use crate::config::AccessSettings;
    use crate::error::ErrorCode;
    use crate::rbac::models::Principal;
    use crate::store::InMemoryStore;

    struct Setup {
        store: InMemoryStore,
        registry: PolicyRegistry,
        license: StaticLicense,
        settings: AccessSettings,
        user: Principal,
        first: Resource,
        second: Resource,
        template: Resource,
    }

    fn setup() -> Setup {
        let store = InMemoryStore::new();
        let user = store.add_principal(Principal::new(1, "alice"));
        let org = store
            .create(Resource::new(ResourceType::Organization, 10, "org"))
            .unwrap();
        let first = store
            .create(Resource::new(ResourceType::Inventory, 11, "first").in_organization(org.id))
            .unwrap();
        let second = store
            .create(Resource::new(ResourceType::Inventory, 12, "second").in_organization(org.id))
            .unwrap();
        let template = store
            .create(
                Resource::new(ResourceType::JobTemplate, 13, "deploy")
                    .in_organization(org.id)
                    .with_relation("inventory", first.reference()),
            )
            .unwrap();
        Setup {
            store,
            registry: PolicyRegistry::standard(),
            license: StaticLicense(LicenseInfo::open()),
            settings: AccessSettings::default(),
            user,
            first,
            second,
            template,
        }
    }

    fn context<'a>(s: &'a Setup, principal: &'a Principal) -> AccessContext<'a> {
        AccessContext::new(principal, &s.store, &s.registry, &s.license, &s.settings)
    }

    fn inventory_field() -> RelatedField<'static> {
        RelatedField::new("inventory", ResourceType::Inventory, RoleField::Use)
    }

    #[test]
    fn test_unchanged_value_skips_role_check() {
        let s = setup();
        let cx = context(&s, &s.user);
        let same = Payload::new().with("inventory", s.first.id.0);
        assert!(inventory_field().check(&cx, Some(&same), Some(&s.template)).unwrap());
        assert!(inventory_field().check(&cx, Some(&Payload::new()), Some(&s.template)).unwrap());
    }

    #[test]
    fn test_replacement_needs_both_old_and_new() {
        let s = setup();
        let moved = Payload::new().with("inventory", s.second.id.0);

        s.store.grant_on(s.user.id, &s.second, RoleField::Use).unwrap();
        assert!(!inventory_field()
            .check(&context(&s, &s.user), Some(&moved), Some(&s.template))
            .unwrap());

        s.store.grant_on(s.user.id, &s.first, RoleField::Use).unwrap();
        assert!(inventory_field()
            .check(&context(&s, &s.user), Some(&moved), Some(&s.template))
            .unwrap());
    }

    #[test]
    fn test_mandatory_field_missing_on_create() {
        let s = setup();
        let admin = s.store.add_principal(Principal::new(2, "root").superuser());
        let field = inventory_field().mandatory();
        assert!(!field.check(&context(&s, &s.user), Some(&Payload::new()), None).unwrap());
        assert!(field.check(&context(&s, &admin), Some(&Payload::new()), None).unwrap());
    }

    #[test]
    fn test_omitted_mandatory_field_still_checks_current_value() {
        let s = setup();
        let field = inventory_field().mandatory();
        let untouched = Payload::new().with("name", "renamed");
        assert!(!field
            .check(&context(&s, &s.user), Some(&untouched), Some(&s.template))
            .unwrap());

        s.store.grant_on(s.user.id, &s.first, RoleField::Use).unwrap();
        assert!(field
            .check(&context(&s, &s.user), Some(&untouched), Some(&s.template))
            .unwrap());
    }

    #[test]
    fn test_unknown_id_is_rejected() {
        let s = setup();
        let cx = context(&s, &s.user);
        let err = inventory_field()
            .check(&cx, Some(&Payload::new().with("inventory", 999)), None)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecordNotFound);
    }

    #[test]
    fn test_copy_reads_from_reference_object() {
        let s = setup();
        let copy = Payload::copy_of(&s.template);
        assert!(!inventory_field().check(&context(&s, &s.user), Some(&copy), None).unwrap());

        s.store.grant_on(s.user.id, &s.first, RoleField::Use).unwrap();
        assert!(inventory_field().check(&context(&s, &s.user), Some(&copy), None).unwrap());
    }
}
