//! Credentials, credential types and external input sources.

use crate::access::context::AccessContext;
use crate::access::payload::Payload;
use crate::access::policy::{check_superuser, Action, ActionArgs, Policy};
use crate::error::{AccessError, Result};
use crate::rbac::models::{Resource, ResourceType, RoleField};
use crate::store::Query;

// ═══════════════════════════════════════════════════════════════════════════════
// Credential
// ═══════════════════════════════════════════════════════════════════════════════

/// Credentials are owned by a user, team or organization.
#[derive(Debug, Default)]
pub struct CredentialPolicy;

impl CredentialPolicy {
    /// The owner named by `field` must be changeable by the principal.
    fn owner_allowed(cx: &AccessContext<'_>, payload: &Payload, field: &str, kind: ResourceType) -> Result<bool> {
        let Some(id) = payload.related_id(field)? else {
            return Ok(true);
        };
        let owner = cx.get_or_400(kind, id, field)?;
        if cx.check(kind, Action::Change, ActionArgs::on(&owner))? {
            return Ok(true);
        }
        Ok(kind == ResourceType::Organization && cx.in_role(&owner, RoleField::CredentialAdmin))
    }
}

impl Policy for CredentialPolicy {
    fn name(&self) -> &'static str {
        "credential"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(cx.accessible(RoleField::Read))
    }

    /// One of `user`, `team` or `organization` must name an owner the
    /// principal can change.
    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        check_superuser(cx, || {
            if payload.is_empty() {
                return Ok(true);
            }
            for (field, kind) in [
                ("user", ResourceType::User),
                ("team", ResourceType::Team),
                ("organization", ResourceType::Organization),
            ] {
                if !Self::owner_allowed(cx, payload, field, kind)? {
                    return Ok(false);
                }
            }
            let has_owner = ["user", "team", "organization"]
                .iter()
                .any(|field| matches!(payload.related_id(field), Ok(Some(_))));
            Ok(has_owner)
        })
    }

    fn can_use(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_role(obj, RoleField::Use)))
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        check_superuser(cx, || {
            Ok(cx.in_role(obj, RoleField::Admin)
                && cx.check_related(
                    "organization",
                    ResourceType::Organization,
                    RoleField::CredentialAdmin,
                    payload,
                    Some(obj),
                )?)
        })
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        self.can_change(cx, obj, None)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Credential Type
// ═══════════════════════════════════════════════════════════════════════════════

/// Credential types are readable by everyone and managed by superusers.
/// Built-in types are immutable, and a type in use cannot be deleted.
#[derive(Debug, Default)]
pub struct CredentialTypePolicy;

impl CredentialTypePolicy {
    fn in_use(cx: &AccessContext<'_>, obj: &Resource) -> bool {
        !cx.filter(
            ResourceType::Credential,
            &Query::related("credential_type", Query::ids([obj.id])),
        )
        .is_empty()
    }
}

impl Policy for CredentialTypePolicy {
    fn name(&self) -> &'static str {
        "credential_type"
    }

    fn filtered_query(&self, _cx: &AccessContext<'_>) -> Result<Query> {
        Ok(Query::All)
    }

    fn can_read(&self, _cx: &AccessContext<'_>, _obj: &Resource) -> Result<bool> {
        Ok(true)
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, _payload: Option<&Payload>) -> Result<bool> {
        if obj.attr_bool("managed") {
            return Ok(false);
        }
        Ok(cx.is_superuser())
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        if obj.attr_bool("managed") {
            return Ok(false);
        }
        if Self::in_use(cx, obj) {
            return Err(AccessError::permission_denied(
                "Credential types that are in use cannot be deleted",
            ));
        }
        Ok(cx.is_superuser())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Credential Input Source
// ═══════════════════════════════════════════════════════════════════════════════

/// Links a target credential's input to a source credential's lookup.
#[derive(Debug, Default)]
pub struct CredentialInputSourcePolicy;

impl Policy for CredentialInputSourcePolicy {
    fn name(&self) -> &'static str {
        "credential_input_source"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(Query::related("target_credential", cx.accessible(RoleField::Read)))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        check_superuser(cx, || {
            Ok(cx.check_related(
                "target_credential",
                ResourceType::Credential,
                RoleField::Admin,
                Some(payload),
                None,
            )? && cx.check_related(
                "source_credential",
                ResourceType::Credential,
                RoleField::Use,
                Some(payload),
                None,
            )?)
        })
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        check_superuser(cx, || {
            let empty = Payload::new();
            if !self.can_add(cx, payload.unwrap_or(&empty))? {
                return Ok(false);
            }
            Ok(cx.in_related_role(obj, "target_credential", RoleField::Admin)
                && cx.in_related_role(obj, "source_credential", RoleField::Use))
        })
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_related_role(obj, "target_credential", RoleField::Admin)))
    }
}
