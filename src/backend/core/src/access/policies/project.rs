use crate::access::context::AccessContext;
use crate::access::payload::Payload;
use crate::access::policy::{check_superuser, Policy};
use crate::error::Result;
use crate::rbac::models::{Resource, ResourceType, RoleField};
use crate::store::Query;

use super::{environment_readable, is_cancelable};
use super::notification::{can_attach_notification, is_notification_relationship};

// ═══════════════════════════════════════════════════════════════════════════════
// Project
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct ProjectPolicy;

impl Policy for ProjectPolicy {
    fn name(&self) -> &'static str {
        "project"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &[
            "notification_templates_started",
            "notification_templates_success",
            "notification_templates_error",
        ]
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(cx.accessible(RoleField::Read))
    }

    fn can_use(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_role(obj, RoleField::Use)))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        check_superuser(cx, || {
            if payload.is_empty() {
                return Ok(cx.has_any(ResourceType::Organization, RoleField::ProjectAdmin));
            }
            if !environment_readable(cx, Some(payload), "default_environment")? {
                return Ok(false);
            }
            Ok(cx.check_related_mandatory(
                "organization",
                ResourceType::Organization,
                RoleField::ProjectAdmin,
                Some(payload),
                None,
            )? && cx.check_related("credential", ResourceType::Credential, RoleField::Use, Some(payload), None)?)
        })
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        check_superuser(cx, || {
            if !environment_readable(cx, payload, "default_environment")? {
                return Ok(false);
            }
            Ok(cx.check_related(
                "organization",
                ResourceType::Organization,
                RoleField::ProjectAdmin,
                payload,
                Some(obj),
            )? && cx.in_role(obj, RoleField::Admin)
                && cx.check_related("credential", ResourceType::Credential, RoleField::Use, payload, Some(obj))?)
        })
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        self.can_change(cx, obj, None)
    }

    /// Project update.
    fn can_start(&self, cx: &AccessContext<'_>, obj: &Resource, _validate_license: bool) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_role(obj, RoleField::Update)))
    }

    fn can_attach(
        &self,
        cx: &AccessContext<'_>,
        obj: &Resource,
        sub_obj: &Resource,
        relationship: &str,
        _payload: Option<&Payload>,
        _skip_sub_read_check: bool,
    ) -> Result<bool> {
        if is_notification_relationship(relationship) {
            return can_attach_notification(cx, sub_obj, || self.can_change(cx, obj, None));
        }
        Ok(false)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Project Update
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct ProjectUpdatePolicy;

impl Policy for ProjectUpdatePolicy {
    fn name(&self) -> &'static str {
        "project_update"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(Query::related("project", cx.accessible(RoleField::Read)))
    }

    fn can_cancel(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        if !is_cancelable(obj) {
            return Ok(false);
        }
        check_superuser(cx, || {
            Ok(obj.is_created_by(cx.principal()) || cx.in_related_role(obj, "project", RoleField::Admin))
        })
    }

    /// Relaunch runs a fresh update of the same project.
    fn can_start(&self, cx: &AccessContext<'_>, obj: &Resource, _validate_license: bool) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_related_role(obj, "project", RoleField::Update)))
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_related_role(obj, "project", RoleField::Admin)))
    }
}
