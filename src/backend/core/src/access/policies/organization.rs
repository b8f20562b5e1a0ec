use crate::access::context::AccessContext;
use crate::access::license::{check_license, LicenseCheck};
use crate::access::payload::Payload;
use crate::access::policy::{check_superuser, Action, ActionArgs, Policy};
use crate::error::Result;
use crate::rbac::models::{Resource, ResourceType, RoleField};
use crate::store::Query;

use super::environment_readable;
use super::notification::{can_attach_notification, is_notification_relationship};

/// Organizations: the root of the role hierarchy.
#[derive(Debug, Default)]
pub struct OrganizationPolicy;

impl OrganizationPolicy {
    /// Membership edits go through the role's own grant rules.
    fn membership_role(obj: &Resource, relationship: &str) -> Option<RoleField> {
        match relationship {
            "member_role.members" => obj.role(RoleField::Member).map(|_| RoleField::Member),
            "admin_role.members" => obj.role(RoleField::Admin).map(|_| RoleField::Admin),
            _ => None,
        }
    }

    fn check_membership(
        cx: &AccessContext<'_>,
        action: Action,
        obj: &Resource,
        field: RoleField,
        sub_obj: &Resource,
        skip_sub_read_check: bool,
    ) -> Result<bool> {
        let Some(role) = obj.role(field).and_then(|id| cx.store().role(id)) else {
            return Ok(false);
        };
        let role = role.to_resource();
        let mut args = ActionArgs::on(&role).with_sub(sub_obj, "members");
        if skip_sub_read_check {
            args = args.skip_sub_read_check();
        }
        cx.check(ResourceType::Role, action, args)
    }
}

impl Policy for OrganizationPolicy {
    fn name(&self) -> &'static str {
        "organization"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &[
            "member_role.members",
            "admin_role.members",
            "instance_groups",
            "galaxy_credentials",
            "notification_templates_started",
            "notification_templates_success",
            "notification_templates_error",
            "notification_templates_approvals",
        ]
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(cx.accessible(RoleField::Read))
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        check_superuser(cx, || {
            if !environment_readable(cx, payload, "default_environment")? {
                return Ok(false);
            }
            Ok(cx.in_role(obj, RoleField::Admin))
        })
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_license(
            cx,
            LicenseCheck {
                check_expiration: false,
                ..LicenseCheck::default()
            },
        )?;
        self.can_change(cx, obj, None)
    }

    fn can_attach(
        &self,
        cx: &AccessContext<'_>,
        obj: &Resource,
        sub_obj: &Resource,
        relationship: &str,
        _payload: Option<&Payload>,
        skip_sub_read_check: bool,
    ) -> Result<bool> {
        if let Some(field) = Self::membership_role(obj, relationship) {
            return Self::check_membership(cx, Action::Attach, obj, field, sub_obj, skip_sub_read_check);
        }
        match relationship {
            "instance_groups" => Ok(cx.is_superuser()),
            "galaxy_credentials" => check_superuser(cx, || {
                Ok(cx.in_role(obj, RoleField::Admin) && cx.in_role(sub_obj, RoleField::Use))
            }),
            rel if is_notification_relationship(rel) => can_attach_notification(cx, sub_obj, || {
                Ok(cx.in_role(obj, RoleField::Admin) || cx.in_role(obj, RoleField::Auditor))
            }),
            _ => {
                if !self.can_change(cx, obj, None)? {
                    return Ok(false);
                }
                if skip_sub_read_check {
                    return Ok(true);
                }
                cx.can_read(sub_obj)
            }
        }
    }

    fn can_unattach(
        &self,
        cx: &AccessContext<'_>,
        obj: &Resource,
        sub_obj: &Resource,
        relationship: &str,
        payload: Option<&Payload>,
        skip_sub_read_check: bool,
    ) -> Result<bool> {
        if let Some(field) = Self::membership_role(obj, relationship) {
            return Self::check_membership(cx, Action::Unattach, obj, field, sub_obj, skip_sub_read_check);
        }
        if relationship == "instance_groups" {
            return Ok(cx.is_superuser());
        }
        self.can_change(cx, obj, payload)
    }
}
