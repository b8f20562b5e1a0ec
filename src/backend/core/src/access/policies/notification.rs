//! Notification templates, notifications, and the notification attach
//! rules shared by every resource that sends notifications.

use crate::access::context::AccessContext;
use crate::access::payload::Payload;
use crate::access::policy::{check_superuser, Action, ActionArgs, Policy};
use crate::error::Result;
use crate::rbac::models::{Resource, ResourceType, RoleField};
use crate::store::Query;

use super::admin_or_auditor_orgs;

/// Relationships binding notification templates to a resource.
pub(crate) const NOTIFICATION_RELATIONSHIPS: [&str; 4] = [
    "notification_templates_started",
    "notification_templates_success",
    "notification_templates_error",
    "notification_templates_approvals",
];

pub(crate) fn is_notification_relationship(relationship: &str) -> bool {
    NOTIFICATION_RELATIONSHIPS.contains(&relationship)
}

/// Attaching a notification template to a resource needs change rights
/// on the template and whatever the resource itself demands.
pub(crate) fn can_attach_notification<F>(cx: &AccessContext<'_>, template: &Resource, resource_check: F) -> Result<bool>
where
    F: FnOnce() -> Result<bool>,
{
    if template.kind != ResourceType::NotificationTemplate {
        return Ok(false);
    }
    let empty = Payload::new();
    if !cx.check(
        ResourceType::NotificationTemplate,
        Action::Change,
        ActionArgs::on(template).with_payload(&empty),
    )? {
        return Ok(false);
    }
    resource_check()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Notification Template
// ═══════════════════════════════════════════════════════════════════════════════

/// Managed by organization notification admins; visible to them and to
/// organization auditors.
#[derive(Debug, Default)]
pub struct NotificationTemplatePolicy;

impl Policy for NotificationTemplatePolicy {
    fn name(&self) -> &'static str {
        "notification_template"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(Query::related(
            "organization",
            cx.accessible(RoleField::NotificationAdmin).or(cx.accessible(RoleField::Auditor)),
        ))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        check_superuser(cx, || {
            if payload.is_empty() {
                return Ok(cx.has_any(ResourceType::Organization, RoleField::NotificationAdmin));
            }
            cx.check_related_mandatory(
                "organization",
                ResourceType::Organization,
                RoleField::NotificationAdmin,
                Some(payload),
                None,
            )
        })
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        check_superuser(cx, || {
            Ok(cx.in_related_role(obj, "organization", RoleField::NotificationAdmin)
                && cx.check_related_mandatory(
                    "organization",
                    ResourceType::Organization,
                    RoleField::NotificationAdmin,
                    payload,
                    Some(obj),
                )?)
        })
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        self.can_change(cx, obj, None)
    }

    /// Sending a test notification.
    fn can_start(&self, cx: &AccessContext<'_>, obj: &Resource, _validate_license: bool) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_related_role(obj, "organization", RoleField::NotificationAdmin)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Notification
// ═══════════════════════════════════════════════════════════════════════════════

/// A sent notification, scoped by its template's organization.
#[derive(Debug, Default)]
pub struct NotificationPolicy;

impl Policy for NotificationPolicy {
    fn name(&self) -> &'static str {
        "notification"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        let orgs = cx.accessible(RoleField::NotificationAdmin).or(admin_or_auditor_orgs(cx));
        Ok(Query::related("notification_template", Query::related("organization", orgs)))
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        match cx.related(obj, "notification_template") {
            Some(template) => cx.check(ResourceType::NotificationTemplate, Action::Delete, ActionArgs::on(&template)),
            None => Ok(cx.is_superuser()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_relationships() {
        assert!(is_notification_relationship("notification_templates_error"));
        assert!(!is_notification_relationship("credentials"));
    }
}
