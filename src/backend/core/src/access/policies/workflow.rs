//! Workflow templates, their nodes, workflow jobs and approvals.

use crate::access::context::AccessContext;
use crate::access::license::{check_license, LicenseCheck};
use crate::access::payload::Payload;
use crate::access::policy::{check_superuser, Action, ActionArgs, Policy};
use crate::error::{AccessError, Result};
use crate::rbac::models::{Resource, ResourceType, RoleField};
use crate::store::Query;

use super::notification::{can_attach_notification, is_notification_relationship};
use super::templates::can_use_prompts;
use super::{in_audited_organization, is_cancelable};

/// Links between workflow nodes.
const NODE_LINKS: [&str; 3] = ["success_nodes", "failure_nodes", "always_nodes"];

// ═══════════════════════════════════════════════════════════════════════════════
// Workflow Job Template
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct WorkflowJobTemplatePolicy;

impl WorkflowJobTemplatePolicy {
    fn nodes(cx: &AccessContext<'_>, obj: &Resource) -> Vec<Resource> {
        cx.filter(
            ResourceType::WorkflowJobTemplateNode,
            &Query::related("workflow_job_template", Query::ids([obj.id])),
        )
    }
}

impl Policy for WorkflowJobTemplatePolicy {
    fn name(&self) -> &'static str {
        "workflow_job_template"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &[
            "labels",
            "notification_templates_started",
            "notification_templates_success",
            "notification_templates_error",
            "notification_templates_approvals",
        ]
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(cx.accessible(RoleField::Read))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        check_superuser(cx, || {
            if payload.is_empty() {
                return Ok(cx.has_any(ResourceType::Organization, RoleField::WorkflowAdmin));
            }
            let organization_ok = cx.check_related_mandatory(
                "organization",
                ResourceType::Organization,
                RoleField::WorkflowAdmin,
                Some(payload),
                None,
            )?;
            if !organization_ok {
                if payload.related_id("organization")?.is_none() {
                    cx.add_message(
                        "organization",
                        "An organization is required to create a workflow job template for normal user",
                    );
                }
                return Ok(false);
            }
            if !cx.check_related("inventory", ResourceType::Inventory, RoleField::Use, Some(payload), None)? {
                if let Some(id) = payload.related_id("inventory")? {
                    cx.add_message("inventory", format!("You do not have use_role to {}", id));
                }
                return Ok(false);
            }
            Ok(true)
        })
    }

    /// Every node's template must be startable and every node credential
    /// and inventory usable. Blocked names are reported per topic.
    fn can_copy(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || {
            let mut blocked = false;
            for node in Self::nodes(cx, obj) {
                if let Some(template) = cx.related(&node, "unified_job_template") {
                    let args = ActionArgs::on(&template).without_license_check();
                    if !cx.check(template.kind, Action::Start, args)? {
                        cx.add_message("templates_unable_to_copy", template.name.clone());
                        blocked = true;
                    }
                }
                if let Some(inventory) = cx.related(&node, "inventory") {
                    if !cx.in_role(&inventory, RoleField::Use) {
                        cx.add_message("inventories_unable_to_copy", inventory.name.clone());
                        blocked = true;
                    }
                }
                for credential in cx.collection(&node, "credentials") {
                    if !cx.in_role(&credential, RoleField::Use) {
                        cx.add_message("credentials_unable_to_copy", credential.name.clone());
                        blocked = true;
                    }
                }
            }
            if blocked {
                return Ok(false);
            }
            cx.check_related_mandatory(
                "organization",
                ResourceType::Organization,
                RoleField::WorkflowAdmin,
                Some(&Payload::copy_of(obj)),
                None,
            )
        })
    }

    fn can_start(&self, cx: &AccessContext<'_>, obj: &Resource, validate_license: bool) -> Result<bool> {
        if validate_license {
            check_license(cx, LicenseCheck::default())?;
        }
        check_superuser(cx, || Ok(cx.in_role(obj, RoleField::Execute)))
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        check_superuser(cx, || {
            Ok(cx.check_related(
                "organization",
                ResourceType::Organization,
                RoleField::WorkflowAdmin,
                payload,
                Some(obj),
            )? && cx.check_related("inventory", ResourceType::Inventory, RoleField::Use, payload, Some(obj))?
                && cx.in_role(obj, RoleField::Admin))
        })
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_role(obj, RoleField::Admin)))
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
        if is_notification_relationship(relationship) {
            return can_attach_notification(cx, sub_obj, || self.can_change(cx, obj, None));
        }
        if !self.can_change(cx, obj, None)? {
            return Ok(false);
        }
        if skip_sub_read_check {
            return Ok(true);
        }
        cx.can_read(sub_obj)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Workflow Job Template Node
// ═══════════════════════════════════════════════════════════════════════════════

/// Nodes are edited by admins of the owning workflow, and may only point
/// at templates the editor can execute.
#[derive(Debug, Default)]
pub struct WorkflowJobTemplateNodePolicy;

impl WorkflowJobTemplateNodePolicy {
    fn wfjt_admin(cx: &AccessContext<'_>, obj: &Resource) -> bool {
        cx.in_related_role(obj, "workflow_job_template", RoleField::Admin)
    }

    fn ujt_execute(cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        cx.check_related_mandatory(
            "unified_job_template",
            ResourceType::UnifiedJobTemplate,
            RoleField::Execute,
            None,
            Some(obj),
        )
    }

    fn can_change_link(obj: &Resource, sub_obj: &Resource, relationship: &str) -> Option<bool> {
        if !NODE_LINKS.contains(&relationship) {
            return None;
        }
        Some(
            sub_obj.kind == ResourceType::WorkflowJobTemplateNode
                && obj.relation("workflow_job_template") == sub_obj.relation("workflow_job_template"),
        )
    }
}

impl Policy for WorkflowJobTemplateNodePolicy {
    fn name(&self) -> &'static str {
        "workflow_job_template_node"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &["credentials", "success_nodes", "failure_nodes", "always_nodes"]
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(Query::related("workflow_job_template", cx.accessible(RoleField::Read)))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        check_superuser(cx, || {
            if payload.is_empty() {
                return Ok(true);
            }
            Ok(cx.check_related_mandatory(
                "workflow_job_template",
                ResourceType::WorkflowJobTemplate,
                RoleField::Admin,
                Some(payload),
                None,
            )? && cx.check_related(
                "unified_job_template",
                ResourceType::UnifiedJobTemplate,
                RoleField::Execute,
                Some(payload),
                None,
            )? && can_use_prompts(cx, payload)?)
        })
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        check_superuser(cx, || {
            if !Self::wfjt_admin(cx, obj) {
                return Ok(false);
            }
            let Some(payload) = payload.filter(|p| !p.is_empty()) else {
                return Ok(true);
            };
            Ok(cx.check_related(
                "unified_job_template",
                ResourceType::UnifiedJobTemplate,
                RoleField::Execute,
                Some(payload),
                Some(obj),
            )? && can_use_prompts(cx, payload)?)
        })
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || Ok(Self::wfjt_admin(cx, obj)))
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
        check_superuser(cx, || {
            if !Self::wfjt_admin(cx, obj) {
                return Ok(false);
            }
            if relationship == "credentials" {
                return Ok(Self::ujt_execute(cx, obj)? && cx.in_role(sub_obj, RoleField::Use));
            }
            if let Some(allowed) = Self::can_change_link(obj, sub_obj, relationship) {
                return Ok(allowed);
            }
            if skip_sub_read_check {
                return Ok(true);
            }
            cx.can_read(sub_obj)
        })
    }

    fn can_unattach(
        &self,
        cx: &AccessContext<'_>,
        obj: &Resource,
        sub_obj: &Resource,
        relationship: &str,
        _payload: Option<&Payload>,
        _skip_sub_read_check: bool,
    ) -> Result<bool> {
        check_superuser(cx, || {
            if !Self::wfjt_admin(cx, obj) {
                return Ok(false);
            }
            if relationship == "credentials" {
                return Self::ujt_execute(cx, obj);
            }
            Ok(Self::can_change_link(obj, sub_obj, relationship).unwrap_or(true))
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Workflow Job
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct WorkflowJobPolicy;

impl Policy for WorkflowJobPolicy {
    fn name(&self) -> &'static str {
        "workflow_job"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(Query::related("workflow_job_template", cx.accessible(RoleField::Read))
            .or(in_audited_organization(cx, &[]))
            .or(in_audited_organization(cx, &["workflow_job_template"])))
    }

    fn can_add(&self, _cx: &AccessContext<'_>, _payload: &Payload) -> Result<bool> {
        Ok(false)
    }

    fn can_change(&self, _cx: &AccessContext<'_>, _obj: &Resource, _payload: Option<&Payload>) -> Result<bool> {
        Ok(false)
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || {
            Ok(cx
                .follow(obj, &["workflow_job_template", "organization"])
                .map(|org| cx.in_role(&org, RoleField::WorkflowAdmin))
                .unwrap_or(false))
        })
    }

    /// Relaunch.
    fn can_start(&self, cx: &AccessContext<'_>, obj: &Resource, validate_license: bool) -> Result<bool> {
        if validate_license {
            check_license(cx, LicenseCheck::default())?;
        }
        check_superuser(cx, || {
            let Some(template) = cx.related(obj, "workflow_job_template") else {
                return Ok(false);
            };
            if obj.attr_bool("secret_prompts") && !obj.is_created_by(cx.principal()) {
                return Err(AccessError::permission_denied(
                    "Job was launched with secret prompts provided by another user.",
                ));
            }
            if !cx.in_role(&template, RoleField::Execute) {
                return Ok(false);
            }
            match obj.attr("launch_config") {
                Some(config) => can_use_prompts(cx, &Payload::from_value(config.clone())?),
                None => Ok(true),
            }
        })
    }

    fn can_cancel(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        if !is_cancelable(obj) {
            return Ok(false);
        }
        check_superuser(cx, || Ok(obj.is_created_by(cx.principal()) || self.can_delete(cx, obj)?))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Workflow Job Node
// ═══════════════════════════════════════════════════════════════════════════════

/// Runtime nodes are read-only copies of template nodes.
#[derive(Debug, Default)]
pub struct WorkflowJobNodePolicy;

impl Policy for WorkflowJobNodePolicy {
    fn name(&self) -> &'static str {
        "workflow_job_node"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        let jobs = cx.registry().resolve(ResourceType::WorkflowJob)?.filtered_query(cx)?;
        Ok(Query::related("workflow_job", jobs))
    }

    fn can_add(&self, _cx: &AccessContext<'_>, _payload: &Payload) -> Result<bool> {
        Ok(false)
    }

    fn can_change(&self, _cx: &AccessContext<'_>, _obj: &Resource, _payload: Option<&Payload>) -> Result<bool> {
        Ok(false)
    }

    fn can_delete(&self, _cx: &AccessContext<'_>, _obj: &Resource) -> Result<bool> {
        Ok(false)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Workflow Approval
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct WorkflowApprovalPolicy;

impl Policy for WorkflowApprovalPolicy {
    fn name(&self) -> &'static str {
        "workflow_approval"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(Query::related("workflow_job_template", cx.accessible(RoleField::Read)))
    }

    fn can_approve_or_deny(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || {
            Ok(cx.in_related_role(obj, "workflow_job_template", RoleField::Approval))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::ResourceRef;

    fn node(id: u64, workflow: u64) -> Resource {
        Resource::new(ResourceType::WorkflowJobTemplateNode, id, format!("node-{}", id))
            .with_relation("workflow_job_template", ResourceRef::new(ResourceType::WorkflowJobTemplate, workflow))
    }

    #[test]
    fn test_node_links_stay_in_one_workflow() {
        let a = node(1, 10);
        let b = node(2, 10);
        let c = node(3, 11);
        assert_eq!(WorkflowJobTemplateNodePolicy::can_change_link(&a, &b, "success_nodes"), Some(true));
        assert_eq!(WorkflowJobTemplateNodePolicy::can_change_link(&a, &c, "always_nodes"), Some(false));
        assert_eq!(WorkflowJobTemplateNodePolicy::can_change_link(&a, &b, "credentials"), None);
    }
}
