//! Job templates and the jobs they launch.

use serde_json::Value;

use crate::access::context::AccessContext;
use crate::access::license::{check_license, check_org_host_limit, LicenseCheck};
use crate::access::payload::Payload;
use crate::access::policy::{check_superuser, Policy};
use crate::access::related::RelatedField;
use crate::error::{AccessError, ErrorCode, Result};
use crate::rbac::models::{Resource, ResourceType, RoleField};
use crate::store::Query;

use super::notification::{can_attach_notification, is_notification_relationship};
use super::{environment_readable, in_audited_organization, is_cancelable};

/// Fields a job template admin may edit without rights on the template's
/// inventory, project or credentials.
const NON_SENSITIVE_FIELDS: &[&str] = &[
    "name",
    "description",
    "forks",
    "limit",
    "verbosity",
    "extra_vars",
    "job_tags",
    "force_handlers",
    "skip_tags",
    "ask_variables_on_launch",
    "ask_tags_on_launch",
    "ask_job_type_on_launch",
    "ask_skip_tags_on_launch",
    "ask_inventory_on_launch",
    "ask_credential_on_launch",
    "survey_enabled",
    "diff_mode",
    "timeout",
    "job_slice_count",
    "last_job_run",
    "created",
    "modified",
];

/// Template fields that point at other resources.
const TEMPLATE_RELATIONS: &[&str] = &[
    "inventory",
    "project",
    "organization",
    "execution_environment",
    "webhook_credential",
];

/// Whether the principal may use every resource a launch configuration
/// supplies: inventory, credentials and execution environment.
pub(crate) fn can_use_prompts(cx: &AccessContext<'_>, prompts: &Payload) -> Result<bool> {
    if !cx.check_related("inventory", ResourceType::Inventory, RoleField::Use, Some(prompts), None)? {
        return Ok(false);
    }
    for id in prompts.related_ids("credentials")? {
        let credential = cx.get_or_400(ResourceType::Credential, id, "credentials")?;
        if !(cx.is_superuser() || cx.in_role(&credential, RoleField::Use)) {
            return Ok(false);
        }
    }
    environment_readable(cx, Some(prompts), "execution_environment")
}

/// The `ask_*_on_launch` flag that allows a prompted field.
fn prompt_flag(field: &str) -> String {
    match field {
        "extra_vars" | "extra_data" => "ask_variables_on_launch".to_string(),
        "credentials" => "ask_credential_on_launch".to_string(),
        "job_tags" => "ask_tags_on_launch".to_string(),
        other => format!("ask_{}_on_launch", other),
    }
}

/// Prompted fields the template no longer accepts.
fn has_unprompted(prompts: &Payload, template: &Resource) -> bool {
    prompts.keys().any(|field| !template.attr_bool(&prompt_flag(field)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Template
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct JobTemplatePolicy;

impl JobTemplatePolicy {
    /// True when every submitted field either is on the allow list or keeps
    /// its current value.
    fn changes_are_non_sensitive(obj: &Resource, payload: &Payload) -> bool {
        payload.keys().all(|field| {
            if NON_SENSITIVE_FIELDS.contains(&field) {
                return true;
            }
            if TEMPLATE_RELATIONS.contains(&field) {
                let current = obj.relation(field).map(|r| r.id);
                return match payload.get(field) {
                    // '' and null both clear a relation
                    Some(Value::String(s)) if s.is_empty() => current.is_none(),
                    _ => payload.related_id(field).ok() == Some(current),
                };
            }
            obj.attributes.get(field).unwrap_or(&Value::Null) == payload.get(field).unwrap_or(&Value::Null)
        })
    }
}

impl Policy for JobTemplatePolicy {
    fn name(&self) -> &'static str {
        "job_template"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &[
            "instance_groups",
            "credentials",
            "labels",
            "notification_templates_started",
            "notification_templates_success",
            "notification_templates_error",
        ]
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(cx.accessible(RoleField::Read))
    }

    /// A new template needs use of its project, and of its inventory when
    /// one is given.
    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        if payload.is_empty() {
            return Ok(cx.is_superuser() || cx.has_any(ResourceType::Project, RoleField::Use));
        }
        if cx.is_superuser() {
            return Ok(true);
        }
        if !cx.check_related("inventory", ResourceType::Inventory, RoleField::Use, Some(payload), None)? {
            return Ok(false);
        }
        if !environment_readable(cx, Some(payload), "execution_environment")? {
            return Ok(false);
        }
        cx.check_related_mandatory("project", ResourceType::Project, RoleField::Use, Some(payload), None)
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        if cx.is_superuser() {
            return Ok(true);
        }
        if !cx.in_role(obj, RoleField::Admin) {
            return Ok(false);
        }
        let Some(payload) = payload else {
            return Ok(true);
        };
        if Self::changes_are_non_sensitive(obj, payload) {
            return Ok(true);
        }
        for (field, kind) in [("inventory", ResourceType::Inventory), ("project", ResourceType::Project)] {
            let mut related = RelatedField::new(field, kind, RoleField::Use);
            if obj.relation(field).is_some() {
                related = related.mandatory();
            }
            if !related.check(cx, Some(payload), Some(obj))? {
                return Ok(false);
            }
        }
        environment_readable(cx, Some(payload), "execution_environment")
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_role(obj, RoleField::Admin)))
    }

    fn can_start(&self, cx: &AccessContext<'_>, obj: &Resource, validate_license: bool) -> Result<bool> {
        if validate_license {
            check_license(cx, LicenseCheck::default())?;
            if let Some(inventory) = cx.related(obj, "inventory") {
                check_org_host_limit(cx, &inventory, None)?;
            }
        }
        check_superuser(cx, || Ok(cx.in_role(obj, RoleField::Execute)))
    }

    /// Every credential on the template must be usable by whoever copies it.
    fn can_copy_related(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || {
            let blocked: Vec<String> = cx
                .collection(obj, "credentials")
                .into_iter()
                .filter(|credential| !cx.in_role(credential, RoleField::Use))
                .map(|credential| credential.name)
                .collect();
            if blocked.is_empty() {
                return Ok(true);
            }
            for name in blocked {
                cx.add_message("credentials", name);
            }
            Err(AccessError::permission_denied("Insufficient access to Job Template credentials."))
        })
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
        match relationship {
            // Running on an instance group is a use of the template's inventory.
            "instance_groups" => check_superuser(cx, || {
                if !cx.in_role(obj, RoleField::Admin) || !cx.can_read(sub_obj)? {
                    return Ok(false);
                }
                Ok(match cx.related(obj, "inventory") {
                    Some(inventory) => cx.in_role(&inventory, RoleField::Use),
                    None => true,
                })
            }),
            "credentials" if sub_obj.kind == ResourceType::Credential => check_superuser(cx, || {
                Ok(cx.in_role(obj, RoleField::Admin) && cx.in_role(sub_obj, RoleField::Use))
            }),
            rel if is_notification_relationship(rel) => {
                can_attach_notification(cx, sub_obj, || self.can_change(cx, obj, None))
            }
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
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job
// ═══════════════════════════════════════════════════════════════════════════════

/// Jobs launched from job templates.
///
/// Visible through the template, or to admins and auditors of the
/// organization the job ran in, so orphaned jobs stay reachable.
#[derive(Debug, Default)]
pub struct JobPolicy;

impl JobPolicy {
    /// The organization a job belongs to: its own, else its template's,
    /// inventory's or project's.
    fn organization(cx: &AccessContext<'_>, obj: &Resource) -> Option<Resource> {
        cx.organization_of(obj)
            .or_else(|| cx.follow(obj, &["job_template", "organization"]))
            .or_else(|| cx.follow(obj, &["inventory", "organization"]))
            .or_else(|| cx.follow(obj, &["project", "organization"]))
    }

    fn launch_config(obj: &Resource) -> Result<Option<Payload>> {
        match obj.attr("launch_config") {
            None => Ok(None),
            Some(config) => Payload::from_value(config.clone()).map(Some),
        }
    }

    /// Relaunch rights derived from organization-level roles, for when
    /// template execute rights alone are not enough.
    fn equivalent_template_access(cx: &AccessContext<'_>, obj: &Resource) -> bool {
        let org_access = cx
            .follow(obj, &["inventory", "organization"])
            .map(|org| cx.in_role(&org, RoleField::InventoryAdmin))
            .unwrap_or(false);
        let project_access = match cx.related(obj, "project") {
            Some(project) => cx.in_role(&project, RoleField::Admin),
            None => true,
        };
        let credential_access = cx
            .collection(obj, "credentials")
            .iter()
            .all(|credential| cx.in_role(credential, RoleField::Use));
        org_access && project_access && credential_access
    }
}

impl Policy for JobPolicy {
    fn name(&self) -> &'static str {
        "job"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        let through_template = Query::related("job_template", cx.accessible(RoleField::Read));
        Ok(through_template
            .or(in_audited_organization(cx, &[]))
            .or(in_audited_organization(cx, &["inventory"]))
            .or(in_audited_organization(cx, &["project"])))
    }

    fn can_add(&self, _cx: &AccessContext<'_>, _payload: &Payload) -> Result<bool> {
        Err(AccessError::new(
            ErrorCode::UnsupportedOperation,
            "Jobs are created by launching a job template.",
        ))
    }

    fn can_change(&self, _cx: &AccessContext<'_>, _obj: &Resource, _payload: Option<&Payload>) -> Result<bool> {
        Err(AccessError::new(ErrorCode::UnsupportedOperation, "Jobs cannot be edited."))
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || {
            Ok(Self::organization(cx, obj)
                .map(|org| cx.in_role(&org, RoleField::Admin))
                .unwrap_or(false))
        })
    }

    /// Relaunch.
    fn can_start(&self, cx: &AccessContext<'_>, obj: &Resource, validate_license: bool) -> Result<bool> {
        if validate_license {
            check_license(cx, LicenseCheck::default())?;
        }
        if cx.is_superuser() {
            return Ok(true);
        }

        let config = Self::launch_config(obj)?;
        let template = cx.related(obj, "job_template");

        if let Some(template) = &template {
            let prompts_access = match &config {
                None => false,
                Some(prompts) if prompts.is_empty() => true,
                Some(_) if obj.attr_bool("secret_prompts") && !obj.is_created_by(cx.principal()) => {
                    return Err(AccessError::permission_denied(
                        "Job was launched with secret prompts provided by another user.",
                    ));
                }
                Some(prompts) => can_use_prompts(cx, prompts)? && !has_unprompted(prompts, template),
            };
            let template_access = cx.in_role(template, RoleField::Execute);
            if prompts_access && template_access {
                return Ok(true);
            }
            if !template_access {
                return Ok(false);
            }
        }

        let allowed = Self::equivalent_template_access(cx, obj);
        if !allowed && !cx.has_messages() {
            let pretext = if template.is_none() {
                "Job has been orphaned from its job template and organization."
            } else if config.is_none() {
                "Job was launched with unknown prompted fields. Organization admin permissions required."
            } else {
                "Job was launched with prompted fields you do not have access to."
            };
            cx.add_message(
                "detail",
                format!("{} You do not have permission to relaunch it.", pretext),
            );
        }
        Ok(allowed)
    }

    fn can_cancel(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        if !is_cancelable(obj) {
            return Ok(false);
        }
        check_superuser(cx, || {
            if obj.is_created_by(cx.principal()) {
                return Ok(true);
            }
            if let Some(template) = cx.related(obj, "job_template") {
                return Ok(cx.in_role(&template, RoleField::Admin));
            }
            Ok(cx.in_related_role(obj, "organization", RoleField::JobTemplateAdmin))
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Ad Hoc Command
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct AdHocCommandPolicy;

impl AdHocCommandPolicy {
    fn launch(cx: &AccessContext<'_>, payload: &Payload, validate_license: bool) -> Result<bool> {
        if payload.is_empty() {
            return Ok(false);
        }
        if validate_license {
            check_license(cx, LicenseCheck::default())?;
        }
        check_superuser(cx, || {
            Ok(
                cx.check_related("credential", ResourceType::Credential, RoleField::Use, Some(payload), None)?
                    && cx.check_related("inventory", ResourceType::Inventory, RoleField::Adhoc, Some(payload), None)?,
            )
        })
    }
}

impl Policy for AdHocCommandPolicy {
    fn name(&self) -> &'static str {
        "ad_hoc_command"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(Query::related("inventory", cx.accessible(RoleField::Read)))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        Self::launch(cx, payload, true)
    }

    fn can_change(&self, _cx: &AccessContext<'_>, _obj: &Resource, _payload: Option<&Payload>) -> Result<bool> {
        Ok(false)
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || {
            Ok(cx
                .follow(obj, &["inventory", "organization"])
                .map(|org| cx.in_role(&org, RoleField::Admin))
                .unwrap_or(false))
        })
    }

    /// Relaunch with the same inventory and credential.
    fn can_start(&self, cx: &AccessContext<'_>, obj: &Resource, validate_license: bool) -> Result<bool> {
        let mut payload = Payload::new();
        for field in ["credential", "inventory"] {
            if let Some(target) = obj.relation(field) {
                payload = payload.with(field, target.id.0);
            }
        }
        Self::launch(cx, &payload, validate_license)
    }

    fn can_cancel(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        if !is_cancelable(obj) {
            return Ok(false);
        }
        check_superuser(cx, || {
            Ok(obj.is_created_by(cx.principal()) || cx.in_related_role(obj, "inventory", RoleField::Admin))
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// System Jobs
// ═══════════════════════════════════════════════════════════════════════════════

/// Built-in maintenance templates; superusers only.
#[derive(Debug, Default)]
pub struct SystemJobTemplatePolicy;

impl Policy for SystemJobTemplatePolicy {
    fn name(&self) -> &'static str {
        "system_job_template"
    }
}

#[derive(Debug, Default)]
pub struct SystemJobPolicy;

impl Policy for SystemJobPolicy {
    fn name(&self) -> &'static str {
        "system_job"
    }

    /// System jobs are never relaunched.
    fn can_start(&self, _cx: &AccessContext<'_>, _obj: &Resource, _validate_license: bool) -> Result<bool> {
        Ok(false)
    }

    fn can_cancel(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        Ok(is_cancelable(obj) && cx.is_superuser())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::ResourceRef;
    use serde_json::json;

    fn template() -> Resource {
        Resource::new(ResourceType::JobTemplate, 1, "deploy")
            .with_relation("inventory", ResourceRef::new(ResourceType::Inventory, 3))
            .with_relation("project", ResourceRef::new(ResourceType::Project, 4))
            .with_attr("playbook", "site.yml")
            .with_attr("ask_inventory_on_launch", true)
    }

    #[test]
    fn test_non_sensitive_changes() {
        let jt = template();
        let rename = Payload::new().with("name", "deploy-2").with("forks", 10);
        assert!(JobTemplatePolicy::changes_are_non_sensitive(&jt, &rename));

        let same_inventory = Payload::new().with("inventory", "3").with("playbook", "site.yml");
        assert!(JobTemplatePolicy::changes_are_non_sensitive(&jt, &same_inventory));

        let new_inventory = Payload::new().with("inventory", 9);
        assert!(!JobTemplatePolicy::changes_are_non_sensitive(&jt, &new_inventory));

        let new_playbook = Payload::new().with("playbook", "other.yml");
        assert!(!JobTemplatePolicy::changes_are_non_sensitive(&jt, &new_playbook));
    }

    #[test]
    fn test_unprompted_fields() {
        let jt = template();
        let allowed = Payload::from_value(json!({"inventory": 3})).unwrap();
        assert!(!has_unprompted(&allowed, &jt));

        let denied = Payload::from_value(json!({"extra_vars": {"a": 1}})).unwrap();
        assert!(has_unprompted(&denied, &jt));
    }

    #[test]
    fn test_prompt_flag_names() {
        assert_eq!(prompt_flag("credentials"), "ask_credential_on_launch");
        assert_eq!(prompt_flag("limit"), "ask_limit_on_launch");
    }
}
