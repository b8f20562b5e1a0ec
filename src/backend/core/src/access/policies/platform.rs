//! Platform-level resources: capacity, execution environments, labels,
//! schedules and the activity stream.

use std::collections::BTreeSet;

use crate::access::context::AccessContext;
use crate::access::payload::Payload;
use crate::access::policy::{check_superuser, Policy};
use crate::error::{AccessError, Result};
use crate::rbac::models::{Resource, ResourceId, ResourceType, RoleField};
use crate::store::Query;

use super::by_kind_visibility;
use super::templates::can_use_prompts;

// ═══════════════════════════════════════════════════════════════════════════════
// Instance Group
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct InstanceGroupPolicy;

impl Policy for InstanceGroupPolicy {
    fn name(&self) -> &'static str {
        "instance_group"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &["instances"]
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(cx.accessible(RoleField::Read))
    }

    fn can_use(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_role(obj, RoleField::Use)))
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, _payload: Option<&Payload>) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_role(obj, RoleField::Admin)))
    }

    /// The built-in control plane and default groups are never deleted.
    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        if cx.settings().is_reserved_instance_group(&obj.name) {
            return Ok(false);
        }
        self.can_change(cx, obj, None)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Instance
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct InstancePolicy;

impl Policy for InstancePolicy {
    fn name(&self) -> &'static str {
        "instance"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &["instance_groups"]
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(Query::any_related("instance_groups", cx.accessible(RoleField::Read)))
    }

    fn can_attach(
        &self,
        cx: &AccessContext<'_>,
        _obj: &Resource,
        _sub_obj: &Resource,
        _relationship: &str,
        _payload: Option<&Payload>,
        _skip_sub_read_check: bool,
    ) -> Result<bool> {
        Ok(cx.is_superuser())
    }

    fn can_unattach(
        &self,
        cx: &AccessContext<'_>,
        _obj: &Resource,
        _sub_obj: &Resource,
        _relationship: &str,
        _payload: Option<&Payload>,
        _skip_sub_read_check: bool,
    ) -> Result<bool> {
        Ok(cx.is_superuser())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Execution Environment
// ═══════════════════════════════════════════════════════════════════════════════

/// Global environments (no organization) are readable by everyone;
/// organization environments follow the organization.
#[derive(Debug, Default)]
pub struct ExecutionEnvironmentPolicy;

impl Policy for ExecutionEnvironmentPolicy {
    fn name(&self) -> &'static str {
        "execution_environment"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(Query::related("organization", cx.accessible(RoleField::Read))
            .or(Query::RelationIsNull("organization".to_string())))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        check_superuser(cx, || {
            cx.check_related_mandatory(
                "organization",
                ResourceType::Organization,
                RoleField::ExecutionEnvironmentAdmin,
                Some(payload),
                None,
            )
        })
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        check_superuser(cx, || {
            if obj.attr_bool("managed") || obj.relation("organization").is_none() {
                return Ok(false);
            }
            if !cx.in_related_role(obj, "organization", RoleField::ExecutionEnvironmentAdmin) {
                return Ok(false);
            }
            cx.check_related_mandatory(
                "organization",
                ResourceType::Organization,
                RoleField::ExecutionEnvironmentAdmin,
                payload,
                Some(obj),
            )
        })
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        if obj.attr_bool("managed") {
            return Err(AccessError::permission_denied(
                "Cannot delete a managed execution environment.",
            ));
        }
        self.can_change(cx, obj, None)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Label
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct LabelPolicy;

impl Policy for LabelPolicy {
    fn name(&self) -> &'static str {
        "label"
    }

    /// Labels of a readable organization, plus any label on a template the
    /// principal can read.
    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        let mut on_templates: BTreeSet<ResourceId> = BTreeSet::new();
        for kind in [ResourceType::JobTemplate, ResourceType::WorkflowJobTemplate] {
            for template in cx.filter(kind, &cx.accessible(RoleField::Read)) {
                on_templates.extend(template.collection("labels").iter().map(|label| label.id));
            }
        }
        Ok(Query::related("organization", cx.accessible(RoleField::Read)).or(Query::Ids(on_templates)))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        check_superuser(cx, || {
            if payload.is_empty() {
                return Ok(true);
            }
            cx.check_related_mandatory(
                "organization",
                ResourceType::Organization,
                RoleField::Member,
                Some(payload),
                None,
            )
        })
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, _payload: Option<&Payload>) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_related_role(obj, "organization", RoleField::Read)))
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        self.can_change(cx, obj, None)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Schedule
// ═══════════════════════════════════════════════════════════════════════════════

/// Schedules launch a unified job template with saved prompts.
#[derive(Debug, Default)]
pub struct SchedulePolicy;

impl SchedulePolicy {
    fn prompts_allowed(cx: &AccessContext<'_>, payload: Option<&Payload>) -> Result<bool> {
        match payload {
            Some(prompts) if !prompts.is_empty() => can_use_prompts(cx, prompts),
            _ => Ok(true),
        }
    }
}

impl Policy for SchedulePolicy {
    fn name(&self) -> &'static str {
        "schedule"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        let templates = by_kind_visibility(cx, &ResourceType::UNIFIED_JOB_TEMPLATES)?;
        Ok(Query::related("unified_job_template", templates))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        check_superuser(cx, || {
            if !Self::prompts_allowed(cx, Some(payload))? {
                return Ok(false);
            }
            if payload.is_empty() {
                return Ok(cx.has_any(ResourceType::JobTemplate, RoleField::Execute)
                    || cx.has_any(ResourceType::WorkflowJobTemplate, RoleField::Execute));
            }
            cx.check_related_mandatory(
                "unified_job_template",
                ResourceType::UnifiedJobTemplate,
                RoleField::Execute,
                Some(payload),
                None,
            )
        })
    }

    /// Template admins manage every schedule; creators keep their own while
    /// they can still execute the template.
    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        check_superuser(cx, || {
            if !Self::prompts_allowed(cx, payload)? {
                return Ok(false);
            }
            if cx.check_related_mandatory(
                "unified_job_template",
                ResourceType::UnifiedJobTemplate,
                RoleField::Admin,
                payload,
                Some(obj),
            )? {
                return Ok(true);
            }
            Ok(obj.is_created_by(cx.principal())
                && cx.check_related_mandatory(
                    "unified_job_template",
                    ResourceType::UnifiedJobTemplate,
                    RoleField::Execute,
                    payload,
                    Some(obj),
                )?)
        })
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        self.can_change(cx, obj, Some(&Payload::new()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Activity Stream
// ═══════════════════════════════════════════════════════════════════════════════

/// The audit log. Entries are visible to their actor and to anyone who
/// can see one of the objects they touch; nobody edits them.
#[derive(Debug, Default)]
pub struct ActivityStreamPolicy;

impl Policy for ActivityStreamPolicy {
    fn name(&self) -> &'static str {
        "activity_stream"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        let kinds: Vec<ResourceType> = ResourceType::ALL
            .into_iter()
            .filter(|kind| !kind.is_abstract() && *kind != ResourceType::ActivityStream)
            .collect();
        let own = Query::related("actor", Query::ids([ResourceId(cx.principal().id.0)]));
        Ok(own.or(Query::any_related("objects", by_kind_visibility(cx, &kinds)?)))
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
