//! Built-in policies, one per resource type.

mod credential;
mod events;
mod identity;
mod inventory;
mod notification;
mod organization;
mod platform;
mod project;
mod templates;
mod unified;
mod workflow;

pub use credential::{CredentialInputSourcePolicy, CredentialPolicy, CredentialTypePolicy};
pub use events::{JobEventPolicy, JobHostSummaryPolicy};
pub use identity::{RolePolicy, TeamPolicy, UserPolicy};
pub use inventory::{GroupPolicy, HostPolicy, InventoryPolicy, InventorySourcePolicy, InventoryUpdatePolicy};
pub use notification::{NotificationPolicy, NotificationTemplatePolicy};
pub use organization::OrganizationPolicy;
pub use platform::{
    ActivityStreamPolicy, ExecutionEnvironmentPolicy, InstanceGroupPolicy, InstancePolicy, LabelPolicy,
    SchedulePolicy,
};
pub use project::{ProjectPolicy, ProjectUpdatePolicy};
pub use templates::{
    AdHocCommandPolicy, JobPolicy, JobTemplatePolicy, SystemJobPolicy, SystemJobTemplatePolicy,
};
pub use unified::{UnifiedJobPolicy, UnifiedJobTemplatePolicy};
pub use workflow::{
    WorkflowApprovalPolicy, WorkflowJobNodePolicy, WorkflowJobPolicy, WorkflowJobTemplateNodePolicy,
    WorkflowJobTemplatePolicy,
};

use serde_json::Value;

use crate::access::context::AccessContext;
use crate::access::payload::Payload;
use crate::access::registry::PolicyRegistry;
use crate::error::Result;
use crate::rbac::models::{Resource, ResourceType, RoleField};
use crate::store::Query;

/// Register every built-in policy.
pub fn register_all(registry: &mut PolicyRegistry) {
    use ResourceType as T;

    registry.register(T::Organization, OrganizationPolicy);
    registry.register(T::User, UserPolicy);
    registry.register(T::Team, TeamPolicy);
    registry.register(T::Role, RolePolicy);
    registry.register(T::Inventory, InventoryPolicy);
    registry.register(T::Host, HostPolicy);
    registry.register(T::Group, GroupPolicy);
    registry.register(T::InventorySource, InventorySourcePolicy);
    registry.register(T::InventoryUpdate, InventoryUpdatePolicy);
    registry.register(T::Credential, CredentialPolicy);
    registry.register(T::CredentialType, CredentialTypePolicy);
    registry.register(T::CredentialInputSource, CredentialInputSourcePolicy);
    registry.register(T::Project, ProjectPolicy);
    registry.register(T::ProjectUpdate, ProjectUpdatePolicy);
    registry.register(T::JobTemplate, JobTemplatePolicy);
    registry.register(T::Job, JobPolicy);
    registry.register(T::JobEvent, JobEventPolicy);
    registry.register(T::JobHostSummary, JobHostSummaryPolicy);
    registry.register(T::AdHocCommand, AdHocCommandPolicy);
    registry.register(T::SystemJobTemplate, SystemJobTemplatePolicy);
    registry.register(T::SystemJob, SystemJobPolicy);
    registry.register(T::WorkflowJobTemplate, WorkflowJobTemplatePolicy);
    registry.register(T::WorkflowJobTemplateNode, WorkflowJobTemplateNodePolicy);
    registry.register(T::WorkflowJob, WorkflowJobPolicy);
    registry.register(T::WorkflowJobNode, WorkflowJobNodePolicy);
    registry.register(T::WorkflowApproval, WorkflowApprovalPolicy);
    registry.register(T::NotificationTemplate, NotificationTemplatePolicy);
    registry.register(T::Notification, NotificationPolicy);
    registry.register(T::Label, LabelPolicy);
    registry.register(T::Schedule, SchedulePolicy);
    registry.register(T::InstanceGroup, InstanceGroupPolicy);
    registry.register(T::Instance, InstancePolicy);
    registry.register(T::ExecutionEnvironment, ExecutionEnvironmentPolicy);
    registry.register(T::ActivityStream, ActivityStreamPolicy);
    registry.register(T::UnifiedJobTemplate, UnifiedJobTemplatePolicy);
    registry.register(T::UnifiedJob, UnifiedJobPolicy);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Shared helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Job statuses that can still be canceled.
const CANCELABLE_STATUSES: [&str; 4] = ["new", "pending", "waiting", "running"];

pub(crate) fn is_cancelable(job: &Resource) -> bool {
    job.attr_str("status")
        .map(|status| CANCELABLE_STATUSES.contains(&status))
        .unwrap_or(false)
}

/// Read a boolean flag from a payload, accepting `"true"`/`"false"` strings.
pub(crate) fn payload_flag(payload: Option<&Payload>, key: &str) -> bool {
    match payload.and_then(|p| p.get(key)) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        Some(Value::Number(n)) => n.as_i64().map(|n| n != 0).unwrap_or(false),
        _ => false,
    }
}

/// Organizations where the principal is admin or auditor.
pub(crate) fn admin_or_auditor_orgs(cx: &AccessContext<'_>) -> Query {
    cx.accessible(RoleField::Admin).or(cx.accessible(RoleField::Auditor))
}

/// The query matching resources whose organization the principal
/// administers or audits, or `Query::None` when there are none.
pub(crate) fn in_audited_organization(cx: &AccessContext<'_>, relation_path: &[&str]) -> Query {
    if cx.filter(ResourceType::Organization, &admin_or_auditor_orgs(cx)).is_empty() {
        return Query::None;
    }
    relation_path
        .iter()
        .rev()
        .fold(Query::related("organization", admin_or_auditor_orgs(cx)), |inner, relation| {
            Query::related(*relation, inner)
        })
}

/// Whether a payload changes a relation of `obj` to a different id.
///
/// Absent or unparsable values count as no change.
pub(crate) fn moves_relation(payload: Option<&Payload>, obj: &Resource, field: &str) -> bool {
    let Some(new) = payload.and_then(|p| p.related_id(field).ok().flatten()) else {
        return false;
    };
    obj.relation(field).map(|current| current.id) != Some(new)
}

/// An execution environment named in a payload must be readable.
pub(crate) fn environment_readable(cx: &AccessContext<'_>, payload: Option<&Payload>, field: &str) -> Result<bool> {
    let Some(id) = payload.map(|p| p.related_id(field)).transpose()?.flatten() else {
        return Ok(true);
    };
    let environment = cx.get_or_400(ResourceType::ExecutionEnvironment, id, field)?;
    cx.can_read(&environment)
}

/// The visibility filter of every concrete kind, for abstract and
/// cross-type queries.
pub(crate) fn by_kind_visibility(cx: &AccessContext<'_>, kinds: &[ResourceType]) -> Result<Query> {
    let mut branches = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let policy = cx.registry().resolve(*kind)?;
        branches.push((*kind, policy.visibility_filter(cx)?));
    }
    Ok(Query::ByKind(branches))
}
