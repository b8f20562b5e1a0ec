//! UI capability bundles derived from point checks.
//!
//! Capabilities are evaluated in a fixed order so later ones can reuse
//! earlier results (`delete` from `edit`, `schedule` from `start`). Every
//! value equals the matching point check except where a shortcut below
//! says otherwise.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

use crate::access::context::AccessContext;
use crate::access::policy::{dispatch, Action, ActionArgs, Policy};
use crate::error::Result;
use crate::rbac::models::{PrincipalId, Resource, ResourceRef, ResourceType, RoleField};

/// A UI-facing capability name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Edit,
    Delete,
    Start,
    Schedule,
    Copy,
    Adhoc,
    Unattach,
}

impl Capability {
    /// Evaluation order.
    pub const ORDER: [Capability; 7] = [
        Self::Edit,
        Self::Delete,
        Self::Start,
        Self::Schedule,
        Self::Copy,
        Self::Adhoc,
        Self::Unattach,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Start => "start",
            Self::Schedule => "schedule",
            Self::Copy => "copy",
            Self::Adhoc => "adhoc",
            Self::Unattach => "unattach",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ORDER.iter().copied().find(|c| c.as_str() == s)
    }

    /// The point-check action a capability maps to.
    pub fn action(&self) -> Action {
        match self {
            Self::Edit => Action::Change,
            Self::Delete => Action::Delete,
            Self::Start | Self::Schedule => Action::Start,
            Self::Copy => Action::Copy,
            Self::Adhoc => Action::RunAdHocCommands,
            Self::Unattach => Action::Unattach,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computed capability values keyed by name.
pub type Capabilities = BTreeMap<String, bool>;

/// Per-request capability results.
///
/// Created by the caller and passed into every aggregation for the same
/// request, so values computed for one serializer field are reused by the
/// next. Entries are keyed by principal and object (and sibling, for
/// `unattach`), so one cache can serve a whole list response. Never share
/// one across requests.
#[derive(Debug, Default, Clone)]
pub struct CapabilityCache {
    values: HashMap<CacheKey, bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    principal: PrincipalId,
    object: ResourceRef,
    sibling: Option<ResourceRef>,
    capability: Capability,
}

impl CacheKey {
    fn new(principal: PrincipalId, object: ResourceRef, sibling: Option<ResourceRef>, capability: Capability) -> Self {
        Self {
            principal,
            object,
            sibling: sibling.filter(|_| capability == Capability::Unattach),
            capability,
        }
    }
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        principal: PrincipalId,
        obj: ResourceRef,
        sibling: Option<ResourceRef>,
        capability: Capability,
    ) -> Option<bool> {
        self.values
            .get(&CacheKey::new(principal, obj, sibling, capability))
            .copied()
    }

    pub fn insert(
        &mut self,
        principal: PrincipalId,
        obj: ResourceRef,
        sibling: Option<ResourceRef>,
        capability: Capability,
        value: bool,
    ) {
        self.values
            .insert(CacheKey::new(principal, obj, sibling, capability), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Kinds whose `delete` is computed on its own instead of copying `edit`.
fn deletes_independently(kind: ResourceType) -> bool {
    kind == ResourceType::User || kind == ResourceType::CredentialInputSource || kind.is_unified_job()
}

/// Capabilities forced to a value by the object's shape, ahead of any
/// role lookup.
fn validation_shortcut(cx: &AccessContext<'_>, obj: &Resource, capability: Capability) -> Option<bool> {
    if !cx.settings().manage_organization_auth && matches!(obj.kind, ResourceType::User | ResourceType::Team) {
        return Some(cx.is_superuser());
    }
    match (obj.kind, capability) {
        (ResourceType::JobTemplate, Capability::Copy | Capability::Start | Capability::Schedule)
            if has_validation_errors(obj) =>
        {
            Some(false)
        }
        (ResourceType::WorkflowJobTemplate | ResourceType::WorkflowJob, Capability::Copy)
            if obj.organization_id().is_none() =>
        {
            Some(cx.is_superuser())
        }
        (ResourceType::Project, Capability::Start | Capability::Schedule | Capability::Copy)
            if is_manual_project(obj) =>
        {
            Some(false)
        }
        _ => None,
    }
}

/// A job template that cannot launch as configured.
pub fn has_validation_errors(template: &Resource) -> bool {
    let missing_inventory =
        template.relation("inventory").is_none() && !template.attr_bool("ask_inventory_on_launch");
    let missing_project = template.relation("project").is_none();
    missing_inventory || missing_project
}

/// A project with no source control, which can never be updated.
pub fn is_manual_project(project: &Resource) -> bool {
    project.attr_str("scm_type").unwrap_or("").is_empty()
}

/// Compute the requested capabilities of `obj`.
///
/// Errors the aggregation tolerates (validation, denial, not found,
/// unsupported) fold to `false`; fatal errors propagate.
pub fn compute_capabilities(
    cx: &AccessContext<'_>,
    obj: &Resource,
    requested: &[Capability],
    sibling: Option<&Resource>,
    cache: &mut CapabilityCache,
) -> Result<Capabilities> {
    let policy = cx.registry().resolve(obj.kind)?;
    let principal = cx.principal().id;
    let target = obj.reference();
    let sibling_ref = sibling.map(Resource::reference);
    let mut result = Capabilities::new();

    for capability in Capability::ORDER {
        if !requested.contains(&capability) {
            continue;
        }

        if let Some(value) = validation_shortcut(cx, obj, capability) {
            result.insert(capability.as_str().to_string(), value);
            continue;
        }

        let value = match cache.get(principal, target, sibling_ref, capability) {
            Some(cached) => cached,
            None => {
                let computed = match capability {
                    Capability::Schedule => {
                        capability_value(cx, policy, obj, Capability::Start, sibling, cache)?
                    }
                    Capability::Delete if !deletes_independently(obj.kind) => {
                        capability_value(cx, policy, obj, Capability::Edit, sibling, cache)?
                    }
                    Capability::Copy if matches!(obj.kind, ResourceType::Group | ResourceType::Host) => {
                        capability_value(cx, policy, obj, Capability::Edit, sibling, cache)?
                    }
                    _ => capability_value(cx, policy, obj, capability, sibling, cache)?,
                };
                cache.insert(principal, target, sibling_ref, capability, computed);
                computed
            }
        };

        // Orphaned or inconsistent objects must never hide actions from a superuser.
        let value = value || cx.is_superuser();
        result.insert(capability.as_str().to_string(), value);
    }

    debug!(
        principal = %cx.principal().id,
        resource = %obj.reference(),
        capabilities = ?result,
        "Capabilities computed"
    );
    Ok(result)
}

/// One capability straight from the policy, memoized in `cache`.
fn capability_value(
    cx: &AccessContext<'_>,
    policy: &dyn Policy,
    obj: &Resource,
    capability: Capability,
    sibling: Option<&Resource>,
    cache: &mut CapabilityCache,
) -> Result<bool> {
    let (principal, target, sibling_ref) = (cx.principal().id, obj.reference(), sibling.map(Resource::reference));
    if let Some(cached) = cache.get(principal, target, sibling_ref, capability) {
        return Ok(cached);
    }
    let value = match method_capability(cx, policy, obj, capability, sibling) {
        Ok(value) => value,
        Err(err) if err.is_capability_tolerant() => {
            debug!(
                capability = capability.as_str(),
                code = ?err.code(),
                "Capability check failed, reporting false"
            );
            false
        }
        Err(err) => return Err(err),
    };
    cache.insert(principal, target, sibling_ref, capability, value);
    Ok(value)
}

fn method_capability(
    cx: &AccessContext<'_>,
    policy: &dyn Policy,
    obj: &Resource,
    capability: Capability,
    sibling: Option<&Resource>,
) -> Result<bool> {
    let action = capability.action();
    match capability {
        Capability::Start | Capability::Schedule => {
            dispatch(policy, cx, action, ActionArgs::on(obj).without_license_check())
        }
        Capability::Unattach => {
            let Some(sibling) = sibling else {
                return Ok(false);
            };
            if sibling.kind == ResourceType::Team {
                // Removing a team from a role detaches the team's member role.
                let Some(member_role) = sibling.role(RoleField::Member).and_then(|id| cx.store().role(id)) else {
                    return Ok(false);
                };
                let member = member_role.to_resource();
                let args = ActionArgs::on(obj)
                    .with_sub(&member, "parents")
                    .skip_sub_read_check();
                dispatch(policy, cx, action, args)
            } else {
                let args = ActionArgs::on(obj).with_sub(sibling, "members").skip_sub_read_check();
                dispatch(policy, cx, action, args)
            }
        }
        _ => dispatch(policy, cx, action, ActionArgs::on(obj)),
    }
}
