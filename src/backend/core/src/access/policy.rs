//! The base policy contract every resource type implements.
//!
//! Defaults deny everyone but superusers. Per-type policies override only
//! the checks their resource needs, and opt into the superuser bypass
//! explicitly with [`check_superuser`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::access::context::AccessContext;
use crate::access::payload::Payload;
use crate::error::{AccessError, Result};
use crate::rbac::models::Resource;
use crate::store::Query;

// ═══════════════════════════════════════════════════════════════════════════════
// Actions
// ═══════════════════════════════════════════════════════════════════════════════

/// A point-check action name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Add,
    Change,
    Admin,
    Delete,
    Copy,
    CopyRelated,
    Attach,
    Unattach,
    /// Launch, relaunch or update.
    Start,
    Cancel,
    RunAdHocCommands,
    Use,
    ApproveOrDeny,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Add => "add",
            Self::Change => "change",
            Self::Admin => "admin",
            Self::Delete => "delete",
            Self::Copy => "copy",
            Self::CopyRelated => "copy_related",
            Self::Attach => "attach",
            Self::Unattach => "unattach",
            Self::Start => "start",
            Self::Cancel => "cancel",
            Self::RunAdHocCommands => "run_ad_hoc_commands",
            Self::Use => "use",
            Self::ApproveOrDeny => "approve_or_deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        const ALL: [Action; 14] = [
            Action::Read,
            Action::Add,
            Action::Change,
            Action::Admin,
            Action::Delete,
            Action::Copy,
            Action::CopyRelated,
            Action::Attach,
            Action::Unattach,
            Action::Start,
            Action::Cancel,
            Action::RunAdHocCommands,
            Action::Use,
            Action::ApproveOrDeny,
        ];
        // "update" is the inventory/project spelling of start
        if s == "update" {
            return Some(Self::Start);
        }
        ALL.iter().copied().find(|a| a.as_str() == s)
    }

    /// Whether the action needs a target instance.
    pub fn needs_instance(&self) -> bool {
        !matches!(self, Self::Add)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments to a point check. Which ones matter depends on the action.
#[derive(Debug, Clone, Copy)]
pub struct ActionArgs<'a> {
    pub instance: Option<&'a Resource>,
    pub payload: Option<&'a Payload>,
    pub sub_instance: Option<&'a Resource>,
    pub relationship: Option<&'a str>,
    pub skip_sub_read_check: bool,
    pub validate_license: bool,
}

impl Default for ActionArgs<'_> {
    fn default() -> Self {
        Self {
            instance: None,
            payload: None,
            sub_instance: None,
            relationship: None,
            skip_sub_read_check: false,
            validate_license: true,
        }
    }
}

impl<'a> ActionArgs<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments targeting one instance.
    pub fn on(instance: &'a Resource) -> Self {
        Self {
            instance: Some(instance),
            ..Self::default()
        }
    }

    /// Arguments for an add check.
    pub fn payload(payload: &'a Payload) -> Self {
        Self {
            payload: Some(payload),
            ..Self::default()
        }
    }

    pub fn with_payload(mut self, payload: &'a Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach/unattach target and relationship name.
    pub fn with_sub(mut self, sub_instance: &'a Resource, relationship: &'a str) -> Self {
        self.sub_instance = Some(sub_instance);
        self.relationship = Some(relationship);
        self
    }

    pub fn skip_sub_read_check(mut self) -> Self {
        self.skip_sub_read_check = true;
        self
    }

    pub fn without_license_check(mut self) -> Self {
        self.validate_license = false;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-resource-type access rules.
///
/// Point checks return `Ok(false)` for an ordinary denial and
/// `Err(AccessDenied)` when the reason must reach the end user.
pub trait Policy: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Relationships this type accepts in attach/unattach.
    fn relationships(&self) -> &'static [&'static str] {
        &[]
    }

    /// Type-specific visibility for ordinary principals.
    fn filtered_query(&self, _cx: &AccessContext<'_>) -> Result<Query> {
        Ok(Query::None)
    }

    /// Visibility scope for list endpoints.
    fn visibility_filter(&self, cx: &AccessContext<'_>) -> Result<Query> {
        if cx.is_superuser() || cx.is_system_auditor() {
            return Ok(Query::All);
        }
        self.filtered_query(cx)
    }

    fn can_read(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        let query = self.visibility_filter(cx)?;
        Ok(cx.matches(&query, obj))
    }

    fn can_add(&self, cx: &AccessContext<'_>, _payload: &Payload) -> Result<bool> {
        Ok(cx.is_superuser())
    }

    fn can_change(&self, cx: &AccessContext<'_>, _obj: &Resource, _payload: Option<&Payload>) -> Result<bool> {
        Ok(cx.is_superuser())
    }

    fn can_admin(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        self.can_change(cx, obj, payload)
    }

    fn can_delete(&self, cx: &AccessContext<'_>, _obj: &Resource) -> Result<bool> {
        Ok(cx.is_superuser())
    }

    fn can_copy(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        self.can_add(cx, &Payload::copy_of(obj))
    }

    /// Whether every related object of `obj` may be carried into a copy.
    fn can_copy_related(&self, _cx: &AccessContext<'_>, _obj: &Resource) -> Result<bool> {
        Ok(true)
    }

    fn can_attach(
        &self,
        cx: &AccessContext<'_>,
        obj: &Resource,
        sub_obj: &Resource,
        _relationship: &str,
        _payload: Option<&Payload>,
        skip_sub_read_check: bool,
    ) -> Result<bool> {
        if !self.can_change(cx, obj, None)? {
            return Ok(false);
        }
        if skip_sub_read_check {
            return Ok(true);
        }
        cx.can_read(sub_obj)
    }

    fn can_unattach(
        &self,
        cx: &AccessContext<'_>,
        obj: &Resource,
        _sub_obj: &Resource,
        _relationship: &str,
        payload: Option<&Payload>,
        _skip_sub_read_check: bool,
    ) -> Result<bool> {
        self.can_change(cx, obj, payload)
    }

    fn can_start(&self, cx: &AccessContext<'_>, _obj: &Resource, _validate_license: bool) -> Result<bool> {
        Ok(cx.is_superuser())
    }

    fn can_cancel(&self, cx: &AccessContext<'_>, _obj: &Resource) -> Result<bool> {
        Ok(cx.is_superuser())
    }

    fn can_run_ad_hoc_commands(&self, cx: &AccessContext<'_>, _obj: &Resource) -> Result<bool> {
        Ok(cx.is_superuser())
    }

    fn can_use(&self, cx: &AccessContext<'_>, _obj: &Resource) -> Result<bool> {
        Ok(cx.is_superuser())
    }

    fn can_approve_or_deny(&self, cx: &AccessContext<'_>, _obj: &Resource) -> Result<bool> {
        Ok(cx.is_superuser())
    }
}

/// Superuser bypass: `is_superuser OR check()`.
///
/// The wrapped check is not evaluated for superusers.
pub fn check_superuser<F>(cx: &AccessContext<'_>, check: F) -> Result<bool>
where
    F: FnOnce() -> Result<bool>,
{
    if cx.is_superuser() {
        return Ok(true);
    }
    check()
}

/// Route an action to the matching policy method.
pub fn dispatch(
    policy: &dyn Policy,
    cx: &AccessContext<'_>,
    action: Action,
    args: ActionArgs<'_>,
) -> Result<bool> {
    let instance = || {
        args.instance.ok_or_else(|| {
            AccessError::validation(format!("The {} action requires an instance", action))
        })
    };

    match action {
        Action::Add => {
            let empty = Payload::new();
            policy.can_add(cx, args.payload.unwrap_or(&empty))
        }
        Action::Read => policy.can_read(cx, instance()?),
        Action::Change => policy.can_change(cx, instance()?, args.payload),
        Action::Admin => policy.can_admin(cx, instance()?, args.payload),
        Action::Delete => policy.can_delete(cx, instance()?),
        Action::Copy => policy.can_copy(cx, instance()?),
        Action::CopyRelated => policy.can_copy_related(cx, instance()?),
        Action::Attach | Action::Unattach => {
            let obj = instance()?;
            let relationship = args.relationship.unwrap_or_default();
            if !policy.relationships().contains(&relationship) {
                return Err(AccessError::unsupported(policy.name(), relationship));
            }
            let sub_obj = args.sub_instance.ok_or_else(|| {
                AccessError::validation(format!("The {} action requires a related instance", action))
            })?;
            if action == Action::Attach {
                policy.can_attach(cx, obj, sub_obj, relationship, args.payload, args.skip_sub_read_check)
            } else {
                policy.can_unattach(cx, obj, sub_obj, relationship, args.payload, args.skip_sub_read_check)
            }
        }
        Action::Start => policy.can_start(cx, instance()?, args.validate_license),
        Action::Cancel => policy.can_cancel(cx, instance()?),
        Action::RunAdHocCommands => policy.can_run_ad_hoc_commands(cx, instance()?),
        Action::Use => policy.can_use(cx, instance()?),
        Action::ApproveOrDeny => policy.can_approve_or_deny(cx, instance()?),
    }
}
