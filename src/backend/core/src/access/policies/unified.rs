//! Abstract template and job lookups.
//!
//! A unified lookup may return any concrete template or job type. These
//! policies list through the concrete visibility filters and hand every
//! instance check to the policy of the instance's own type.

use crate::access::context::AccessContext;
use crate::access::payload::Payload;
use crate::access::policy::{Action, ActionArgs, Policy};
use crate::error::{AccessError, Result};
use crate::rbac::models::{Resource, ResourceType};
use crate::store::Query;

use super::by_kind_visibility;

const UNIFIED_RELATIONSHIPS: &[&str] = &[
    "credentials",
    "instance_groups",
    "labels",
    "notification_templates_started",
    "notification_templates_success",
    "notification_templates_error",
    "notification_templates_approvals",
];

/// Route an instance check to the concrete policy of `obj`.
fn delegate<'a>(
    cx: &AccessContext<'_>,
    family: ResourceType,
    action: Action,
    obj: &'a Resource,
    extend: impl FnOnce(ActionArgs<'a>) -> ActionArgs<'a>,
) -> Result<bool> {
    if obj.kind.is_abstract() || !family.admits(obj.kind) {
        return Err(AccessError::validation(format!("A {} is not a {}", obj.kind, family)));
    }
    cx.check(obj.kind, action, extend(ActionArgs::on(obj)))
}

fn with_payload<'a>(args: ActionArgs<'a>, payload: Option<&'a Payload>) -> ActionArgs<'a> {
    match payload {
        Some(payload) => args.with_payload(payload),
        None => args,
    }
}

/// Shared body of both unified policies.
macro_rules! unified_policy {
    ($policy:ident, $name:literal, $family:expr) => {
        #[derive(Debug, Default)]
        pub struct $policy;

        impl Policy for $policy {
            fn name(&self) -> &'static str {
                $name
            }

            fn relationships(&self) -> &'static [&'static str] {
                UNIFIED_RELATIONSHIPS
            }

            fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
                by_kind_visibility(cx, &$family.concrete_kinds())
            }

            fn can_read(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
                delegate(cx, $family, Action::Read, obj, |args| args)
            }

            fn can_add(&self, _cx: &AccessContext<'_>, _payload: &Payload) -> Result<bool> {
                Ok(false)
            }

            fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
                delegate(cx, $family, Action::Change, obj, |args| with_payload(args, payload))
            }

            fn can_admin(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
                delegate(cx, $family, Action::Admin, obj, |args| with_payload(args, payload))
            }

            fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
                delegate(cx, $family, Action::Delete, obj, |args| args)
            }

            fn can_copy(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
                delegate(cx, $family, Action::Copy, obj, |args| args)
            }

            fn can_copy_related(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
                delegate(cx, $family, Action::CopyRelated, obj, |args| args)
            }

            fn can_attach(
                &self,
                cx: &AccessContext<'_>,
                obj: &Resource,
                sub_obj: &Resource,
                relationship: &str,
                payload: Option<&Payload>,
                skip_sub_read_check: bool,
            ) -> Result<bool> {
                delegate(cx, $family, Action::Attach, obj, |args| {
                    let args = with_payload(args.with_sub(sub_obj, relationship), payload);
                    if skip_sub_read_check {
                        args.skip_sub_read_check()
                    } else {
                        args
                    }
                })
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
                delegate(cx, $family, Action::Unattach, obj, |args| {
                    let args = with_payload(args.with_sub(sub_obj, relationship), payload);
                    if skip_sub_read_check {
                        args.skip_sub_read_check()
                    } else {
                        args
                    }
                })
            }

            fn can_start(&self, cx: &AccessContext<'_>, obj: &Resource, validate_license: bool) -> Result<bool> {
                delegate(cx, $family, Action::Start, obj, |args| {
                    if validate_license {
                        args
                    } else {
                        args.without_license_check()
                    }
                })
            }

            fn can_cancel(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
                delegate(cx, $family, Action::Cancel, obj, |args| args)
            }

            fn can_use(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
                delegate(cx, $family, Action::Use, obj, |args| args)
            }
        }
    };
}

unified_policy!(UnifiedJobTemplatePolicy, "unified_job_template", ResourceType::UnifiedJobTemplate);
unified_policy!(UnifiedJobPolicy, "unified_job", ResourceType::UnifiedJob);
