//! Inventories and everything scoped by them.

use crate::access::context::AccessContext;
use crate::access::license::{check_license, check_org_host_limit, LicenseCheck};
use crate::access::payload::Payload;
use crate::access::policy::{check_superuser, Action, ActionArgs, Policy};
use crate::access::related::RelatedField;
use crate::error::{AccessError, Result};
use crate::rbac::models::{Resource, ResourceType, RoleField};
use crate::store::Query;

use super::notification::{can_attach_notification, is_notification_relationship};
use super::{is_cancelable, moves_relation};

/// Resources visible through a readable inventory.
fn in_readable_inventory(cx: &AccessContext<'_>) -> Query {
    Query::related("inventory", cx.accessible(RoleField::Read))
}

fn inventory_of(cx: &AccessContext<'_>, obj: &Resource) -> Option<Resource> {
    cx.related(obj, "inventory")
}

fn same_inventory(obj: &Resource, sub_obj: &Resource) -> Result<()> {
    if obj.relation("inventory") != sub_obj.relation("inventory") {
        return Err(AccessError::validation("Cannot associate two items from different inventories."));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Inventory
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct InventoryPolicy;

impl Policy for InventoryPolicy {
    fn name(&self) -> &'static str {
        "inventory"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &["instance_groups", "labels"]
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
                return Ok(cx.has_any(ResourceType::Organization, RoleField::InventoryAdmin));
            }
            cx.check_related(
                "organization",
                ResourceType::Organization,
                RoleField::InventoryAdmin,
                Some(payload),
                None,
            )
        })
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        self.can_admin(cx, obj, payload)
    }

    /// Changing a smart inventory's host filter takes organization-level
    /// inventory admin, not just admin of the inventory.
    fn can_admin(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        check_superuser(cx, || {
            let new_filter = payload.and_then(|p| p.get_str("host_filter")).filter(|f| !f.is_empty());
            let org_admin_mandatory = new_filter.is_some() && new_filter != obj.attr_str("host_filter");

            let mut related =
                RelatedField::new("organization", ResourceType::Organization, RoleField::InventoryAdmin);
            if org_admin_mandatory {
                related = related.mandatory();
            }
            Ok(related.check(cx, payload, Some(obj))? && cx.in_role(obj, RoleField::Admin))
        })
    }

    /// Inventory update.
    fn can_start(&self, cx: &AccessContext<'_>, obj: &Resource, _validate_license: bool) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_role(obj, RoleField::Update)))
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        self.can_admin(cx, obj, None)
    }

    fn can_run_ad_hoc_commands(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_role(obj, RoleField::Adhoc)))
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
        if relationship == "instance_groups" {
            return check_superuser(cx, || {
                Ok(cx.in_role(sub_obj, RoleField::Use) && cx.in_role(obj, RoleField::Admin))
            });
        }
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
        sub_obj: &Resource,
        relationship: &str,
        payload: Option<&Payload>,
        _skip_sub_read_check: bool,
    ) -> Result<bool> {
        if relationship == "instance_groups" {
            return check_superuser(cx, || {
                Ok(cx.in_role(sub_obj, RoleField::Use) && cx.in_role(obj, RoleField::Admin))
            });
        }
        self.can_change(cx, obj, payload)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Host
// ═══════════════════════════════════════════════════════════════════════════════

/// Hosts count against the license and the organization host limit.
#[derive(Debug, Default)]
pub struct HostPolicy;

impl Policy for HostPolicy {
    fn name(&self) -> &'static str {
        "host"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &["groups"]
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(in_readable_inventory(cx))
    }

    fn can_read(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        if cx.is_superuser() || cx.is_system_auditor() {
            return Ok(true);
        }
        Ok(cx.in_related_role(obj, "inventory", RoleField::Read))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        if payload.is_empty() {
            return Ok(cx.is_superuser() || cx.has_any(ResourceType::Inventory, RoleField::Admin));
        }
        if !cx.check_related("inventory", ResourceType::Inventory, RoleField::Admin, Some(payload), None)? {
            return Ok(false);
        }
        let name = payload.get_str("name");
        check_license(cx, LicenseCheck::adding_host(name))?;
        if let Some(id) = payload.related_id("inventory")? {
            let inventory = cx.get_or_400(ResourceType::Inventory, id, "inventory")?;
            check_org_host_limit(cx, &inventory, name)?;
        }
        Ok(true)
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        if moves_relation(payload, obj, "inventory") {
            return Err(AccessError::permission_denied("Unable to change inventory on a host."));
        }
        // A rename may push the host count past the license.
        if let Some(name) = payload.and_then(|p| p.get_str("name")) {
            check_license(cx, LicenseCheck::adding_host(Some(name)))?;
            if let Some(inventory) = inventory_of(cx, obj) {
                check_org_host_limit(cx, &inventory, Some(name))?;
            }
        }
        check_superuser(cx, || Ok(cx.in_related_role(obj, "inventory", RoleField::Admin)))
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_related_role(obj, "inventory", RoleField::Admin)))
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
        if !skip_sub_read_check && !cx.can_read(sub_obj)? {
            return Ok(false);
        }
        same_inventory(obj, sub_obj)?;
        Ok(true)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Group
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct GroupPolicy;

impl Policy for GroupPolicy {
    fn name(&self) -> &'static str {
        "group"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &["hosts", "children"]
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(in_readable_inventory(cx))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        if payload.is_empty() {
            return Ok(cx.is_superuser() || cx.has_any(ResourceType::Inventory, RoleField::Admin));
        }
        cx.check_related("inventory", ResourceType::Inventory, RoleField::Admin, Some(payload), None)
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        if moves_relation(payload, obj, "inventory") {
            return Err(AccessError::permission_denied("Unable to change inventory on a group."));
        }
        check_superuser(cx, || Ok(cx.in_related_role(obj, "inventory", RoleField::Admin)))
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_related_role(obj, "inventory", RoleField::Admin)))
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
        if !skip_sub_read_check && !cx.can_read(sub_obj)? {
            return Ok(false);
        }
        same_inventory(obj, sub_obj)?;
        Ok(true)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Inventory Source
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct InventorySourcePolicy;

impl Policy for InventorySourcePolicy {
    fn name(&self) -> &'static str {
        "inventory_source"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &[
            "credentials",
            "notification_templates_started",
            "notification_templates_success",
            "notification_templates_error",
        ]
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(in_readable_inventory(cx))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        if payload.is_empty() || !payload.contains("inventory") {
            return Ok(cx.is_superuser() || cx.has_any(ResourceType::Inventory, RoleField::Admin));
        }
        if !cx.check_related("source_project", ResourceType::Project, RoleField::Use, Some(payload), None)? {
            return Ok(false);
        }
        cx.check_related("inventory", ResourceType::Inventory, RoleField::Admin, Some(payload), None)
    }

    /// Sources without an inventory are managed by the platform itself.
    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        check_superuser(cx, || {
            let Some(inventory) = inventory_of(cx, obj) else {
                return Ok(false);
            };
            Ok(cx.check(ResourceType::Inventory, Action::Change, ActionArgs::on(&inventory))?
                && cx.check_related("source_project", ResourceType::Project, RoleField::Use, payload, Some(obj))?)
        })
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || match inventory_of(cx, obj) {
            Some(inventory) => cx.check(ResourceType::Inventory, Action::Admin, ActionArgs::on(&inventory)),
            None => Ok(false),
        })
    }

    /// Sync the source.
    fn can_start(&self, cx: &AccessContext<'_>, obj: &Resource, _validate_license: bool) -> Result<bool> {
        check_superuser(cx, || Ok(cx.in_related_role(obj, "inventory", RoleField::Update)))
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
        if relationship == "credentials" && sub_obj.kind == ResourceType::Credential {
            return check_superuser(cx, || {
                Ok(cx.in_related_role(obj, "inventory", RoleField::Admin) && cx.in_role(sub_obj, RoleField::Use))
            });
        }
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
// Inventory Update
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct InventoryUpdatePolicy;

impl InventoryUpdatePolicy {
    fn inventory(cx: &AccessContext<'_>, obj: &Resource) -> Option<Resource> {
        cx.follow(obj, &["inventory_source", "inventory"])
    }
}

impl Policy for InventoryUpdatePolicy {
    fn name(&self) -> &'static str {
        "inventory_update"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(Query::related("inventory_source", in_readable_inventory(cx)))
    }

    fn can_cancel(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        if !is_cancelable(obj) {
            return Ok(false);
        }
        if cx.is_superuser() || obj.is_created_by(cx.principal()) {
            return Ok(true);
        }
        Ok(Self::inventory(cx, obj)
            .map(|inventory| cx.in_role(&inventory, RoleField::Admin))
            .unwrap_or(false))
    }

    /// Relaunch re-syncs the originating source.
    fn can_start(&self, cx: &AccessContext<'_>, obj: &Resource, validate_license: bool) -> Result<bool> {
        match cx.related(obj, "inventory_source") {
            Some(source) => {
                let mut args = ActionArgs::on(&source);
                if !validate_license {
                    args = args.without_license_check();
                }
                cx.check(ResourceType::InventorySource, Action::Start, args)
            }
            None => Ok(cx.is_superuser()),
        }
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        check_superuser(cx, || {
            Ok(Self::inventory(cx, obj)
                .map(|inventory| cx.in_role(&inventory, RoleField::Admin))
                .unwrap_or(false))
        })
    }
}
