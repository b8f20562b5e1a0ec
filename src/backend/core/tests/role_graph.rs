//! Role inheritance as seen through access decisions.

mod common;

use access_core::access::{Action, ActionArgs};
use access_core::error::ErrorCode;
use access_core::rbac::{ResourceType, RoleField};
use access_core::store::ResourceStore;

use common::World;

// ============================================================================
// Implicit Chains
// ============================================================================

#[test]
fn test_org_admin_implies_inventory_and_template_rights() {
    let world = World::new();
    let user = world.user();

    let org = world.organization();
    let inventory = world.inventory(&org);
    let project = world.project(&org);
    let jt = world.job_template(&org, &inventory, &project);
    world.grant(&user, &org, RoleField::Admin);

    let store = &world.store;
    let held = |resource: &access_core::rbac::Resource, field| {
        store.principal_in_role(user.id, resource.role(field).unwrap())
    };

    assert!(held(&inventory, RoleField::Admin));
    assert!(held(&inventory, RoleField::Use));
    assert!(held(&inventory, RoleField::Read));
    assert!(held(&project, RoleField::Use));
    assert!(held(&jt, RoleField::Admin));
    assert!(held(&jt, RoleField::Execute));
}

#[test]
fn test_org_execute_does_not_imply_template_admin() {
    let world = World::new();
    let engine = world.engine();
    let user = world.user();

    let org = world.organization();
    let inventory = world.inventory(&org);
    let project = world.project(&org);
    let jt = world.job_template(&org, &inventory, &project);
    world.grant(&user, &org, RoleField::Execute);

    assert!(engine.check_access(&user, ResourceType::JobTemplate, Action::Start, ActionArgs::on(&jt)).unwrap());
    assert!(engine.check_access(&user, ResourceType::JobTemplate, Action::Read, ActionArgs::on(&jt)).unwrap());
    assert!(!engine.check_access(&user, ResourceType::JobTemplate, Action::Delete, ActionArgs::on(&jt)).unwrap());
    assert!(!engine.check_access(&user, ResourceType::Inventory, Action::Read, ActionArgs::on(&inventory)).unwrap());
}

#[test]
fn test_team_grant_flows_through_three_levels() {
    let world = World::new();
    let engine = world.engine();
    let user = world.user();

    let org = world.organization();
    let team = world.team(&org);
    let project = world.project(&org);
    world.grant(&user, &team, RoleField::Member);

    let team_member = team.role(RoleField::Member).unwrap();
    let project_admins = org.role(RoleField::ProjectAdmin).unwrap();

    assert!(!engine.check_access(&user, ResourceType::Project, Action::Use, ActionArgs::on(&project)).unwrap());

    world.store.add_role_parent(team_member, project_admins).unwrap();
    assert!(engine.check_access(&user, ResourceType::Project, Action::Use, ActionArgs::on(&project)).unwrap());
    assert!(engine.check_access(&user, ResourceType::Project, Action::Read, ActionArgs::on(&project)).unwrap());

    assert!(world.store.remove_role_parent(team_member, project_admins));
    assert!(!engine.check_access(&user, ResourceType::Project, Action::Use, ActionArgs::on(&project)).unwrap());
    assert!(!engine.check_access(&user, ResourceType::Project, Action::Read, ActionArgs::on(&project)).unwrap());
}

#[test]
fn test_cyclic_inheritance_is_rejected() {
    let world = World::new();
    let org = world.organization();
    let team = world.team(&org);

    let team_member = team.role(RoleField::Member).unwrap();
    let org_admin = org.role(RoleField::Admin).unwrap();

    // Org admin already implies team admin; looping back must fail.
    let team_admin = team.role(RoleField::Admin).unwrap();
    let err = world.store.add_role_parent(team_admin, org_admin).unwrap_err();
    assert_eq!(err.code(), ErrorCode::RoleCycleDetected);

    world.store.add_role_parent(team_member, org_admin).unwrap();
    let err = world.store.add_role_parent(org_admin, team_member).unwrap_err();
    assert_eq!(err.code(), ErrorCode::RoleCycleDetected);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_deleting_a_resource_drops_its_roles() {
    let world = World::new();
    let user = world.user();

    let org = world.organization();
    let inventory = world.inventory(&org);
    world.grant(&user, &inventory, RoleField::Admin);
    let admin_role = inventory.role(RoleField::Admin).unwrap();
    assert!(world.store.principal_in_role(user.id, admin_role));

    world.store.delete(ResourceType::Inventory, inventory.id);
    assert!(world.store.role(admin_role).is_none());
    assert!(!world.store.principal_in_role(user.id, admin_role));
}

#[test]
fn test_revoked_grant_no_longer_applies() {
    let world = World::new();
    let engine = world.engine();
    let user = world.user();

    let org = world.organization();
    let inventory = world.inventory(&org);
    world.grant(&user, &inventory, RoleField::Use);
    assert!(engine.check_access(&user, ResourceType::Inventory, Action::Use, ActionArgs::on(&inventory)).unwrap());

    assert!(world.store.revoke(user.id, inventory.role(RoleField::Use).unwrap()));
    assert!(!engine.check_access(&user, ResourceType::Inventory, Action::Use, ActionArgs::on(&inventory)).unwrap());
}

// ============================================================================
// System Roles
// ============================================================================

#[test]
fn test_system_auditor_reads_everything() {
    let world = World::new();
    let engine = world.engine();
    let auditor = world.system_auditor();

    let org = world.organization();
    let inventory = world.inventory(&org);
    let project = world.project(&org);
    let jt = world.job_template(&org, &inventory, &project);
    let credential = world.credential(&org);

    for (kind, obj) in [
        (ResourceType::Organization, &org),
        (ResourceType::Inventory, &inventory),
        (ResourceType::Project, &project),
        (ResourceType::JobTemplate, &jt),
        (ResourceType::Credential, &credential),
    ] {
        assert!(engine.check_access(&auditor, kind, Action::Read, ActionArgs::on(obj)).unwrap(), "{}", kind);
        assert!(!engine.check_access(&auditor, kind, Action::Delete, ActionArgs::on(obj)).unwrap(), "{}", kind);
    }

    assert_eq!(engine.list_visible(&auditor, ResourceType::JobTemplate).unwrap().len(), 1);
}

#[test]
fn test_inactive_principal_loses_every_role() {
    let world = World::new();
    let engine = world.engine();
    let mut user = world.user();

    let org = world.organization();
    let inventory = world.inventory(&org);
    world.grant(&user, &inventory, RoleField::Admin);

    user.is_active = false;
    let user = world.store.add_principal(user);
    assert!(!engine.check_access(&user, ResourceType::Inventory, Action::Read, ActionArgs::on(&inventory)).unwrap());
}
