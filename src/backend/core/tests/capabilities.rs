//! Capability bundles against the point checks they summarize.

mod common;

use access_core::access::{Action, ActionArgs, Capability, CapabilityCache};
use access_core::rbac::{Principal, Resource, ResourceType, RoleField};
use access_core::store::ResourceStore;
use serde_json::json;

use common::World;

// ============================================================================
// Utilities
// ============================================================================

const TEMPLATE_CAPABILITIES: [Capability; 4] =
    [Capability::Edit, Capability::Delete, Capability::Start, Capability::Copy];

fn point_check(world: &World, principal: &Principal, obj: &Resource, capability: Capability) -> bool {
    let engine = world.engine();
    let args = match capability {
        Capability::Start | Capability::Schedule => ActionArgs::on(obj).without_license_check(),
        _ => ActionArgs::on(obj),
    };
    engine
        .check_access(principal, obj.kind, capability.action(), args)
        .unwrap_or(false)
}

struct Template {
    jt: Resource,
    inventory: Resource,
    project: Resource,
}

fn template(world: &World) -> Template {
    let org = world.organization();
    let inventory = world.inventory(&org);
    let project = world.project(&org);
    let jt = world.job_template(&org, &inventory, &project);
    Template { jt, inventory, project }
}

// ============================================================================
// Equivalence
// ============================================================================

#[test]
fn test_execute_only_capabilities_match_point_checks() {
    let world = World::new();
    let engine = world.engine();
    let user = world.user();
    let fixture = template(&world);
    world.grant(&user, &fixture.jt, RoleField::Execute);

    let caps = engine
        .compute_capabilities(&user, &fixture.jt, &TEMPLATE_CAPABILITIES, None, &mut CapabilityCache::new())
        .unwrap();

    for capability in TEMPLATE_CAPABILITIES {
        assert_eq!(
            caps[capability.as_str()],
            point_check(&world, &user, &fixture.jt, capability),
            "{}",
            capability
        );
    }
    assert!(caps["start"]);
    assert!(!caps["edit"]);
    assert!(!caps["delete"]);
    assert!(!caps["copy"]);
}

#[test]
fn test_template_admin_capabilities_match_point_checks() {
    let world = World::new();
    let engine = world.engine();
    let user = world.user();
    let fixture = template(&world);
    world.grant(&user, &fixture.jt, RoleField::Admin);
    world.grant(&user, &fixture.inventory, RoleField::Use);
    world.grant(&user, &fixture.project, RoleField::Use);

    let caps = engine
        .compute_capabilities(&user, &fixture.jt, &TEMPLATE_CAPABILITIES, None, &mut CapabilityCache::new())
        .unwrap();

    for capability in TEMPLATE_CAPABILITIES {
        assert_eq!(caps[capability.as_str()], point_check(&world, &user, &fixture.jt, capability));
        assert!(caps[capability.as_str()], "{}", capability);
    }
}

#[test]
fn test_superuser_gets_every_capability() {
    let world = World::new();
    let engine = world.engine();
    let admin = world.superuser();
    let fixture = template(&world);

    let caps = engine
        .compute_capabilities(&admin, &fixture.jt, &Capability::ORDER, None, &mut CapabilityCache::new())
        .unwrap();
    for capability in TEMPLATE_CAPABILITIES {
        assert!(caps[capability.as_str()], "{}", capability);
    }
    assert!(caps["schedule"]);
    assert_eq!(caps.len(), Capability::ORDER.len());
}

// ============================================================================
// Shortcuts
// ============================================================================

#[test]
fn test_manual_project_cannot_start_even_for_superuser() {
    let world = World::new();
    let engine = world.engine();
    let admin = world.superuser();
    let org = world.organization();
    let manual = world.create(
        Resource::new(ResourceType::Project, world.next_id(), "playbooks")
            .in_organization(org.id)
            .with_attr("scm_type", ""),
    );

    let caps = engine
        .compute_capabilities(
            &admin,
            &manual,
            &[Capability::Edit, Capability::Start, Capability::Schedule],
            None,
            &mut CapabilityCache::new(),
        )
        .unwrap();
    assert!(caps["edit"]);
    assert!(!caps["start"]);
    assert!(!caps["schedule"]);
}

#[test]
fn test_template_without_project_cannot_start() {
    let world = World::new();
    let engine = world.engine();
    let user = world.user();
    let org = world.organization();
    let inventory = world.inventory(&org);
    let broken = world.create(
        Resource::new(ResourceType::JobTemplate, world.next_id(), "broken")
            .in_organization(org.id)
            .with_relation("inventory", inventory.reference()),
    );
    world.grant(&user, &broken, RoleField::Admin);

    let caps = engine
        .compute_capabilities(&user, &broken, &[Capability::Edit, Capability::Start], None, &mut CapabilityCache::new())
        .unwrap();
    assert!(caps["edit"]);
    assert!(!caps["start"]);
    assert!(engine
        .check_access(&user, ResourceType::JobTemplate, Action::Start, ActionArgs::on(&broken))
        .unwrap());
}

#[test]
fn test_cache_is_reused_within_a_request() {
    let world = World::new();
    let engine = world.engine();
    let user = world.user();
    let fixture = template(&world);
    world.grant(&user, &fixture.jt, RoleField::Execute);

    let mut cache = CapabilityCache::new();
    engine
        .compute_capabilities(&user, &fixture.jt, &[Capability::Start], None, &mut cache)
        .unwrap();
    assert_eq!(cache.get(user.id, fixture.jt.reference(), None, Capability::Start), Some(true));

    // A revoked grant is not observed until the next request.
    world.store.revoke(user.id, fixture.jt.role(RoleField::Execute).unwrap());
    let caps = engine
        .compute_capabilities(&user, &fixture.jt, &[Capability::Start, Capability::Schedule], None, &mut cache)
        .unwrap();
    assert!(caps["start"]);
    assert!(caps["schedule"]);

    let fresh = engine
        .compute_capabilities(&user, &fixture.jt, &[Capability::Start], None, &mut CapabilityCache::new())
        .unwrap();
    assert!(!fresh["start"]);
}

#[test]
fn test_shared_cache_keeps_objects_apart() {
    let world = World::new();
    let engine = world.engine();
    let user = world.user();
    let mine = template(&world);
    let theirs = template(&world);
    world.grant(&user, &mine.jt, RoleField::Admin);

    let requested = [Capability::Edit, Capability::Delete, Capability::Start];
    let mut cache = CapabilityCache::new();
    let first = engine
        .compute_capabilities(&user, &mine.jt, &requested, None, &mut cache)
        .unwrap();
    let second = engine
        .compute_capabilities(&user, &theirs.jt, &requested, None, &mut cache)
        .unwrap();

    assert!(first["edit"] && first["delete"] && first["start"]);
    for capability in requested {
        assert_eq!(
            second[capability.as_str()],
            point_check(&world, &user, &theirs.jt, capability),
            "{}",
            capability
        );
        assert!(!second[capability.as_str()], "{}", capability);
    }
}

#[test]
fn test_shared_cache_keeps_principals_apart() {
    let world = World::new();
    let engine = world.engine();
    let operator = world.user();
    let stranger = world.user();
    let fixture = template(&world);
    world.grant(&operator, &fixture.jt, RoleField::Execute);

    let mut cache = CapabilityCache::new();
    let granted = engine
        .compute_capabilities(&operator, &fixture.jt, &[Capability::Start], None, &mut cache)
        .unwrap();
    let denied = engine
        .compute_capabilities(&stranger, &fixture.jt, &[Capability::Start], None, &mut cache)
        .unwrap();
    assert!(granted["start"]);
    assert!(!denied["start"]);
}

#[test]
fn test_unattach_capability_for_role_members() {
    let world = World::new();
    let engine = world.engine();
    let admin = world.user();
    let member = world.user();
    let org = world.organization();
    let inventory = world.inventory(&org);
    world.grant(&admin, &inventory, RoleField::Admin);
    world.grant(&member, &inventory, RoleField::Use);

    let role = world
        .store
        .role(inventory.role(RoleField::Use).unwrap())
        .unwrap()
        .to_resource();
    let sibling = member.to_resource();

    let caps = engine
        .compute_capabilities(&admin, &role, &[Capability::Unattach], Some(&sibling), &mut CapabilityCache::new())
        .unwrap();
    assert!(caps["unattach"]);

    let caps = engine
        .compute_capabilities(&member, &role, &[Capability::Unattach], Some(&sibling), &mut CapabilityCache::new())
        .unwrap();
    assert!(!caps["unattach"]);

    let caps = engine
        .compute_capabilities(&admin, &role, &[Capability::Unattach], None, &mut CapabilityCache::new())
        .unwrap();
    assert!(!caps["unattach"]);
}

#[test]
fn test_unattach_cache_is_per_sibling() {
    let world = World::new();
    let engine = world.engine();
    let admin = world.user();
    let member = world.user();
    let outsider = world.user();
    let org = world.organization();
    let inventory = world.inventory(&org);
    world.grant(&admin, &inventory, RoleField::Admin);
    world.grant(&member, &inventory, RoleField::Use);

    let role = world
        .store
        .role(inventory.role(RoleField::Use).unwrap())
        .unwrap()
        .to_resource();

    let mut cache = CapabilityCache::new();
    let with_member = engine
        .compute_capabilities(&admin, &role, &[Capability::Unattach], Some(&member.to_resource()), &mut cache)
        .unwrap();
    let without_sibling = engine
        .compute_capabilities(&admin, &role, &[Capability::Unattach], None, &mut cache)
        .unwrap();
    assert!(with_member["unattach"]);
    assert!(!without_sibling["unattach"]);
    assert!(cache.get(admin.id, role.reference(), Some(outsider.to_resource().reference()), Capability::Unattach).is_none());
}

// ============================================================================
// Equivalence Across Types
// ============================================================================

/// One capability computation to compare against point checks.
struct Case {
    label: &'static str,
    principal: Principal,
    obj: Resource,
    expected: &'static [(Capability, bool)],
}

/// The capability whose point check a capability reports. Host and group
/// copies mirror `edit`.
fn mirrored(kind: ResourceType, capability: Capability) -> Capability {
    match (kind, capability) {
        (ResourceType::Host | ResourceType::Group, Capability::Copy) => Capability::Edit,
        _ => capability,
    }
}

fn granted(world: &World, target: &Resource, field: RoleField) -> Principal {
    let principal = world.user();
    world.grant(&principal, target, field);
    principal
}

fn equivalence_cases(world: &World) -> Vec<Case> {
    use Capability::*;

    let org = world.organization();
    let inventory = world.inventory(&org);
    let project = world.project(&org);
    let jt = world.job_template(&org, &inventory, &project);
    let job = world.create(
        Resource::new(ResourceType::Job, world.next_id(), "nightly")
            .with_relation("job_template", jt.reference())
            .with_relation("inventory", inventory.reference())
            .with_attr("status", "successful")
            .with_attr("launch_config", json!({})),
    );
    let host = world.host(&inventory, "web");
    let group = world.create(
        Resource::new(ResourceType::Group, world.next_id(), "webservers")
            .with_relation("inventory", inventory.reference()),
    );
    let credential = world.credential(&org);
    let own = world.user();

    vec![
        Case {
            label: "inventory admin",
            principal: granted(world, &inventory, RoleField::Admin),
            obj: inventory.clone(),
            expected: &[(Edit, true), (Delete, true), (Adhoc, true)],
        },
        Case {
            label: "inventory adhoc",
            principal: granted(world, &inventory, RoleField::Adhoc),
            obj: inventory.clone(),
            expected: &[(Edit, false), (Delete, false), (Adhoc, true)],
        },
        Case {
            label: "inventory read",
            principal: granted(world, &inventory, RoleField::Read),
            obj: inventory.clone(),
            expected: &[(Edit, false), (Delete, false), (Adhoc, false)],
        },
        Case {
            label: "project update",
            principal: granted(world, &project, RoleField::Update),
            obj: project.clone(),
            expected: &[(Edit, false), (Start, true), (Schedule, true)],
        },
        Case {
            label: "project read",
            principal: granted(world, &project, RoleField::Read),
            obj: project.clone(),
            expected: &[(Start, false), (Schedule, false)],
        },
        Case {
            label: "job template execute",
            principal: granted(world, &jt, RoleField::Execute),
            obj: job.clone(),
            expected: &[(Delete, false), (Start, true)],
        },
        Case {
            label: "organization admin on job",
            principal: granted(world, &org, RoleField::Admin),
            obj: job.clone(),
            expected: &[(Delete, true), (Start, true)],
        },
        Case {
            label: "own user record",
            principal: own.clone(),
            obj: own.to_resource(),
            expected: &[(Edit, true), (Delete, false)],
        },
        Case {
            label: "host with inventory admin",
            principal: granted(world, &inventory, RoleField::Admin),
            obj: host.clone(),
            expected: &[(Edit, true), (Delete, true), (Copy, true)],
        },
        Case {
            label: "group with inventory read",
            principal: granted(world, &inventory, RoleField::Read),
            obj: group.clone(),
            expected: &[(Edit, false), (Copy, false)],
        },
        Case {
            label: "credential admin",
            principal: granted(world, &credential, RoleField::Admin),
            obj: credential.clone(),
            expected: &[(Edit, true), (Delete, true)],
        },
        Case {
            label: "credential use",
            principal: granted(world, &credential, RoleField::Use),
            obj: credential.clone(),
            expected: &[(Edit, false), (Delete, false)],
        },
    ]
}

#[test]
fn test_capabilities_match_point_checks_across_types() {
    let world = World::new();
    let engine = world.engine();

    for case in equivalence_cases(&world) {
        let requested: Vec<Capability> = case.expected.iter().map(|(capability, _)| *capability).collect();
        let caps = engine
            .compute_capabilities(&case.principal, &case.obj, &requested, None, &mut CapabilityCache::new())
            .unwrap();

        for (capability, expected) in case.expected {
            let point = point_check(&world, &case.principal, &case.obj, mirrored(case.obj.kind, *capability));
            assert_eq!(caps[capability.as_str()], point, "{}: {}", case.label, capability);
            assert_eq!(caps[capability.as_str()], *expected, "{}: {}", case.label, capability);
        }
    }
}

#[test]
fn test_organization_less_workflow_copies_are_superuser_only() {
    let world = World::new();
    let engine = world.engine();
    let admin = world.superuser();
    let user = world.user();

    let template = world.create(Resource::new(ResourceType::WorkflowJobTemplate, world.next_id(), "flow"));
    let run = world.create(
        Resource::new(ResourceType::WorkflowJob, world.next_id(), "flow run")
            .with_relation("workflow_job_template", template.reference()),
    );
    world.grant(&user, &template, RoleField::Admin);

    for obj in [&template, &run] {
        let caps = engine
            .compute_capabilities(&user, obj, &[Capability::Copy], None, &mut CapabilityCache::new())
            .unwrap();
        assert!(!caps["copy"], "{}", obj.kind);

        let caps = engine
            .compute_capabilities(&admin, obj, &[Capability::Copy], None, &mut CapabilityCache::new())
            .unwrap();
        assert!(caps["copy"], "{}", obj.kind);
    }
}
