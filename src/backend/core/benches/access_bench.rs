//! Benchmarks for role membership and visibility evaluation.

use std::sync::Arc;

use access_core::access::{AccessEngine, Action, ActionArgs, LicenseInfo, StaticLicense};
use access_core::config::AccessSettings;
use access_core::rbac::{Principal, Resource, ResourceType, RoleField};
use access_core::store::{InMemoryStore, ResourceStore};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

struct Fixture {
    store: Arc<InMemoryStore>,
    engine: AccessEngine,
    user: Principal,
    templates: Vec<Resource>,
}

/// `orgs` organizations, each with one inventory, one project and
/// `per_org` job templates. The user executes every template of the
/// first organization through a team.
fn build_fixture(orgs: u64, per_org: u64) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let user = store.add_principal(Principal::new(1, "bench"));
    let mut next = 10u64;
    let mut id = || {
        next += 1;
        next
    };

    let mut templates = Vec::new();
    for o in 0..orgs {
        let org = store
            .create(Resource::new(ResourceType::Organization, id(), format!("org-{o}")))
            .unwrap();
        let inventory = store
            .create(Resource::new(ResourceType::Inventory, id(), format!("inv-{o}")).in_organization(org.id))
            .unwrap();
        let project = store
            .create(Resource::new(ResourceType::Project, id(), format!("proj-{o}")).in_organization(org.id))
            .unwrap();
        for t in 0..per_org {
            let jt = store
                .create(
                    Resource::new(ResourceType::JobTemplate, id(), format!("jt-{o}-{t}"))
                        .in_organization(org.id)
                        .with_relation("inventory", inventory.reference())
                        .with_relation("project", project.reference()),
                )
                .unwrap();
            templates.push(jt);
        }
        if o == 0 {
            let team = store
                .create(Resource::new(ResourceType::Team, id(), "operators").in_organization(org.id))
                .unwrap();
            store.grant_on(user.id, &team, RoleField::Member).unwrap();
            store
                .add_role_parent(team.role(RoleField::Member).unwrap(), org.role(RoleField::Execute).unwrap())
                .unwrap();
        }
    }

    let engine = AccessEngine::new(
        store.clone(),
        Arc::new(StaticLicense(LicenseInfo::open())),
        AccessSettings::default(),
    );
    Fixture {
        store,
        engine,
        user,
        templates,
    }
}

fn bench_role_membership(c: &mut Criterion) {
    let mut group = c.benchmark_group("role_membership");
    for orgs in [1, 10, 100] {
        let fixture = build_fixture(orgs, 10);
        let role = fixture.templates[0].role(RoleField::Execute).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(orgs), &orgs, |b, _| {
            b.iter(|| black_box(fixture.store.principal_in_role(fixture.user.id, role)));
        });
    }
    group.finish();
}

fn bench_point_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_check_start");
    for orgs in [1, 10, 100] {
        let fixture = build_fixture(orgs, 10);
        let jt = fixture.templates.last().unwrap().clone();
        group.bench_with_input(BenchmarkId::from_parameter(orgs), &orgs, |b, _| {
            b.iter(|| {
                black_box(
                    fixture
                        .engine
                        .check_access(&fixture.user, ResourceType::JobTemplate, Action::Start, ActionArgs::on(&jt))
                        .unwrap(),
                )
            });
        });
    }
    group.finish();
}

fn bench_visibility(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_visible_templates");
    for orgs in [1, 10, 100] {
        let fixture = build_fixture(orgs, 10);
        group.throughput(Throughput::Elements(fixture.templates.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(orgs), &orgs, |b, _| {
            b.iter(|| {
                black_box(
                    fixture
                        .engine
                        .list_visible(&fixture.user, ResourceType::JobTemplate)
                        .unwrap(),
                )
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_role_membership, bench_point_check, bench_visibility);
criterion_main!(benches);
