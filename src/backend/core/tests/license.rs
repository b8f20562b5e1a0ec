//! File-backed license terms and the gates that consult them.

mod common;

use std::io::Write;
use std::sync::Arc;

use access_core::access::{AccessEngine, Action, ActionArgs, FileLicenseValidator, LicenseValidator, Payload};
use access_core::config::AccessSettings;
use access_core::error::ErrorCode;
use access_core::rbac::{ResourceType, RoleField};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tempfile::NamedTempFile;

use common::World;

// ============================================================================
// Utilities
// ============================================================================

fn license_file(terms: Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", terms).unwrap();
    file.flush().unwrap();
    file
}

fn enterprise_terms(instance_count: i64, expires_in: Duration, trial: bool) -> Value {
    json!({
        "license_type": "enterprise",
        "instance_count": instance_count,
        "license_date": (Utc::now() + expires_in).to_rfc3339(),
        "trial": trial,
    })
}

fn file_engine(world: &World, file: &NamedTempFile) -> AccessEngine {
    let validator = FileLicenseValidator::load(file.path(), world.store.clone()).unwrap();
    AccessEngine::new(world.store.clone(), Arc::new(validator), AccessSettings::default())
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_free_instances_count_distinct_host_names() {
    let world = World::new();
    let org = world.organization();
    let first = world.inventory(&org);
    let second = world.inventory(&org);
    world.host(&first, "web");
    world.host(&second, "web");
    world.host(&second, "db");

    let file = license_file(enterprise_terms(5, Duration::days(90), false));
    let validator = FileLicenseValidator::load(file.path(), world.store.clone()).unwrap();
    let info = validator.validate();

    assert_eq!(info.instance_count, 5);
    assert_eq!(info.free_instances, 3);
    assert!(!info.is_missing());
    assert!(!info.trial);
}

#[test]
fn test_open_license_file_disables_enforcement() {
    let world = World::new();
    let file = license_file(json!({
        "license_type": "open",
        "instance_count": 0,
        "license_date": Utc::now().to_rfc3339(),
    }));
    let validator = FileLicenseValidator::load(file.path(), world.store.clone()).unwrap();
    assert!(validator.validate().is_open());
}

#[test]
fn test_missing_file_is_a_configuration_error() {
    let world = World::new();
    let dir = tempfile::tempdir().unwrap();
    let err = FileLicenseValidator::load(dir.path().join("license.json"), world.store.clone())
        .err()
        .unwrap();
    assert_eq!(err.code(), ErrorCode::ConfigurationError);
}

#[test]
fn test_malformed_file_is_rejected() {
    let world = World::new();
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{{\"license_type\": ").unwrap();
    assert!(FileLicenseValidator::load(file.path(), world.store.clone()).is_err());
}

// ============================================================================
// Expiry
// ============================================================================

#[test]
fn test_expired_trial_blocks_launch() {
    let world = World::new();
    let admin = world.superuser();
    let org = world.organization();
    let inventory = world.inventory(&org);
    let project = world.project(&org);
    let jt = world.job_template(&org, &inventory, &project);

    let file = license_file(enterprise_terms(10, Duration::days(-1), true));
    let engine = file_engine(&world, &file);

    let err = engine
        .check_access(&admin, ResourceType::JobTemplate, Action::Start, ActionArgs::on(&jt))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LicenseExpired);

    // Capability views never consult the license.
    assert!(engine
        .check_access(
            &admin,
            ResourceType::JobTemplate,
            Action::Start,
            ActionArgs::on(&jt).without_license_check(),
        )
        .unwrap());
}

#[test]
fn test_expired_license_within_grace_period_still_launches() {
    let world = World::new();
    let user = world.user();
    let org = world.organization();
    let inventory = world.inventory(&org);
    let project = world.project(&org);
    let jt = world.job_template(&org, &inventory, &project);
    world.grant(&user, &jt, RoleField::Execute);

    let file = license_file(enterprise_terms(10, Duration::days(-1), false));
    let engine = file_engine(&world, &file);

    assert!(engine
        .check_access(&user, ResourceType::JobTemplate, Action::Start, ActionArgs::on(&jt))
        .unwrap());
}

#[test]
fn test_unlicensed_deployment_cannot_launch() {
    let world = World::new();
    let admin = world.superuser();
    let org = world.organization();
    let inventory = world.inventory(&org);
    let project = world.project(&org);
    let jt = world.job_template(&org, &inventory, &project);

    let validator = FileLicenseValidator::unlicensed(world.store.clone());
    let engine = AccessEngine::new(world.store.clone(), Arc::new(validator), AccessSettings::default());

    let err = engine
        .check_access(&admin, ResourceType::JobTemplate, Action::Start, ActionArgs::on(&jt))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LicenseMissing);
}

// ============================================================================
// Host Count
// ============================================================================

#[test]
fn test_host_count_tracks_the_store() {
    let world = World::new();
    let user = world.user();
    let org = world.organization();
    let inventory = world.inventory(&org);
    world.host(&inventory, "web");
    world.grant(&user, &inventory, RoleField::Admin);

    let file = license_file(enterprise_terms(2, Duration::days(90), false));
    let engine = file_engine(&world, &file);

    let db = Payload::new().with("inventory", inventory.id.0).with("name", "db");
    assert!(engine
        .check_access(&user, ResourceType::Host, Action::Add, ActionArgs::payload(&db))
        .unwrap());
    world.host(&inventory, "db");

    let cache = Payload::new().with("inventory", inventory.id.0).with("name", "cache");
    let err = engine
        .check_access(&user, ResourceType::Host, Action::Add, ActionArgs::payload(&cache))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LicenseCountExceeded);
    assert!(err.user_message().contains("has been reached"));
}
