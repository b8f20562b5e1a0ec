//! License and host quota gate.
//!
//! Host creation and job launches are limited by the license's instance
//! count and expiry, and by an optional per-organization host cap. The
//! license itself is supplied by a [`LicenseValidator`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::access::context::AccessContext;
use crate::error::{AccessError, ErrorCode, Result};
use crate::rbac::models::{Resource, ResourceType};
use crate::store::{Query, ResourceStore};
use crate::telemetry::DecisionMetrics;

/// License type that disables every license check.
pub const OPEN_LICENSE: &str = "open";

// ═══════════════════════════════════════════════════════════════════════════════
// License Snapshot
// ═══════════════════════════════════════════════════════════════════════════════

/// A point-in-time view of the license.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseInfo {
    /// Empty when no license is installed.
    pub license_type: String,
    pub instance_count: i64,
    pub free_instances: i64,
    /// Seconds until the license date; absent without a license.
    pub time_remaining: Option<i64>,
    /// Seconds until the grace period ends.
    pub grace_period_remaining: Option<i64>,
    pub trial: bool,
}

impl LicenseInfo {
    /// No license installed.
    pub fn missing() -> Self {
        Self {
            license_type: String::new(),
            instance_count: 0,
            free_instances: 0,
            time_remaining: None,
            grace_period_remaining: None,
            trial: false,
        }
    }

    /// A license with no enforcement.
    pub fn open() -> Self {
        Self {
            license_type: OPEN_LICENSE.to_string(),
            ..Self::missing()
        }
    }

    /// An enterprise license for `instance_count` hosts, valid for `days`.
    pub fn enterprise(instance_count: i64, free_instances: i64, days: i64) -> Self {
        let seconds = days * 86_400;
        Self {
            license_type: "enterprise".to_string(),
            instance_count,
            free_instances,
            time_remaining: Some(seconds),
            grace_period_remaining: Some(seconds),
            trial: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.license_type == OPEN_LICENSE
    }

    pub fn is_missing(&self) -> bool {
        self.license_type.is_empty() || self.time_remaining.is_none()
    }
}

/// Source of license snapshots.
pub trait LicenseValidator: Send + Sync {
    fn validate(&self) -> LicenseInfo;
}

/// A fixed snapshot.
#[derive(Debug, Clone)]
pub struct StaticLicense(pub LicenseInfo);

impl LicenseValidator for StaticLicense {
    fn validate(&self) -> LicenseInfo {
        self.0.clone()
    }
}

impl<V: LicenseValidator + ?Sized> LicenseValidator for Arc<V> {
    fn validate(&self) -> LicenseInfo {
        (**self).validate()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// File-backed License
// ═══════════════════════════════════════════════════════════════════════════════

/// License terms as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseTerms {
    pub license_type: String,
    pub instance_count: i64,
    /// Expiry of the license.
    pub license_date: DateTime<Utc>,
    #[serde(default)]
    pub trial: bool,
    /// Extra time after expiry during which the license still works.
    #[serde(default = "default_grace_period", with = "humantime_serde")]
    pub grace_period: Duration,
}

fn default_grace_period() -> Duration {
    Duration::from_secs(30 * 86_400)
}

/// Reads license terms from a JSON file and counts hosts in the store.
pub struct FileLicenseValidator {
    terms: Option<LicenseTerms>,
    store: Arc<dyn ResourceStore>,
}

impl FileLicenseValidator {
    /// Load terms from `path`.
    pub fn load(path: impl AsRef<Path>, store: Arc<dyn ResourceStore>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AccessError::configuration(format!("cannot read license file {}", path.display())).with_source(e)
        })?;
        let terms: LicenseTerms = serde_json::from_str(&raw)?;
        debug!(
            license_type = %terms.license_type,
            instance_count = terms.instance_count,
            license_date = %terms.license_date,
            "License terms loaded"
        );
        Ok(Self {
            terms: Some(terms),
            store,
        })
    }

    /// A validator with no license installed.
    pub fn unlicensed(store: Arc<dyn ResourceStore>) -> Self {
        Self { terms: None, store }
    }

    pub fn with_terms(terms: LicenseTerms, store: Arc<dyn ResourceStore>) -> Self {
        Self {
            terms: Some(terms),
            store,
        }
    }

    pub fn terms(&self) -> Option<&LicenseTerms> {
        self.terms.as_ref()
    }
}

impl LicenseValidator for FileLicenseValidator {
    fn validate(&self) -> LicenseInfo {
        let Some(terms) = &self.terms else {
            return LicenseInfo::missing();
        };
        if terms.license_type == OPEN_LICENSE {
            return LicenseInfo::open();
        }

        let time_remaining = (terms.license_date - Utc::now()).num_seconds();
        let grace = if terms.trial {
            0
        } else {
            i64::try_from(terms.grace_period.as_secs()).unwrap_or(i64::MAX)
        };
        let used = distinct_host_names(self.store.filter(ResourceType::Host, &Query::All).iter()).len() as i64;

        LicenseInfo {
            license_type: terms.license_type.clone(),
            instance_count: terms.instance_count,
            free_instances: terms.instance_count - used,
            time_remaining: Some(time_remaining),
            grace_period_remaining: Some(time_remaining.saturating_add(grace)),
            trial: terms.trial,
        }
    }
}

fn distinct_host_names<'r>(hosts: impl Iterator<Item = &'r Resource>) -> HashSet<&'r str> {
    hosts.map(|host| host.name.as_str()).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Gate
// ═══════════════════════════════════════════════════════════════════════════════

/// Options for [`check_license`].
#[derive(Debug, Clone, Copy)]
pub struct LicenseCheck<'a> {
    /// Name of a host about to be added or renamed.
    pub add_host_name: Option<&'a str>,
    pub check_expiration: bool,
    /// Deny without a reason instead of naming the license problem.
    pub quiet: bool,
}

impl Default for LicenseCheck<'_> {
    fn default() -> Self {
        Self {
            add_host_name: None,
            check_expiration: true,
            quiet: false,
        }
    }
}

impl<'a> LicenseCheck<'a> {
    pub fn adding_host(name: Option<&'a str>) -> Self {
        Self {
            add_host_name: name,
            ..Self::default()
        }
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

fn license_denial(code: ErrorCode, reason: &'static str, message: String, quiet: bool) -> AccessError {
    DecisionMetrics::record_license_denial(reason);
    info!(reason, quiet, "License gate denied action");
    if quiet {
        return AccessError::permission_denied_quietly();
    }
    AccessError::new(code, message)
}

/// Enforce license presence, expiry and instance count.
pub fn check_license(cx: &AccessContext<'_>, check: LicenseCheck<'_>) -> Result<()> {
    let license = cx.license_info();
    if license.is_open() {
        return Ok(());
    }
    if license.is_missing() {
        return Err(license_denial(
            ErrorCode::LicenseMissing,
            "missing",
            "License is missing.".to_string(),
            check.quiet,
        ));
    }
    if check.check_expiration && license.grace_period_remaining.unwrap_or(0) <= 0 {
        return Err(license_denial(
            ErrorCode::LicenseExpired,
            "expired",
            "License has expired.".to_string(),
            check.quiet,
        ));
    }

    let free = license.free_instances;
    match check.add_host_name {
        Some(name) => {
            if host_name_exists(cx, name) {
                return Ok(());
            }
            if free == 0 {
                return Err(license_denial(
                    ErrorCode::LicenseCountExceeded,
                    "count_reached",
                    format!("License count of {} instances has been reached.", license.instance_count),
                    check.quiet,
                ));
            }
            if free < 0 {
                return Err(license_denial(
                    ErrorCode::LicenseCountExceeded,
                    "count_exceeded",
                    format!("License count of {} instances has been exceeded.", license.instance_count),
                    check.quiet,
                ));
            }
        }
        None if free < 0 => {
            return Err(license_denial(
                ErrorCode::LicenseCountExceeded,
                "count_exceeded",
                "Host count exceeds available instances.".to_string(),
                check.quiet,
            ));
        }
        None => {}
    }
    Ok(())
}

fn host_name_exists(cx: &AccessContext<'_>, name: &str) -> bool {
    cx.filter(ResourceType::Host, &Query::All)
        .iter()
        .any(|host| host.name == name)
}

/// Enforce the per-organization host cap for an inventory.
///
/// A cap of zero means unlimited. Hosts are counted by distinct name, so
/// re-adding or renaming to a name already present never counts twice.
pub fn check_org_host_limit(cx: &AccessContext<'_>, inventory: &Resource, add_host_name: Option<&str>) -> Result<()> {
    if cx.license_info().is_open() {
        return Ok(());
    }
    let Some(org) = cx.organization_of(inventory) else {
        return Ok(());
    };
    let limit = org.attr_i64("max_hosts").unwrap_or(0);
    if limit <= 0 {
        return Ok(());
    }

    let org_hosts = cx.filter(
        ResourceType::Host,
        &Query::related("inventory", Query::related("organization", Query::ids([org.id]))),
    );
    let names = distinct_host_names(org_hosts.iter());
    let active = names.len() as i64;

    if active > limit {
        return Err(org_limit_denial(
            &org,
            limit,
            active,
            format!("Organization host limit of {} has been exceeded.", limit),
        ));
    }
    if let Some(name) = add_host_name {
        if !names.contains(name) && active == limit {
            return Err(org_limit_denial(
                &org,
                limit,
                active,
                format!(
                    "You have already reached the maximum number of {} hosts allowed for your organization. Contact your System Administrator for assistance.",
                    limit
                ),
            ));
        }
    }
    Ok(())
}

fn org_limit_denial(org: &Resource, limit: i64, active: i64, message: String) -> AccessError {
    DecisionMetrics::record_license_denial("org_host_limit");
    info!(
        organization = %org.id,
        limit,
        active,
        "Organization host limit reached"
    );
    AccessError::new(ErrorCode::HostLimitReached, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_license_info_states() {
        assert!(LicenseInfo::missing().is_missing());
        assert!(LicenseInfo::open().is_open());
        let enterprise = LicenseInfo::enterprise(10, 4, 30);
        assert!(!enterprise.is_missing());
        assert_eq!(enterprise.grace_period_remaining, Some(30 * 86_400));
    }

    #[test]
    fn test_terms_parse_humantime_grace() {
        let terms: LicenseTerms = serde_json::from_str(
            r#"{"license_type": "enterprise", "instance_count": 100,
                "license_date": "2030-01-01T00:00:00Z", "grace_period": "7days"}"#,
        )
        .unwrap();
        assert_eq!(terms.grace_period, Duration::from_secs(7 * 86_400));
        assert!(!terms.trial);

        let terms: LicenseTerms = serde_json::from_str(
            r#"{"license_type": "enterprise", "instance_count": 5, "license_date": "2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(terms.grace_period, default_grace_period());
    }

    #[test]
    fn test_distinct_host_names() {
        let hosts = [
            Resource::new(ResourceType::Host, 1, "web"),
            Resource::new(ResourceType::Host, 2, "web"),
            Resource::new(ResourceType::Host, 3, "db"),
        ];
        let names = distinct_host_names(hosts.iter());
        assert_eq!(names.len(), 2);
        assert!(names.contains("web"));
    }
}
