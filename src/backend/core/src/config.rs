//! Configuration management.

use serde::Deserialize;
use std::path::PathBuf;

use crate::telemetry::LoggingConfig;

/// Main engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Access rule toggles
    #[serde(default)]
    pub access: AccessSettings,

    /// License source
    #[serde(default)]
    pub license: LicenseSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Platform settings that change access rules.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessSettings {
    /// Whether organization admins may manage organization membership
    #[serde(default = "default_manage_organization_auth")]
    pub manage_organization_auth: bool,

    /// Whether organization admins can see every user
    #[serde(default = "default_org_admins_can_see_all_users")]
    pub org_admins_can_see_all_users: bool,

    /// Instance groups that can never be deleted
    #[serde(default = "default_reserved_instance_groups")]
    pub reserved_instance_groups: Vec<String>,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            manage_organization_auth: default_manage_organization_auth(),
            org_admins_can_see_all_users: default_org_admins_can_see_all_users(),
            reserved_instance_groups: default_reserved_instance_groups(),
        }
    }
}

impl AccessSettings {
    pub fn is_reserved_instance_group(&self, name: &str) -> bool {
        self.reserved_instance_groups.iter().any(|reserved| reserved == name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LicenseSettings {
    /// JSON license terms file; no file means no license
    pub path: Option<PathBuf>,

    /// Treat the deployment as open (no license enforcement)
    #[serde(default)]
    pub open: bool,
}

// Default value functions
fn default_manage_organization_auth() -> bool { true }
fn default_org_admins_can_see_all_users() -> bool { true }
fn default_reserved_instance_groups() -> Vec<String> {
    vec!["controlplane".to_string(), "default".to_string()]
}

impl Settings {
    /// Load configuration from `.env` and `ACCESS__*` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("ACCESS").separator("__"))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("ACCESS").separator("__"))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}
