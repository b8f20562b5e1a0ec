//! Access decisions.
//!
//! This module provides:
//! - **Engine**: the public entry points (`check_access`, `query_visible`, capabilities)
//! - **Policy**: the per-type contract, dispatch and the superuser bypass
//! - **Policies**: one built-in policy per resource type
//! - **Related fields**: validation of references in create/edit payloads
//! - **License gate**: subscription, host count and per-organization host caps
//! - **Capabilities**: the per-object action map shown by user interfaces
//!
//! # Usage
//!
//! ```rust,ignore
//! use access_core::access::{AccessEngine, Action, ActionArgs, StaticLicense, LicenseInfo};
//!
//! let engine = AccessEngine::new(store, Arc::new(StaticLicense(LicenseInfo::open())), settings);
//! let allowed = engine.check_access(&alice, ResourceType::JobTemplate, Action::Start, ActionArgs::on(&template))?;
//! ```

pub mod capabilities;
pub mod context;
pub mod engine;
pub mod license;
pub mod payload;
pub mod policies;
pub mod policy;
pub mod registry;
pub mod related;

pub use capabilities::{compute_capabilities, Capabilities, Capability, CapabilityCache};
pub use context::{AccessContext, AccessMessages};
pub use engine::AccessEngine;
pub use license::{
    check_license, check_org_host_limit, FileLicenseValidator, LicenseCheck, LicenseInfo, LicenseTerms,
    LicenseValidator, StaticLicense, OPEN_LICENSE,
};
pub use payload::Payload;
pub use policy::{check_superuser, dispatch, Action, ActionArgs, Policy};
pub use registry::PolicyRegistry;
pub use related::RelatedField;
