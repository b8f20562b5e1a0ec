#![allow(clippy::result_large_err)]
//! # Access Core
//!
//! Role-based access control for a multi-tenant automation platform.
//!
//! ## Architecture
//!
//! - **Role Graph**: implicit roles per resource, inherited through a DAG
//! - **Policies**: one access policy per resource type, dispatched through a static registry
//! - **Related Fields**: rights checks on every reference a create or edit introduces
//! - **License Gate**: subscription validity, host counts and per-organization host caps
//! - **Capabilities**: per-object action maps for user interfaces
//! - **Store**: the read-only resource adapter, with an in-memory reference implementation
//! - **Telemetry**: structured decision logging and metrics

pub mod access;
pub mod config;
pub mod error;
pub mod rbac;
pub mod store;
pub mod telemetry;

pub use error::{AccessError, ErrorCode, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::access::{
        check_superuser, AccessContext, AccessEngine, AccessMessages, Action, ActionArgs, Capabilities,
        Capability, CapabilityCache, FileLicenseValidator, LicenseInfo, LicenseValidator, Payload, Policy,
        PolicyRegistry, StaticLicense,
    };
    pub use crate::config::{AccessSettings, Settings};
    pub use crate::error::{AccessError, ErrorCode, ErrorDetails, ErrorSeverity, Result};
    pub use crate::rbac::{
        Principal, PrincipalId, Resource, ResourceId, ResourceRef, ResourceType, Role, RoleAssignment,
        RoleField, RoleGraph, RoleId,
    };
    pub use crate::store::{InMemoryStore, Query, ResourceStore};
}
