//! Role graph foundations.
//!
//! This module provides:
//! - **Models**: principals, roles, assignments and the generic resource record
//! - **Graph**: the role inheritance DAG with ancestor/descendant closure
//! - **Schema**: the fixed set of roles each resource type owns and how they chain
//!
//! # Usage
//!
//! ```rust,ignore
//! use access_core::rbac::{RoleGraph, RoleId};
//!
//! let mut graph = RoleGraph::new();
//! graph.add_role(RoleId(1));
//! graph.add_role(RoleId(2));
//! graph.add_parent(RoleId(1), RoleId(2))?;
//! assert!(graph.implies(RoleId(1), RoleId(2)));
//! ```

pub mod graph;
pub mod models;
pub mod schema;

pub use graph::RoleGraph;
pub use models::{
    Principal, PrincipalId, Resource, ResourceId, ResourceRef, ResourceType, Role,
    RoleAssignment, RoleField, RoleId,
};
pub use schema::{implicit_roles, ImplicitRole, ParentRole};
