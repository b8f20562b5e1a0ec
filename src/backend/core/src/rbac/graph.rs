//! Role inheritance graph.
//!
//! An edge `parent -> child` means membership in `parent` implies
//! membership in `child`. Holding a role therefore grants every role
//! reachable from it; a role is "held" by a principal when the principal
//! holds the role itself or any of its ancestors.

use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Bfs, Reversed};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

use crate::error::{AccessError, ErrorCode, Result};
use crate::rbac::models::RoleId;

/// Directed acyclic graph of role implications.
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    graph: StableDiGraph<RoleId, ()>,

    /// Map from RoleId to graph node index for O(1) lookup
    index: HashMap<RoleId, NodeIndex>,
}

impl RoleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role node. Adding an existing role is a no-op.
    pub fn add_role(&mut self, role: RoleId) {
        if !self.index.contains_key(&role) {
            let idx = self.graph.add_node(role);
            self.index.insert(role, idx);
        }
    }

    /// Remove a role together with all of its edges.
    pub fn remove_role(&mut self, role: RoleId) -> bool {
        match self.index.remove(&role) {
            Some(idx) => {
                self.graph.remove_node(idx);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, role: RoleId) -> bool {
        self.index.contains_key(&role)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Make `parent` imply `child`.
    ///
    /// Fails if either role is unknown or if the edge would close a cycle.
    pub fn add_parent(&mut self, parent: RoleId, child: RoleId) -> Result<()> {
        let parent_idx = self.node(parent)?;
        let child_idx = self.node(child)?;

        if parent == child || has_path_connecting(&self.graph, child_idx, parent_idx, None) {
            return Err(AccessError::with_internal(
                ErrorCode::RoleCycleDetected,
                "Role inheritance would create a cycle",
                format!("role {} already implies role {}", child, parent),
            ));
        }

        if self.graph.find_edge(parent_idx, child_idx).is_none() {
            self.graph.add_edge(parent_idx, child_idx, ());
        }
        Ok(())
    }

    /// Drop the `parent -> child` implication if present.
    pub fn remove_parent(&mut self, parent: RoleId, child: RoleId) -> bool {
        let (Some(p), Some(c)) = (self.index.get(&parent), self.index.get(&child)) else {
            return false;
        };
        match self.graph.find_edge(*p, *c) {
            Some(edge) => self.graph.remove_edge(edge).is_some(),
            None => false,
        }
    }

    /// Direct parents of a role.
    pub fn parents(&self, role: RoleId) -> Vec<RoleId> {
        self.neighbors(role, Direction::Incoming)
    }

    /// Direct children of a role.
    pub fn children(&self, role: RoleId) -> Vec<RoleId> {
        self.neighbors(role, Direction::Outgoing)
    }

    /// Every role that implies `role`, excluding itself.
    pub fn ancestors(&self, role: RoleId) -> HashSet<RoleId> {
        let Some(&start) = self.index.get(&role) else {
            return HashSet::new();
        };
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, start);
        let mut found = HashSet::new();
        while let Some(idx) = bfs.next(reversed) {
            if idx != start {
                found.insert(self.graph[idx]);
            }
        }
        found
    }

    /// Every role implied by `role`, excluding itself.
    pub fn descendants(&self, role: RoleId) -> HashSet<RoleId> {
        let Some(&start) = self.index.get(&role) else {
            return HashSet::new();
        };
        let mut bfs = Bfs::new(&self.graph, start);
        let mut found = HashSet::new();
        while let Some(idx) = bfs.next(&self.graph) {
            if idx != start {
                found.insert(self.graph[idx]);
            }
        }
        found
    }

    /// Whether holding `holder` implies `role`.
    pub fn implies(&self, holder: RoleId, role: RoleId) -> bool {
        if holder == role {
            return self.contains(role);
        }
        match (self.index.get(&holder), self.index.get(&role)) {
            (Some(h), Some(r)) => has_path_connecting(&self.graph, *h, *r, None),
            _ => false,
        }
    }

    /// The closure of `held` under implication.
    pub fn effective_roles<'a>(&self, held: impl IntoIterator<Item = &'a RoleId>) -> HashSet<RoleId> {
        let mut roles = HashSet::new();
        for role in held {
            if roles.contains(role) || !self.contains(*role) {
                continue;
            }
            roles.insert(*role);
            roles.extend(self.descendants(*role));
        }
        roles
    }

    /// Whether any role in `held` implies `role`.
    pub fn held_implies(&self, held: &HashSet<RoleId>, role: RoleId) -> bool {
        if held.contains(&role) {
            return true;
        }
        self.ancestors(role).iter().any(|ancestor| held.contains(ancestor))
    }

    fn node(&self, role: RoleId) -> Result<NodeIndex> {
        self.index.get(&role).copied().ok_or_else(|| {
            AccessError::with_internal(
                ErrorCode::RoleNotFound,
                "Role not found",
                format!("role {} is not part of the role graph", role),
            )
        })
    }

    fn neighbors(&self, role: RoleId, direction: Direction) -> Vec<RoleId> {
        match self.index.get(&role) {
            Some(idx) => self
                .graph
                .neighbors_directed(*idx, direction)
                .map(|n| self.graph[n])
                .collect(),
            None => Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
