//! Visibility predicates over stored resources.
//!
//! A [`Query`] is a pure description; evaluation happens against a
//! [`ResourceStore`] through a [`QueryEvaluator`], which memoizes each
//! principal's effective role set for the duration of one evaluation.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::rbac::models::{PrincipalId, Resource, ResourceId, ResourceType, RoleField, RoleId};
use crate::store::ResourceStore;

/// A filter predicate over resources of one type.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Every instance.
    All,
    /// No instance.
    None,
    /// Instances with one of these ids.
    Ids(BTreeSet<ResourceId>),
    /// Instances whose `role_field` role is held by the principal, directly
    /// or through an ancestor.
    Accessible {
        principal: PrincipalId,
        role_field: RoleField,
    },
    /// Instances whose single-valued relation satisfies the inner query.
    /// A missing or dangling relation never matches.
    Related { field: String, query: Box<Query> },
    /// Instances where at least one member of a collection satisfies the
    /// inner query.
    AnyRelated { collection: String, query: Box<Query> },
    /// Instances that have no value for a relation.
    RelationIsNull(String),
    /// Instances whose attribute equals a value.
    AttrEq { key: String, value: Value },
    /// Dispatch on the concrete kind, for abstract lookups.
    ByKind(Vec<(ResourceType, Query)>),
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn ids<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ResourceId>,
    {
        Self::Ids(ids.into_iter().map(Into::into).collect())
    }

    pub fn accessible(principal: PrincipalId, role_field: RoleField) -> Self {
        Self::Accessible {
            principal,
            role_field,
        }
    }

    pub fn related(field: impl Into<String>, query: Query) -> Self {
        Self::Related {
            field: field.into(),
            query: Box::new(query),
        }
    }

    pub fn any_related(collection: impl Into<String>, query: Query) -> Self {
        Self::AnyRelated {
            collection: collection.into(),
            query: Box::new(query),
        }
    }

    pub fn attr_eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::AttrEq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn or(self, other: Query) -> Self {
        match (self, other) {
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::None, q) | (q, Self::None) => q,
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), q) => {
                left.push(q);
                Self::Or(left)
            }
            (a, b) => Self::Or(vec![a, b]),
        }
    }

    pub fn and(self, other: Query) -> Self {
        match (self, other) {
            (Self::None, _) | (_, Self::None) => Self::None,
            (Self::All, q) | (q, Self::All) => q,
            (Self::And(mut left), q) => {
                left.push(q);
                Self::And(left)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Self::All => Self::None,
            Self::None => Self::All,
            Self::Not(inner) => *inner,
            q => Self::Not(Box::new(q)),
        }
    }

    /// Fold a list of alternatives.
    pub fn any_of(queries: impl IntoIterator<Item = Query>) -> Self {
        queries.into_iter().fold(Self::None, Self::or)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Evaluation
// ═══════════════════════════════════════════════════════════════════════════════

/// Evaluates queries against a store, memoizing effective roles.
pub struct QueryEvaluator<'a> {
    store: &'a dyn ResourceStore,
    effective: HashMap<PrincipalId, HashSet<RoleId>>,
}

impl<'a> QueryEvaluator<'a> {
    pub fn new(store: &'a dyn ResourceStore) -> Self {
        Self {
            store,
            effective: HashMap::new(),
        }
    }

    pub fn matches(&mut self, query: &Query, resource: &Resource) -> bool {
        match query {
            Query::All => true,
            Query::None => false,
            Query::Ids(ids) => ids.contains(&resource.id),
            Query::Accessible {
                principal,
                role_field,
            } => match resource.role(*role_field) {
                Some(role) => self.effective_roles(*principal).contains(&role),
                None => false,
            },
            Query::Related { field, query } => {
                let Some(target) = resource.relation(field) else {
                    return false;
                };
                match self.store.get(target.kind, target.id) {
                    Some(related) => self.matches(query, &related),
                    None => false,
                }
            }
            Query::AnyRelated { collection, query } => {
                let targets = resource.collection(collection).to_vec();
                targets.into_iter().any(|target| {
                    self.store
                        .get(target.kind, target.id)
                        .map(|related| self.matches(query, &related))
                        .unwrap_or(false)
                })
            }
            Query::RelationIsNull(field) => resource.relation(field).is_none(),
            Query::AttrEq { key, value } => resource.attributes.get(key) == Some(value),
            Query::ByKind(branches) => branches
                .iter()
                .find(|(kind, _)| *kind == resource.kind)
                .map(|(_, q)| self.matches(q, resource))
                .unwrap_or(false),
            Query::And(queries) => queries.iter().all(|q| self.matches(q, resource)),
            Query::Or(queries) => queries.iter().any(|q| self.matches(q, resource)),
            Query::Not(inner) => !self.matches(inner, resource),
        }
    }

    fn effective_roles(&mut self, principal: PrincipalId) -> &HashSet<RoleId> {
        let store = self.store;
        self.effective
            .entry(principal)
            .or_insert_with(|| store.effective_roles(principal))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_simplification() {
        assert_eq!(Query::None.or(Query::All), Query::All);
        assert_eq!(Query::None.or(Query::ids([1u64])), Query::ids([1u64]));
        let combined = Query::ids([1u64]).or(Query::ids([2u64])).or(Query::ids([3u64]));
        match combined {
            Query::Or(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_and_simplification() {
        assert_eq!(Query::All.and(Query::ids([1u64])), Query::ids([1u64]));
        assert_eq!(Query::ids([1u64]).and(Query::None), Query::None);
    }

    #[test]
    fn test_negate() {
        assert_eq!(Query::All.negate(), Query::None);
        let q = Query::ids([4u64]);
        assert_eq!(q.clone().negate().negate(), q);
    }

    #[test]
    fn test_any_of_empty_is_none() {
        assert!(Query::any_of(Vec::new()).is_none());
    }
}
