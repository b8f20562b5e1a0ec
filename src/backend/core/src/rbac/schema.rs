//! Implicit role topology per resource type.
//!
//! Each resource type that exposes access control owns a fixed set of
//! roles. A role's parents are either sibling roles on the same resource,
//! roles on the resource's organization, or a system singleton.

use crate::rbac::models::{ResourceType, RoleField};

/// Where a parent role of an implicit role comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRole {
    /// Another role on the same resource.
    Local(RoleField),
    /// A role on the resource's organization.
    Organization(RoleField),
    /// A process-wide singleton role.
    Singleton(RoleField),
}

/// One role a resource type owns, with its parents.
#[derive(Debug, Clone, Copy)]
pub struct ImplicitRole {
    pub field: RoleField,
    pub parents: &'static [ParentRole],
}

const fn role(field: RoleField, parents: &'static [ParentRole]) -> ImplicitRole {
    ImplicitRole { field, parents }
}

use ParentRole::{Local, Organization as Org, Singleton};
use RoleField::*;

const ORGANIZATION: &[ImplicitRole] = &[
    role(Admin, &[Singleton(SystemAdministrator)]),
    role(Execute, &[Local(Admin)]),
    role(ProjectAdmin, &[Local(Admin)]),
    role(InventoryAdmin, &[Local(Admin)]),
    role(CredentialAdmin, &[Local(Admin)]),
    role(WorkflowAdmin, &[Local(Admin)]),
    role(NotificationAdmin, &[Local(Admin)]),
    role(JobTemplateAdmin, &[Local(Admin)]),
    role(ExecutionEnvironmentAdmin, &[Local(Admin)]),
    role(Member, &[Local(Admin)]),
    role(Approval, &[Local(Admin)]),
    role(Auditor, &[Singleton(SystemAuditor)]),
    role(
        Read,
        &[
            Local(Member),
            Local(Auditor),
            Local(Execute),
            Local(ProjectAdmin),
            Local(InventoryAdmin),
            Local(CredentialAdmin),
            Local(WorkflowAdmin),
            Local(NotificationAdmin),
            Local(JobTemplateAdmin),
            Local(ExecutionEnvironmentAdmin),
        ],
    ),
];

const TEAM: &[ImplicitRole] = &[
    role(Admin, &[Org(Admin)]),
    role(Member, &[]),
    role(Read, &[Local(Admin), Org(Auditor), Local(Member)]),
];

const INVENTORY: &[ImplicitRole] = &[
    role(Admin, &[Org(InventoryAdmin)]),
    role(Update, &[Local(Admin)]),
    role(Adhoc, &[Local(Admin)]),
    role(Use, &[Local(Adhoc)]),
    role(Read, &[Org(Auditor), Local(Update), Local(Use), Local(Admin)]),
];

const CREDENTIAL: &[ImplicitRole] = &[
    role(Admin, &[Singleton(SystemAdministrator), Org(CredentialAdmin)]),
    role(Use, &[Local(Admin)]),
    role(Read, &[Singleton(SystemAuditor), Org(Auditor), Local(Use), Local(Admin)]),
];

const PROJECT: &[ImplicitRole] = &[
    role(Admin, &[Org(ProjectAdmin), Singleton(SystemAdministrator)]),
    role(Use, &[Local(Admin)]),
    role(Update, &[Local(Admin)]),
    role(Read, &[Org(Auditor), Singleton(SystemAuditor), Local(Use), Local(Update)]),
];

const JOB_TEMPLATE: &[ImplicitRole] = &[
    role(Admin, &[Org(JobTemplateAdmin)]),
    role(Execute, &[Local(Admin), Org(Execute)]),
    role(Read, &[Org(Auditor), Local(Execute), Local(Admin)]),
];

const WORKFLOW_JOB_TEMPLATE: &[ImplicitRole] = &[
    role(Admin, &[Singleton(SystemAdministrator), Org(WorkflowAdmin)]),
    role(Execute, &[Local(Admin), Org(Execute)]),
    role(Approval, &[Org(Approval), Local(Admin)]),
    role(Read, &[Singleton(SystemAuditor), Org(Auditor), Local(Execute), Local(Admin)]),
];

const INSTANCE_GROUP: &[ImplicitRole] = &[
    role(Admin, &[Singleton(SystemAdministrator)]),
    role(Use, &[Local(Admin)]),
    role(Read, &[Local(Use), Singleton(SystemAuditor)]),
];

/// The roles a resource of `kind` owns, in creation order.
///
/// Local parents always precede the roles that reference them.
pub fn implicit_roles(kind: ResourceType) -> &'static [ImplicitRole] {
    match kind {
        ResourceType::Organization => ORGANIZATION,
        ResourceType::Team => TEAM,
        ResourceType::Inventory => INVENTORY,
        ResourceType::Credential => CREDENTIAL,
        ResourceType::Project => PROJECT,
        ResourceType::JobTemplate => JOB_TEMPLATE,
        ResourceType::WorkflowJobTemplate => WORKFLOW_JOB_TEMPLATE,
        ResourceType::InstanceGroup => INSTANCE_GROUP,
        _ => &[],
    }
}

/// Whether resources of `kind` own any roles.
pub fn has_roles(kind: ResourceType) -> bool {
    !implicit_roles(kind).is_empty()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_parents_declared_first() {
        for kind in ResourceType::ALL {
            let roles = implicit_roles(kind);
            for (position, implicit) in roles.iter().enumerate() {
                for parent in implicit.parents {
                    if let ParentRole::Local(field) = parent {
                        let declared = roles[..position].iter().any(|r| r.field == *field);
                        assert!(declared, "{} {} references {} before it exists", kind, implicit.field, field);
                    }
                }
            }
        }
    }

    #[test]
    fn test_every_role_owning_type_has_admin_and_read() {
        for kind in ResourceType::ALL {
            let roles = implicit_roles(kind);
            if roles.is_empty() {
                continue;
            }
            assert!(roles.iter().any(|r| r.field == RoleField::Read), "{} lacks read", kind);
            assert!(
                roles.iter().any(|r| r.field == RoleField::Admin || r.field == RoleField::Member),
                "{} lacks admin",
                kind
            );
        }
    }

    #[test]
    fn test_types_without_roles() {
        assert!(!has_roles(ResourceType::Host));
        assert!(!has_roles(ResourceType::Job));
        assert!(!has_roles(ResourceType::UnifiedJobTemplate));
        assert!(has_roles(ResourceType::Inventory));
    }
}
