//! RBAC data models: identifiers, principals, roles, assignments and the
//! generic resource record every policy operates on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed principal (user) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrincipalId(pub u64);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PrincipalId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Strongly-typed role identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(pub u64);

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RoleId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Strongly-typed resource instance identifier (primary key within a type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resource Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Every resource type that exposes access control.
///
/// `UnifiedJobTemplate` and `UnifiedJob` are abstract: they never appear as
/// the kind of a stored record, only as lookup and registry keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Organization,
    User,
    Team,
    Role,
    Inventory,
    Host,
    Group,
    InventorySource,
    InventoryUpdate,
    Credential,
    CredentialType,
    CredentialInputSource,
    Project,
    ProjectUpdate,
    JobTemplate,
    Job,
    JobEvent,
    JobHostSummary,
    AdHocCommand,
    SystemJobTemplate,
    SystemJob,
    WorkflowJobTemplate,
    WorkflowJobTemplateNode,
    WorkflowJob,
    WorkflowJobNode,
    WorkflowApproval,
    NotificationTemplate,
    Notification,
    Label,
    Schedule,
    InstanceGroup,
    Instance,
    ExecutionEnvironment,
    ActivityStream,
    UnifiedJobTemplate,
    UnifiedJob,
}

impl ResourceType {
    /// All registered resource types, concrete and abstract.
    pub const ALL: [ResourceType; 36] = [
        Self::Organization,
        Self::User,
        Self::Team,
        Self::Role,
        Self::Inventory,
        Self::Host,
        Self::Group,
        Self::InventorySource,
        Self::InventoryUpdate,
        Self::Credential,
        Self::CredentialType,
        Self::CredentialInputSource,
        Self::Project,
        Self::ProjectUpdate,
        Self::JobTemplate,
        Self::Job,
        Self::JobEvent,
        Self::JobHostSummary,
        Self::AdHocCommand,
        Self::SystemJobTemplate,
        Self::SystemJob,
        Self::WorkflowJobTemplate,
        Self::WorkflowJobTemplateNode,
        Self::WorkflowJob,
        Self::WorkflowJobNode,
        Self::WorkflowApproval,
        Self::NotificationTemplate,
        Self::Notification,
        Self::Label,
        Self::Schedule,
        Self::InstanceGroup,
        Self::Instance,
        Self::ExecutionEnvironment,
        Self::ActivityStream,
        Self::UnifiedJobTemplate,
        Self::UnifiedJob,
    ];

    /// Concrete types that are launchable templates.
    pub const UNIFIED_JOB_TEMPLATES: [ResourceType; 5] = [
        Self::JobTemplate,
        Self::Project,
        Self::InventorySource,
        Self::SystemJobTemplate,
        Self::WorkflowJobTemplate,
    ];

    /// Concrete types that are job runs.
    pub const UNIFIED_JOBS: [ResourceType; 6] = [
        Self::Job,
        Self::ProjectUpdate,
        Self::InventoryUpdate,
        Self::AdHocCommand,
        Self::SystemJob,
        Self::WorkflowJob,
    ];

    /// Snake-case identifier, also the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::User => "user",
            Self::Team => "team",
            Self::Role => "role",
            Self::Inventory => "inventory",
            Self::Host => "host",
            Self::Group => "group",
            Self::InventorySource => "inventory_source",
            Self::InventoryUpdate => "inventory_update",
            Self::Credential => "credential",
            Self::CredentialType => "credential_type",
            Self::CredentialInputSource => "credential_input_source",
            Self::Project => "project",
            Self::ProjectUpdate => "project_update",
            Self::JobTemplate => "job_template",
            Self::Job => "job",
            Self::JobEvent => "job_event",
            Self::JobHostSummary => "job_host_summary",
            Self::AdHocCommand => "ad_hoc_command",
            Self::SystemJobTemplate => "system_job_template",
            Self::SystemJob => "system_job",
            Self::WorkflowJobTemplate => "workflow_job_template",
            Self::WorkflowJobTemplateNode => "workflow_job_template_node",
            Self::WorkflowJob => "workflow_job",
            Self::WorkflowJobNode => "workflow_job_node",
            Self::WorkflowApproval => "workflow_approval",
            Self::NotificationTemplate => "notification_template",
            Self::Notification => "notification",
            Self::Label => "label",
            Self::Schedule => "schedule",
            Self::InstanceGroup => "instance_group",
            Self::Instance => "instance",
            Self::ExecutionEnvironment => "execution_environment",
            Self::ActivityStream => "activity_stream",
            Self::UnifiedJobTemplate => "unified_job_template",
            Self::UnifiedJob => "unified_job",
        }
    }

    /// Parse the snake-case identifier.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == s)
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::UnifiedJobTemplate | Self::UnifiedJob)
    }

    pub fn is_unified_job_template(&self) -> bool {
        Self::UNIFIED_JOB_TEMPLATES.contains(self)
    }

    pub fn is_unified_job(&self) -> bool {
        Self::UNIFIED_JOBS.contains(self)
    }

    /// Concrete types a lookup of this type may return.
    pub fn concrete_kinds(&self) -> Vec<ResourceType> {
        match self {
            Self::UnifiedJobTemplate => Self::UNIFIED_JOB_TEMPLATES.to_vec(),
            Self::UnifiedJob => Self::UNIFIED_JOBS.to_vec(),
            other => vec![*other],
        }
    }

    /// Whether a record of type `other` satisfies a lookup for this type.
    pub fn admits(&self, other: ResourceType) -> bool {
        match self {
            Self::UnifiedJobTemplate => other.is_unified_job_template(),
            Self::UnifiedJob => other.is_unified_job(),
            _ => *self == other,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed pointer to a resource instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceType,
    pub id: ResourceId,
}

impl ResourceRef {
    pub fn new(kind: ResourceType, id: impl Into<ResourceId>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl From<&Resource> for ResourceRef {
    fn from(resource: &Resource) -> Self {
        resource.reference()
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Fields
// ═══════════════════════════════════════════════════════════════════════════════

/// The named slot a role occupies on its owning resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleField {
    Admin,
    Read,
    Use,
    Execute,
    Member,
    Auditor,
    Update,
    Adhoc,
    Approval,
    ProjectAdmin,
    InventoryAdmin,
    CredentialAdmin,
    WorkflowAdmin,
    NotificationAdmin,
    JobTemplateAdmin,
    ExecutionEnvironmentAdmin,
    SystemAdministrator,
    SystemAuditor,
}

impl RoleField {
    /// The attribute name of this role on its resource (`admin_role`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin_role",
            Self::Read => "read_role",
            Self::Use => "use_role",
            Self::Execute => "execute_role",
            Self::Member => "member_role",
            Self::Auditor => "auditor_role",
            Self::Update => "update_role",
            Self::Adhoc => "adhoc_role",
            Self::Approval => "approval_role",
            Self::ProjectAdmin => "project_admin_role",
            Self::InventoryAdmin => "inventory_admin_role",
            Self::CredentialAdmin => "credential_admin_role",
            Self::WorkflowAdmin => "workflow_admin_role",
            Self::NotificationAdmin => "notification_admin_role",
            Self::JobTemplateAdmin => "job_template_admin_role",
            Self::ExecutionEnvironmentAdmin => "execution_environment_admin_role",
            Self::SystemAdministrator => "system_administrator",
            Self::SystemAuditor => "system_auditor",
        }
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self, Self::SystemAdministrator | Self::SystemAuditor)
    }

    pub fn parse(s: &str) -> Option<Self> {
        const FIELDS: [RoleField; 18] = [
            RoleField::Admin,
            RoleField::Read,
            RoleField::Use,
            RoleField::Execute,
            RoleField::Member,
            RoleField::Auditor,
            RoleField::Update,
            RoleField::Adhoc,
            RoleField::Approval,
            RoleField::ProjectAdmin,
            RoleField::InventoryAdmin,
            RoleField::CredentialAdmin,
            RoleField::WorkflowAdmin,
            RoleField::NotificationAdmin,
            RoleField::JobTemplateAdmin,
            RoleField::ExecutionEnvironmentAdmin,
            RoleField::SystemAdministrator,
            RoleField::SystemAuditor,
        ];
        FIELDS.iter().copied().find(|f| f.as_str() == s)
    }
}

impl fmt::Display for RoleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Principal
// ═══════════════════════════════════════════════════════════════════════════════

/// An authenticated identity being checked for access.
///
/// Owned by the identity subsystem; read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub username: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_system_auditor: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl Principal {
    pub fn new(id: impl Into<PrincipalId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            is_superuser: false,
            is_system_auditor: false,
            is_active: true,
        }
    }

    /// Mark this principal as a superuser.
    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    /// Mark this principal as a system auditor.
    pub fn system_auditor(mut self) -> Self {
        self.is_system_auditor = true;
        self
    }

    /// The `User` resource view of this principal.
    pub fn to_resource(&self) -> Resource {
        Resource::new(ResourceType::User, self.id.0, self.username.clone())
            .with_attr("is_superuser", self.is_superuser)
            .with_attr("is_system_auditor", self.is_system_auditor)
            .with_attr("is_active", self.is_active)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// A named permission bundle attached to one resource instance, or a
/// process-wide singleton when `content` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub role_field: RoleField,
    /// The resource owning this role (None = singleton system role).
    pub content: Option<ResourceRef>,
}

impl Role {
    pub fn new(id: impl Into<RoleId>, role_field: RoleField, content: Option<ResourceRef>) -> Self {
        Self {
            id: id.into(),
            role_field,
            content,
        }
    }

    pub fn is_singleton(&self) -> bool {
        self.content.is_none()
    }

    /// The `Role` resource view of this role, so role grants can be
    /// checked through the same policy machinery as any other type.
    pub fn to_resource(&self) -> Resource {
        let name = match &self.content {
            Some(content) => format!("{} {}", content, self.role_field),
            None => self.role_field.as_str().to_string(),
        };
        let mut resource = Resource::new(ResourceType::Role, self.id.0, name)
            .with_attr("role_field", self.role_field.as_str())
            .with_attr("singleton", self.is_singleton());
        if let Some(content) = self.content {
            resource = resource.with_relation("content", content);
        }
        resource
    }
}

/// Binds a principal to a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub principal: PrincipalId,
    pub role: RoleId,
    pub granted_at: DateTime<Utc>,
    pub granted_by: Option<PrincipalId>,
}

impl RoleAssignment {
    pub fn new(principal: PrincipalId, role: RoleId) -> Self {
        Self {
            principal,
            role,
            granted_at: Utc::now(),
            granted_by: None,
        }
    }

    /// Record who granted this assignment.
    pub fn granted_by(mut self, principal: PrincipalId) -> Self {
        self.granted_by = Some(principal);
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resource
// ═══════════════════════════════════════════════════════════════════════════════

/// A typed resource instance as seen by the access engine.
///
/// Relations are single-valued references (`inventory`, `project`,
/// `organization`, ...); collections are many-valued (`credentials`,
/// `instance_groups`, ...). Type-specific scalar state lives in
/// `attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceType,
    pub name: String,
    #[serde(default)]
    pub relations: BTreeMap<String, ResourceRef>,
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<ResourceRef>>,
    /// Roles owned by this instance, filled in by the store.
    #[serde(default)]
    pub roles: BTreeMap<RoleField, RoleId>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Resource {
    pub fn new(kind: ResourceType, id: impl Into<ResourceId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            relations: BTreeMap::new(),
            collections: BTreeMap::new(),
            roles: BTreeMap::new(),
            attributes: Map::new(),
        }
    }

    /// Set the owning organization.
    pub fn in_organization(self, organization: impl Into<ResourceId>) -> Self {
        self.with_relation(
            "organization",
            ResourceRef::new(ResourceType::Organization, organization),
        )
    }

    pub fn with_relation(mut self, field: impl Into<String>, target: ResourceRef) -> Self {
        self.relations.insert(field.into(), target);
        self
    }

    pub fn with_collection(mut self, field: impl Into<String>, targets: Vec<ResourceRef>) -> Self {
        self.collections.insert(field.into(), targets);
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Record the creating principal.
    pub fn created_by(self, principal: PrincipalId) -> Self {
        self.with_attr("created_by", principal.0)
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.kind, self.id)
    }

    pub fn relation(&self, field: &str) -> Option<ResourceRef> {
        self.relations.get(field).copied()
    }

    pub fn collection(&self, field: &str) -> &[ResourceRef] {
        self.collections.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn role(&self, field: RoleField) -> Option<RoleId> {
        self.roles.get(&field).copied()
    }

    pub fn organization_id(&self) -> Option<ResourceId> {
        self.relation("organization").map(|r| r.id)
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Value::as_str)
    }

    pub fn attr_bool(&self, key: &str) -> bool {
        self.attr(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn attr_i64(&self, key: &str) -> Option<i64> {
        self.attr(key).and_then(Value::as_i64)
    }

    pub fn creator(&self) -> Option<PrincipalId> {
        self.attr("created_by").and_then(Value::as_u64).map(PrincipalId)
    }

    pub fn is_created_by(&self, principal: &Principal) -> bool {
        self.creator() == Some(principal.id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
