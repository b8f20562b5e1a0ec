//! Users, teams and role grants.

use crate::access::context::AccessContext;
use crate::access::payload::Payload;
use crate::access::policy::{check_superuser, Action, ActionArgs, Policy};
use crate::error::{AccessError, Result};
use crate::rbac::models::{Principal, PrincipalId, Resource, ResourceId, ResourceType, Role, RoleField, RoleId};
use crate::rbac::schema::has_roles;
use crate::store::Query;

use super::{moves_relation, payload_flag};

/// Whether the principal administers at least one organization or audits
/// one, which unlocks the full user and team lists.
fn sees_all_identities(cx: &AccessContext<'_>) -> bool {
    cx.settings().org_admins_can_see_all_users
        && (cx.has_any(ResourceType::Organization, RoleField::Admin)
            || cx.has_any(ResourceType::Organization, RoleField::Auditor))
}

// ═══════════════════════════════════════════════════════════════════════════════
// User
// ═══════════════════════════════════════════════════════════════════════════════

/// Users are administered by the admins of every organization they
/// belong to; system flags are reserved for superusers.
#[derive(Debug, Default)]
pub struct UserPolicy;

impl UserPolicy {
    fn target(cx: &AccessContext<'_>, obj: &Resource) -> Option<Principal> {
        cx.store().principal(PrincipalId(obj.id.0))
    }

    fn is_self(cx: &AccessContext<'_>, obj: &Resource) -> bool {
        obj.id.0 == cx.principal().id.0
    }

    /// Organizations the user is a member of.
    fn organizations(cx: &AccessContext<'_>, user: PrincipalId) -> Vec<Resource> {
        cx.filter(ResourceType::Organization, &Query::All)
            .into_iter()
            .filter(|org| {
                org.role(RoleField::Member)
                    .map(|role| cx.store().principal_in_role(user, role))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Only superusers may raise system flags; a user may keep their own
    /// auditor flag.
    fn flags_allowed(cx: &AccessContext<'_>, obj: Option<&Resource>, payload: Option<&Payload>) -> bool {
        if payload_flag(payload, "is_superuser") && !cx.is_superuser() {
            return false;
        }
        let is_self = obj.map(|o| Self::is_self(cx, o)).unwrap_or(false);
        if payload_flag(payload, "is_system_auditor") && !(cx.is_superuser() || is_self) {
            return false;
        }
        true
    }

    /// Admin rights over a user. `allow_orphans` lets any organization
    /// admin act on users outside every organization.
    pub(crate) fn can_admin_user(cx: &AccessContext<'_>, obj: &Resource, allow_orphans: bool) -> Result<bool> {
        check_superuser(cx, || {
            if !cx.settings().manage_organization_auth {
                return Ok(false);
            }
            let Some(target) = Self::target(cx, obj) else {
                return Ok(false);
            };
            if target.is_superuser || target.is_system_auditor {
                return Ok(false);
            }
            let orgs = Self::organizations(cx, target.id);
            if orgs.is_empty() {
                return Ok(allow_orphans && cx.has_any(ResourceType::Organization, RoleField::Admin));
            }
            Ok(orgs.iter().all(|org| cx.in_role(org, RoleField::Admin)))
        })
    }
}

impl Policy for UserPolicy {
    fn name(&self) -> &'static str {
        "user"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &["roles"]
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        if sees_all_identities(cx) {
            return Ok(Query::All);
        }
        let mut ids: Vec<ResourceId> = vec![ResourceId(cx.principal().id.0)];
        for org in cx.filter(ResourceType::Organization, &cx.accessible(RoleField::Read)) {
            if let Some(member) = org.role(RoleField::Member) {
                ids.extend(cx.store().members(member).into_iter().map(|p| ResourceId(p.0)));
            }
        }
        for principal in cx.store().principals() {
            if principal.is_superuser || principal.is_system_auditor {
                ids.push(ResourceId(principal.id.0));
            }
        }
        for field in [RoleField::SystemAdministrator, RoleField::SystemAuditor] {
            if let Some(singleton) = cx.store().singleton_role(field) {
                ids.extend(cx.store().direct_members(singleton).into_iter().map(|p| ResourceId(p.0)));
            }
        }
        Ok(Query::ids(ids))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        if !Self::flags_allowed(cx, None, Some(payload)) {
            return Ok(false);
        }
        if cx.is_superuser() {
            return Ok(true);
        }
        if !cx.settings().manage_organization_auth {
            return Ok(false);
        }
        Ok(cx.has_any(ResourceType::Organization, RoleField::Admin))
    }

    /// Users may edit themselves; everything else needs admin rights.
    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        if !Self::flags_allowed(cx, Some(obj), payload) {
            return Ok(false);
        }
        let is_self = Self::is_self(cx, obj);
        if !cx.settings().manage_organization_auth && !is_self {
            return Ok(cx.is_superuser());
        }
        Ok(is_self || self.can_admin(cx, obj, payload)?)
    }

    fn can_admin(&self, cx: &AccessContext<'_>, obj: &Resource, _payload: Option<&Payload>) -> Result<bool> {
        Self::can_admin_user(cx, obj, false)
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        if Self::is_self(cx, obj) {
            return Ok(false);
        }
        if let Some(target) = Self::target(cx, obj) {
            if target.is_superuser {
                let superusers = cx
                    .store()
                    .principals()
                    .into_iter()
                    .filter(|p| p.is_superuser && p.is_active)
                    .count();
                if superusers <= 1 {
                    return Ok(false);
                }
            }
        }
        Self::can_admin_user(cx, obj, true)
    }

    fn can_attach(
        &self,
        cx: &AccessContext<'_>,
        obj: &Resource,
        sub_obj: &Resource,
        _relationship: &str,
        payload: Option<&Payload>,
        skip_sub_read_check: bool,
    ) -> Result<bool> {
        role_grant(cx, Action::Attach, sub_obj, obj, "members", payload, skip_sub_read_check)
    }

    fn can_unattach(
        &self,
        cx: &AccessContext<'_>,
        obj: &Resource,
        sub_obj: &Resource,
        _relationship: &str,
        payload: Option<&Payload>,
        skip_sub_read_check: bool,
    ) -> Result<bool> {
        role_grant(cx, Action::Unattach, sub_obj, obj, "members", payload, skip_sub_read_check)
    }
}

/// Defer a membership change to the role policy, with the role as the
/// target and the principal or team as the sub-object.
fn role_grant(
    cx: &AccessContext<'_>,
    action: Action,
    role: &Resource,
    member: &Resource,
    relationship: &str,
    payload: Option<&Payload>,
    skip_sub_read_check: bool,
) -> Result<bool> {
    if role.kind != ResourceType::Role {
        return Ok(false);
    }
    let mut args = ActionArgs::on(role).with_sub(member, relationship);
    if let Some(payload) = payload {
        args = args.with_payload(payload);
    }
    if skip_sub_read_check {
        args = args.skip_sub_read_check();
    }
    cx.check(ResourceType::Role, action, args)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Team
// ═══════════════════════════════════════════════════════════════════════════════

/// Teams belong to one organization and are administered by its admins.
#[derive(Debug, Default)]
pub struct TeamPolicy;

impl TeamPolicy {
    fn membership(
        cx: &AccessContext<'_>,
        action: Action,
        obj: &Resource,
        sub_obj: &Resource,
        relationship: &str,
        payload: Option<&Payload>,
        skip_sub_read_check: bool,
    ) -> Result<Option<bool>> {
        let field = match relationship {
            "member_role.members" => RoleField::Member,
            "admin_role.members" => RoleField::Admin,
            _ => return Ok(None),
        };
        let Some(role) = obj.role(field).and_then(|id| cx.store().role(id)) else {
            return Ok(Some(false));
        };
        let role = role.to_resource();
        role_grant(cx, action, &role, sub_obj, "members", payload, skip_sub_read_check).map(Some)
    }

    /// Granting a resource role to a team goes through the role's grant
    /// rules with the team's member role as the new parent.
    fn resource_role(
        cx: &AccessContext<'_>,
        action: Action,
        obj: &Resource,
        role: &Resource,
        payload: Option<&Payload>,
        skip_sub_read_check: bool,
    ) -> Result<Option<bool>> {
        if role.kind != ResourceType::Role {
            return Ok(None);
        }
        let Some(content) = role.relation("content") else {
            return Err(AccessError::permission_denied(format!(
                "The {} role cannot be assigned to a team",
                role.attr_str("role_field").unwrap_or(role.name.as_str())
            )));
        };
        if !has_roles(content.kind) {
            return Ok(None);
        }
        role_grant(cx, action, role, obj, "member_role.parents", payload, skip_sub_read_check).map(Some)
    }
}

impl Policy for TeamPolicy {
    fn name(&self) -> &'static str {
        "team"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &["roles", "member_role.members", "admin_role.members"]
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        if sees_all_identities(cx) {
            return Ok(Query::All);
        }
        Ok(cx.accessible(RoleField::Read))
    }

    fn can_add(&self, cx: &AccessContext<'_>, payload: &Payload) -> Result<bool> {
        check_superuser(cx, || {
            if payload.is_empty() {
                return Ok(cx.has_any(ResourceType::Organization, RoleField::Admin));
            }
            if !cx.settings().manage_organization_auth {
                return Ok(false);
            }
            cx.check_related(
                "organization",
                ResourceType::Organization,
                RoleField::Admin,
                Some(payload),
                None,
            )
        })
    }

    fn can_change(&self, cx: &AccessContext<'_>, obj: &Resource, payload: Option<&Payload>) -> Result<bool> {
        if moves_relation(payload, obj, "organization") {
            return Err(AccessError::permission_denied("Unable to change organization on a team."));
        }
        check_superuser(cx, || {
            if !cx.settings().manage_organization_auth {
                return Ok(false);
            }
            Ok(cx.in_role(obj, RoleField::Admin))
        })
    }

    fn can_delete(&self, cx: &AccessContext<'_>, obj: &Resource) -> Result<bool> {
        self.can_change(cx, obj, None)
    }

    fn can_attach(
        &self,
        cx: &AccessContext<'_>,
        obj: &Resource,
        sub_obj: &Resource,
        relationship: &str,
        payload: Option<&Payload>,
        skip_sub_read_check: bool,
    ) -> Result<bool> {
        if let Some(decided) = Self::resource_role(cx, Action::Attach, obj, sub_obj, payload, skip_sub_read_check)? {
            return Ok(decided);
        }
        if cx.is_superuser() {
            return Ok(true);
        }
        if let Some(decided) =
            Self::membership(cx, Action::Attach, obj, sub_obj, relationship, payload, skip_sub_read_check)?
        {
            return Ok(decided);
        }
        if !self.can_change(cx, obj, None)? {
            return Ok(false);
        }
        if skip_sub_read_check {
            return Ok(true);
        }
        cx.can_read(sub_obj)
    }

    fn can_unattach(
        &self,
        cx: &AccessContext<'_>,
        obj: &Resource,
        sub_obj: &Resource,
        relationship: &str,
        payload: Option<&Payload>,
        skip_sub_read_check: bool,
    ) -> Result<bool> {
        if let Some(decided) =
            Self::resource_role(cx, Action::Unattach, obj, sub_obj, payload, skip_sub_read_check)?
        {
            return Ok(decided);
        }
        if cx.is_superuser() {
            return Ok(true);
        }
        if let Some(decided) =
            Self::membership(cx, Action::Unattach, obj, sub_obj, relationship, payload, skip_sub_read_check)?
        {
            return Ok(decided);
        }
        self.can_change(cx, obj, payload)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// Role membership: who may grant or revoke a role.
///
/// `obj` is always the role. The sub-object is a user for `members`, a
/// team for `member_role.parents` and a team's member role for `parents`.
#[derive(Debug, Default)]
pub struct RolePolicy;

impl RolePolicy {
    fn load(cx: &AccessContext<'_>, obj: &Resource) -> Option<Role> {
        cx.store().role(RoleId(obj.id.0))
    }

    /// The team behind a grant target, if the target is a team or a
    /// team's role.
    fn grantee_team(cx: &AccessContext<'_>, sub_obj: &Resource) -> Option<Resource> {
        match sub_obj.kind {
            ResourceType::Team => Some(sub_obj.clone()),
            ResourceType::Role => cx
                .related(sub_obj, "content")
                .filter(|content| content.kind == ResourceType::Team),
            _ => None,
        }
    }

    /// Credentials may only be shared with teams of their own organization.
    fn check_credential_team(cx: &AccessContext<'_>, content: &Resource, sub_obj: &Resource) -> Result<()> {
        if content.kind != ResourceType::Credential {
            return Ok(());
        }
        let Some(team) = Self::grantee_team(cx, sub_obj) else {
            return Ok(());
        };
        match (content.organization_id(), team.organization_id()) {
            (Some(credential_org), Some(team_org)) if credential_org == team_org => Ok(()),
            _ => Err(AccessError::permission_denied(
                "You cannot grant credential access to a team when the Organization field isn't set, or belongs to a different organization",
            )),
        }
    }
}

impl Policy for RolePolicy {
    fn name(&self) -> &'static str {
        "role"
    }

    fn relationships(&self) -> &'static [&'static str] {
        &["members", "parents", "member_role.parents"]
    }

    /// Roles on any visible resource, plus roles the principal holds.
    /// Principals outside every organization also see the system roles.
    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        let mut branches = Vec::new();
        for kind in ResourceType::ALL {
            if kind.is_abstract() || !has_roles(kind) {
                continue;
            }
            let policy = cx.registry().resolve(kind)?;
            branches.push((kind, policy.visibility_filter(cx)?));
        }
        let held = cx
            .store()
            .effective_roles(cx.principal().id)
            .into_iter()
            .map(|role| ResourceId(role.0));

        let mut query = Query::related("content", Query::ByKind(branches)).or(Query::ids(held));
        if !cx.has_any(ResourceType::Organization, RoleField::Member) {
            query = query.or(Query::attr_eq("singleton", true));
        }
        Ok(query)
    }

    /// Roles are created only with their resource.
    fn can_add(&self, _cx: &AccessContext<'_>, _payload: &Payload) -> Result<bool> {
        Ok(false)
    }

    fn can_change(&self, _cx: &AccessContext<'_>, _obj: &Resource, _payload: Option<&Payload>) -> Result<bool> {
        Ok(false)
    }

    fn can_delete(&self, _cx: &AccessContext<'_>, _obj: &Resource) -> Result<bool> {
        Ok(false)
    }

    fn can_attach(
        &self,
        cx: &AccessContext<'_>,
        obj: &Resource,
        sub_obj: &Resource,
        relationship: &str,
        payload: Option<&Payload>,
        skip_sub_read_check: bool,
    ) -> Result<bool> {
        if let Some(content) = cx.related(obj, "content") {
            Self::check_credential_team(cx, &content, sub_obj)?;
        }
        self.can_unattach(cx, obj, sub_obj, relationship, payload, skip_sub_read_check)
    }

    fn can_unattach(
        &self,
        cx: &AccessContext<'_>,
        obj: &Resource,
        sub_obj: &Resource,
        relationship: &str,
        _payload: Option<&Payload>,
        skip_sub_read_check: bool,
    ) -> Result<bool> {
        check_superuser(cx, || {
            let Some(role) = Self::load(cx, obj) else {
                return Ok(false);
            };
            // System roles are granted by superusers only.
            let Some(content) = role.content.and_then(|c| cx.store().get(c.kind, c.id)) else {
                return Ok(false);
            };

            if content.kind == ResourceType::Team && !cx.settings().manage_organization_auth {
                return Ok(false);
            }

            if !skip_sub_read_check && matches!(relationship, "members" | "member_role.parents" | "parents") {
                let readable = if relationship == "parents" {
                    cx.related(sub_obj, "content")
                } else {
                    Some(sub_obj.clone())
                };
                match readable {
                    Some(target) if cx.can_read(&target)? => {}
                    _ => return Ok(false),
                }
            }

            // Organization membership makes the org admin an admin of the
            // user, so they must already be able to admin that user.
            if content.kind == ResourceType::Organization
                && matches!(role.role_field, RoleField::Admin | RoleField::Member)
            {
                if sub_obj.kind != ResourceType::User || !cx.settings().manage_organization_auth {
                    return Ok(false);
                }
                if !UserPolicy::can_admin_user(cx, sub_obj, true)? {
                    return Ok(false);
                }
            }

            Ok(has_roles(content.kind) && cx.in_role(&content, RoleField::Admin))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::license::StaticLicense;
    use crate::access::registry::PolicyRegistry;
    use crate::access::LicenseInfo;
    use crate::config::AccessSettings;
    use crate::store::InMemoryStore;

    #[test]
    fn test_user_flags_need_superuser() {
        let store = InMemoryStore::new();
        let registry = PolicyRegistry::standard();
        let license = StaticLicense(LicenseInfo::open());
        let settings = AccessSettings::default();
        let alice = store.add_principal(Principal::new(10, "alice"));
        let cx = AccessContext::new(&alice, &store, &registry, &license, &settings);

        let own = alice.to_resource();
        let promote = Payload::new().with("is_superuser", true);
        assert!(!UserPolicy.can_change(&cx, &own, Some(&promote)).unwrap());

        let audit = Payload::new().with("is_system_auditor", "true");
        assert!(UserPolicy.can_change(&cx, &own, Some(&audit)).unwrap());
        assert!(!UserPolicy.can_delete(&cx, &own).unwrap());
    }
}
