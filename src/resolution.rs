//! Permission and membership resolution.
//!
//! A subject holds a permission when it was granted directly, through one of
//! its roles, or through one of its groups. A group holds a permission when it
//! was granted directly or through one of the group's roles. Both rules share
//! [`holder_grants`]; the subject rule only adds the group step.

use log::debug;

use crate::{
    cache::CatalogFilter,
    core::Registrar,
    entity::{Entity, EntityId},
    error::Result,
    group::Group,
    guard::ensure_guard,
    permission::Permission,
    reference::{GroupRef, PermissionRef, Reference, RoleRef},
    role::Role,
    storage::EntityStore,
    subject::Subject,
};
use std::collections::BTreeSet;

/// Anything that can hold permissions directly or through roles.
pub trait PermissionHolder {
    /// Ids of permissions granted directly.
    fn direct_permissions(&self) -> BTreeSet<EntityId>;

    /// Ids of roles whose permissions the holder inherits.
    fn granting_roles(&self) -> BTreeSet<EntityId>;
}

impl PermissionHolder for Subject {
    fn direct_permissions(&self) -> BTreeSet<EntityId> {
        self.permission_ids().clone()
    }

    fn granting_roles(&self) -> BTreeSet<EntityId> {
        self.role_ids()
    }
}

impl PermissionHolder for Group {
    fn direct_permissions(&self) -> BTreeSet<EntityId> {
        self.permissions().clone()
    }

    fn granting_roles(&self) -> BTreeSet<EntityId> {
        self.roles().clone()
    }
}

/// True if `holder` holds `permission` directly or through a role.
pub fn holder_grants<H>(holder: &H, permission: &Permission) -> bool
where
    H: PermissionHolder + ?Sized,
{
    holder.direct_permissions().contains(&permission.id())
        || holder
            .granting_roles()
            .into_iter()
            .any(|role| permission.is_granted_by(role))
}

impl<S> Registrar<S>
where
    S: EntityStore,
{
    /// Check whether the subject holds a permission directly, through a role,
    /// or through a group.
    ///
    /// Names and ids are looked up under the subject's default guard. Fails
    /// with `EntityDoesNotExist` if the permission is unknown and with
    /// `GuardMismatch` if its guard does not serve the subject.
    pub fn has_permission_to(
        &self,
        subject: &Subject,
        permission: impl Into<PermissionRef>,
    ) -> Result<bool> {
        self.metrics().record_permission_check();

        let guard = self.guards().subject_default_guard(subject);
        let permission: Permission = self.resolve_single(permission.into(), &guard)?;
        self.guards().ensure_match(&permission, subject)?;

        let granted = holder_grants(subject, &permission) || self.granted_through_groups(subject, &permission)?;

        debug!("{subject} {} `{}`", if granted { "holds" } else { "lacks" }, permission.name());
        Ok(granted)
    }

    fn granted_through_groups(&self, subject: &Subject, permission: &Permission) -> Result<bool> {
        let ids = subject.group_ids();
        if ids.is_empty() {
            return Ok(false);
        }
        Ok(self
            .groups(&CatalogFilter::new())?
            .iter()
            .filter(|group| ids.contains(&group.id()))
            .any(|group| holder_grants(group, permission)))
    }

    /// True if any referenced permission is held.
    pub fn has_any_permission(
        &self,
        subject: &Subject,
        permissions: impl Into<PermissionRef>,
    ) -> Result<bool> {
        for permission in permissions.into().flatten() {
            if self.has_permission_to(subject, permission)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True if every referenced permission is held. An empty list holds.
    pub fn has_all_permissions(
        &self,
        subject: &Subject,
        permissions: impl Into<PermissionRef>,
    ) -> Result<bool> {
        for permission in permissions.into().flatten() {
            if !self.has_permission_to(subject, permission)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Every permission the subject holds, in catalog order.
    pub fn all_permissions(&self, subject: &Subject) -> Result<Vec<Permission>> {
        let guards = self.guards().guards_of(subject);
        let ids = subject.group_ids();
        let groups: Vec<Group> = self
            .groups(&CatalogFilter::new())?
            .into_iter()
            .filter(|group| ids.contains(&group.id()))
            .collect();

        Ok(self
            .permissions(&CatalogFilter::new())?
            .into_iter()
            .filter(|permission| guards.iter().any(|guard| guard == permission.guard()))
            .filter(|permission| {
                holder_grants(subject, permission)
                    || groups.iter().any(|group| holder_grants(group, permission))
            })
            .collect())
    }

    /// Membership test over the subject's loaded roles. Accepts names, ids,
    /// entities, lists, and pipe-delimited names.
    pub fn has_role(&self, subject: &Subject, roles: impl Into<RoleRef>) -> bool {
        let roles = roles.into();
        subject.roles().iter().any(|role| roles.matches(role))
    }

    /// True if every referenced role is loaded on the subject.
    pub fn has_all_roles(&self, subject: &Subject, roles: impl Into<RoleRef>) -> bool {
        split_names(roles.into())
            .iter()
            .all(|reference| subject.roles().iter().any(|role| reference.matches(role)))
    }

    /// Names of the subject's loaded roles.
    pub fn role_names(&self, subject: &Subject) -> Vec<String> {
        subject.roles().iter().map(|role| role.name().to_string()).collect()
    }

    /// True if the subject has a referenced role, directly or through one of
    /// its groups.
    pub fn has_role_through_groups(&self, subject: &Subject, roles: impl Into<RoleRef>) -> Result<bool> {
        let roles = roles.into();
        if self.has_role(subject, roles.clone()) {
            return Ok(true);
        }

        let ids = subject.group_ids();
        for group in self.groups(&CatalogFilter::new())? {
            if !ids.contains(&group.id()) {
                continue;
            }
            let guards = [group.guard().to_string()];
            for role_id in group.roles() {
                if let Some(record) = self.role_record_in(*role_id, &guards)?
                    && roles.matches(&Role::from_record(record))
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Membership test over the subject's loaded groups.
    pub fn has_group(&self, subject: &Subject, groups: impl Into<GroupRef>) -> bool {
        let groups = groups.into();
        subject.groups().iter().any(|group| groups.matches(group))
    }

    /// True if every referenced group is loaded on the subject.
    pub fn has_all_groups(&self, subject: &Subject, groups: impl Into<GroupRef>) -> bool {
        split_names(groups.into())
            .iter()
            .all(|reference| subject.groups().iter().any(|group| reference.matches(group)))
    }

    /// Check whether a role grants a permission. The permission must share the
    /// role's guard.
    pub fn role_has_permission_to(&self, role: &Role, permission: impl Into<PermissionRef>) -> Result<bool> {
        self.metrics().record_permission_check();

        let permission: Permission = self.resolve_single(permission.into(), role.guard())?;
        ensure_guard(
            Permission::KIND,
            permission.guard(),
            &[role.guard().to_string()],
        )?;
        Ok(permission.is_granted_by(role.id()))
    }

    /// Check whether a group holds a permission directly or through one of its
    /// roles. The permission must share the group's guard.
    pub fn group_has_permission_to(
        &self,
        group: &Group,
        permission: impl Into<PermissionRef>,
    ) -> Result<bool> {
        self.metrics().record_permission_check();

        let permission: Permission = self.resolve_single(permission.into(), group.guard())?;
        ensure_guard(
            Permission::KIND,
            permission.guard(),
            &[group.guard().to_string()],
        )?;

        let fresh = self
            .groups(&CatalogFilter::new().id(group.id()))?
            .into_iter()
            .next();
        Ok(holder_grants(fresh.as_ref().unwrap_or(group), &permission))
    }
}

/// Flatten a reference, splitting pipe-delimited names into separate entries.
fn split_names<E>(reference: Reference<E>) -> Vec<Reference<E>> {
    reference
        .flatten()
        .into_iter()
        .flat_map(|reference| match reference {
            Reference::Name(name) if name.contains('|') => Reference::names(&name).flatten(),
            other => vec![other],
        })
        .collect()
}
