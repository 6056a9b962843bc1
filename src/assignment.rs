//! Association mutations: assigning, removing and syncing roles, groups and
//! permissions.
//!
//! Every mutation validates its references and checks guards before the first
//! write. A mutation on a persisted subject writes through, reloads the touched
//! association and flushes the catalog cache. Roles and groups assigned to a
//! subject that is not persisted yet are queued and written by
//! [`Registrar::persist_subject`].

#[cfg(feature = "audit")]
use log::info;

use crate::{
    core::{Lookup, Registrar},
    entity::{Entity, EntityId, Owner, Relation},
    error::Result,
    group::Group,
    guard::ensure_guard,
    permission::Permission,
    reference::{GroupRef, PermissionRef, Reference, RoleRef},
    role::Role,
    storage::EntityStore,
    subject::{PendingAssociations, Subject},
};
use std::collections::BTreeSet;

/// Roles and groups: the entities a subject can be a member of.
trait Membership: Entity + Sized {
    const RELATION: Relation;

    fn queue(pending: &mut PendingAssociations) -> &mut BTreeSet<EntityId>;
    fn loaded(subject: &Subject) -> Vec<Self>;
    fn replace(subject: &mut Subject, entities: Vec<Self>);
    fn merge(subject: &mut Subject, entities: Vec<Self>);
}

impl Membership for Role {
    const RELATION: Relation = Relation::SubjectRoles;

    fn queue(pending: &mut PendingAssociations) -> &mut BTreeSet<EntityId> {
        &mut pending.roles
    }

    fn loaded(subject: &Subject) -> Vec<Self> {
        subject.roles().to_vec()
    }

    fn replace(subject: &mut Subject, roles: Vec<Self>) {
        subject.set_roles(roles);
    }

    fn merge(subject: &mut Subject, roles: Vec<Self>) {
        subject.merge_roles(roles);
    }
}

impl Membership for Group {
    const RELATION: Relation = Relation::SubjectGroups;

    fn queue(pending: &mut PendingAssociations) -> &mut BTreeSet<EntityId> {
        &mut pending.groups
    }

    fn loaded(subject: &Subject) -> Vec<Self> {
        subject.groups().to_vec()
    }

    fn replace(subject: &mut Subject, groups: Vec<Self>) {
        subject.set_groups(groups);
    }

    fn merge(subject: &mut Subject, groups: Vec<Self>) {
        subject.merge_groups(groups);
    }
}

/// Roles and groups can be granted permissions directly.
pub trait Grantee: Entity {
    /// Association holding the grantee's direct permissions.
    const PERMISSIONS: Relation;

    /// Owner of the grantee's association rows.
    fn owner(&self) -> Owner;
}

impl Grantee for Role {
    const PERMISSIONS: Relation = Relation::RolePermissions;

    fn owner(&self) -> Owner {
        Owner::Role(self.id())
    }
}

impl Grantee for Group {
    const PERMISSIONS: Relation = Relation::GroupPermissions;

    fn owner(&self) -> Owner {
        Owner::Group(self.id())
    }
}

fn ids_of<E: Entity>(entities: &[E]) -> Vec<EntityId> {
    entities.iter().map(Entity::id).collect()
}

impl<S> Registrar<S>
where
    S: EntityStore,
{
    // Subject roles and groups

    /// Assign roles to the subject, merging with the roles it already has.
    pub fn assign_role(&self, subject: &mut Subject, roles: impl Into<RoleRef>) -> Result<()> {
        self.attach(subject, roles.into(), false)
    }

    /// Remove roles from the subject. Roles it does not have are ignored.
    pub fn remove_role(&self, subject: &mut Subject, roles: impl Into<RoleRef>) -> Result<()> {
        self.detach(subject, roles.into())
    }

    /// Replace the subject's roles with exactly the referenced ones.
    pub fn sync_roles(&self, subject: &mut Subject, roles: impl Into<RoleRef>) -> Result<()> {
        self.attach(subject, roles.into(), true)
    }

    /// Assign groups to the subject, merging with the groups it already has.
    pub fn assign_group(&self, subject: &mut Subject, groups: impl Into<GroupRef>) -> Result<()> {
        self.attach(subject, groups.into(), false)
    }

    /// Remove groups from the subject. Groups it does not have are ignored.
    pub fn remove_group(&self, subject: &mut Subject, groups: impl Into<GroupRef>) -> Result<()> {
        self.detach(subject, groups.into())
    }

    /// Replace the subject's groups with exactly the referenced ones.
    pub fn sync_groups(&self, subject: &mut Subject, groups: impl Into<GroupRef>) -> Result<()> {
        self.attach(subject, groups.into(), true)
    }

    /// Resolve references under the subject's default guard and require every
    /// entity to match one of the subject's guards.
    fn resolve_for_subject<E>(&self, subject: &Subject, reference: Reference<E>) -> Result<Vec<E>>
    where
        E: Entity,
        Self: Lookup<E>,
    {
        let guard = self.guards().subject_default_guard(subject);
        let entities = self.resolve(reference, &guard)?;
        for entity in &entities {
            self.guards().ensure_match(entity, subject)?;
        }
        Ok(entities)
    }

    fn attach<E>(&self, subject: &mut Subject, reference: Reference<E>, replace: bool) -> Result<()>
    where
        E: Membership,
        Self: Lookup<E>,
    {
        let entities = self.resolve_for_subject(subject, reference)?;
        let ids = ids_of(&entities);

        match subject.subject_key() {
            Some(key) => {
                let owner = Owner::Subject(key.clone());
                self.store()
                    .sync_association(&owner, E::RELATION, &ids, replace)?;
                self.reload_relation(subject, &key, E::RELATION)?;
            }
            None => {
                if replace {
                    E::queue(subject.pending_mut()).clear();
                    E::replace(subject, entities);
                } else {
                    E::merge(subject, entities);
                }
                E::queue(subject.pending_mut()).extend(ids.iter().copied());
            }
        }

        #[cfg(feature = "audit")]
        info!("{subject}: {} {:?} {}", if replace { "synced" } else { "assigned" }, ids, E::KIND);

        self.metrics().record_assignment();
        self.forget_cached_permissions()
    }

    fn detach<E>(&self, subject: &mut Subject, reference: Reference<E>) -> Result<()>
    where
        E: Membership,
        Self: Lookup<E>,
    {
        let guard = self.guards().subject_default_guard(subject);
        let ids: BTreeSet<EntityId> = self.resolve(reference, &guard)?.iter().map(Entity::id).collect();

        match subject.subject_key() {
            Some(key) => {
                let owner = Owner::Subject(key.clone());
                for id in &ids {
                    self.store()
                        .detach_association(&owner, E::RELATION, Some(*id))?;
                }
                self.reload_relation(subject, &key, E::RELATION)?;
            }
            None => {
                E::queue(subject.pending_mut()).retain(|id| !ids.contains(id));
                let remaining = E::loaded(subject)
                    .into_iter()
                    .filter(|entity| !ids.contains(&entity.id()))
                    .collect();
                E::replace(subject, remaining);
            }
        }

        #[cfg(feature = "audit")]
        info!("{subject}: removed {:?} {}", ids, E::KIND);

        self.metrics().record_removal();
        self.forget_cached_permissions()
    }

    // Subject direct permissions

    /// Grant permissions directly to a persisted subject.
    pub fn give_permission_to_subject(
        &self,
        subject: &mut Subject,
        permissions: impl Into<PermissionRef>,
    ) -> Result<()> {
        self.write_subject_permissions(subject, permissions.into(), false)
    }

    /// Replace a persisted subject's direct permissions.
    pub fn sync_subject_permissions(
        &self,
        subject: &mut Subject,
        permissions: impl Into<PermissionRef>,
    ) -> Result<()> {
        self.write_subject_permissions(subject, permissions.into(), true)
    }

    /// Revoke direct permissions from a persisted subject. Permissions held
    /// through roles or groups are unaffected.
    pub fn revoke_permission_from_subject(
        &self,
        subject: &mut Subject,
        permissions: impl Into<PermissionRef>,
    ) -> Result<()> {
        let key = self.persisted_key(subject)?;
        let guard = self.guards().subject_default_guard(subject);
        let permissions: Vec<Permission> = self.resolve(permissions.into(), &guard)?;

        let owner = Owner::Subject(key.clone());
        for permission in &permissions {
            self.store().detach_association(
                &owner,
                Relation::SubjectPermissions,
                Some(permission.id()),
            )?;
        }
        self.reload_relation(subject, &key, Relation::SubjectPermissions)?;

        self.metrics().record_removal();
        self.forget_cached_permissions()
    }

    fn write_subject_permissions(
        &self,
        subject: &mut Subject,
        permissions: PermissionRef,
        replace: bool,
    ) -> Result<()> {
        let key = self.persisted_key(subject)?;
        let permissions: Vec<Permission> = self.resolve_for_subject(subject, permissions)?;

        self.store().sync_association(
            &Owner::Subject(key.clone()),
            Relation::SubjectPermissions,
            &ids_of(&permissions),
            replace,
        )?;
        self.reload_relation(subject, &key, Relation::SubjectPermissions)?;

        self.metrics().record_assignment();
        self.forget_cached_permissions()
    }

    // Role and group permissions

    /// Grant permissions to a role or group. Every permission must share the
    /// grantee's guard.
    pub fn give_permission_to<G: Grantee>(
        &self,
        grantee: &G,
        permissions: impl Into<PermissionRef>,
    ) -> Result<()> {
        self.write_grantee_permissions(grantee, permissions.into(), false)
    }

    /// Replace the direct permissions of a role or group.
    pub fn sync_permissions<G: Grantee>(
        &self,
        grantee: &G,
        permissions: impl Into<PermissionRef>,
    ) -> Result<()> {
        self.write_grantee_permissions(grantee, permissions.into(), true)
    }

    /// Revoke direct permissions from a role or group.
    pub fn revoke_permission_to<G: Grantee>(
        &self,
        grantee: &G,
        permissions: impl Into<PermissionRef>,
    ) -> Result<()> {
        let permissions: Vec<Permission> = self.resolve(permissions.into(), grantee.guard())?;
        let owner = grantee.owner();
        for permission in &permissions {
            self.store()
                .detach_association(&owner, G::PERMISSIONS, Some(permission.id()))?;
        }

        self.metrics().record_removal();
        self.forget_cached_permissions()
    }

    fn write_grantee_permissions<G: Grantee>(
        &self,
        grantee: &G,
        permissions: PermissionRef,
        replace: bool,
    ) -> Result<()> {
        let guards = [grantee.guard().to_string()];
        let permissions: Vec<Permission> = self.resolve(permissions, grantee.guard())?;
        for permission in &permissions {
            ensure_guard(Permission::KIND, permission.guard(), &guards)?;
        }

        self.store().sync_association(
            &grantee.owner(),
            G::PERMISSIONS,
            &ids_of(&permissions),
            replace,
        )?;

        #[cfg(feature = "audit")]
        info!("{} {}: permissions {:?}", G::KIND, grantee.name(), ids_of(&permissions));

        self.metrics().record_assignment();
        self.forget_cached_permissions()
    }

    // Group roles

    /// Assign roles to a group. Every role must share the group's guard.
    pub fn assign_role_to_group(&self, group: &Group, roles: impl Into<RoleRef>) -> Result<()> {
        self.write_group_roles(group, roles.into(), false)
    }

    /// Replace a group's roles.
    pub fn sync_group_roles(&self, group: &Group, roles: impl Into<RoleRef>) -> Result<()> {
        self.write_group_roles(group, roles.into(), true)
    }

    /// Remove roles from a group.
    pub fn remove_role_from_group(&self, group: &Group, roles: impl Into<RoleRef>) -> Result<()> {
        let roles: Vec<Role> = self.resolve(roles.into(), group.guard())?;
        for role in &roles {
            self.store()
                .detach_association(&group.owner(), Relation::GroupRoles, Some(role.id()))?;
        }

        self.metrics().record_removal();
        self.forget_cached_permissions()
    }

    /// Add a role to groups, the role-side view of [`Self::assign_role_to_group`].
    pub fn assign_group_to_role(&self, role: &Role, groups: impl Into<GroupRef>) -> Result<()> {
        let guards = [role.guard().to_string()];
        let groups: Vec<Group> = self.resolve(groups.into(), role.guard())?;
        for group in &groups {
            ensure_guard(Group::KIND, group.guard(), &guards)?;
        }
        for group in &groups {
            self.store()
                .sync_association(&group.owner(), Relation::GroupRoles, &[role.id()], false)?;
        }

        self.metrics().record_assignment();
        self.forget_cached_permissions()
    }

    fn write_group_roles(&self, group: &Group, roles: RoleRef, replace: bool) -> Result<()> {
        let guards = [group.guard().to_string()];
        let roles: Vec<Role> = self.resolve(roles, group.guard())?;
        for role in &roles {
            ensure_guard(Role::KIND, role.guard(), &guards)?;
        }

        self.store()
            .sync_association(&group.owner(), Relation::GroupRoles, &ids_of(&roles), replace)?;

        #[cfg(feature = "audit")]
        info!("group {}: roles {:?}", group.name(), ids_of(&roles));

        self.metrics().record_assignment();
        self.forget_cached_permissions()
    }

    // Subject lifecycle

    /// Persist the subject if needed and flush its queued roles and groups.
    ///
    /// On failure the subject keeps its key and its queue, so calling this
    /// again retries the flush.
    pub fn persist_subject(&self, subject: &mut Subject) -> Result<()> {
        if !subject.is_persisted() {
            let key = self.store().create_subject(subject.model_type())?;
            subject.set_key(key);
        }
        let key = self.persisted_key(subject)?;
        if subject.pending().is_empty() {
            return Ok(());
        }

        let owner = Owner::Subject(key.clone());
        let pending = subject.pending().clone();
        let roles: Vec<EntityId> = pending.roles.iter().copied().collect();
        let groups: Vec<EntityId> = pending.groups.iter().copied().collect();
        self.store()
            .sync_association(&owner, Relation::SubjectRoles, &roles, false)?;
        self.store()
            .sync_association(&owner, Relation::SubjectGroups, &groups, false)?;
        *subject.pending_mut() = PendingAssociations::default();

        self.reload_relation(subject, &key, Relation::SubjectRoles)?;
        self.reload_relation(subject, &key, Relation::SubjectGroups)?;

        #[cfg(feature = "audit")]
        info!("{subject}: flushed {} roles and {} groups", roles.len(), groups.len());

        self.metrics().record_assignment();
        self.forget_cached_permissions()
    }

    /// Create and persist a subject with initial roles and groups.
    pub fn create_subject_with(
        &self,
        model_type: &str,
        roles: impl Into<RoleRef>,
        groups: impl Into<GroupRef>,
    ) -> Result<Subject> {
        let mut subject = Subject::new(model_type);
        self.assign_role(&mut subject, roles)?;
        self.assign_group(&mut subject, groups)?;
        self.persist_subject(&mut subject)?;
        Ok(subject)
    }

    /// Detach every association of the subject and delete it. Returns false if
    /// the subject was already gone.
    pub fn delete_subject(&self, subject: Subject) -> Result<bool> {
        let key = self.persisted_key(&subject)?;
        let owner = Owner::Subject(key.clone());
        for relation in [
            Relation::SubjectRoles,
            Relation::SubjectGroups,
            Relation::SubjectPermissions,
        ] {
            self.store().detach_association(&owner, relation, None)?;
        }
        let deleted = self.store().delete_subject(&key)?;

        #[cfg(feature = "audit")]
        info!("{key} deleted");

        self.forget_cached_permissions()?;
        Ok(deleted)
    }
}
