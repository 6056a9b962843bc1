//! Property-based tests for resolution and the assignment protocol.
//!
//! Random grant graphs are built through the public registrar API and every
//! answer is compared against a direct evaluation of the three grant paths.

use crate::{
    core::Registrar, entity::Entity, group::Group, permission::Permission, role::Role,
    subject::Subject,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

const PERMISSIONS: usize = 6;
const ROLES: usize = 4;
const GROUPS: usize = 3;

/// A random grant graph over small fixed entity sets, as index sets.
#[derive(Debug, Clone)]
struct GrantGraph {
    role_permissions: Vec<BTreeSet<usize>>,
    group_roles: Vec<BTreeSet<usize>>,
    group_permissions: Vec<BTreeSet<usize>>,
    subject_roles: BTreeSet<usize>,
    subject_groups: BTreeSet<usize>,
    subject_permissions: BTreeSet<usize>,
}

impl GrantGraph {
    /// Evaluate the grant rules without the registrar.
    fn grants(&self, permission: usize) -> bool {
        let via_role = |role: &usize| self.role_permissions[*role].contains(&permission);
        self.subject_permissions.contains(&permission)
            || self.subject_roles.iter().any(via_role)
            || self.subject_groups.iter().any(|group| {
                self.group_permissions[*group].contains(&permission)
                    || self.group_roles[*group].iter().any(via_role)
            })
    }
}

fn index_set(size: usize) -> impl Strategy<Value = BTreeSet<usize>> {
    prop::collection::btree_set(0..size, 0..=size)
}

fn grant_graph_strategy() -> impl Strategy<Value = GrantGraph> {
    (
        prop::collection::vec(index_set(PERMISSIONS), ROLES),
        prop::collection::vec(index_set(ROLES), GROUPS),
        prop::collection::vec(index_set(PERMISSIONS), GROUPS),
        index_set(ROLES),
        index_set(GROUPS),
        index_set(PERMISSIONS),
    )
        .prop_map(
            |(
                role_permissions,
                group_roles,
                group_permissions,
                subject_roles,
                subject_groups,
                subject_permissions,
            )| GrantGraph {
                role_permissions,
                group_roles,
                group_permissions,
                subject_roles,
                subject_groups,
                subject_permissions,
            },
        )
}

struct Fixture {
    registrar: Registrar,
    permissions: Vec<Permission>,
    roles: Vec<Role>,
    groups: Vec<Group>,
}

impl Fixture {
    fn new() -> Self {
        let registrar = Registrar::new();
        let permissions = (0..PERMISSIONS)
            .map(|i| registrar.create_permission(&format!("permission-{i}"), None).unwrap())
            .collect();
        let roles = (0..ROLES)
            .map(|i| registrar.create_role(&format!("role-{i}"), None).unwrap())
            .collect();
        let groups = (0..GROUPS)
            .map(|i| registrar.create_group(&format!("group-{i}"), None).unwrap())
            .collect();
        Self {
            registrar,
            permissions,
            roles,
            groups,
        }
    }

    fn pick<E: Clone>(entities: &[E], indices: &BTreeSet<usize>) -> Vec<E> {
        indices.iter().map(|i| entities[*i].clone()).collect()
    }

    fn apply(&self, graph: &GrantGraph) -> Subject {
        let registrar = &self.registrar;
        for (role, permissions) in self.roles.iter().zip(&graph.role_permissions) {
            registrar
                .give_permission_to(role, Self::pick(&self.permissions, permissions))
                .unwrap();
        }
        for (i, group) in self.groups.iter().enumerate() {
            registrar
                .assign_role_to_group(group, Self::pick(&self.roles, &graph.group_roles[i]))
                .unwrap();
            registrar
                .give_permission_to(group, Self::pick(&self.permissions, &graph.group_permissions[i]))
                .unwrap();
        }

        let mut subject = registrar
            .create_subject_with(
                "user",
                Self::pick(&self.roles, &graph.subject_roles),
                Self::pick(&self.groups, &graph.subject_groups),
            )
            .unwrap();
        registrar
            .give_permission_to_subject(
                &mut subject,
                Self::pick(&self.permissions, &graph.subject_permissions),
            )
            .unwrap();
        subject
    }
}

proptest! {
    #[test]
    fn resolution_matches_grant_rules(graph in grant_graph_strategy()) {
        let fixture = Fixture::new();
        let subject = fixture.apply(&graph);

        for (i, permission) in fixture.permissions.iter().enumerate() {
            let granted = fixture.registrar.has_permission_to(&subject, permission.name()).unwrap();
            prop_assert_eq!(granted, graph.grants(i), "permission-{}", i);
        }

        let all: BTreeSet<_> = fixture
            .registrar
            .all_permissions(&subject)
            .unwrap()
            .iter()
            .map(Entity::id)
            .collect();
        let expected: BTreeSet<_> = (0..PERMISSIONS)
            .filter(|i| graph.grants(*i))
            .map(|i| fixture.permissions[i].id())
            .collect();
        prop_assert_eq!(all, expected);
    }

    #[test]
    fn group_resolution_matches_grant_rules(graph in grant_graph_strategy()) {
        let fixture = Fixture::new();
        fixture.apply(&graph);

        for (g, group) in fixture.groups.iter().enumerate() {
            for (p, permission) in fixture.permissions.iter().enumerate() {
                let expected = graph.group_permissions[g].contains(&p)
                    || graph.group_roles[g].iter().any(|r| graph.role_permissions[*r].contains(&p));
                let granted = fixture.registrar.group_has_permission_to(group, permission).unwrap();
                prop_assert_eq!(granted, expected);
            }
        }
    }

    #[test]
    fn sync_roles_is_idempotent(
        first in index_set(ROLES),
        second in index_set(ROLES),
    ) {
        let fixture = Fixture::new();
        let registrar = &fixture.registrar;
        let mut subject = registrar
            .create_subject_with("user", Fixture::pick(&fixture.roles, &first), Vec::<&str>::new())
            .unwrap();

        registrar.sync_roles(&mut subject, Fixture::pick(&fixture.roles, &second)).unwrap();
        let once = subject.role_ids();
        registrar.sync_roles(&mut subject, Fixture::pick(&fixture.roles, &second)).unwrap();

        let expected: BTreeSet<_> = second.iter().map(|i| fixture.roles[*i].id()).collect();
        prop_assert_eq!(&once, &expected);
        prop_assert_eq!(subject.role_ids(), expected);
    }

    #[test]
    fn assign_then_remove_restores_roles(
        initial in index_set(ROLES),
        extra in 0..ROLES,
    ) {
        let fixture = Fixture::new();
        let registrar = &fixture.registrar;
        let mut subject = registrar
            .create_subject_with("user", Fixture::pick(&fixture.roles, &initial), Vec::<&str>::new())
            .unwrap();
        let before = subject.role_ids();

        registrar.assign_role(&mut subject, &fixture.roles[extra]).unwrap();
        registrar.assign_role(&mut subject, &fixture.roles[extra]).unwrap();
        prop_assert!(registrar.has_role(&subject, fixture.roles[extra].name()));

        registrar.remove_role(&mut subject, fixture.roles[extra].id()).unwrap();
        let mut expected = before;
        expected.remove(&fixture.roles[extra].id());
        prop_assert_eq!(subject.role_ids(), expected);
    }
}
