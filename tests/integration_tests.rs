//! Integration tests for resolution and the assignment protocol.

use role_groups::{
    CatalogFilter, Entity, Error, GuardConfig, Permission, Registrar, RegistrarConfig, Role,
    Subject, refs,
};

struct Fixture {
    registrar: Registrar,
    user: Subject,
    edit_articles: Permission,
    test_role: Role,
}

/// Users act under `web`, admins under `admin`.
fn setup() -> Fixture {
    let config = RegistrarConfig::default().with_guards(
        GuardConfig::new("web")
            .guard("web", "user")
            .guard("admin", "admin"),
    );
    let registrar = Registrar::with_config(config).unwrap();

    let edit_articles = registrar.create_permission("edit-articles", None).unwrap();
    registrar.create_permission("edit-news", None).unwrap();
    registrar
        .create_permission("admin-permission", Some("admin"))
        .unwrap();

    let test_role = registrar.create_role("testRole", None).unwrap();
    registrar.create_role("testRole2", None).unwrap();
    registrar.create_role("testAdminRole", Some("admin")).unwrap();

    registrar.create_group("testGroup", None).unwrap();

    let user = registrar
        .create_subject_with("user", Vec::<&str>::new(), Vec::<&str>::new())
        .unwrap();

    Fixture {
        registrar,
        user,
        edit_articles,
        test_role,
    }
}

#[test]
fn test_direct_permission_grant_and_revoke() {
    let Fixture {
        registrar,
        mut user,
        ..
    } = setup();

    assert!(!registrar.has_permission_to(&user, "edit-articles").unwrap());

    registrar
        .give_permission_to_subject(&mut user, "edit-articles")
        .unwrap();
    assert!(registrar.has_permission_to(&user, "edit-articles").unwrap());
    assert!(!registrar.has_permission_to(&user, "edit-news").unwrap());

    registrar
        .revoke_permission_from_subject(&mut user, "edit-articles")
        .unwrap();
    assert!(!registrar.has_permission_to(&user, "edit-articles").unwrap());
}

#[test]
fn test_permission_through_role() {
    let Fixture {
        registrar,
        mut user,
        edit_articles,
        test_role,
    } = setup();

    registrar.give_permission_to(&test_role, &edit_articles).unwrap();
    assert!(registrar.role_has_permission_to(&test_role, "edit-articles").unwrap());
    assert!(!registrar.role_has_permission_to(&test_role, "edit-news").unwrap());

    registrar.assign_role(&mut user, "testRole").unwrap();
    assert!(registrar.has_role(&user, "testRole"));
    assert!(registrar.has_permission_to(&user, &edit_articles).unwrap());
    assert!(registrar.has_permission_to(&user, edit_articles.id()).unwrap());

    registrar.remove_role(&mut user, "testRole").unwrap();
    assert!(!registrar.has_role(&user, "testRole"));
    assert!(!registrar.has_permission_to(&user, "edit-articles").unwrap());
}

#[test]
fn test_revoking_from_role_removes_grant() {
    let Fixture {
        registrar,
        mut user,
        test_role,
        ..
    } = setup();

    registrar
        .give_permission_to(&test_role, refs!["edit-articles", "edit-news"])
        .unwrap();
    registrar.assign_role(&mut user, &test_role).unwrap();
    assert!(registrar.has_all_permissions(&user, vec!["edit-articles", "edit-news"]).unwrap());

    registrar.revoke_permission_to(&test_role, "edit-news").unwrap();
    assert!(!registrar.has_permission_to(&user, "edit-news").unwrap());
    assert!(registrar.has_any_permission(&user, vec!["edit-news", "edit-articles"]).unwrap());

    registrar.sync_permissions(&test_role, Vec::<&str>::new()).unwrap();
    assert!(!registrar.has_any_permission(&user, vec!["edit-news", "edit-articles"]).unwrap());
}

#[test]
fn test_group_role_grant_and_removal() {
    let Fixture {
        registrar,
        mut user,
        edit_articles,
        test_role,
    } = setup();

    let group = registrar.find_group("testGroup", None).unwrap();
    registrar.give_permission_to(&test_role, &edit_articles).unwrap();
    registrar.assign_role_to_group(&group, &test_role).unwrap();

    registrar.assign_group(&mut user, "testGroup").unwrap();
    assert!(registrar.has_group(&user, "testGroup"));
    assert!(registrar.has_permission_to(&user, "edit-articles").unwrap());
    assert!(registrar.group_has_permission_to(&group, "edit-articles").unwrap());

    registrar.remove_role_from_group(&group, "testRole").unwrap();
    assert!(!registrar.has_permission_to(&user, "edit-articles").unwrap());
    assert!(!registrar.group_has_permission_to(&group, "edit-articles").unwrap());
}

#[test]
fn test_group_direct_permission() {
    let Fixture {
        registrar,
        mut user,
        ..
    } = setup();

    let group = registrar.find_group("testGroup", None).unwrap();
    registrar.give_permission_to(&group, "edit-news").unwrap();
    registrar.assign_group(&mut user, &group).unwrap();

    assert!(registrar.has_permission_to(&user, "edit-news").unwrap());
    assert!(!registrar.has_permission_to(&user, "edit-articles").unwrap());

    let names: Vec<String> = registrar
        .all_permissions(&user)
        .unwrap()
        .iter()
        .map(|permission| permission.name().to_string())
        .collect();
    assert_eq!(names, vec!["edit-news".to_string()]);
}

#[test]
fn test_assign_and_remove_group() {
    let Fixture {
        registrar,
        mut user,
        ..
    } = setup();

    assert!(!registrar.has_group(&user, "testGroup"));
    registrar.assign_group(&mut user, "testGroup").unwrap();
    assert!(registrar.has_group(&user, "testGroup"));
    registrar.remove_group(&mut user, "testGroup").unwrap();
    assert!(!registrar.has_group(&user, "testGroup"));

    // Removing a group the subject does not have is a no-op.
    registrar.remove_group(&mut user, "testGroup").unwrap();
}

#[test]
fn test_sync_roles_is_idempotent() {
    let Fixture {
        registrar,
        mut user,
        ..
    } = setup();

    registrar.assign_role(&mut user, "testRole").unwrap();
    registrar.sync_roles(&mut user, "testRole2").unwrap();
    let once = user.role_ids();
    registrar.sync_roles(&mut user, "testRole2").unwrap();

    assert_eq!(once, user.role_ids());
    assert!(registrar.has_role(&user, "testRole2"));
    assert!(!registrar.has_role(&user, "testRole"));

    registrar.sync_roles(&mut user, Vec::<&str>::new()).unwrap();
    assert!(user.roles().is_empty());
}

#[test]
fn test_sync_groups_replaces() {
    let Fixture {
        registrar,
        mut user,
        ..
    } = setup();
    registrar.create_group("otherGroup", None).unwrap();

    registrar.assign_group(&mut user, "testGroup").unwrap();
    registrar.sync_groups(&mut user, "otherGroup").unwrap();

    assert!(registrar.has_group(&user, "otherGroup"));
    assert!(!registrar.has_group(&user, "testGroup"));
    assert!(registrar.has_all_groups(&user, "otherGroup"));
}

#[test]
fn test_mutation_invalidates_populated_catalogs() {
    let Fixture {
        registrar,
        mut user,
        ..
    } = setup();

    registrar.permissions(&CatalogFilter::new()).unwrap();
    registrar.groups(&CatalogFilter::new()).unwrap();
    assert_eq!(registrar.catalog().is_loaded(), (true, true));

    registrar.assign_role(&mut user, "testRole").unwrap();
    assert_eq!(registrar.catalog().is_loaded(), (false, false));

    // The next read reloads from the store.
    let loads = registrar.metrics().summary().catalog_loads;
    registrar.permissions(&CatalogFilter::new()).unwrap();
    assert_eq!(registrar.metrics().summary().catalog_loads, loads + 1);
}

#[test]
fn test_guard_mismatch_on_assignment() {
    let Fixture {
        registrar,
        mut user,
        test_role,
        ..
    } = setup();

    let admin_role = registrar.find_role("testAdminRole", Some("admin")).unwrap();
    let err = registrar.assign_role(&mut user, &admin_role).unwrap_err();
    assert!(err.is_guard_mismatch());
    assert!(user.roles().is_empty());

    // A mismatch anywhere in the batch writes nothing.
    let err = registrar
        .assign_role(&mut user, refs![&test_role, &admin_role])
        .unwrap_err();
    assert!(err.is_guard_mismatch());
    registrar.refresh_subject(&mut user).unwrap();
    assert!(user.roles().is_empty());

    let admin_permission = registrar
        .find_permission("admin-permission", Some("admin"))
        .unwrap();
    assert!(registrar
        .give_permission_to(&test_role, &admin_permission)
        .unwrap_err()
        .is_guard_mismatch());
    assert!(registrar
        .has_permission_to(&user, &admin_permission)
        .unwrap_err()
        .is_guard_mismatch());
}

#[test]
fn test_admin_subject_uses_admin_guard() {
    let Fixture { registrar, .. } = setup();

    let mut admin = registrar
        .create_subject_with("admin", "testAdminRole", Vec::<&str>::new())
        .unwrap();
    assert!(registrar.has_role(&admin, "testAdminRole"));

    let err = registrar.assign_role(&mut admin, "testRole").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_duplicate_creation_and_find_or_create() {
    let Fixture { registrar, .. } = setup();

    let err = registrar.create_role("testRole", None).unwrap_err();
    assert!(matches!(err, Error::DuplicateEntity { .. }));
    assert_eq!(
        err.to_string(),
        "A role `testRole` already exists for guard `web`"
    );

    let found = registrar.find_or_create_role("testRole", None).unwrap();
    let created = registrar.find_or_create_role("testRole", Some("admin")).unwrap();
    assert_ne!(found.id(), created.id());
    assert_eq!(created.guard(), "admin");
}

#[test]
fn test_unknown_permission_is_an_error() {
    let Fixture { registrar, user, .. } = setup();

    let err = registrar.has_permission_to(&user, "does-not-exist").unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(
        err.to_string(),
        "There is no permission named `does-not-exist`"
    );
}

#[test]
fn test_roles_queued_before_persist() {
    let Fixture { registrar, .. } = setup();

    let mut user = Subject::new("user");
    registrar.assign_role(&mut user, "testRole|testRole2").unwrap();
    registrar.assign_group(&mut user, "testGroup").unwrap();
    assert!(!user.is_persisted());
    assert!(registrar.has_all_roles(&user, "testRole|testRole2"));

    registrar.persist_subject(&mut user).unwrap();
    let reloaded = registrar.load_subject("user", user.key().unwrap()).unwrap();
    assert!(registrar.has_all_roles(&reloaded, vec!["testRole", "testRole2"]));
    assert!(registrar.has_group(&reloaded, "testGroup"));

    // Persisting again writes nothing new.
    registrar.persist_subject(&mut user).unwrap();
    assert_eq!(registrar.store().subject_count(), 2);
}

#[test]
fn test_role_sees_its_groups() {
    let Fixture {
        registrar,
        test_role,
        ..
    } = setup();

    registrar.assign_group_to_role(&test_role, "testGroup").unwrap();
    let role = registrar.find_role("testRole", None).unwrap();
    let group = registrar.find_group("testGroup", None).unwrap();

    assert!(role.belongs_to_group(group.id()));
    assert!(group.has_role_id(role.id()));
}

/// A group aggregating a role and a direct permission, then removed from the
/// user: every grant it carried disappears.
#[test]
fn test_permission_direct_to_group_scenario() {
    let Fixture {
        registrar,
        mut user,
        edit_articles,
        test_role,
    } = setup();

    let group = registrar.find_group("testGroup", None).unwrap();
    registrar.assign_group_to_role(&test_role, &group).unwrap();
    registrar.give_permission_to(&test_role, &edit_articles).unwrap();

    let direct = registrar
        .create_permission("permission_direct_to_group", None)
        .unwrap();
    registrar.give_permission_to(&group, &direct).unwrap();
    registrar.assign_group(&mut user, "testGroup").unwrap();

    assert!(registrar.group_has_permission_to(&group, "permission_direct_to_group").unwrap());
    assert!(registrar.role_has_permission_to(&test_role, &edit_articles).unwrap());
    assert!(registrar.has_role_through_groups(&user, "testRole").unwrap());
    assert!(registrar.has_permission_to(&user, &edit_articles).unwrap());
    assert!(registrar.has_permission_to(&user, "permission_direct_to_group").unwrap());

    registrar.create_permission("permission_direct_to_user", None).unwrap();
    registrar
        .give_permission_to_subject(&mut user, "permission_direct_to_user")
        .unwrap();
    assert!(registrar.has_permission_to(&user, "permission_direct_to_user").unwrap());

    registrar.remove_group(&mut user, &group).unwrap();
    assert!(!registrar.has_group(&user, "testGroup"));
    assert!(!registrar.has_role_through_groups(&user, "testRole").unwrap());
    assert!(!registrar.has_permission_to(&user, "permission_direct_to_group").unwrap());
    assert!(!registrar.has_permission_to(&user, &edit_articles).unwrap());
    assert!(registrar.has_permission_to(&user, "permission_direct_to_user").unwrap());

    let newcomer = registrar
        .create_subject_with("user", Vec::<&str>::new(), Vec::<&str>::new())
        .unwrap();
    assert!(!registrar.has_role_through_groups(&newcomer, "testRole").unwrap());
    assert!(!registrar.has_permission_to(&newcomer, &edit_articles).unwrap());
    assert!(!registrar.has_permission_to(&newcomer, "permission_direct_to_group").unwrap());
}

#[test]
fn test_delete_subject_leaves_entities() {
    let Fixture {
        registrar,
        mut user,
        ..
    } = setup();

    registrar.assign_role(&mut user, "testRole").unwrap();
    let key = user.key().unwrap().to_string();
    assert!(registrar.delete_subject(user).unwrap());

    assert!(registrar.load_subject("user", &key).is_err());
    assert!(registrar.find_role("testRole", None).is_ok());
}

/// A role held through a group grants its permissions, but the group itself is
/// not a role.
#[test]
fn test_role_through_group_is_not_a_role_check() {
    let registrar = Registrar::new();
    let role = registrar.create_role("testRole", None).unwrap();
    registrar.create_permission("edit", None).unwrap();
    registrar.give_permission_to(&role, "edit").unwrap();

    let group = registrar.create_group("testGroup", None).unwrap();
    registrar.assign_role_to_group(&group, &role).unwrap();

    let mut user = registrar
        .create_subject_with("user", Vec::<&str>::new(), Vec::<&str>::new())
        .unwrap();
    registrar.assign_group(&mut user, "testGroup").unwrap();

    assert!(!registrar.has_role(&user, "testGroup"));
    assert!(!registrar.has_role(&user, "testRole"));
    assert!(registrar.has_group(&user, "testGroup"));
    assert!(registrar.has_role_through_groups(&user, "testRole").unwrap());
    assert!(registrar.has_permission_to(&user, "edit").unwrap());
}
