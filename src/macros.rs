//! Convenience macros.

/// Build a [`Reference::Many`](crate::reference::Reference::Many) from mixed
/// names, ids and entities.
///
/// # Examples
///
/// ```rust
/// use role_groups::{refs, Entity, Registrar, RoleRef};
///
/// let registrar = Registrar::new();
/// let writer = registrar.create_role("writer", None)?;
/// let admin = registrar.create_role("admin", None)?;
///
/// let roles: RoleRef = refs!["writer", admin.id(), &writer];
/// assert_eq!(roles.flatten().len(), 3);
/// # Ok::<(), role_groups::Error>(())
/// ```
#[macro_export]
macro_rules! refs {
    ($($reference:expr),* $(,)?) => {
        $crate::reference::Reference::Many(vec![$(
            $crate::reference::Reference::from($reference)
        ),*])
    };
}
