//! Fixed mutation → invalidated-keys table.
//!
//! The mapping is data, not logic: [`INVALIDATION_TABLE`] lists every
//! mutation and the key families it marks stale, and [`keys_to_invalidate`]
//! only interprets it.

use crate::cache::QueryKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateAnimation,
    LikeAnimation,
    DeleteAnimation,
    UpdateAnimation,
    UpdateProfile,
    Login,
    Register,
}

/// A family of cache keys a mutation can mark stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Every animation list, whatever its filters, including per-user
    /// galleries and marketplace feeds.
    AnimationLists,
    /// The single-record key of the mutated animation.
    AnimationRecord,
    CurrentUser,
}

pub const INVALIDATION_TABLE: &[(MutationKind, &[Target])] = &[
    (MutationKind::CreateAnimation, &[Target::AnimationLists]),
    (MutationKind::LikeAnimation, &[Target::AnimationRecord]),
    (MutationKind::DeleteAnimation, &[Target::AnimationLists]),
    (MutationKind::UpdateAnimation, &[Target::AnimationRecord, Target::AnimationLists]),
    (MutationKind::UpdateProfile, &[Target::CurrentUser]),
    (MutationKind::Login, &[]),
    (MutationKind::Register, &[]),
];

/// Targets for `kind`. Mutations missing from the table invalidate nothing.
#[must_use]
pub fn targets(kind: MutationKind) -> &'static [Target] {
    INVALIDATION_TABLE
        .iter()
        .find(|(mutation, _)| *mutation == kind)
        .map(|(_, targets)| *targets)
        .unwrap_or_default()
}

impl Target {
    /// Whether `key` belongs to this family. `id` is the mutated record, if any.
    #[must_use]
    pub fn matches(self, key: &QueryKey, id: Option<&str>) -> bool {
        match (self, key) {
            (
                Self::AnimationLists,
                QueryKey::Animations(_) | QueryKey::UserAnimations(_) | QueryKey::Marketplace(..),
            )
            | (Self::CurrentUser, QueryKey::CurrentUser) => true,
            (Self::AnimationRecord, QueryKey::Animation(record)) => id == Some(record.as_str()),
            _ => false,
        }
    }
}

/// Whether `key` is invalidated by a successful `kind` mutation on `id`.
#[must_use]
pub fn keys_to_invalidate(kind: MutationKind, id: Option<&str>, key: &QueryKey) -> bool {
    targets(kind).iter().any(|target| target.matches(key, id))
}

#[cfg(test)]
#[path = "invalidation_test.rs"]
mod tests;
