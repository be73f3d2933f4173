//! Entity trait: identity + account ownership.

use crate::id::AccountId;

/// Entity marker + minimal interface.
///
/// Every entity in this workspace lives inside exactly one account, so the
/// owning account is part of the contract.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Returns the account that owns this entity.
    fn account_id(&self) -> AccountId;

    /// True when the entity is visible from `account_id`.
    fn belongs_to(&self, account_id: AccountId) -> bool {
        self.account_id() == account_id
    }
}
