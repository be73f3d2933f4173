use rolegate_auth::Principal;
use rolegate_core::{AccountId, PrincipalId};

/// Account a request is scoped to (taken from the path).
///
/// Present for every `/accounts/:account_id/...` route once the gates pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AccountContext {
    account_id: AccountId,
}

impl AccountContext {
    pub fn new(account_id: AccountId) -> Self {
        Self { account_id }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }
}

/// The calling principal, resolved against its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal.principal_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}
