//! API-side authorization guard for commands.
//!
//! Enforces authorization at the command boundary (before dispatch), keeping
//! domain aggregates and infra auth-agnostic.

use facturier_auth::{
    AccountMembership, AuthzError, CommandAuthorization, Permission, Principal, authorize,
};

use crate::context::{AccountContext, PrincipalContext};

/// Check authorization for a command in the current request context.
///
/// Intended to be called **before** dispatching a command.
pub fn authorize_command<C: CommandAuthorization>(
    account: &AccountContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let membership = AccountMembership {
        account_id: account.account_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    };

    let principal = Principal {
        principal_id: principal.principal_id(),
        active_account_id: account.account_id(),
        membership,
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}

/// Minimal role→permission mapping stub.
///
/// Intentionally simple until a real policy source exists (e.g. DB-backed).
fn permissions_from_roles(roles: &[facturier_auth::Role]) -> Vec<Permission> {
    // Convention: "admin" grants all permissions in the current account.
    if roles.iter().any(|r| r.as_str() == "admin") {
        return vec![Permission::new("*")];
    }

    Vec::new()
}
