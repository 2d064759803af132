//! Caller identity as supplied by the identity service.
//!
//! Credentials are never parsed here: an [`IdentityResolver`] turns an opaque
//! bearer credential into an [`Identity`], and everything downstream takes
//! that identity as an explicit argument.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::value_objects::CustomerId;
use crate::store::StoreError;
use crate::EcommerceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Admin,
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    pub customer_id: Option<CustomerId>,
    pub role: Option<Role>,
}

impl Identity {
    pub const ANONYMOUS: Identity = Identity { customer_id: None, role: None };

    pub const fn customer(id: CustomerId) -> Self { Self { customer_id: Some(id), role: Some(Role::Customer) } }

    pub const fn admin(id: CustomerId) -> Self { Self { customer_id: Some(id), role: Some(Role::Admin) } }

    pub fn is_authenticated(&self) -> bool { self.customer_id.is_some() }

    pub fn is_admin(&self) -> bool { self.is_authenticated() && self.role == Some(Role::Admin) }

    pub fn require_customer(&self) -> Result<CustomerId, EcommerceError> {
        self.customer_id.ok_or(EcommerceError::Unauthenticated)
    }

    pub fn require_admin(&self) -> Result<CustomerId, EcommerceError> {
        let id = self.require_customer()?;
        if self.is_admin() { Ok(id) } else { Err(EcommerceError::Forbidden) }
    }
}

/// Resolves a bearer credential. `Ok(None)` means the credential is unknown
/// or expired and the caller is treated as anonymous.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<Option<Identity>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_roles() {
        let id = CustomerId::generate();
        assert!(!Identity::ANONYMOUS.is_authenticated());
        assert!(matches!(Identity::ANONYMOUS.require_customer(), Err(EcommerceError::Unauthenticated)));
        assert_eq!(Identity::customer(id).require_customer().unwrap(), id);
        assert!(matches!(Identity::customer(id).require_admin(), Err(EcommerceError::Forbidden)));
        assert_eq!(Identity::admin(id).require_admin().unwrap(), id);
        let role_only = Identity { customer_id: None, role: Some(Role::Admin) };
        assert!(!role_only.is_admin());
    }
}
