//! The already-authenticated caller.

use super::permissions::{Permission, UserRole};
use crate::error::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: UserRole,
}

/// Every core operation, with the permission it requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ReadCatalog,
    WriteCatalog,
    AddFavorite,
    ListFavorites,
    RemoveFavorite,
    ChangePassword,
    AddUser,
    ListUsers,
    DeleteUser,
    Reconcile,
    CheckIntegrity,
}

impl Operation {
    pub fn required_permission(self) -> Permission {
        match self {
            Operation::ReadCatalog => Permission::AccessCatalog,
            Operation::WriteCatalog => Permission::EditCatalog,
            Operation::AddFavorite | Operation::ListFavorites | Operation::RemoveFavorite => {
                Permission::ManageOwnFavorites
            }
            Operation::ChangePassword => Permission::ChangeOwnPassword,
            Operation::AddUser | Operation::ListUsers | Operation::DeleteUser => {
                Permission::ManageUsers
            }
            Operation::Reconcile | Operation::CheckIntegrity => Permission::RunMaintenance,
        }
    }
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: UserRole) -> Self {
        Identity {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn authorize(&self, operation: Operation) -> Result<(), ServiceError> {
        let permission = operation.required_permission();
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "{} role lacks {:?} for {:?}",
                self.role, permission, operation
            )))
        }
    }
}
