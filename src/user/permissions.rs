use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    AccessCatalog,
    EditCatalog,
    ManageOwnFavorites,
    ChangeOwnPassword,
    ManageUsers,
    RunMaintenance,
}

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::AccessCatalog,
    Permission::EditCatalog,
    Permission::ManageOwnFavorites,
    Permission::ChangeOwnPassword,
    Permission::ManageUsers,
    Permission::RunMaintenance,
];
const EDITOR_PERMISSIONS: &[Permission] = &[
    Permission::AccessCatalog,
    Permission::EditCatalog,
    Permission::ManageOwnFavorites,
    Permission::ChangeOwnPassword,
];
const VIEWER_PERMISSIONS: &[Permission] = &[
    Permission::AccessCatalog,
    Permission::ManageOwnFavorites,
    Permission::ChangeOwnPassword,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Editor,
    Viewer,
}

impl UserRole {
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            UserRole::Admin => ADMIN_PERMISSIONS,
            UserRole::Editor => EDITOR_PERMISSIONS,
            UserRole::Viewer => VIEWER_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Editor => "editor",
            UserRole::Viewer => "viewer",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(UserRole::Admin),
            "editor" => Some(UserRole::Editor),
            "viewer" => Some(UserRole::Viewer),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
