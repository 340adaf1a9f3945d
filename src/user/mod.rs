pub mod auth;
mod identity;
pub mod permissions;
mod user_manager;

pub use auth::PasswordHasher;
pub use identity::{Identity, Operation};
pub use permissions::{Permission, UserRole};
pub use user_manager::{UserManager, UserSummary, MIN_PASSWORD_LENGTH};
