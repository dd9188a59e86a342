pub mod account_token;
pub mod audit;
pub mod credential;
pub mod identity;
pub mod permission;

pub use account_token::{AccountToken, AccountTokenType};
pub use audit::{AuditEntry, RequestContext};
pub use credential::UserCredentials;
pub use identity::{Identity, Role, SessionClaims, SessionStatus};
pub use permission::{
    Permission, PermissionOverride, PermissionResponse, RolePermission, UserPermission,
};
