//! Permission model - named capabilities, role defaults, per-user overrides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Role;

/// Permission entity (global registry).
///
/// `name` is conventionally `"<resource>:<action>"` and globally unique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub permission_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub resource: String,
    pub action: String,
    pub created_utc: DateTime<Utc>,
}

impl Permission {
    /// Create a new permission from a `resource:action` name.
    ///
    /// Returns `None` when the name does not split into exactly two
    /// non-empty lowercase tokens.
    pub fn new(name: &str, description: Option<String>) -> Option<Self> {
        let (resource, action) = parse_permission_name(name)?;
        Some(Self {
            permission_id: Uuid::new_v4(),
            name: name.to_string(),
            description,
            resource,
            action,
            created_utc: Utc::now(),
        })
    }
}

/// Split a permission name into its resource and action tokens.
pub fn parse_permission_name(name: &str) -> Option<(String, String)> {
    let mut parts = name.split(':');
    let resource = parts.next()?;
    let action = parts.next()?;
    if parts.next().is_some() || resource.is_empty() || action.is_empty() {
        return None;
    }
    let lowercase =
        |s: &str| s.chars().all(|c| c.is_ascii_lowercase() || c == '_' || c == '-');
    if !lowercase(resource) || !lowercase(action) {
        return None;
    }
    Some((resource.to_string(), action.to_string()))
}

/// Role default edge. Unique on `(role, permission_id)`.
#[derive(Debug, Clone, FromRow)]
pub struct RolePermission {
    pub role_code: String,
    pub permission_id: Uuid,
}

impl RolePermission {
    pub fn new(role: Role, permission_id: Uuid) -> Self {
        Self {
            role_code: role.as_str().to_string(),
            permission_id,
        }
    }
}

/// Per-user override. Unique on `(user_id, permission_id)`.
///
/// Presence pins the effective answer to `granted`; absence falls back to
/// the role default.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserPermission {
    pub user_id: Uuid,
    pub permission_id: Uuid,
    pub granted: bool,
}

/// One entry of a user-override replacement set.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionOverride {
    pub permission_id: Uuid,
    pub granted: bool,
}

/// Request to create a permission.
#[derive(Debug, Deserialize)]
pub struct CreatePermissionRequest {
    pub name: String,
    pub description: Option<String>,
}

/// Permission response for API.
#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub permission_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub resource: String,
    pub action: String,
    pub created_utc: DateTime<Utc>,
}

impl From<Permission> for PermissionResponse {
    fn from(p: Permission) -> Self {
        Self {
            permission_id: p.permission_id,
            name: p.name,
            description: p.description,
            resource: p.resource,
            action: p.action,
            created_utc: p.created_utc,
        }
    }
}
