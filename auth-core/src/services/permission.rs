//! Role/override permission resolver and its administrative surface.
//!
//! Resolution precedence, in order: no session denies; the ADMIN super-role
//! allows unconditionally; a per-user override pins the answer; otherwise
//! the role's default set decides. Unknown permission names and absent role
//! edges deny - the resolver fails closed, and a storage failure is an
//! error, never an allow.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    permission::CreatePermissionRequest, AuditEntry, Permission, PermissionOverride,
    RequestContext, Role, SessionClaims,
};
use crate::services::{AuditService, AuthStore, ServiceError};

#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn AuthStore>,
    audit: AuditService,
}

impl PermissionService {
    pub fn new(store: Arc<dyn AuthStore>, audit: AuditService) -> Self {
        Self { store, audit }
    }

    /// May the given session perform the named capability?
    ///
    /// Ownership questions ("may alice edit *this* post?") are the
    /// caller's: combine this answer with an equality check against the
    /// resource's owner field.
    pub async fn has_permission(
        &self,
        session: Option<&SessionClaims>,
        permission_name: &str,
    ) -> Result<bool, ServiceError> {
        let claims = match session {
            Some(claims) => claims,
            None => return Ok(false),
        };

        // Super-role bypass: never locked out by a misconfigured table,
        // and overrides authored against ADMIN are documentation-only.
        // Exhaustive so a new role cannot silently skip the deny path.
        match claims.role {
            Role::Admin => return Ok(true),
            Role::User | Role::Editor | Role::Manager => {}
        }

        let permission = match self
            .store
            .find_permission_by_name(permission_name)
            .await
            .map_err(ServiceError::storage)?
        {
            Some(permission) => permission,
            // Unknown capability names deny.
            None => return Ok(false),
        };

        if let Some(user_override) = self
            .store
            .find_user_override(claims.sub, permission.permission_id)
            .await
            .map_err(ServiceError::storage)?
        {
            return Ok(user_override.granted);
        }

        self.store
            .role_has_permission(claims.role, permission.permission_id)
            .await
            .map_err(ServiceError::storage)
    }

    /// `has_permission` that maps a false answer to `PermissionDenied`,
    /// for handlers that want a short-circuit.
    pub async fn require(
        &self,
        session: Option<&SessionClaims>,
        permission_name: &str,
    ) -> Result<(), ServiceError> {
        if self.has_permission(session, permission_name).await? {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied(permission_name.to_string()))
        }
    }

    // ==================== Administrative surface ====================

    pub async fn create_permission(
        &self,
        req: CreatePermissionRequest,
        actor: Uuid,
        ctx: &RequestContext,
    ) -> Result<Permission, ServiceError> {
        let permission = Permission::new(&req.name, req.description).ok_or_else(|| {
            ServiceError::Validation(format!(
                "Permission name must be lowercase \"resource:action\", got {:?}",
                req.name
            ))
        })?;

        self.store
            .insert_permission(&permission)
            .await
            .map_err(ServiceError::storage)?;

        self.audit.emit(AuditEntry::user_action(
            actor,
            "permissions:create",
            "permission",
            Some(permission.permission_id.to_string()),
            Some(serde_json::json!({ "name": permission.name })),
            ctx,
        ));

        Ok(permission)
    }

    pub async fn delete_permission(
        &self,
        permission_id: Uuid,
        actor: Uuid,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let deleted = self
            .store
            .delete_permission(permission_id)
            .await
            .map_err(ServiceError::storage)?;

        if !deleted {
            return Err(ServiceError::Validation(format!(
                "Unknown permission: {}",
                permission_id
            )));
        }

        self.audit.emit(AuditEntry::user_action(
            actor,
            "permissions:delete",
            "permission",
            Some(permission_id.to_string()),
            None,
            ctx,
        ));

        Ok(())
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, ServiceError> {
        self.store
            .list_permissions()
            .await
            .map_err(ServiceError::storage)
    }

    pub async fn role_permissions(&self, role: Role) -> Result<Vec<Permission>, ServiceError> {
        self.store
            .find_role_permissions(role)
            .await
            .map_err(ServiceError::storage)
    }

    /// Replace a role's full default grant set.
    ///
    /// Delete-then-insert as one transaction in the store: a concurrent
    /// reader never sees the half-replaced role. This is the only supported
    /// update shape - no incremental patch.
    pub async fn update_role_permissions(
        &self,
        role: Role,
        permission_ids: Vec<Uuid>,
        actor: Uuid,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        self.store
            .replace_role_permissions(role, &permission_ids)
            .await
            .map_err(ServiceError::storage)?;

        tracing::info!(
            role = %role,
            count = permission_ids.len(),
            "Role permissions replaced"
        );

        self.audit.emit(AuditEntry::user_action(
            actor,
            "roles:update_permissions",
            "role",
            Some(role.as_str().to_string()),
            Some(serde_json::json!({
                "permission_ids": permission_ids,
            })),
            ctx,
        ));

        Ok(())
    }

    /// Replace a user's full override set; an empty set clears every
    /// override and returns the user to pure role defaults.
    pub async fn update_user_permissions(
        &self,
        user_id: Uuid,
        overrides: Vec<PermissionOverride>,
        actor: Uuid,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        self.store
            .replace_user_overrides(user_id, &overrides)
            .await
            .map_err(ServiceError::storage)?;

        self.audit.emit(AuditEntry::user_action(
            actor,
            "users:update_permissions",
            "user",
            Some(user_id.to_string()),
            Some(serde_json::json!({
                "overrides": overrides
                    .iter()
                    .map(|o| serde_json::json!({
                        "permission_id": o.permission_id,
                        "granted": o.granted,
                    }))
                    .collect::<Vec<_>>(),
            })),
            ctx,
        ));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MockStore;
    use chrono::{Duration, Utc};

    fn claims_for(role: Role) -> SessionClaims {
        let now = Utc::now();
        SessionClaims {
            sub: Uuid::new_v4(),
            username: "tester".to_string(),
            email: "tester@example.com".to_string(),
            role,
            last_login: None,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(3600)).timestamp(),
        }
    }

    fn service_with_store() -> (PermissionService, Arc<MockStore>) {
        let store = Arc::new(MockStore::new());
        let audit = AuditService::new(store.clone());
        (PermissionService::new(store.clone(), audit), store)
    }

    fn seed_permission(store: &MockStore, name: &str) -> Permission {
        let permission = Permission::new(name, None).unwrap();
        store.seed_permission(permission.clone());
        permission
    }

    #[tokio::test]
    async fn test_no_session_denies() {
        let (service, store) = service_with_store();
        seed_permission(&store, "posts:read");
        assert!(!service.has_permission(None, "posts:read").await.unwrap());
    }

    #[tokio::test]
    async fn test_role_default_grants() {
        let (service, store) = service_with_store();
        let read = seed_permission(&store, "posts:read");
        seed_permission(&store, "posts:create");
        store.seed_role_permission(Role::User, read.permission_id);

        let claims = claims_for(Role::User);
        assert!(service
            .has_permission(Some(&claims), "posts:read")
            .await
            .unwrap());
        assert!(!service
            .has_permission(Some(&claims), "posts:create")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unknown_permission_fails_closed() {
        let (service, _) = service_with_store();
        let claims = claims_for(Role::Manager);
        assert!(!service
            .has_permission(Some(&claims), "ghosts:summon")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_admin_bypasses_everything() {
        let (service, store) = service_with_store();
        let claims = claims_for(Role::Admin);

        // No RolePermission rows for ADMIN at all.
        assert!(service
            .has_permission(Some(&claims), "posts:delete")
            .await
            .unwrap());

        // Even an explicit deny override is documentation-only for ADMIN.
        let delete = seed_permission(&store, "posts:delete");
        store
            .replace_user_overrides(
                claims.sub,
                &[PermissionOverride {
                    permission_id: delete.permission_id,
                    granted: false,
                }],
            )
            .await
            .unwrap();
        assert!(service
            .has_permission(Some(&claims), "posts:delete")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_override_pins_answer_both_ways() {
        let (service, store) = service_with_store();
        let create = seed_permission(&store, "posts:create");
        let read = seed_permission(&store, "posts:read");
        // Role USER grants create and read by default.
        store.seed_role_permission(Role::User, create.permission_id);
        store.seed_role_permission(Role::User, read.permission_id);

        let alice = claims_for(Role::User);
        // Explicit deny beats the role grant.
        store
            .replace_user_overrides(
                alice.sub,
                &[PermissionOverride {
                    permission_id: create.permission_id,
                    granted: false,
                }],
            )
            .await
            .unwrap();

        assert!(!service
            .has_permission(Some(&alice), "posts:create")
            .await
            .unwrap());
        assert!(service
            .has_permission(Some(&alice), "posts:read")
            .await
            .unwrap());

        // Explicit grant beats the absence of a role edge.
        let publish = seed_permission(&store, "posts:publish");
        store
            .replace_user_overrides(
                alice.sub,
                &[PermissionOverride {
                    permission_id: publish.permission_id,
                    granted: true,
                }],
            )
            .await
            .unwrap();
        assert!(service
            .has_permission(Some(&alice), "posts:publish")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_storage_failure_never_fails_open() {
        let (service, store) = service_with_store();
        seed_permission(&store, "posts:read");
        store.set_unavailable(true);

        let claims = claims_for(Role::User);
        let err = service
            .has_permission(Some(&claims), "posts:read")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));
    }

    #[tokio::test]
    async fn test_require_maps_to_permission_denied() {
        let (service, store) = service_with_store();
        seed_permission(&store, "settings:update");
        let claims = claims_for(Role::Editor);

        let err = service
            .require(Some(&claims), "settings:update")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_full_replace_swaps_role_set() {
        let (service, store) = service_with_store();
        let read = seed_permission(&store, "posts:read");
        let create = seed_permission(&store, "posts:create");
        store.seed_role_permission(Role::Editor, read.permission_id);

        service
            .update_role_permissions(
                Role::Editor,
                vec![create.permission_id],
                Uuid::new_v4(),
                &RequestContext::default(),
            )
            .await
            .unwrap();

        let claims = claims_for(Role::Editor);
        assert!(!service
            .has_permission(Some(&claims), "posts:read")
            .await
            .unwrap());
        assert!(service
            .has_permission(Some(&claims), "posts:create")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_empty_override_replace_restores_role_defaults() {
        let (service, store) = service_with_store();
        let read = seed_permission(&store, "posts:read");
        store.seed_role_permission(Role::User, read.permission_id);

        let user_id = Uuid::new_v4();
        let mut claims = claims_for(Role::User);
        claims.sub = user_id;

        service
            .update_user_permissions(
                user_id,
                vec![PermissionOverride {
                    permission_id: read.permission_id,
                    granted: false,
                }],
                Uuid::new_v4(),
                &RequestContext::default(),
            )
            .await
            .unwrap();
        assert!(!service
            .has_permission(Some(&claims), "posts:read")
            .await
            .unwrap());

        service
            .update_user_permissions(user_id, vec![], Uuid::new_v4(), &RequestContext::default())
            .await
            .unwrap();
        assert!(service
            .has_permission(Some(&claims), "posts:read")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_create_permission_rejects_malformed_name() {
        let (service, _) = service_with_store();
        let err = service
            .create_permission(
                CreatePermissionRequest {
                    name: "NotAName".to_string(),
                    description: None,
                },
                Uuid::new_v4(),
                &RequestContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
