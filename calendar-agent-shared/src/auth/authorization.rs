//! Authorization checks
//!
//! Every check here reduces to comparing a resource owner with the signed-in
//! user, optionally letting admins through. Handlers call these after loading
//! a record and before touching it.
//!
//! # Example
//!
//! ```
//! use calendar_agent_shared::auth::authorization::{authorize_resource_access, OwnedResource};
//! use calendar_agent_shared::auth::middleware::SessionContext;
//! use uuid::Uuid;
//!
//! struct Note { owner: Uuid }
//!
//! impl OwnedResource for Note {
//!     fn owner_id(&self) -> Uuid { self.owner }
//! }
//!
//! fn check(session: &SessionContext, note: Option<&Note>) -> bool {
//!     authorize_resource_access(Some(session), note).is_ok()
//! }
//! ```

use axum::http::StatusCode;
use std::collections::HashMap;
use uuid::Uuid;

use super::middleware::SessionContext;
use crate::models::{User, UserRole};

/// Authorization failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("Insufficient permissions: requires one of {required:?}")]
    InsufficientRole { required: Vec<UserRole> },

    #[error("You do not have access to this workspace")]
    WorkspaceAccessDenied,

    #[error("{0}")]
    ResourceAccessDenied(String),

    #[error("Invalid session")]
    InvalidSession,
}

impl AuthorizationError {
    /// Machine-readable code returned to clients
    pub fn code(&self) -> &'static str {
        match self {
            AuthorizationError::NotAuthenticated => "NOT_AUTHENTICATED",
            AuthorizationError::Forbidden(_) => "FORBIDDEN",
            AuthorizationError::InsufficientRole { .. } => "INSUFFICIENT_ROLE",
            AuthorizationError::WorkspaceAccessDenied => "WORKSPACE_ACCESS_DENIED",
            AuthorizationError::ResourceAccessDenied(_) => "RESOURCE_ACCESS_DENIED",
            AuthorizationError::InvalidSession => "INVALID_SESSION",
        }
    }

    /// 401 for missing authentication, 403 for everything else
    pub fn status(&self) -> StatusCode {
        match self {
            AuthorizationError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            _ => StatusCode::FORBIDDEN,
        }
    }
}

/// A record with a single owning user
pub trait OwnedResource {
    fn owner_id(&self) -> Uuid;
}

impl OwnedResource for User {
    fn owner_id(&self) -> Uuid {
        self.id
    }
}

/// Checks that the session owns the resource
///
/// A missing resource is reported as an access failure so callers cannot
/// probe for the existence of other users' records.
pub fn authorize_resource_access<R: OwnedResource>(
    session: Option<&SessionContext>,
    resource: Option<&R>,
) -> Result<(), AuthorizationError> {
    let session = session.ok_or(AuthorizationError::NotAuthenticated)?;
    let resource = resource.ok_or_else(|| {
        AuthorizationError::ResourceAccessDenied("Resource not found".to_string())
    })?;

    if resource.owner_id() != session.user_id {
        tracing::warn!(
            user_id = %session.user_id,
            owner_id = %resource.owner_id(),
            "Resource access denied"
        );
        return Err(AuthorizationError::ResourceAccessDenied(
            "You do not have permission to access this resource".to_string(),
        ));
    }

    Ok(())
}

/// Like [`authorize_resource_access`] but admins may modify any resource
pub fn authorize_modify_resource<R: OwnedResource>(
    session: Option<&SessionContext>,
    resource: Option<&R>,
) -> Result<(), AuthorizationError> {
    if let Some(s) = session {
        if s.is_admin() && resource.is_some() {
            return Ok(());
        }
    }

    authorize_resource_access(session, resource)
}

/// Requires an active session with the given role
pub fn require_role(
    session: Option<&SessionContext>,
    role: UserRole,
) -> Result<&SessionContext, AuthorizationError> {
    require_any_role(session, &[role])
}

/// Requires an active session holding any of the given roles
pub fn require_any_role<'a>(
    session: Option<&'a SessionContext>,
    roles: &[UserRole],
) -> Result<&'a SessionContext, AuthorizationError> {
    let session = session.ok_or(AuthorizationError::NotAuthenticated)?;

    if !session.is_active {
        return Err(AuthorizationError::Forbidden(
            "User account is inactive".to_string(),
        ));
    }

    if !roles.contains(&session.role) {
        return Err(AuthorizationError::InsufficientRole {
            required: roles.to_vec(),
        });
    }

    Ok(session)
}

/// Checks workspace membership and, optionally, a minimum role
///
/// Admins satisfy any required role but still need to belong to the workspace.
pub fn authorize_workspace_access(
    session: Option<&SessionContext>,
    workspace_id: Uuid,
    required_role: Option<UserRole>,
) -> Result<(), AuthorizationError> {
    let session = session.ok_or(AuthorizationError::NotAuthenticated)?;

    if session.workspace_id != Some(workspace_id) {
        return Err(AuthorizationError::WorkspaceAccessDenied);
    }

    match required_role {
        Some(role) if session.role != role && !session.is_admin() => {
            Err(AuthorizationError::InsufficientRole {
                required: vec![role],
            })
        }
        _ => Ok(()),
    }
}

/// Checks ownership of a batch of resources
///
/// # Returns
///
/// IDs the session may not touch; IDs absent from `resources` count as
/// unauthorized. An empty vector means everything is allowed.
pub fn authorize_multiple_resources<R: OwnedResource>(
    session: Option<&SessionContext>,
    resources: &HashMap<Uuid, R>,
    requested: &[Uuid],
) -> Result<Vec<Uuid>, AuthorizationError> {
    let session = session.ok_or(AuthorizationError::NotAuthenticated)?;

    Ok(requested
        .iter()
        .filter(|id| {
            resources
                .get(*id)
                .map(|r| r.owner_id() != session.user_id)
                .unwrap_or(true)
        })
        .copied()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct Doc(Uuid);

    impl OwnedResource for Doc {
        fn owner_id(&self) -> Uuid {
            self.0
        }
    }

    fn session(role: UserRole) -> SessionContext {
        SessionContext {
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            name: None,
            image: None,
            role,
            is_active: true,
            workspace_id: Some(Uuid::new_v4()),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn test_owner_allowed_stranger_denied() {
        let s = session(UserRole::User);
        let mine = Doc(s.user_id);
        let theirs = Doc(Uuid::new_v4());

        assert!(authorize_resource_access(Some(&s), Some(&mine)).is_ok());

        let err = authorize_resource_access(Some(&s), Some(&theirs)).unwrap_err();
        assert_eq!(err.code(), "RESOURCE_ACCESS_DENIED");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "You do not have permission to access this resource");
    }

    #[test]
    fn test_missing_session_and_resource() {
        let s = session(UserRole::User);

        let err = authorize_resource_access(None, Some(&Doc(s.user_id))).unwrap_err();
        assert_eq!(err, AuthorizationError::NotAuthenticated);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = authorize_resource_access::<Doc>(Some(&s), None).unwrap_err();
        assert_eq!(err.to_string(), "Resource not found");
    }

    #[test]
    fn test_admin_bypass_only_for_modify() {
        let admin = session(UserRole::Admin);
        let theirs = Doc(Uuid::new_v4());

        assert!(authorize_modify_resource(Some(&admin), Some(&theirs)).is_ok());
        assert!(authorize_resource_access(Some(&admin), Some(&theirs)).is_err());
        assert!(authorize_modify_resource(Some(&session(UserRole::User)), Some(&theirs)).is_err());
    }

    #[test]
    fn test_roles() {
        let premium = session(UserRole::Premium);
        assert!(require_role(Some(&premium), UserRole::Premium).is_ok());
        assert!(require_any_role(Some(&premium), &[UserRole::Admin, UserRole::Premium]).is_ok());

        let err = require_role(Some(&premium), UserRole::Admin).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_ROLE");

        let mut inactive = session(UserRole::Admin);
        inactive.is_active = false;
        assert_eq!(
            require_role(Some(&inactive), UserRole::Admin).unwrap_err().code(),
            "FORBIDDEN"
        );
    }

    #[test]
    fn test_workspace_access() {
        let user = session(UserRole::User);
        let admin = session(UserRole::Admin);
        let ws = user.workspace_id.unwrap();

        assert!(authorize_workspace_access(Some(&user), ws, None).is_ok());
        assert_eq!(
            authorize_workspace_access(Some(&user), ws, Some(UserRole::Premium))
                .unwrap_err()
                .code(),
            "INSUFFICIENT_ROLE"
        );
        assert_eq!(
            authorize_workspace_access(Some(&user), Uuid::new_v4(), None)
                .unwrap_err()
                .code(),
            "WORKSPACE_ACCESS_DENIED"
        );

        let admin_ws = admin.workspace_id.unwrap();
        assert!(authorize_workspace_access(Some(&admin), admin_ws, Some(UserRole::Premium)).is_ok());
    }

    #[test]
    fn test_multiple_resources() {
        let s = session(UserRole::User);
        let mine = Uuid::new_v4();
        let theirs = Uuid::new_v4();
        let missing = Uuid::new_v4();

        let mut resources = HashMap::new();
        resources.insert(mine, Doc(s.user_id));
        resources.insert(theirs, Doc(Uuid::new_v4()));

        let denied =
            authorize_multiple_resources(Some(&s), &resources, &[mine, theirs, missing]).unwrap();
        assert_eq!(denied, vec![theirs, missing]);
    }
}
