use super::{Repository, RepositoryError, RepositoryResult};
use crate::models::{
    Account, AuditLog, CreateUser, CreateWorkspace, LinkAccount, NewAuditLog, Preferences,
    ProfileChanges, Session, User, Workspace,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    workspaces: HashMap<Uuid, Workspace>,
    accounts: Vec<Account>,
    sessions: HashMap<Uuid, Session>,
    audit_logs: Vec<AuditLog>,
}

impl MemoryState {
    fn push_audit(&mut self, entry: NewAuditLog) -> AuditLog {
        let log = AuditLog {
            id: Uuid::new_v4(),
            workspace_id: entry.workspace_id,
            user_id: entry.user_id,
            action: entry.action,
            resource: entry.resource,
            resource_id: entry.resource_id,
            changes: entry.changes,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            created_at: Utc::now(),
        };
        self.audit_logs.push(log.clone());
        log
    }
}

/// In-process repository with the same semantics as [`super::PgRepository`]
///
/// Backs the router tests and `APP_ENV=test` runs. Nothing is persisted.
#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides stored fields that the public operations never change
    /// (role, active flag); used to set up admin and inactive accounts.
    pub async fn set_user_flags(&self, id: Uuid, role: &str, is_active: bool) -> bool {
        let mut state = self.state.write().await;
        match state.users.get_mut(&id) {
            Some(user) => {
                user.role = role.to_string();
                user.is_active = is_active;
                true
            }
            None => false,
        }
    }
}

fn live(user: &User) -> bool {
    user.deleted_at.is_none()
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn ping(&self) -> RepositoryResult<Duration> {
        Ok(Duration::ZERO)
    }

    async fn find_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).filter(|u| live(u)).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| live(u) && u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(&self, data: CreateUser) -> RepositoryResult<User> {
        let mut state = self.state.write().await;

        if state
            .users
            .values()
            .any(|u| live(u) && u.email.eq_ignore_ascii_case(&data.email))
        {
            return Err(RepositoryError::Conflict("user already exists".to_string()));
        }

        let now = Utc::now();
        let prefs = Preferences::default();
        let user = User {
            id: Uuid::new_v4(),
            email: data.email,
            name: data.name,
            image: data.image,
            role: "user".to_string(),
            is_active: true,
            timezone: prefs.timezone,
            work_hours_start: prefs.work_hours_start,
            work_hours_end: prefs.work_hours_end,
            work_days: prefs.work_days,
            break_duration: prefs.break_duration,
            workspace_id: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> RepositoryResult<Option<User>> {
        let mut state = self.state.write().await;

        match state.users.get_mut(&id).filter(|u| live(u)) {
            Some(user) => {
                changes.apply_to(user);
                user.updated_at = Utc::now();
                Ok(Some(user.clone()))
            }
            None => Ok(None),
        }
    }

    async fn assign_workspace(&self, user_id: Uuid, workspace_id: Uuid) -> RepositoryResult<bool> {
        let mut state = self.state.write().await;

        match state.users.get_mut(&user_id).filter(|u| live(u)) {
            Some(user) => {
                user.workspace_id = Some(workspace_id);
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete_user(&self, id: Uuid, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let mut state = self.state.write().await;

        match state.users.get_mut(&id).filter(|u| live(u)) {
            Some(user) => {
                user.deleted_at = Some(at);
                user.is_active = false;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_account(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        audit: NewAuditLog,
    ) -> RepositoryResult<Option<u64>> {
        let mut state = self.state.write().await;

        let Some(user) = state.users.get_mut(&id).filter(|u| live(u)) else {
            return Ok(None);
        };
        user.deleted_at = Some(at);
        user.is_active = false;
        user.updated_at = Utc::now();

        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.user_id != id);
        let revoked = (before - state.sessions.len()) as u64;

        state.push_audit(audit);
        Ok(Some(revoked))
    }

    async fn find_workspace(&self, id: Uuid) -> RepositoryResult<Option<Workspace>> {
        let state = self.state.read().await;
        Ok(state.workspaces.get(&id).cloned())
    }

    async fn workspace_slug_exists(&self, slug: &str) -> RepositoryResult<bool> {
        let state = self.state.read().await;
        Ok(state.workspaces.values().any(|w| w.slug == slug))
    }

    async fn create_workspace(&self, data: CreateWorkspace) -> RepositoryResult<Workspace> {
        let mut state = self.state.write().await;

        if state.workspaces.values().any(|w| w.slug == data.slug) {
            return Err(RepositoryError::Conflict(
                "workspace slug already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let workspace = Workspace {
            id: Uuid::new_v4(),
            name: data.name,
            slug: data.slug,
            workspace_type: data.workspace_type.as_str().to_string(),
            plan: data.plan,
            owner_id: data.owner_id,
            created_at: now,
            updated_at: now,
        };

        state.workspaces.insert(workspace.id, workspace.clone());
        Ok(workspace)
    }

    async fn list_accounts(&self, user_id: Uuid) -> RepositoryResult<Vec<Account>> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn link_account(&self, data: LinkAccount) -> RepositoryResult<Account> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.accounts.iter_mut().find(|a| {
            a.provider == data.provider && a.provider_account_id == data.provider_account_id
        }) {
            existing.user_id = data.user_id;
            existing.access_token = data.access_token;
            if data.refresh_token.is_some() {
                existing.refresh_token = data.refresh_token;
            }
            existing.expires_at = data.expires_at;
            existing.scope = data.scope;
            existing.token_type = data.token_type;
            existing.id_token = data.id_token;
            return Ok(existing.clone());
        }

        let account = Account {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            provider: data.provider,
            provider_account_id: data.provider_account_id,
            access_token: data.access_token,
            refresh_token: data.refresh_token,
            expires_at: data.expires_at,
            scope: data.scope,
            token_type: data.token_type,
            id_token: data.id_token,
            created_at: Utc::now(),
        };

        state.accounts.push(account.clone());
        Ok(account)
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<Session> {
        let mut state = self.state.write().await;
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            expires_at,
            created_at: Utc::now(),
        };
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_session(&self, id: Uuid) -> RepositoryResult<Option<Session>> {
        let state = self.state.read().await;
        let now = Utc::now();
        Ok(state
            .sessions
            .get(&id)
            .filter(|s| !s.is_expired_at(now))
            .cloned())
    }

    async fn extend_session(&self, id: Uuid, expires_at: DateTime<Utc>) -> RepositoryResult<bool> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        match state.sessions.get_mut(&id).filter(|s| !s.is_expired_at(now)) {
            Some(session) => {
                session.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_session(&self, id: Uuid) -> RepositoryResult<bool> {
        let mut state = self.state.write().await;
        Ok(state.sessions.remove(&id).is_some())
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> RepositoryResult<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn record_audit(&self, entry: NewAuditLog) -> RepositoryResult<AuditLog> {
        let mut state = self.state.write().await;
        Ok(state.push_audit(entry))
    }

    async fn list_audit_logs(&self, user_id: Uuid, limit: i64) -> RepositoryResult<Vec<AuditLog>> {
        let state = self.state.read().await;
        Ok(state
            .audit_logs
            .iter()
            .rev()
            .filter(|l| l.user_id == Some(user_id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn new_user(email: &str) -> CreateUser {
        CreateUser {
            email: email.to_string(),
            name: Some("Test".to_string()),
            image: None,
        }
    }

    #[tokio::test]
    async fn test_email_unique_among_live_users() {
        let repo = MemoryRepository::new();
        let user = repo.create_user(new_user("ada@example.com")).await.unwrap();

        let dup = repo.create_user(new_user("ADA@example.com")).await;
        assert!(matches!(dup, Err(RepositoryError::Conflict(_))));

        repo.soft_delete_user(user.id, Utc::now()).await.unwrap();
        assert!(repo.create_user(new_user("ada@example.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_soft_deleted_user_is_hidden() {
        let repo = MemoryRepository::new();
        let user = repo.create_user(new_user("grace@example.com")).await.unwrap();

        assert!(repo.soft_delete_user(user.id, Utc::now()).await.unwrap());
        assert!(repo.find_user(user.id).await.unwrap().is_none());
        assert!(repo.find_user_by_email("grace@example.com").await.unwrap().is_none());
        assert!(!repo.soft_delete_user(user.id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_partial_profile_update() {
        let repo = MemoryRepository::new();
        let user = repo.create_user(new_user("linus@example.com")).await.unwrap();

        let changes = ProfileChanges {
            name: Some("Linus".to_string()),
            ..Default::default()
        };
        let updated = repo.update_profile(user.id, &changes).await.unwrap().unwrap();

        assert_eq!(updated.name.as_deref(), Some("Linus"));
        assert_eq!(updated.preferences(), user.preferences());
    }

    #[tokio::test]
    async fn test_sessions_expire_and_revoke() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();

        let live_session = repo
            .create_session(user_id, Utc::now() + ChronoDuration::days(1))
            .await
            .unwrap();
        let stale = repo
            .create_session(user_id, Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();

        assert!(repo.find_session(live_session.id).await.unwrap().is_some());
        assert!(repo.find_session(stale.id).await.unwrap().is_none());

        assert_eq!(repo.delete_user_sessions(user_id).await.unwrap(), 2);
        assert!(repo.find_session(live_session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extend_session_only_while_live() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();
        let later = Utc::now() + ChronoDuration::days(30);

        let live_session = repo
            .create_session(user_id, Utc::now() + ChronoDuration::seconds(2))
            .await
            .unwrap();
        let stale = repo
            .create_session(user_id, Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();

        assert!(repo.extend_session(live_session.id, later).await.unwrap());
        assert!(!repo.extend_session(stale.id, later).await.unwrap());
        assert!(!repo.extend_session(Uuid::new_v4(), later).await.unwrap());

        let found = repo.find_session(live_session.id).await.unwrap().unwrap();
        assert_eq!(found.expires_at, later);
    }

    #[tokio::test]
    async fn test_delete_account_revokes_and_audits() {
        let repo = MemoryRepository::new();
        let user = repo.create_user(new_user("hedy@example.com")).await.unwrap();
        repo.create_session(user.id, Utc::now() + ChronoDuration::days(1))
            .await
            .unwrap();

        let audit = NewAuditLog {
            workspace_id: None,
            user_id: Some(user.id),
            action: "account.deleted".to_string(),
            resource: "user".to_string(),
            resource_id: Some(user.id.to_string()),
            changes: serde_json::json!({}),
            ip_address: "127.0.0.1".to_string(),
            user_agent: None,
        };

        let revoked = repo
            .delete_account(user.id, Utc::now(), audit.clone())
            .await
            .unwrap();
        assert_eq!(revoked, Some(1));
        assert!(repo.find_user(user.id).await.unwrap().is_none());
        assert_eq!(repo.list_audit_logs(user.id, 10).await.unwrap().len(), 1);

        // Already deleted: nothing else is written
        assert_eq!(repo.delete_account(user.id, Utc::now(), audit).await.unwrap(), None);
        assert_eq!(repo.list_audit_logs(user.id, 10).await.unwrap().len(), 1);
    }
}
