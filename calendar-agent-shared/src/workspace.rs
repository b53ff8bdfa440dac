//! Workspace context resolution and personal workspace provisioning

use crate::models::workspace::{personal_slug_base, personal_workspace_name};
use crate::models::{CreateWorkspace, User, Workspace, WorkspaceType};
use crate::repository::{Repository, RepositoryError, RepositoryResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Plan assigned to new personal workspaces
pub const DEFAULT_PLAN: &str = "free";

/// Upper bound on slug suffixes tried before giving up
const MAX_SLUG_ATTEMPTS: u32 = 1000;

/// Workspace as seen from a signed-in user's perspective
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceContext {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub workspace_type: String,
    pub plan: String,
    pub user_id: Uuid,
}

impl WorkspaceContext {
    fn new(workspace: Workspace, user_id: Uuid) -> Self {
        Self {
            id: workspace.id,
            name: workspace.name,
            slug: workspace.slug,
            workspace_type: workspace.workspace_type,
            plan: workspace.plan,
            user_id,
        }
    }
}

/// Resolves the workspace a user belongs to
///
/// Returns None for users that have not been assigned one yet.
pub async fn workspace_for_user(
    repo: &dyn Repository,
    user_id: Uuid,
) -> RepositoryResult<Option<WorkspaceContext>> {
    let Some(user) = repo.find_user(user_id).await? else {
        return Ok(None);
    };
    let Some(workspace_id) = user.workspace_id else {
        return Ok(None);
    };

    Ok(repo
        .find_workspace(workspace_id)
        .await?
        .map(|w| WorkspaceContext::new(w, user_id)))
}

/// Checks that a user belongs to the given workspace
pub async fn verify_workspace_access(
    repo: &dyn Repository,
    user_id: Uuid,
    workspace_id: Uuid,
) -> RepositoryResult<bool> {
    Ok(repo
        .find_user(user_id)
        .await?
        .map(|u| u.workspace_id == Some(workspace_id))
        .unwrap_or(false))
}

/// Creates a personal workspace for a user and assigns the user to it
///
/// The slug comes from the email local part; `-1`, `-2`, ... are appended
/// until a free slug is found.
pub async fn create_personal_workspace(
    repo: &dyn Repository,
    user: &User,
) -> RepositoryResult<Workspace> {
    let base = personal_slug_base(&user.email);
    let slug = next_free_slug(repo, &base).await?;

    let workspace = repo
        .create_workspace(CreateWorkspace {
            name: personal_workspace_name(user.name.as_deref()),
            slug,
            workspace_type: WorkspaceType::Personal,
            plan: DEFAULT_PLAN.to_string(),
            owner_id: user.id,
        })
        .await?;

    repo.assign_workspace(user.id, workspace.id).await?;

    tracing::info!(
        user_id = %user.id,
        workspace_id = %workspace.id,
        slug = %workspace.slug,
        "Created personal workspace"
    );

    Ok(workspace)
}

async fn next_free_slug(repo: &dyn Repository, base: &str) -> RepositoryResult<String> {
    if !repo.workspace_slug_exists(base).await? {
        return Ok(base.to_string());
    }

    for counter in 1..=MAX_SLUG_ATTEMPTS {
        let candidate = format!("{}-{}", base, counter);
        if !repo.workspace_slug_exists(&candidate).await? {
            return Ok(candidate);
        }
    }

    Err(RepositoryError::Conflict(format!(
        "no free workspace slug for '{}'",
        base
    )))
}
