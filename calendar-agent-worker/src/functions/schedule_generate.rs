/// Schedule generation
///
/// Loads the user's scheduling preferences (cache first, then the
/// repository, then defaults) and publishes generation progress. Slot
/// assignment is not implemented; the generated schedule is empty.

use super::{unexpected, JobContext, JobError, JobFunction, JobResult, StepContext};
use async_trait::async_trait;
use calendar_agent_shared::{infra::JobEvent, models::Preferences};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

pub struct ScheduleGenerate;

/// Preferences for a user, falling back to defaults when unknown
pub async fn load_preferences(ctx: &JobContext, user_id: Uuid) -> JobResult<Preferences> {
    if let Some(cached) = ctx.cache.get_user_preferences(user_id).await {
        return Ok(cached);
    }

    let Some(repo) = ctx.repo.as_ref() else {
        return Ok(Preferences::default());
    };

    let user = repo
        .find_user(user_id)
        .await
        .map_err(|e| JobError::Retriable(format!("Failed to load user: {}", e)))?;

    match user {
        Some(user) => {
            let preferences = user.preferences();
            ctx.cache.set_user_preferences(user_id, &preferences).await;
            Ok(preferences)
        }
        None => {
            tracing::warn!(user_id = %user_id, "User not found, using default preferences");
            Ok(Preferences::default())
        }
    }
}

#[async_trait]
impl JobFunction for ScheduleGenerate {
    fn id(&self) -> &'static str {
        "schedule-generate"
    }

    fn event(&self) -> &'static str {
        JobEvent::SCHEDULE_GENERATE_REQUESTED
    }

    fn retries(&self) -> u32 {
        2
    }

    async fn run(
        &self,
        step: &StepContext,
        ctx: &JobContext,
        event: &JobEvent,
    ) -> JobResult<JsonValue> {
        let JobEvent::ScheduleGenerateRequested(data) = event else {
            return Err(unexpected(self.id(), event));
        };

        step.run("notify-generation-started", || async move {
            ctx.realtime
                .notify_schedule_generation_started(data.user_id)
                .await;
            Ok(())
        })
        .await?;

        let tasks: Vec<String> = step
            .run("load-tasks", || async move {
                tracing::info!(
                    user_id = %data.user_id,
                    requested = data.task_ids.len(),
                    "Loading tasks for scheduling"
                );
                Ok(Vec::new())
            })
            .await?;

        let preferences = step
            .run("load-preferences", || load_preferences(ctx, data.user_id))
            .await?;

        let schedule = step
            .run("generate-schedule", || async move {
                Ok(json!({
                    "scheduleId": Uuid::new_v4(),
                    "startDate": data.start_date,
                    "endDate": data.end_date,
                    "preferences": preferences,
                    "slots": [],
                }))
            })
            .await?;

        let generated = &schedule;
        step.run("notify-schedule-ready", || async move {
            ctx.realtime
                .notify_schedule_generation_completed(data.user_id, generated)
                .await;
            Ok(())
        })
        .await?;

        Ok(json!({
            "success": true,
            "userId": data.user_id,
            "workspaceId": data.workspace_id,
            "scheduleId": schedule["scheduleId"],
            "tasksScheduled": tasks.len(),
        }))
    }
}
