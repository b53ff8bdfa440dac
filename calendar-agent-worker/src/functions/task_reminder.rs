/// Task reminders
///
/// Fires at the scheduled reminder time and notifies the user.

use super::{
    notification_send::notification_payload, unexpected, JobContext, JobFunction, JobResult,
    StepContext,
};
use async_trait::async_trait;
use calendar_agent_shared::infra::{
    realtime::{channels, events},
    JobEvent,
};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

pub struct TaskReminder;

#[async_trait]
impl JobFunction for TaskReminder {
    fn id(&self) -> &'static str {
        "task-reminder"
    }

    fn event(&self) -> &'static str {
        JobEvent::TASK_REMINDER_SCHEDULED
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
        let JobEvent::TaskReminderScheduled(data) = event else {
            return Err(unexpected(self.id(), event));
        };

        let payload = notification_payload(
            Uuid::new_v4(),
            "task_reminder",
            "Task reminder",
            &format!("Task {} is due at {}", data.task_id, data.reminder_time),
            Some("/dashboard"),
        );

        step.run("send-reminder-notification", || async move {
            ctx.realtime
                .trigger(
                    &channels::user_private(data.user_id),
                    events::NOTIFICATION_NEW,
                    &payload,
                )
                .await;
            Ok(())
        })
        .await?;

        Ok(json!({
            "success": true,
            "userId": data.user_id,
            "taskId": data.task_id,
            "reminderTime": data.reminder_time,
        }))
    }
}
