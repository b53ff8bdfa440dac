//! Background job events
//!
//! The API enqueues [`JobEvent`]s by appending them to the `jobs:events`
//! Redis stream; the worker consumes the stream through a consumer group.
//! Each entry carries three fields:
//!
//! | field  | value                              |
//! |--------|------------------------------------|
//! | `name` | event name, e.g. `email/send.requested` |
//! | `data` | JSON payload (camelCase)           |
//! | `ts`   | enqueue time, unix milliseconds    |
//!
//! Unlike the cache, enqueue failures propagate: a job the caller believes
//! was scheduled must actually be scheduled.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::redis::RedisClient;

/// Stream the worker consumes
pub const JOB_STREAM: &str = "jobs:events";

/// Approximate cap on retained stream entries
const JOB_STREAM_MAXLEN: usize = 10_000;

/// Job queue errors
#[derive(Error, Debug)]
pub enum JobQueueError {
    #[error("Job queue is not configured")]
    NotConfigured,

    #[error("Job queue command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Job payload could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed job entry: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSyncRequested {
    pub user_id: Uuid,
    pub calendar_id: String,
    pub workspace_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleGenerateRequested {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub start_date: String,
    pub end_date: String,
    pub task_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSendRequested {
    pub to: String,
    pub subject: String,
    pub template: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSendRequested {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReminderScheduled {
    pub user_id: Uuid,
    pub task_id: String,
    pub reminder_time: String,
}

/// Events the worker knows how to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum JobEvent {
    #[serde(rename = "calendar/sync.requested")]
    CalendarSyncRequested(CalendarSyncRequested),

    #[serde(rename = "schedule/generate.requested")]
    ScheduleGenerateRequested(ScheduleGenerateRequested),

    #[serde(rename = "email/send.requested")]
    EmailSendRequested(EmailSendRequested),

    #[serde(rename = "notification/send.requested")]
    NotificationSendRequested(NotificationSendRequested),

    #[serde(rename = "task/reminder.scheduled")]
    TaskReminderScheduled(TaskReminderScheduled),
}

impl JobEvent {
    pub const CALENDAR_SYNC_REQUESTED: &'static str = "calendar/sync.requested";
    pub const SCHEDULE_GENERATE_REQUESTED: &'static str = "schedule/generate.requested";
    pub const EMAIL_SEND_REQUESTED: &'static str = "email/send.requested";
    pub const NOTIFICATION_SEND_REQUESTED: &'static str = "notification/send.requested";
    pub const TASK_REMINDER_SCHEDULED: &'static str = "task/reminder.scheduled";

    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::CalendarSyncRequested(_) => Self::CALENDAR_SYNC_REQUESTED,
            JobEvent::ScheduleGenerateRequested(_) => Self::SCHEDULE_GENERATE_REQUESTED,
            JobEvent::EmailSendRequested(_) => Self::EMAIL_SEND_REQUESTED,
            JobEvent::NotificationSendRequested(_) => Self::NOTIFICATION_SEND_REQUESTED,
            JobEvent::TaskReminderScheduled(_) => Self::TASK_REMINDER_SCHEDULED,
        }
    }

    /// Payload as JSON text, the `data` stream field
    pub fn data_json(&self) -> Result<String, JobQueueError> {
        let value = serde_json::to_value(self)?;
        Ok(value
            .get("data")
            .map(|d| d.to_string())
            .unwrap_or_else(|| "{}".to_string()))
    }

    /// Rebuilds an event from its stream fields
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, JobQueueError> {
        let name = fields
            .get("name")
            .ok_or_else(|| JobQueueError::Malformed("missing name".to_string()))?;
        let data = fields
            .get("data")
            .ok_or_else(|| JobQueueError::Malformed("missing data".to_string()))?;

        let data: serde_json::Value = serde_json::from_str(data)?;
        Ok(serde_json::from_value(serde_json::json!({
            "name": name,
            "data": data,
        }))?)
    }
}

/// Producer side of the job stream
#[derive(Clone, Default)]
pub struct JobClient {
    client: Option<RedisClient>,
}

impl JobClient {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// Client that refuses to enqueue
    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Appends an event to the job stream
    ///
    /// # Returns
    ///
    /// The stream entry ID
    pub async fn send(&self, event: &JobEvent) -> Result<String, JobQueueError> {
        let client = self.client.as_ref().ok_or(JobQueueError::NotConfigured)?;
        let mut conn = client.get_connection();

        let data = event.data_json()?;
        let ts = chrono::Utc::now().timestamp_millis().to_string();
        let items = [("name", event.name()), ("data", data.as_str()), ("ts", ts.as_str())];

        let id: String = conn
            .xadd_maxlen(
                JOB_STREAM,
                redis::streams::StreamMaxlen::Approx(JOB_STREAM_MAXLEN),
                "*",
                &items[..],
            )
            .await
            .map_err(|e| {
                tracing::error!(event = event.name(), error = %e, "Failed to enqueue job");
                e
            })?;

        tracing::debug!(event = event.name(), stream_id = %id, "Enqueued job");
        Ok(id)
    }

    /// Appends several events; stops at the first failure
    pub async fn send_batch(&self, events: &[JobEvent]) -> Result<Vec<String>, JobQueueError> {
        let mut ids = Vec::with_capacity(events.len());
        for event in events {
            ids.push(self.send(event).await?);
        }
        Ok(ids)
    }

    pub async fn schedule_calendar_sync(
        &self,
        user_id: Uuid,
        calendar_id: impl Into<String>,
        workspace_id: Uuid,
    ) -> Result<String, JobQueueError> {
        self.send(&JobEvent::CalendarSyncRequested(CalendarSyncRequested {
            user_id,
            calendar_id: calendar_id.into(),
            workspace_id,
        }))
        .await
    }

    pub async fn schedule_generate_schedule(
        &self,
        request: ScheduleGenerateRequested,
    ) -> Result<String, JobQueueError> {
        self.send(&JobEvent::ScheduleGenerateRequested(request)).await
    }

    pub async fn schedule_email(
        &self,
        to: impl Into<String>,
        subject: impl Into<String>,
        template: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<String, JobQueueError> {
        self.send(&JobEvent::EmailSendRequested(EmailSendRequested {
            to: to.into(),
            subject: subject.into(),
            template: template.into(),
            data,
        }))
        .await
    }

    pub async fn send_notification(
        &self,
        notification: NotificationSendRequested,
    ) -> Result<String, JobQueueError> {
        self.send(&JobEvent::NotificationSendRequested(notification)).await
    }

    pub async fn schedule_task_reminder(
        &self,
        user_id: Uuid,
        task_id: impl Into<String>,
        reminder_time: impl Into<String>,
    ) -> Result<String, JobQueueError> {
        self.send(&JobEvent::TaskReminderScheduled(TaskReminderScheduled {
            user_id,
            task_id: task_id.into(),
            reminder_time: reminder_time.into(),
        }))
        .await
    }

    /// Checks that the stream accepts writes without enqueueing a job
    pub async fn test_connection(&self) -> Result<(), JobQueueError> {
        let client = self.client.as_ref().ok_or(JobQueueError::NotConfigured)?;
        let mut conn = client.get_connection();

        let ts = chrono::Utc::now().to_rfc3339();
        let _: String = conn
            .xadd_maxlen(
                "jobs:connection-test",
                redis::streams::StreamMaxlen::Approx(10),
                "*",
                &[("name", "test/connection"), ("ts", ts.as_str())],
            )
            .await?;
        Ok(())
    }
}
