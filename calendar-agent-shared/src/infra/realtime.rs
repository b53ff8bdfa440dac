//! Realtime push
//!
//! Server-side events are published on Redis pub/sub, one Redis channel per
//! logical channel (`realtime:{channel}`), as JSON
//! `{"event": ..., "data": ..., "timestamp": ...}`. A websocket gateway
//! subscribes and fans out to browsers. Delivery is best effort: publish
//! failures are logged and swallowed.
//!
//! Private channel subscriptions are authorized with
//! [`RealtimeClient::authenticate_channel`], which signs
//! `socket_id:channel` with the app secret.

use chrono::Utc;
use hmac::{Hmac, Mac};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::redis::RedisClient;

/// Prefix of the Redis pub/sub channel for each logical channel
pub const REDIS_CHANNEL_PREFIX: &str = "realtime:";

/// Channel names
pub mod channels {
    use uuid::Uuid;

    pub fn user_private(user_id: Uuid) -> String {
        format!("private-user-{}", user_id)
    }

    pub fn workspace(workspace_id: Uuid) -> String {
        format!("private-workspace-{}", workspace_id)
    }

    pub fn calendar_sync(user_id: Uuid) -> String {
        format!("private-calendar-sync-{}", user_id)
    }

    pub fn task_updates(user_id: Uuid) -> String {
        format!("private-task-updates-{}", user_id)
    }

    pub fn schedule_generation(user_id: Uuid) -> String {
        format!("private-schedule-{}", user_id)
    }
}

/// Event names
pub mod events {
    pub const CALENDAR_SYNC_STARTED: &str = "calendar.sync.started";
    pub const CALENDAR_SYNC_PROGRESS: &str = "calendar.sync.progress";
    pub const CALENDAR_SYNC_COMPLETED: &str = "calendar.sync.completed";
    pub const CALENDAR_SYNC_FAILED: &str = "calendar.sync.failed";

    pub const TASK_CREATED: &str = "task.created";
    pub const TASK_UPDATED: &str = "task.updated";
    pub const TASK_DELETED: &str = "task.deleted";
    pub const TASK_COMPLETED: &str = "task.completed";

    pub const SCHEDULE_GENERATION_STARTED: &str = "schedule.generation.started";
    pub const SCHEDULE_GENERATION_PROGRESS: &str = "schedule.generation.progress";
    pub const SCHEDULE_GENERATION_COMPLETED: &str = "schedule.generation.completed";
    pub const SCHEDULE_GENERATION_FAILED: &str = "schedule.generation.failed";

    pub const NOTIFICATION_NEW: &str = "notification.new";

    pub const USER_ONLINE: &str = "user.online";
    pub const USER_OFFLINE: &str = "user.offline";
}

/// Realtime errors
#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Realtime is not configured")]
    NotConfigured,

    #[error("Unauthorized channel access")]
    UnauthorizedChannel,

    #[error("Realtime publish failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Realtime payload could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// App credentials used to sign channel subscriptions
#[derive(Debug, Clone)]
pub struct RealtimeCredentials {
    pub app_key: String,
    pub app_secret: String,
}

/// Subscription signature returned to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAuth {
    pub auth: String,
}

/// Message published on a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub event: String,
    pub data: serde_json::Value,
    pub timestamp: String,
}

/// Realtime publisher
#[derive(Clone, Default)]
pub struct RealtimeClient {
    client: Option<RedisClient>,
    credentials: Option<RealtimeCredentials>,
}

impl RealtimeClient {
    pub fn new(client: Option<RedisClient>, credentials: Option<RealtimeCredentials>) -> Self {
        Self { client, credentials }
    }

    /// Publisher that drops every event
    pub fn disabled() -> Self {
        Self::default()
    }

    /// True when events can be published
    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Publishes one event; failures are logged, never returned
    pub async fn trigger<T: Serialize + ?Sized>(&self, channel: &str, event: &str, data: &T) {
        if let Err(e) = self.try_trigger(&[channel], event, data).await {
            match e {
                RealtimeError::NotConfigured => {
                    tracing::debug!(channel, event, "Realtime disabled, event dropped");
                }
                e => tracing::warn!(channel, event, error = %e, "Failed to publish realtime event"),
            }
        }
    }

    /// Publishes the same event on several channels in one round trip
    pub async fn trigger_batch<T: Serialize + ?Sized>(&self, channels: &[&str], event: &str, data: &T) {
        if let Err(e) = self.try_trigger(channels, event, data).await {
            if !matches!(e, RealtimeError::NotConfigured) {
                tracing::warn!(event, error = %e, "Failed to publish realtime batch");
            }
        }
    }

    /// Publishes a throwaway event to verify connectivity
    pub async fn test_connection(&self) -> Result<(), RealtimeError> {
        let channel = format!("test-{}", Utc::now().timestamp_millis());
        self.try_trigger(&[channel.as_str()], "test-event", &serde_json::json!({ "test": true }))
            .await
    }

    /// Signs a private channel subscription
    ///
    /// `private-user-*` channels are only granted to the user they name.
    pub fn authenticate_channel(
        &self,
        socket_id: &str,
        channel: &str,
        user_id: Uuid,
    ) -> Result<ChannelAuth, RealtimeError> {
        if channel.starts_with("private-user-") && !channel.contains(&user_id.to_string()) {
            tracing::warn!(user_id = %user_id, channel, "Rejected realtime channel subscription");
            return Err(RealtimeError::UnauthorizedChannel);
        }

        let credentials = self.credentials.as_ref().ok_or(RealtimeError::NotConfigured)?;
        let mut mac = Hmac::<Sha256>::new_from_slice(credentials.app_secret.as_bytes())
            .map_err(|_| RealtimeError::NotConfigured)?;
        mac.update(format!("{}:{}", socket_id, channel).as_bytes());

        Ok(ChannelAuth {
            auth: format!(
                "{}:{}",
                credentials.app_key,
                hex::encode(mac.finalize().into_bytes())
            ),
        })
    }

    pub async fn notify_calendar_sync_started(&self, user_id: Uuid, calendar_id: &str) {
        self.trigger(
            &channels::calendar_sync(user_id),
            events::CALENDAR_SYNC_STARTED,
            &serde_json::json!({ "calendarId": calendar_id, "timestamp": now() }),
        )
        .await
    }

    pub async fn notify_calendar_sync_progress(
        &self,
        user_id: Uuid,
        calendar_id: &str,
        progress: u8,
        message: &str,
    ) {
        self.trigger(
            &channels::calendar_sync(user_id),
            events::CALENDAR_SYNC_PROGRESS,
            &serde_json::json!({
                "calendarId": calendar_id,
                "progress": progress,
                "message": message,
                "timestamp": now(),
            }),
        )
        .await
    }

    pub async fn notify_calendar_sync_completed(
        &self,
        user_id: Uuid,
        calendar_id: &str,
        events_count: usize,
    ) {
        self.trigger(
            &channels::calendar_sync(user_id),
            events::CALENDAR_SYNC_COMPLETED,
            &serde_json::json!({
                "calendarId": calendar_id,
                "eventsCount": events_count,
                "timestamp": now(),
            }),
        )
        .await
    }

    pub async fn notify_calendar_sync_failed(&self, user_id: Uuid, calendar_id: &str, error: &str) {
        self.trigger(
            &channels::calendar_sync(user_id),
            events::CALENDAR_SYNC_FAILED,
            &serde_json::json!({ "calendarId": calendar_id, "error": error, "timestamp": now() }),
        )
        .await
    }

    pub async fn notify_task_created(&self, user_id: Uuid, task: &serde_json::Value) {
        self.trigger(
            &channels::task_updates(user_id),
            events::TASK_CREATED,
            &serde_json::json!({ "task": task, "timestamp": now() }),
        )
        .await
    }

    pub async fn notify_task_updated(&self, user_id: Uuid, task: &serde_json::Value) {
        self.trigger(
            &channels::task_updates(user_id),
            events::TASK_UPDATED,
            &serde_json::json!({ "task": task, "timestamp": now() }),
        )
        .await
    }

    pub async fn notify_schedule_generation_started(&self, user_id: Uuid) {
        self.trigger(
            &channels::schedule_generation(user_id),
            events::SCHEDULE_GENERATION_STARTED,
            &serde_json::json!({ "timestamp": now() }),
        )
        .await
    }

    pub async fn notify_schedule_generation_completed(
        &self,
        user_id: Uuid,
        schedule: &serde_json::Value,
    ) {
        self.trigger(
            &channels::schedule_generation(user_id),
            events::SCHEDULE_GENERATION_COMPLETED,
            &serde_json::json!({ "schedule": schedule, "timestamp": now() }),
        )
        .await
    }

    async fn try_trigger<T: Serialize + ?Sized>(
        &self,
        channels: &[&str],
        event: &str,
        data: &T,
    ) -> Result<(), RealtimeError> {
        let client = self.client.as_ref().ok_or(RealtimeError::NotConfigured)?;
        let payload = serde_json::to_string(&RealtimeMessage {
            event: event.to_string(),
            data: serde_json::to_value(data)?,
            timestamp: now(),
        })?;

        let mut conn = client.get_connection();
        if let [channel] = channels {
            conn.publish::<_, _, ()>(format!("{}{}", REDIS_CHANNEL_PREFIX, channel), payload)
                .await?;
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for channel in channels {
            pipe.publish(format!("{}{}", REDIS_CHANNEL_PREFIX, channel), &payload)
                .ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RealtimeClient {
        RealtimeClient::new(
            None,
            Some(RealtimeCredentials {
                app_key: "app-key".to_string(),
                app_secret: "app-secret".to_string(),
            }),
        )
    }

    #[test]
    fn test_channel_names() {
        let id = Uuid::nil();
        assert_eq!(
            channels::user_private(id),
            "private-user-00000000-0000-0000-0000-000000000000"
        );
        assert!(channels::schedule_generation(id).starts_with("private-schedule-"));
        assert!(channels::calendar_sync(id).starts_with("private-calendar-sync-"));
    }

    #[test]
    fn test_authenticate_own_user_channel() {
        let user_id = Uuid::new_v4();
        let auth = client()
            .authenticate_channel("123.456", &channels::user_private(user_id), user_id)
            .unwrap();

        let mut mac = Hmac::<Sha256>::new_from_slice(b"app-secret").unwrap();
        mac.update(format!("123.456:private-user-{}", user_id).as_bytes());
        let expected = format!("app-key:{}", hex::encode(mac.finalize().into_bytes()));

        assert_eq!(auth.auth, expected);
    }

    #[test]
    fn test_reject_other_users_channel() {
        let result = client().authenticate_channel(
            "123.456",
            &channels::user_private(Uuid::new_v4()),
            Uuid::new_v4(),
        );
        assert!(matches!(result, Err(RealtimeError::UnauthorizedChannel)));
    }

    #[test]
    fn test_workspace_channel_needs_credentials() {
        let result = RealtimeClient::disabled().authenticate_channel(
            "1.2",
            &channels::workspace(Uuid::new_v4()),
            Uuid::new_v4(),
        );
        assert!(matches!(result, Err(RealtimeError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_disabled_trigger_is_silent() {
        let realtime = RealtimeClient::disabled();
        let user_id = Uuid::new_v4();
        realtime.notify_calendar_sync_started(user_id, "primary").await;
        realtime
            .notify_calendar_sync_progress(user_id, "primary", 50, "Halfway")
            .await;
        realtime
            .notify_calendar_sync_failed(user_id, "primary", "token expired")
            .await;
        realtime
            .notify_task_created(user_id, &serde_json::json!({ "id": "t1" }))
            .await;
        realtime
            .notify_task_updated(user_id, &serde_json::json!({ "id": "t1" }))
            .await;
        realtime
            .trigger_batch(&["a", "b"], events::USER_ONLINE, &serde_json::json!({}))
            .await;
        assert!(realtime.test_connection().await.is_err());
    }
}
