/// In-app notifications
///
/// Publishes `notification.new` on the user's private channel.

use super::{unexpected, JobContext, JobFunction, JobResult, StepContext};
use async_trait::async_trait;
use calendar_agent_shared::infra::{
    realtime::{channels, events},
    JobEvent,
};
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

pub struct NotificationSend;

/// Realtime payload for a notification
pub fn notification_payload(
    id: Uuid,
    notification_type: &str,
    title: &str,
    message: &str,
    link: Option<&str>,
) -> JsonValue {
    json!({
        "id": id,
        "type": notification_type,
        "title": title,
        "message": message,
        "link": link,
        "read": false,
        "createdAt": Utc::now().to_rfc3339(),
    })
}

#[async_trait]
impl JobFunction for NotificationSend {
    fn id(&self) -> &'static str {
        "notification-send"
    }

    fn event(&self) -> &'static str {
        JobEvent::NOTIFICATION_SEND_REQUESTED
    }

    fn retries(&self) -> u32 {
        3
    }

    async fn run(
        &self,
        step: &StepContext,
        ctx: &JobContext,
        event: &JobEvent,
    ) -> JobResult<JsonValue> {
        let JobEvent::NotificationSendRequested(data) = event else {
            return Err(unexpected(self.id(), event));
        };

        let notification_id = Uuid::new_v4();
        let payload = notification_payload(
            notification_id,
            &data.notification_type,
            &data.title,
            &data.message,
            data.link.as_deref(),
        );

        step.run("send-realtime", || async move {
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
            "notificationId": notification_id,
            "userId": data.user_id,
            "type": data.notification_type,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calendar_agent_shared::infra::jobs::NotificationSendRequested;

    #[test]
    fn test_payload_shape() {
        let id = Uuid::new_v4();
        let payload = notification_payload(id, "info", "Hello", "World", None);
        assert_eq!(payload["id"], id.to_string());
        assert_eq!(payload["type"], "info");
        assert_eq!(payload["read"], false);
        assert!(payload["link"].is_null());
    }

    #[tokio::test]
    async fn test_send_without_realtime_still_succeeds() {
        let user_id = Uuid::new_v4();
        let event = JobEvent::NotificationSendRequested(NotificationSendRequested {
            user_id,
            notification_type: "calendar".to_string(),
            title: "Sync finished".to_string(),
            message: "Your calendar is up to date".to_string(),
            link: Some("/calendar".to_string()),
        });

        let output = NotificationSend
            .run(
                &StepContext::new("notification-send", "1-0", 1),
                &JobContext::default(),
                &event,
            )
            .await
            .unwrap();

        assert_eq!(output["userId"], user_id.to_string());
        assert_eq!(output["type"], "calendar");
    }
}
