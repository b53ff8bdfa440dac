/// Transactional email
///
/// Validates the recipient, renders the named template and hands the
/// message to delivery. No email provider is configured yet, so delivery
/// is logged with a generated message ID.

use super::{unexpected, JobContext, JobError, JobFunction, JobResult, StepContext};
use async_trait::async_trait;
use calendar_agent_shared::{html::escape, infra::JobEvent};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;
use validator::ValidateEmail;

pub struct EmailSend;

/// Recipient check, as strict as the address validation on request bodies
pub fn is_deliverable_address(address: &str) -> bool {
    address.validate_email()
}

/// Renders a template into an HTML body
pub fn render_template(template: &str, subject: &str, data: &JsonValue) -> String {
    let rows: String = match data.as_object() {
        Some(fields) => fields
            .iter()
            .map(|(key, value)| {
                let value = value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                format!(
                    "<tr><th>{}</th><td>{}</td></tr>",
                    escape(key),
                    escape(&value)
                )
            })
            .collect(),
        None => String::new(),
    };

    format!(
        "<html><body data-template=\"{}\"><h1>{}</h1><table>{}</table></body></html>",
        escape(template),
        escape(subject),
        rows
    )
}

#[async_trait]
impl JobFunction for EmailSend {
    fn id(&self) -> &'static str {
        "email-send"
    }

    fn event(&self) -> &'static str {
        JobEvent::EMAIL_SEND_REQUESTED
    }

    fn retries(&self) -> u32 {
        3
    }

    async fn run(
        &self,
        step: &StepContext,
        _ctx: &JobContext,
        event: &JobEvent,
    ) -> JobResult<JsonValue> {
        let JobEvent::EmailSendRequested(data) = event else {
            return Err(unexpected(self.id(), event));
        };

        step.run("validate-email", || async move {
            if is_deliverable_address(&data.to) {
                Ok(())
            } else {
                Err(JobError::NonRetriable(format!(
                    "Invalid email address: {}",
                    data.to
                )))
            }
        })
        .await?;

        let html = step
            .run("render-template", || async move {
                Ok(render_template(&data.template, &data.subject, &data.data))
            })
            .await?;

        let message_id = step
            .run("send", || async move {
                let message_id = Uuid::new_v4().to_string();
                tracing::info!(
                    template = %data.template,
                    bytes = html.len(),
                    message_id = %message_id,
                    "Email handed to delivery"
                );
                Ok(message_id)
            })
            .await?;

        Ok(json!({
            "success": true,
            "to": data.to,
            "subject": data.subject,
            "messageId": message_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calendar_agent_shared::infra::jobs::EmailSendRequested;

    fn email_event(to: &str) -> JobEvent {
        JobEvent::EmailSendRequested(EmailSendRequested {
            to: to.to_string(),
            subject: "Confirm your account deletion".to_string(),
            template: "account-deletion".to_string(),
            data: json!({ "name": "Ada", "confirmationToken": "abc" }),
        })
    }

    #[test]
    fn test_deliverable_address() {
        assert!(is_deliverable_address("ada@example.com"));
        assert!(is_deliverable_address("a.b+c@mail.example.co"));

        for address in [
            "@example.com",
            "ada@@example.com",
            "ada @example.com",
            "ada@example.",
            "<script>@example.com",
            "a,b@example.com",
            "ada@exa_mple.com",
        ] {
            assert!(!is_deliverable_address(address), "{}", address);
        }
    }

    #[tokio::test]
    async fn test_markup_recipient_is_rejected() {
        let err = EmailSend
            .run(
                &StepContext::new("email-send", "1-0", 1),
                &JobContext::default(),
                &email_event("<script>@example.com"),
            )
            .await
            .unwrap_err();

        assert!(!err.is_retriable());
    }

    #[test]
    fn test_render_escapes_values() {
        let html = render_template("welcome", "Hi <there>", &json!({ "name": "<b>O'Hara</b>" }));
        assert!(html.contains("Hi &lt;there&gt;"));
        assert!(html.contains("&lt;b&gt;O&#39;Hara&lt;/b&gt;"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_not_retried() {
        let err = EmailSend
            .run(
                &StepContext::new("email-send", "1-0", 1),
                &JobContext::default(),
                &email_event("not-an-email"),
            )
            .await
            .unwrap_err();

        assert!(!err.is_retriable());
        assert!(err.to_string().contains("not-an-email"));
    }

    #[tokio::test]
    async fn test_send_returns_message_id() {
        let output = EmailSend
            .run(
                &StepContext::new("email-send", "1-0", 1),
                &JobContext::default(),
                &email_event("ada@example.com"),
            )
            .await
            .unwrap();

        assert_eq!(output["to"], "ada@example.com");
        assert!(output["messageId"].is_string());
    }
}
