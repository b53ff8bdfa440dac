/// Background job functions
///
/// Each function handles one [`JobEvent`] kind and declares how many times
/// it may be retried after a failure.
///
/// # Architecture
///
/// Functions are the execution layer of the worker. Each function:
/// - Implements the `JobFunction` trait
/// - Runs its work as named steps through a `StepContext`
/// - Reports `JobError::Retriable` for transient failures and
///   `JobError::NonRetriable` for input that will never succeed
///
/// # Functions
///
/// | id                  | event                          | retries |
/// |---------------------|--------------------------------|---------|
/// | `calendar-sync`     | `calendar/sync.requested`      | 3       |
/// | `schedule-generate` | `schedule/generate.requested`  | 2       |
/// | `email-send`        | `email/send.requested`         | 3       |
/// | `notification-send` | `notification/send.requested`  | 3       |
/// | `task-reminder`     | `task/reminder.scheduled`      | 2       |
///
/// # Example
///
/// ```no_run
/// use calendar_agent_worker::functions::{registry, JobContext, StepContext};
/// use calendar_agent_shared::infra::JobEvent;
///
/// # async fn example(event: JobEvent) {
/// let ctx = JobContext::default();
/// for function in registry() {
///     if function.event() == event.name() {
///         let step = StepContext::new(function.id(), "1-0", 1);
///         let _ = function.run(&step, &ctx, &event).await;
///     }
/// }
/// # }
/// ```

pub mod calendar_sync;
pub mod email_send;
pub mod notification_send;
pub mod schedule_generate;
pub mod task_reminder;

use async_trait::async_trait;
use calendar_agent_shared::{
    infra::{Cache, JobEvent, RealtimeClient},
    repository::Repository,
};
use serde_json::Value as JsonValue;
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;

pub use calendar_sync::CalendarSync;
pub use email_send::EmailSend;
pub use notification_send::NotificationSend;
pub use schedule_generate::ScheduleGenerate;
pub use task_reminder::TaskReminder;

/// Job function error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Transient failure; the orchestrator retries with backoff
    #[error("{0}")]
    Retriable(String),

    /// Permanent failure; the job is dropped without further attempts
    #[error("{0}")]
    NonRetriable(String),
}

impl JobError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, JobError::Retriable(_))
    }
}

/// Job result type alias
pub type JobResult<T> = Result<T, JobError>;

/// Services available to every function
///
/// Adapters left at their defaults are disabled and drop their work.
#[derive(Clone, Default)]
pub struct JobContext {
    pub realtime: RealtimeClient,
    pub cache: Cache,
    pub repo: Option<Arc<dyn Repository>>,
}

/// Names and logs the steps of one attempt
#[derive(Debug, Clone)]
pub struct StepContext {
    function: &'static str,
    entry_id: String,
    attempt: u32,
}

impl StepContext {
    pub fn new(function: &'static str, entry_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            function,
            entry_id: entry_id.into(),
            attempt,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Runs one named step
    pub async fn run<T, F, Fut>(&self, name: &str, step: F) -> JobResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = JobResult<T>>,
    {
        let started = Instant::now();
        tracing::debug!(
            function = self.function,
            entry_id = %self.entry_id,
            attempt = self.attempt,
            step = name,
            "Step started"
        );

        let result = step().await;

        match &result {
            Ok(_) => tracing::debug!(
                function = self.function,
                entry_id = %self.entry_id,
                step = name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Step completed"
            ),
            Err(e) => tracing::warn!(
                function = self.function,
                entry_id = %self.entry_id,
                attempt = self.attempt,
                step = name,
                error = %e,
                "Step failed"
            ),
        }

        result
    }
}

/// A background job handler
#[async_trait]
pub trait JobFunction: Send + Sync {
    /// Stable identifier, e.g. `email-send`
    fn id(&self) -> &'static str;

    /// Event name this function consumes
    fn event(&self) -> &'static str;

    /// Retries after the first failed attempt
    fn retries(&self) -> u32;

    /// Runs one attempt and returns a JSON summary
    async fn run(&self, step: &StepContext, ctx: &JobContext, event: &JobEvent)
        -> JobResult<JsonValue>;
}

/// Every function the worker runs
pub fn registry() -> Vec<Arc<dyn JobFunction>> {
    vec![
        Arc::new(CalendarSync),
        Arc::new(ScheduleGenerate),
        Arc::new(EmailSend),
        Arc::new(NotificationSend),
        Arc::new(TaskReminder),
    ]
}

fn unexpected(function: &str, event: &JobEvent) -> JobError {
    JobError::NonRetriable(format!(
        "{} cannot handle event {}",
        function,
        event.name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_covers_every_event_once() {
        let events: HashSet<_> = registry().iter().map(|f| f.event()).collect();
        assert_eq!(events.len(), 5);
        assert!(events.contains(JobEvent::EMAIL_SEND_REQUESTED));
        assert!(events.contains(JobEvent::TASK_REMINDER_SCHEDULED));
    }

    #[test]
    fn test_retry_budgets() {
        let budgets: Vec<_> = registry().iter().map(|f| (f.id(), f.retries())).collect();
        assert!(budgets.contains(&("calendar-sync", 3)));
        assert!(budgets.contains(&("schedule-generate", 2)));
        assert!(budgets.contains(&("email-send", 3)));
        assert!(budgets.contains(&("notification-send", 3)));
        assert!(budgets.contains(&("task-reminder", 2)));
    }

    #[tokio::test]
    async fn test_step_passes_result_through() {
        let step = StepContext::new("test", "1-0", 1);
        let value = step.run("double", || async { Ok::<_, JobError>(21 * 2) }).await;
        assert_eq!(value, Ok(42));

        let failed: JobResult<()> = step
            .run("fail", || async { Err(JobError::NonRetriable("bad".to_string())) })
            .await;
        assert!(!failed.unwrap_err().is_retriable());
    }
}
