/// Worker orchestrator
///
/// This module implements the main worker loop. It reads job events from
/// the queue, dispatches each to the function registered for its event
/// name, retries retriable failures with exponential backoff and
/// acknowledges entries once they are finished with.
///
/// # Architecture
///
/// ```text
/// Orchestrator
///   ├─> JobQueue: Recover pending entries, then read new ones
///   ├─> Function registry: Look up the function for each event
///   ├─> JobFunction: Run attempts until success or the retry budget runs out
///   └─> JobQueue: Acknowledge the entry
/// ```
///
/// # Acknowledgement
///
/// An entry is acknowledged after success, a non-retriable failure, an
/// exhausted retry budget, or when it cannot be decoded or has no
/// registered function. Entries interrupted by shutdown are left pending
/// and redelivered on the next start.
///
/// # Example
///
/// ```no_run
/// use calendar_agent_worker::orchestrator::{OrchestratorConfig, WorkerOrchestrator};
/// use calendar_agent_worker::functions::JobContext;
/// use calendar_agent_worker::queue::JobQueue;
/// use calendar_agent_shared::redis::{RedisClient, RedisConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RedisClient::new(RedisConfig::from_url("redis://localhost:6379")).await?;
/// let queue = JobQueue::new(client, "worker-1");
///
/// let orchestrator =
///     WorkerOrchestrator::new(queue, JobContext::default(), OrchestratorConfig::default());
/// orchestrator.run().await?;
/// # Ok(())
/// # }
/// ```

use crate::functions::{registry, JobContext, JobError, JobFunction, StepContext};
use crate::queue::{JobQueue, QueuedJob, NEW_ENTRIES, PENDING_ENTRIES};
use calendar_agent_shared::infra::JobEvent;
use futures::future::join_all;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

/// Worker orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How long one read blocks waiting for new entries
    pub block_ms: usize,

    /// Maximum entries read (and run concurrently) per batch
    pub batch_size: usize,

    /// Delay before the first retry; doubles on each further retry
    pub base_backoff: Duration,

    /// Pause after a failed queue read
    pub error_backoff: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            block_ms: 5_000,
            batch_size: 10,
            base_backoff: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// How a job ended
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded { attempts: u32, output: JsonValue },

    /// Retry budget exhausted on retriable errors
    Failed { attempts: u32, error: JobError },

    /// Non-retriable error; no further attempts
    Rejected { attempts: u32, error: JobError },

    /// Shutdown interrupted the job
    Cancelled { attempts: u32 },
}

impl JobOutcome {
    /// Whether the queue entry should be acknowledged
    pub fn is_final(&self) -> bool {
        !matches!(self, JobOutcome::Cancelled { .. })
    }
}

/// Delay before retry number `retry` (1-based)
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
}

/// Runs a function until it succeeds, is rejected, or exhausts its retries
///
/// A function with `retries() == n` gets at most `n + 1` attempts.
pub async fn run_with_retries(
    function: &dyn JobFunction,
    ctx: &JobContext,
    event: &JobEvent,
    entry_id: &str,
    base_backoff: Duration,
    shutdown: &CancellationToken,
) -> JobOutcome {
    let max_attempts = function.retries() + 1;
    let mut attempt = 1;

    loop {
        let step = StepContext::new(function.id(), entry_id, attempt);

        let result = tokio::select! {
            _ = shutdown.cancelled() => return JobOutcome::Cancelled { attempts: attempt },
            result = function.run(&step, ctx, event) => result,
        };

        let error = match result {
            Ok(output) => {
                return JobOutcome::Succeeded {
                    attempts: attempt,
                    output,
                }
            }
            Err(error) => error,
        };

        if !error.is_retriable() {
            return JobOutcome::Rejected {
                attempts: attempt,
                error,
            };
        }

        if attempt >= max_attempts {
            return JobOutcome::Failed {
                attempts: attempt,
                error,
            };
        }

        let delay = backoff_delay(base_backoff, attempt);
        tracing::warn!(
            function = function.id(),
            entry_id = %entry_id,
            attempt = attempt,
            retry_in_ms = delay.as_millis() as u64,
            error = %error,
            "Job attempt failed, retrying"
        );

        tokio::select! {
            _ = shutdown.cancelled() => return JobOutcome::Cancelled { attempts: attempt },
            _ = sleep(delay) => {}
        }

        attempt += 1;
    }
}

/// Worker orchestrator
///
/// Reads jobs from the queue and runs them through the function registry.
pub struct WorkerOrchestrator {
    /// Job queue
    queue: JobQueue,

    /// Functions keyed by the event name they consume
    functions: HashMap<&'static str, Arc<dyn JobFunction>>,

    /// Services handed to functions
    ctx: JobContext,

    /// Configuration
    config: OrchestratorConfig,

    /// Shutdown token
    shutdown_token: CancellationToken,
}

impl WorkerOrchestrator {
    /// Creates an orchestrator with every built-in function registered
    pub fn new(queue: JobQueue, ctx: JobContext, config: OrchestratorConfig) -> Self {
        let functions = registry()
            .into_iter()
            .map(|function| (function.event(), function))
            .collect();

        WorkerOrchestrator {
            queue,
            functions,
            ctx,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Registers a function, replacing any function for the same event
    pub fn register_function(&mut self, function: Arc<dyn JobFunction>) {
        tracing::info!(function = function.id(), event = function.event(), "Registering function");
        self.functions.insert(function.event(), function);
    }

    /// Gets shutdown token
    ///
    /// Used to signal graceful shutdown from external handlers.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs the worker loop until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the consumer group cannot be created
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            consumer = %self.queue.consumer(),
            functions = self.functions.len(),
            "Worker orchestrator starting"
        );

        self.queue.ensure_group().await?;

        // Entries delivered to this consumer before a restart
        loop {
            let pending = match self
                .queue
                .read(PENDING_ENTRIES, self.config.batch_size, 0)
                .await
            {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read pending jobs");
                    break;
                }
            };

            if pending.is_empty() || self.shutdown_token.is_cancelled() {
                break;
            }

            tracing::info!(count = pending.len(), "Recovering pending jobs");
            self.process_batch(pending).await;
        }

        loop {
            let read = tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                read = self.queue.read(NEW_ENTRIES, self.config.batch_size, self.config.block_ms) => read,
            };

            match read {
                Ok(jobs) => self.process_batch(jobs).await,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read jobs");
                    tokio::select! {
                        _ = self.shutdown_token.cancelled() => break,
                        _ = sleep(self.config.error_backoff) => {}
                    }
                }
            }
        }

        tracing::info!("Worker orchestrator shut down");
        Ok(())
    }

    async fn process_batch(&self, jobs: Vec<QueuedJob>) {
        join_all(jobs.into_iter().map(|job| self.process_job(job))).await;
    }

    async fn process_job(&self, job: QueuedJob) {
        let entry_id = job.entry_id;

        let finished = match job.event {
            Err(e) => {
                tracing::error!(entry_id = %entry_id, error = %e, "Dropping malformed job entry");
                true
            }
            Ok(event) => match self.functions.get(event.name()) {
                None => {
                    tracing::error!(
                        entry_id = %entry_id,
                        event = event.name(),
                        "No function registered for event"
                    );
                    true
                }
                Some(function) => {
                    let outcome = run_with_retries(
                        function.as_ref(),
                        &self.ctx,
                        &event,
                        &entry_id,
                        self.config.base_backoff,
                        &self.shutdown_token,
                    )
                    .await;
                    log_outcome(function.id(), &entry_id, &outcome);
                    outcome.is_final()
                }
            },
        };

        if finished {
            if let Err(e) = self.queue.ack(&entry_id).await {
                tracing::error!(entry_id = %entry_id, error = %e, "Failed to acknowledge job");
            }
        }
    }
}

fn log_outcome(function: &str, entry_id: &str, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Succeeded { attempts, .. } => {
            tracing::info!(function = function, entry_id = %entry_id, attempts = attempts, "Job succeeded")
        }
        JobOutcome::Failed { attempts, error } => tracing::error!(
            function = function,
            entry_id = %entry_id,
            attempts = attempts,
            error = %error,
            "Job failed after exhausting retries"
        ),
        JobOutcome::Rejected { attempts, error } => tracing::error!(
            function = function,
            entry_id = %entry_id,
            attempts = attempts,
            error = %error,
            "Job rejected"
        ),
        JobOutcome::Cancelled { attempts } => {
            tracing::info!(function = function, entry_id = %entry_id, attempts = attempts, "Job interrupted by shutdown")
        }
    }
}
