/// Job queue reader
///
/// Consumes the `jobs:events` Redis stream through the `workers` consumer
/// group. Entries stay pending until acknowledged, so a crashed worker's
/// jobs are redelivered when it restarts under the same consumer name.
///
/// # Reading
///
/// - `>` reads entries never delivered to any consumer in the group
/// - `0` re-reads this consumer's delivered but unacknowledged entries
///
/// # Example
///
/// ```no_run
/// use calendar_agent_worker::queue::{JobQueue, NEW_ENTRIES};
/// use calendar_agent_shared::redis::{RedisClient, RedisConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RedisClient::new(RedisConfig::from_url("redis://localhost:6379")).await?;
/// let queue = JobQueue::new(client, "worker-1");
/// queue.ensure_group().await?;
///
/// for job in queue.read(NEW_ENTRIES, 10, 5_000).await? {
///     println!("Received {}", job.entry_id);
///     queue.ack(&job.entry_id).await?;
/// }
/// # Ok(())
/// # }
/// ```

use calendar_agent_shared::infra::{JobEvent, JobQueueError, JOB_STREAM};
use calendar_agent_shared::redis::RedisClient;
use redis::{
    streams::{StreamReadOptions, StreamReadReply},
    AsyncCommands, Value as RedisValue,
};
use std::collections::HashMap;
use thiserror::Error;

/// Consumer group shared by every worker
pub const CONSUMER_GROUP: &str = "workers";

/// Read position for entries never delivered to the group
pub const NEW_ENTRIES: &str = ">";

/// Read position for this consumer's unacknowledged entries
pub const PENDING_ENTRIES: &str = "0";

/// Job queue error
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// One delivered stream entry
#[derive(Debug)]
pub struct QueuedJob {
    pub entry_id: String,

    /// Decoded event, or why the entry could not be decoded
    pub event: Result<JobEvent, JobQueueError>,
}

/// Consumer side of the job stream
#[derive(Clone)]
pub struct JobQueue {
    client: RedisClient,
    consumer: String,
}

impl JobQueue {
    pub fn new(client: RedisClient, consumer: impl Into<String>) -> Self {
        JobQueue {
            client,
            consumer: consumer.into(),
        }
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Creates the consumer group (and the stream) if missing
    pub async fn ensure_group(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_connection();

        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(JOB_STREAM, CONSUMER_GROUP, "0")
            .await;

        match created {
            Ok(()) => {
                tracing::info!(stream = JOB_STREAM, group = CONSUMER_GROUP, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads up to `count` entries, blocking up to `block_ms` for new ones
    pub async fn read(
        &self,
        position: &str,
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<QueuedJob>, QueueError> {
        let mut conn = self.client.get_connection();

        let mut opts = StreamReadOptions::default()
            .group(CONSUMER_GROUP, &self.consumer)
            .count(count);
        if position == NEW_ENTRIES {
            opts = opts.block(block_ms);
        }

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[JOB_STREAM], &[position], &opts)
            .await?;

        let jobs: Vec<QueuedJob> = reply
            .map(|reply| reply.keys)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|key| key.ids)
            .map(|entry| parse_entry(entry.id, entry.map))
            .collect();

        if !jobs.is_empty() {
            tracing::debug!(
                consumer = %self.consumer,
                position = position,
                count = jobs.len(),
                "Read jobs"
            );
        }

        Ok(jobs)
    }

    /// Acknowledges an entry so it is never redelivered
    pub async fn ack(&self, entry_id: &str) -> Result<(), QueueError> {
        let mut conn = self.client.get_connection();
        let _: i64 = conn.xack(JOB_STREAM, CONSUMER_GROUP, &[entry_id]).await?;
        Ok(())
    }
}

/// Decodes the fields of one stream entry
pub fn parse_entry(entry_id: String, map: HashMap<String, RedisValue>) -> QueuedJob {
    let fields: HashMap<String, String> = map
        .into_iter()
        .filter_map(|(k, v)| {
            let value = redis::from_redis_value::<String>(&v).ok()?;
            Some((k, value))
        })
        .collect();

    QueuedJob {
        entry_id,
        event: JobEvent::from_fields(&fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> RedisValue {
        RedisValue::Data(s.as_bytes().to_vec())
    }

    #[test]
    fn test_parse_entry() {
        let map = HashMap::from([
            ("name".to_string(), bulk("email/send.requested")),
            (
                "data".to_string(),
                bulk(r#"{"to":"ada@example.com","subject":"Hi","template":"welcome","data":{}}"#),
            ),
            ("ts".to_string(), bulk("1700000000000")),
        ]);

        let job = parse_entry("1-0".to_string(), map);
        assert_eq!(job.entry_id, "1-0");
        assert_eq!(job.event.unwrap().name(), JobEvent::EMAIL_SEND_REQUESTED);
    }

    #[test]
    fn test_parse_entry_unknown_event() {
        let map = HashMap::from([
            ("name".to_string(), bulk("billing/charge.requested")),
            ("data".to_string(), bulk("{}")),
        ]);

        assert!(parse_entry("2-0".to_string(), map).event.is_err());
    }

    #[test]
    fn test_parse_entry_missing_data() {
        let map = HashMap::from([("name".to_string(), bulk("email/send.requested"))]);
        assert!(matches!(
            parse_entry("3-0".to_string(), map).event,
            Err(JobQueueError::Malformed(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_group_read_and_ack() {
        use calendar_agent_shared::infra::JobClient;
        use calendar_agent_shared::redis::RedisConfig;

        let client = RedisClient::new(RedisConfig::from_url("redis://localhost:6379")).await.unwrap();
        let queue = JobQueue::new(client.clone(), format!("test-{}", uuid::Uuid::new_v4()));
        queue.ensure_group().await.unwrap();
        queue.ensure_group().await.unwrap();

        JobClient::new(client)
            .schedule_email("ada@example.com", "Hi", "welcome", serde_json::json!({}))
            .await
            .unwrap();

        let jobs = queue.read(NEW_ENTRIES, 100, 1_000).await.unwrap();
        assert!(!jobs.is_empty());
        for job in &jobs {
            queue.ack(&job.entry_id).await.unwrap();
        }

        let pending = queue.read(PENDING_ENTRIES, 100, 0).await.unwrap();
        assert!(pending.is_empty());
    }
}
