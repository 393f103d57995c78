use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::consumer::Consumer;
use crate::errors::{ChangeStreamError, Result, config_err};
use crate::query::PartitionQuery;
use crate::reader::{PartitionReader, ReadOptions};
use crate::scheduler::Scheduler;
use crate::state::PartitionStateTable;

/// Heartbeat interval used when none is configured.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for the subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// If not set, the subscriber reads from the time `subscribe` is called.
    pub start_timestamp: Option<DateTime<Utc>>,
    /// If not set, the subscriber reads until it is cancelled.
    pub end_timestamp: Option<DateTime<Utc>>,
    /// Interval at which the source emits heartbeat records for idle
    /// partitions. Zero uses [`DEFAULT_HEARTBEAT_INTERVAL`].
    pub heartbeat_interval: Duration,
    /// Database role for fine-grained access control.
    pub database_role: Option<String>,
}

/// Reads every partition of a change stream.
///
/// A subscriber can only be subscribed once.
pub struct Subscriber {
    reader: PartitionReader,
    heartbeat_interval: Duration,
    start_timestamp: Option<DateTime<Utc>>,
    subscribed: AtomicBool,
}

impl Subscriber {
    /// Create a subscriber with the default configuration.
    pub fn new(query: Arc<dyn PartitionQuery>, stream_id: impl Into<String>) -> Result<Self> {
        Self::with_config(query, stream_id, Config::default())
    }

    /// Create a subscriber, validating the configuration.
    pub fn with_config(
        query: Arc<dyn PartitionQuery>,
        stream_id: impl Into<String>,
        config: Config,
    ) -> Result<Self> {
        let stream_id = stream_id.into();
        validate_stream_id(&stream_id)?;

        if let (Some(start), Some(end)) = (config.start_timestamp, config.end_timestamp)
            && end < start
        {
            return Err(config_err!(
                "end timestamp {end} is before start timestamp {start}"
            ));
        }

        let heartbeat_interval = if config.heartbeat_interval.is_zero() {
            DEFAULT_HEARTBEAT_INTERVAL
        } else {
            config.heartbeat_interval
        };
        if heartbeat_interval < Duration::from_millis(1) {
            return Err(config_err!(
                "heartbeat interval must be at least one millisecond, got {heartbeat_interval:?}"
            ));
        }
        let heartbeat_millis = i64::try_from(heartbeat_interval.as_millis()).map_err(|_| {
            config_err!("heartbeat interval {heartbeat_interval:?} is too large")
        })?;

        let options = ReadOptions {
            stream_id,
            end_timestamp: config.end_timestamp,
            heartbeat_millis,
            database_role: config.database_role,
        };

        Ok(Subscriber {
            reader: PartitionReader::new(query, options),
            heartbeat_interval,
            start_timestamp: config.start_timestamp,
            subscribed: AtomicBool::new(false),
        })
    }

    pub fn stream_id(&self) -> &str {
        &self.reader.options().stream_id
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Start reading the change stream.
    ///
    /// Blocks until every partition has been read up to the end timestamp, the
    /// consumer returns an error, a partition read fails, or `cancel` is
    /// cancelled. The first error encountered is returned.
    ///
    /// Must only be called once.
    pub async fn subscribe(
        &self,
        consumer: Arc<dyn Consumer>,
        cancel: CancellationToken,
    ) -> Result<()> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(ChangeStreamError::AlreadySubscribed);
        }

        let start = self.start_timestamp.unwrap_or_else(Utc::now);
        let options = self.reader.options();
        info!(
            stream_id = %options.stream_id,
            %start,
            end = ?options.end_timestamp,
            heartbeat = ?self.heartbeat_interval,
            "subscribing to change stream"
        );

        let scheduler = Scheduler::new(
            self.reader.clone(),
            Arc::new(PartitionStateTable::new()),
            consumer,
            cancel.child_token(),
        );

        match scheduler.run(start).await {
            Ok(()) => {
                info!(stream_id = %options.stream_id, "change stream read completed");
                Ok(())
            }
            Err(err) => {
                warn!(stream_id = %options.stream_id, %err, "change stream read failed");
                Err(err)
            }
        }
    }
}

/// Stream ids are interpolated into the query, so only plain identifiers are
/// accepted.
fn validate_stream_id(stream_id: &str) -> Result<()> {
    let mut chars = stream_id.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid || stream_id.len() > 128 {
        return Err(config_err!("invalid change stream id: '{stream_id}'"));
    }
    Ok(())
}
