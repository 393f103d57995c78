use std::sync::Arc;

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::consumer::Consumer;
use crate::errors::{ChangeStreamError, Result};
use crate::query::{PartitionQuery, Statement};
use crate::records::{ChildPartitionsRecord, ReadResult};

/// Decoded results of a single partition, in the order the source produced
/// them.
pub type ReadResultStream = BoxStream<'static, Result<ReadResult>>;

/// Settings shared by every partition read of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    pub stream_id: String,
    /// Read until cancelled if not set.
    pub end_timestamp: Option<DateTime<Utc>>,
    /// Heartbeat interval bound to every statement, in milliseconds.
    pub heartbeat_millis: i64,
    pub database_role: Option<String>,
}

/// Reads individual partitions of a change stream.
#[derive(Clone)]
pub struct PartitionReader {
    query: Arc<dyn PartitionQuery>,
    options: Arc<ReadOptions>,
}

impl PartitionReader {
    pub fn new(query: Arc<dyn PartitionQuery>, options: ReadOptions) -> Self {
        PartitionReader {
            query,
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// Build the statement for reading a partition from `start_timestamp`.
    pub fn statement(&self, partition_token: &str, start_timestamp: DateTime<Utc>) -> Statement {
        Statement::read_partition(
            &self.options.stream_id,
            partition_token,
            start_timestamp,
            self.options.end_timestamp,
            self.options.heartbeat_millis,
        )
        .with_database_role(self.options.database_role.clone())
    }

    /// Lazily read a partition.
    ///
    /// Nothing is executed until the stream is first polled. The stream ends
    /// once the source reaches the end of the partition, and ends right after
    /// yielding the first error.
    pub fn read(&self, partition_token: &str, start_timestamp: DateTime<Utc>) -> ReadResultStream {
        let statement = self.statement(partition_token, start_timestamp);
        let query = self.query.clone();
        let token = partition_token.to_string();

        Box::pin(stream! {
            let mut rows = match query.execute(statement).await {
                Ok(rows) => rows,
                Err(e) => {
                    yield Err(ChangeStreamError::query(token.clone(), e));
                    return;
                }
            };

            while let Some(row) = rows.next().await {
                let row = match row {
                    Ok(row) => row,
                    Err(e) => {
                        yield Err(ChangeStreamError::query(token.clone(), e));
                        return;
                    }
                };
                match row.decode::<ReadResult>() {
                    Ok(mut result) => {
                        result.partition_token = token.clone();
                        yield Ok(result);
                    }
                    Err(e) => {
                        yield Err(ChangeStreamError::from(e));
                        return;
                    }
                }
            }
        })
    }

    /// Read a partition to completion, handing every result to the consumer.
    ///
    /// Returns the child partitions records found in the partition. Stops at
    /// the first consumer or source error without reading any further rows.
    pub async fn drain(
        &self,
        partition_token: &str,
        start_timestamp: DateTime<Utc>,
        consumer: &dyn Consumer,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChildPartitionsRecord>> {
        let mut results = self.read(partition_token, start_timestamp);
        let mut children = Vec::new();
        let mut num_results = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChangeStreamError::Cancelled),
                next = results.next() => next,
            };
            let result = match next {
                Some(result) => result?,
                None => break,
            };
            num_results += 1;
            trace!(token = %partition_token, records = result.change_records.len(), "read result");

            children.extend(result.child_partitions_records().cloned());

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChangeStreamError::Cancelled),
                consumed = consumer.consume(&result) => consumed?,
            }
        }

        debug!(
            token = %partition_token,
            results = num_results,
            children = children.len(),
            "partition drained"
        );

        Ok(children)
    }
}
