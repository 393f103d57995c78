//! Schedules partition reads as the partition tree is discovered.
//!
//! Every partition is read by its own task. When a partition has been fully
//! read, each child it announced is checked against the state table and
//! spawned once all of its parents are finished. A child announced by several
//! parents is checked by each of them as they finish, and only the check
//! following the last parent succeeds. This relies on every parent eventually
//! finishing, which holds since any failure cancels the whole read.
//!
//! The number of concurrent tasks is not bounded. It follows the number of
//! partitions the source splits the stream into.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::consumer::Consumer;
use crate::errors::{ChangeStreamError, Result};
use crate::reader::PartitionReader;
use crate::records::ROOT_PARTITION_TOKEN;
use crate::state::PartitionStateTable;

/// A partition that can be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRead {
    pub token: String,
    pub start_timestamp: DateTime<Utc>,
}

impl PendingRead {
    pub fn root(start_timestamp: DateTime<Utc>) -> Self {
        PendingRead {
            token: ROOT_PARTITION_TOKEN.to_string(),
            start_timestamp,
        }
    }
}

type ReadTasks = JoinSet<Result<Vec<PendingRead>>>;

pub struct Scheduler {
    reader: PartitionReader,
    states: Arc<PartitionStateTable>,
    consumer: Arc<dyn Consumer>,
    /// Cancelled on the first failure. Every read observes this.
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        reader: PartitionReader,
        states: Arc<PartitionStateTable>,
        consumer: Arc<dyn Consumer>,
        cancel: CancellationToken,
    ) -> Self {
        Scheduler {
            reader,
            states,
            consumer,
            cancel,
        }
    }

    /// Read the root partition and, transitively, every partition discovered
    /// from it.
    ///
    /// Returns once all reads have completed, or with the first error
    /// encountered after waiting for the remaining reads to stop.
    pub async fn run(self, root_start: DateTime<Utc>) -> Result<()> {
        let scheduler = Arc::new(self);
        let mut tasks = ReadTasks::new();
        scheduler.spawn(&mut tasks, PendingRead::root(root_start));

        let mut first_error: Option<ChangeStreamError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(ChangeStreamError::from).and_then(|r| r) {
                Ok(ready) => {
                    if first_error.is_some() {
                        continue;
                    }
                    for pending in ready {
                        scheduler.spawn(&mut tasks, pending);
                    }
                }
                Err(err) => match first_error {
                    None => {
                        warn!(%err, "partition read failed, cancelling remaining reads");
                        scheduler.cancel.cancel();
                        first_error = Some(err);
                    }
                    Some(_) => debug!(%err, "partition read stopped after cancellation"),
                },
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn spawn(self: &Arc<Self>, tasks: &mut ReadTasks, pending: PendingRead) {
        let scheduler = self.clone();
        tasks.spawn(async move { scheduler.start_read(pending).await });
    }

    /// Read a single partition, returning the children that became readable
    /// once it finished.
    async fn start_read(&self, pending: PendingRead) -> Result<Vec<PendingRead>> {
        if self.cancel.is_cancelled() {
            return Err(ChangeStreamError::Cancelled);
        }

        let PendingRead {
            token,
            start_timestamp,
        } = pending;

        if !self.states.try_mark_reading(&token) {
            debug!(%token, "partition already claimed by another parent");
            return Ok(Vec::new());
        }

        debug!(%token, %start_timestamp, "reading partition");
        let records = self
            .reader
            .drain(&token, start_timestamp, self.consumer.as_ref(), &self.cancel)
            .await?;
        self.states.mark_finished(&token);

        let mut ready = Vec::new();
        for record in records {
            for child in record.child_partitions {
                if self.states.can_start(&child.parent_partition_tokens) {
                    trace!(parent = %token, child = %child.token, "child partition ready");
                    ready.push(PendingRead {
                        token: child.token,
                        start_timestamp: record.start_timestamp,
                    });
                } else {
                    trace!(
                        parent = %token,
                        child = %child.token,
                        "child partition waiting on other parents"
                    );
                }
            }
        }

        Ok(ready)
    }
}
