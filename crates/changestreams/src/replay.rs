//! Query source serving pre-recorded rows.
//!
//! Useful for exercising the scheduler without a live database, and for
//! replaying a captured stream through the output sinks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::errors::{BoxError, Result};
use crate::query::{PartitionQuery, Row, RowStream, Statement};

/// Something that happened to a replayed partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryEvent {
    /// A statement for the partition was executed.
    Started(String),
    /// Every row of the partition was handed out.
    Drained(String),
}

#[derive(Debug, Clone, Default)]
struct ReplayPartition {
    rows: Vec<Row>,
    delay: Option<Duration>,
    failure: Option<String>,
}

/// A [`PartitionQuery`] returning fixed rows per partition token.
///
/// Partitions without recorded rows produce an empty stream.
#[derive(Debug, Default)]
pub struct ReplayQuery {
    partitions: HashMap<String, ReplayPartition>,
    statements: Mutex<Vec<Statement>>,
    events: Arc<Mutex<Vec<QueryEvent>>>,
}

impl ReplayQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rows from a JSON object mapping partition tokens to arrays of
    /// rows. The root partition is keyed by the empty string.
    pub fn from_json(json: &str) -> Result<Self> {
        let recorded: HashMap<String, Vec<Row>> = serde_json::from_str(json)?;
        let mut query = Self::new();
        for (token, rows) in recorded {
            query = query.with_rows(token, rows);
        }
        Ok(query)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Append rows to a partition.
    pub fn with_rows(
        mut self,
        token: impl Into<String>,
        rows: impl IntoIterator<Item = Row>,
    ) -> Self {
        self.partitions
            .entry(token.into())
            .or_default()
            .rows
            .extend(rows);
        self
    }

    /// Wait before handing out the first row of a partition.
    pub fn with_delay(mut self, token: impl Into<String>, delay: Duration) -> Self {
        self.partitions.entry(token.into()).or_default().delay = Some(delay);
        self
    }

    /// Fail the partition's stream after all of its rows were handed out.
    pub fn with_failure(mut self, token: impl Into<String>, message: impl Into<String>) -> Self {
        self.partitions.entry(token.into()).or_default().failure = Some(message.into());
        self
    }

    /// Statements executed so far, in execution order.
    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().clone()
    }

    pub fn events(&self) -> Vec<QueryEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl PartitionQuery for ReplayQuery {
    async fn execute(&self, statement: Statement) -> Result<RowStream, BoxError> {
        let token = statement.partition_token().to_string();
        let partition = self.partitions.get(&token).cloned().unwrap_or_default();
        debug!(%token, rows = partition.rows.len(), "replaying partition");

        self.statements.lock().push(statement);
        self.events.lock().push(QueryEvent::Started(token.clone()));

        let events = self.events.clone();
        let rows = stream! {
            if let Some(delay) = partition.delay {
                tokio::time::sleep(delay).await;
            }
            for row in partition.rows {
                yield Ok::<_, BoxError>(row);
            }
            if let Some(failure) = partition.failure {
                yield Err(failure.into());
                return;
            }
            events.lock().push(QueryEvent::Drained(token));
        };

        Ok(Box::pin(rows))
    }
}
