//! Interface to the source executing change stream queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::BoxError;
use crate::records::ROOT_PARTITION_TOKEN;

/// Stream of rows produced by a change stream query. The stream ends when the
/// partition has no more records within the requested time range.
pub type RowStream = BoxStream<'static, Result<Row, BoxError>>;

/// Executes change stream queries against some storage engine.
///
/// Implementations may be called concurrently, once per partition.
#[async_trait]
pub trait PartitionQuery: Send + Sync + 'static {
    /// Start executing the statement.
    ///
    /// Errors returned here or through the stream abort the whole read.
    async fn execute(&self, statement: Statement) -> Result<RowStream, BoxError>;
}

/// A single result row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new(columns: Map<String, Value>) -> Self {
        Row(columns)
    }

    /// Create a row holding a single column.
    pub fn with_column(name: impl Into<String>, value: Value) -> Self {
        let mut columns = Map::new();
        columns.insert(name.into(), value);
        Row(columns)
    }

    pub fn column(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Decode the row into a struct. Columns without a matching field are
    /// ignored.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0))
    }
}

impl From<Map<String, Value>> for Row {
    fn from(columns: Map<String, Value>) -> Self {
        Row(columns)
    }
}

/// Statement reading a single partition of a change stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: StatementParams,
    /// Role used for fine-grained access control, if any.
    pub database_role: Option<String>,
}

/// Parameters bound to a change stream statement.
///
/// `None` values are bound as NULL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementParams {
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub partition_token: Option<String>,
    pub heartbeat_millis_second: i64,
}

impl Statement {
    /// Build the statement reading `partition_token` from the change stream.
    ///
    /// The root partition is read with a NULL partition token. A missing end
    /// timestamp reads until cancelled.
    pub fn read_partition(
        stream_id: &str,
        partition_token: &str,
        start_timestamp: DateTime<Utc>,
        end_timestamp: Option<DateTime<Utc>>,
        heartbeat_millis: i64,
    ) -> Self {
        let partition_token = if partition_token == ROOT_PARTITION_TOKEN {
            None
        } else {
            Some(partition_token.to_string())
        };

        Statement {
            sql: format!(
                "SELECT ChangeRecord FROM READ_{stream_id}(@start_timestamp, @end_timestamp, @partition_token, @heartbeat_millis_second)"
            ),
            params: StatementParams {
                start_timestamp,
                end_timestamp,
                partition_token,
                heartbeat_millis_second: heartbeat_millis,
            },
            database_role: None,
        }
    }

    pub fn with_database_role(mut self, role: Option<String>) -> Self {
        self.database_role = role;
        self
    }

    /// Token of the partition this statement reads, empty for the root.
    pub fn partition_token(&self) -> &str {
        self.params
            .partition_token
            .as_deref()
            .unwrap_or(ROOT_PARTITION_TOKEN)
    }
}
