//! Change records decoded from a change stream query.
//!
//! Field names match the column names of the change stream result so rows can
//! be decoded directly, and are kept as-is when records are serialized for
//! output.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Token of the synthetic root partition. The root read is issued without a
/// partition token.
pub const ROOT_PARTITION_TOKEN: &str = "";

/// Decode an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Result of reading a single row from a partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadResult {
    /// Token of the partition this row was read from. Empty for the root
    /// partition.
    pub partition_token: String,
    #[serde(
        rename = "change_record",
        alias = "ChangeRecord",
        deserialize_with = "null_as_default"
    )]
    pub change_records: Vec<ChangeRecord>,
}

impl ReadResult {
    pub fn data_change_records(&self) -> impl Iterator<Item = &DataChangeRecord> {
        self.change_records
            .iter()
            .flat_map(|r| r.data_change_records.iter())
    }

    pub fn heartbeat_records(&self) -> impl Iterator<Item = &HeartbeatRecord> {
        self.change_records
            .iter()
            .flat_map(|r| r.heartbeat_records.iter())
    }

    pub fn child_partitions_records(&self) -> impl Iterator<Item = &ChildPartitionsRecord> {
        self.change_records
            .iter()
            .flat_map(|r| r.child_partitions_records.iter())
    }
}

/// A single unit of records from the change stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeRecord {
    #[serde(rename = "data_change_record", deserialize_with = "null_as_default")]
    pub data_change_records: Vec<DataChangeRecord>,
    #[serde(rename = "heartbeat_record", deserialize_with = "null_as_default")]
    pub heartbeat_records: Vec<HeartbeatRecord>,
    #[serde(rename = "child_partitions_record", deserialize_with = "null_as_default")]
    pub child_partitions_records: Vec<ChildPartitionsRecord>,
}

/// A set of changes made to a table within one transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataChangeRecord {
    pub commit_timestamp: DateTime<Utc>,
    pub record_sequence: String,
    pub server_transaction_id: String,
    pub is_last_record_in_transaction_in_partition: bool,
    pub table_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub column_types: Vec<ColumnType>,
    #[serde(deserialize_with = "null_as_default")]
    pub mods: Vec<Mod>,
    #[serde(deserialize_with = "null_as_default")]
    pub mod_type: ModType,
    pub value_capture_type: String,
    pub number_of_records_in_transaction: i64,
    pub number_of_partitions_in_transaction: i64,
    pub transaction_tag: String,
    pub is_system_transaction: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModType {
    Insert,
    Update,
    Delete,
    /// Missing or not one of the known types. Printed as an empty string.
    #[default]
    #[serde(rename = "", other)]
    Unknown,
}

impl fmt::Display for ModType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModType::Insert => write!(f, "INSERT"),
            ModType::Update => write!(f, "UPDATE"),
            ModType::Delete => write!(f, "DELETE"),
            ModType::Unknown => Ok(()),
        }
    }
}

/// Metadata of a column touched by a data change record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnType {
    pub name: String,
    /// Type description as returned by the stream, e.g. `{"code": "INT64"}`.
    #[serde(rename = "type")]
    pub column_type: Value,
    pub is_primary_key: bool,
    pub ordinal_position: i64,
}

/// Changes made to a single row. Values are `null` when not captured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mod {
    pub keys: Value,
    pub new_values: Value,
    pub old_values: Value,
}

/// Liveness record emitted when no data changes occurred within the heartbeat
/// interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatRecord {
    pub timestamp: DateTime<Utc>,
}

/// Announces partitions created by a split or merge of the partition
/// currently being read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildPartitionsRecord {
    /// Reads of the child partitions start here. Always later than the start
    /// of the overall read.
    pub start_timestamp: DateTime<Utc>,
    pub record_sequence: String,
    #[serde(deserialize_with = "null_as_default")]
    pub child_partitions: Vec<ChildPartition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildPartition {
    pub token: String,
    #[serde(deserialize_with = "null_as_default")]
    pub parent_partition_tokens: Vec<String>,
}
