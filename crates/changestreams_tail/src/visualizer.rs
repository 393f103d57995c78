//! Partition lineage rendered as a Graphviz DOT graph.

use std::collections::BTreeMap;
use std::io::{self, Write};

use async_trait::async_trait;
use changestreams::{Consumer, ReadResult, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;

/// Name of the node every partition without parents hangs off.
const ROOT_NODE: &str = "root";

#[derive(Debug, Default)]
struct PartitionNode {
    /// Unset for the root, and for parents that started before the read.
    start_timestamp: Option<DateTime<Utc>>,
    record_sequence: String,
    parents: Vec<String>,
}

/// Collects child partitions records and draws the partition graph.
#[derive(Debug)]
pub struct PartitionVisualizer {
    partitions: Mutex<BTreeMap<String, PartitionNode>>,
}

impl Default for PartitionVisualizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionVisualizer {
    pub fn new() -> Self {
        let mut partitions = BTreeMap::new();
        partitions.insert(ROOT_NODE.to_string(), PartitionNode::default());
        PartitionVisualizer {
            partitions: Mutex::new(partitions),
        }
    }

    pub fn record(&self, result: &ReadResult) {
        let mut partitions = self.partitions.lock();
        for record in result.child_partitions_records() {
            for child in &record.child_partitions {
                // Merged partitions are announced once per parent.
                if partitions.contains_key(&child.token) {
                    continue;
                }

                let mut parents = Vec::with_capacity(child.parent_partition_tokens.len());
                for parent in &child.parent_partition_tokens {
                    partitions.entry(parent.clone()).or_default();
                    parents.push(parent.clone());
                }
                if parents.is_empty() {
                    parents.push(ROOT_NODE.to_string());
                }

                partitions.insert(
                    child.token.clone(),
                    PartitionNode {
                        start_timestamp: Some(record.start_timestamp),
                        record_sequence: record.record_sequence.clone(),
                        parents,
                    },
                );
            }
        }
    }

    /// Write the graph, nodes and edges ordered by partition token.
    pub fn draw(&self, out: &mut impl Write) -> io::Result<()> {
        let partitions = self.partitions.lock();

        writeln!(out, "digraph {{")?;
        writeln!(out, "  node [shape=record];")?;
        for (token, node) in partitions.iter() {
            let timestamp = node
                .start_timestamp
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default();
            writeln!(
                out,
                r#"  "{token}" [label="{{token|start_timestamp|record_sequence}}|{{{{{token}}}|{{{timestamp}}}|{{{seq}}}}}"];"#,
                seq = node.record_sequence,
            )?;
        }
        for (token, node) in partitions.iter() {
            for parent in &node.parents {
                writeln!(out, r#"  "{parent}" -> "{token}""#)?;
            }
        }
        writeln!(out, "}}")?;

        Ok(())
    }
}

#[async_trait]
impl Consumer for PartitionVisualizer {
    async fn consume(&self, result: &ReadResult) -> Result<()> {
        self.record(result);
        Ok(())
    }
}
