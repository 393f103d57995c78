//! Reading change streams across all of their partitions.
//!
//! A change stream is split into partitions which split and merge over time.
//! Reading a partition reveals the partitions that follow it, and a child
//! partition may only be read once every one of its parents has been read.
//! [`Subscriber`] takes care of discovering partitions, reading each of them
//! concurrently, and handing every result to a [`Consumer`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use changestreams::{ConsumerFn, ReadResult, ReplayQuery, Subscriber};
//! use tokio_util::sync::CancellationToken;
//!
//! let query = Arc::new(ReplayQuery::from_path("stream.json")?);
//! let subscriber = Subscriber::new(query, "MyStream")?;
//! subscriber
//!     .subscribe(
//!         Arc::new(ConsumerFn(|result: &ReadResult| {
//!             for record in result.data_change_records() {
//!                 println!("{} {} {}", record.commit_timestamp, record.mod_type, record.table_name);
//!             }
//!             Ok(())
//!         })),
//!         CancellationToken::new(),
//!     )
//!     .await?;
//! ```

pub mod consumer;
pub mod errors;
pub mod query;
pub mod reader;
pub mod records;
pub mod replay;
pub mod scheduler;
pub mod state;
pub mod subscriber;

pub use consumer::{Consumer, ConsumerFn};
pub use errors::{ChangeStreamError, Result};
pub use query::{PartitionQuery, Row, RowStream, Statement};
pub use records::*;
pub use replay::ReplayQuery;
pub use subscriber::{Config, DEFAULT_HEARTBEAT_INTERVAL, Subscriber};
