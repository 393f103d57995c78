//! Command line tool printing the records of a change stream as they are
//! read from every partition.

pub mod args;
pub mod commands;
pub mod output;
pub mod visualizer;
