//! # Datastore
//!
//! In-memory implementation of the `DataBroker` contract.
//!
//! Responsibilities:
//! - Hold the CONFIGURATION and OPERATIONAL partitions as JSON trees
//! - Serve snapshot reads
//! - Classify mutations into change records for registered listeners
//! - Persist mirrored subscription records

mod broker;
pub mod tree;

pub use broker::{MemoryBroker, MemoryBrokerConfig, MirrorEvent};
