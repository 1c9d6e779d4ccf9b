//! # Registry
//!
//! Subscription registry: the single owner of subscription records.
//!
//! Responsibilities:
//! - Assign monotonic subscription ids
//! - Keep the local record map and the store mirror in step
//! - Serve fire-time lookups to the triggers, keyed by `(id, generation)`

mod registry;

pub use registry::SubscriptionRegistry;
