//! # Contracts
//!
//! Frozen interface contracts shared by every crate: the subscription data
//! model, the external store capabilities and the sink interface.
//! Business crates depend on this crate only, reverse dependencies are
//! prohibited.
//!
//! ## Time Model
//! - Timestamps on the wire use the canonical `YYYY-MM-DDThh:mm:ss.mmmZ` form
//! - Scheduling works on `chrono::DateTime<Utc>` parsed from it

mod blueprint;
mod broker;
mod change;
mod error;
mod notification;
mod path;
mod sink;
mod subscription;
mod subscription_id;
pub mod time;

pub use blueprint::*;
pub use broker::*;
pub use change::*;
pub use error::*;
pub use notification::*;
pub use path::InstancePath;
pub use sink::NotificationSink;
pub use subscription::*;
pub use subscription_id::SubscriptionId;
