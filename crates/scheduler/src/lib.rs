//! # Scheduler
//!
//! Subscription triggers and the control surface.
//!
//! - Periodic trigger: reply guard, then one push-update per period
//! - On-change trigger: sync-on-start, change-feed listening, dampening
//! - Stop-time handling shared by both
//! - `SubscriptionService`: establish, modify, delete, attach, detach
//!
//! ## Example
//!
//! ```ignore
//! use scheduler::{SchedulerConfig, SubscriptionService};
//!
//! let service = SubscriptionService::new(Arc::new(broker), SchedulerConfig::default());
//! service.attach(StreamKind::Operational, Arc::new(LogSink::new("log")));
//! let id = service.establish(params).await?;
//! ```

mod config;
mod error;
mod on_change;
mod periodic;
mod service;
mod trigger;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use on_change::OnChangeSettings;
pub use service::SubscriptionService;
pub use trigger::{TriggerHandle, TriggerKind, TriggerSet, Window};
