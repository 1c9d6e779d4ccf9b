//! Scheduler timing constants

use std::time::Duration;

use contracts::ServiceConfig;

/// Fixed delays applied when arming triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Extra delay before the first fire of any trigger, so the client
    /// receives the establish reply before the first notification
    pub reply_guard_delay: Duration,
    /// Delay between arming an on-change trigger and its sync-on-start push
    pub sync_on_start_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reply_guard_delay: Duration::from_millis(100),
            sync_on_start_delay: Duration::from_millis(50),
        }
    }
}

impl From<&ServiceConfig> for SchedulerConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            reply_guard_delay: config.reply_guard_delay(),
            sync_on_start_delay: config.sync_on_start_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_service_config() {
        let service = ServiceConfig {
            reply_guard_delay_ms: 250,
            sync_on_start_delay_ms: 10,
        };
        let config = SchedulerConfig::from(&service);
        assert_eq!(config.reply_guard_delay, Duration::from_millis(250));
        assert_eq!(config.sync_on_start_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_default_matches_service_defaults() {
        let config = SchedulerConfig::from(&ServiceConfig::default());
        assert_eq!(config, SchedulerConfig::default());
    }
}
