//! Engine runtime limits.

use std::time::Duration;

use crate::db::EngineSettings;

/// Timeouts and caps applied by the engine to every collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub store_timeout: Duration,
    pub directory_timeout: Duration,
    /// Maximum number of completed periods walked by `classify_all_outstanding`.
    pub max_outstanding_periods: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&EngineSettings::default())
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            store_timeout: Duration::from_millis(settings.store_timeout_ms),
            directory_timeout: Duration::from_millis(settings.directory_timeout_ms),
            max_outstanding_periods: settings.max_outstanding_periods,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_directory_timeout(mut self, timeout: Duration) -> Self {
        self.directory_timeout = timeout;
        self
    }

    pub fn with_max_outstanding_periods(mut self, max: u32) -> Self {
        self.max_outstanding_periods = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_file_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.directory_timeout, Duration::from_secs(10));
        assert_eq!(config.max_outstanding_periods, 52);
    }
}
