//! Store construction options.

use serde::Deserialize;

use crate::error::EcsResult;

/// How permanent ids are assigned to new entities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PidStrategy {
    /// Random non-zero 63-bit pids, re-drawn on collision.
    RandomPids,
    /// The pid equals the entity id.
    #[default]
    UsePidAsId,
}

/// Options read when an [`EntityStore`](crate::EntityStore) is created.
///
/// ```json
/// { "pid_strategy": "random_pids", "pid_seed": 7, "recycle_ids": true }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Permanent id strategy.
    pub pid_strategy: PidStrategy,
    /// Seed for [`PidStrategy::RandomPids`]; drawn from the OS when unset.
    pub pid_seed: Option<u64>,
    /// Reuse ids of deleted entities before advancing the id sequence.
    pub recycle_ids: bool,
    /// Node table slots reserved up front.
    pub initial_capacity: usize,
}

impl StoreConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> EcsResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Use the given pid strategy.
    #[must_use]
    pub const fn with_pid_strategy(mut self, strategy: PidStrategy) -> Self {
        self.pid_strategy = strategy;
        self
    }

    /// Seed the random pid generator.
    #[must_use]
    pub const fn with_pid_seed(mut self, seed: u64) -> Self {
        self.pid_seed = Some(seed);
        self
    }

    /// Enable or disable id recycling.
    #[must_use]
    pub const fn with_recycle_ids(mut self, recycle: bool) -> Self {
        self.recycle_ids = recycle;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EcsError;

    #[test]
    fn test_empty_json_is_default() {
        let config = StoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.pid_strategy, PidStrategy::UsePidAsId);
    }

    #[test]
    fn test_full_json() {
        let config = StoreConfig::from_json_str(
            r#"{"pid_strategy":"random_pids","pid_seed":42,"recycle_ids":true,"initial_capacity":128}"#,
        )
        .unwrap();

        assert_eq!(config.pid_strategy, PidStrategy::RandomPids);
        assert_eq!(config.pid_seed, Some(42));
        assert!(config.recycle_ids);
        assert_eq!(config.initial_capacity, 128);
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let err = StoreConfig::from_json_str(r#"{"pid_strategy":"sequential"}"#).unwrap_err();
        assert!(matches!(err, EcsError::Config(_)));
    }
}
