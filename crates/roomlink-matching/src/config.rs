//! Matching configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout budgets and persistence settings for matching.
///
/// ```rust
/// use std::time::Duration;
/// use roomlink_matching::MatchingConfig;
///
/// let config = MatchingConfig {
///     found_timeout: Duration::from_secs(10),
///     ..Default::default()
/// };
/// assert_eq!(config.starting_timeout, Duration::from_secs(15));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Time allowed in `Found` to receive the start confirmation.
    pub found_timeout: Duration,
    /// Time allowed in `Starting` to complete.
    pub starting_timeout: Duration,
    /// `Searching` budget when the caller passes none.
    pub default_max_wait: Duration,
    /// Key under which the session state is persisted.
    pub storage_key: String,
    /// Event bus capacity.
    pub event_capacity: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            found_timeout: Duration::from_secs(30),
            starting_timeout: Duration::from_secs(15),
            default_max_wait: Duration::from_secs(60),
            storage_key: "roomlink.matching".to_string(),
            event_capacity: 64,
        }
    }
}
