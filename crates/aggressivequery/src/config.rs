//! Planner configuration.

use aggressivequery_core::{ConfigError, Error, Result};
use serde::{Deserialize, Serialize};

/// Options for [`build_optimized_query`](crate::build_optimized_query).
///
/// # Example
///
/// ```
/// use aggressivequery::PlannerConfig;
///
/// let config = PlannerConfig::from_json(r#"{"more_specific": true}"#).unwrap();
/// assert!(config.more_specific);
/// assert!(config.sorted);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Use the selection verbatim and restrict columns to it.
    ///
    /// When off, every ancestor level of every path also selects `*` and
    /// the column projection is left alone.
    pub more_specific: bool,
    /// Sort every level of the extracted tree by name.
    pub sorted: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            more_specific: false,
            sorted: true,
        }
    }
}

impl PlannerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn more_specific(mut self, enabled: bool) -> Self {
        self.more_specific = enabled;
        self
    }

    #[must_use]
    pub const fn sorted(mut self, enabled: bool) -> Self {
        self.sorted = enabled;
        self
    }

    /// Parse a JSON object; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid planner configuration: {e}"),
                source: Some(Box::new(e)),
            })
        })
    }
}
