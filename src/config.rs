use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Settings applied to every stack created from it.
///
/// ```
/// use command_stack::config::StackConfig;
///
/// let config = StackConfig::default();
/// assert!(config.history_limit.is_none());
/// assert_eq!(config.batch_capacity_hint, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Maximum number of undoable entries kept, and separately of redoable
    /// entries. `None` keeps the whole history.
    pub history_limit: Option<NonZeroUsize>,

    /// Capacity reserved for a batch when the caller gives no better hint.
    pub batch_capacity_hint: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            history_limit: None,
            batch_capacity_hint: 1,
        }
    }
}

impl StackConfig {
    #[must_use]
    pub fn with_history_limit(mut self, limit: NonZeroUsize) -> Self {
        self.history_limit = Some(limit);
        self
    }
}
