//! Per-identifier results of fan-out operations.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::types::VersionedInstanceIdentifier;

/// What happened to one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ItemOutcome {
    /// Every step completed.
    Succeeded,
    /// A step failed. Later steps for this identifier were skipped.
    Failed {
        /// Error text of the failing step.
        error: String,
    },
}

impl ItemOutcome {
    /// Returns true for [`ItemOutcome::Succeeded`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl From<&StorageError> for ItemOutcome {
    fn from(err: &StorageError) -> Self {
        Self::Failed {
            error: err.to_string(),
        }
    }
}

impl<T> From<&Result<T, StorageError>> for ItemOutcome {
    fn from(result: &Result<T, StorageError>) -> Self {
        match result {
            Ok(_) => Self::Succeeded,
            Err(err) => err.into(),
        }
    }
}

/// Identifier/outcome pairs in the order the identifiers were resolved.
pub type ItemOutcomes = Vec<(VersionedInstanceIdentifier, ItemOutcome)>;

pub(crate) fn count_failed(outcomes: &ItemOutcomes) -> usize {
    outcomes.iter().filter(|(_, o)| !o.is_success()).count()
}
