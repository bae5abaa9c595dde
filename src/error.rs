//! Error taxonomy for a hunt run.

use std::fmt;

use crate::protocol::WantedKind;

/// Errors surfaced by the hunt engine and its collaborators.
///
/// Only [`HuntError::Config`] and [`HuntError::StateStore`] may terminate a
/// run; the remaining variants are isolated to one instance/kind cell or one
/// item and aggregated into the run summary.
#[derive(Debug, thiserror::Error)]
pub enum HuntError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("[{instance}] unreachable{}: {reason}", kind_suffix(.kind))]
    InstanceUnreachable {
        instance: String,
        kind: Option<WantedKind>,
        reason: String,
    },

    #[error("[{instance}] search trigger failed for item {item_id}: {reason}")]
    TriggerFailed {
        instance: String,
        item_id: i64,
        reason: String,
    },

    #[error("state store error: {0}")]
    StateStore(String),
}

impl HuntError {
    /// Returns true when the error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HuntError::Config(_) | HuntError::StateStore(_))
    }

    /// Attaches a wanted kind to an `InstanceUnreachable` error.
    pub fn with_kind(self, wanted_kind: WantedKind) -> Self {
        match self {
            HuntError::InstanceUnreachable {
                instance, reason, ..
            } => HuntError::InstanceUnreachable {
                instance,
                kind: Some(wanted_kind),
                reason,
            },
            other => other,
        }
    }
}

impl From<rusqlite::Error> for HuntError {
    fn from(err: rusqlite::Error) -> Self {
        HuntError::StateStore(err.to_string())
    }
}

struct KindSuffix<'a>(&'a Option<WantedKind>);

impl fmt::Display for KindSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(kind) => write!(f, " while fetching {kind} items"),
            None => Ok(()),
        }
    }
}

fn kind_suffix(kind: &Option<WantedKind>) -> KindSuffix<'_> {
    KindSuffix(kind)
}
