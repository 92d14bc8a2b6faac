//! Severity classification for validation failures.

use serde::{Deserialize, Serialize};

/// The fate assigned to a row when a validation rule fails.
///
/// The declaration order is a total order: when several rules fire on one
/// row, the highest-ranked action wins. `Abend` is never downgraded; a
/// single abend-classified failure aborts the whole pipeline.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum InvalidAction {
    /// Row passes with no action.
    Pass = 1,
    /// Row passes with cleanup values applied.
    Clean = 2,
    /// Two rows: one pass with cleanup, one reject.
    RejectClean = 3,
    /// Row rejected.
    Reject = 4,
    /// Row completely discarded.
    Discard = 5,
    /// Pipeline aborted.
    Abend = 6,
}

impl InvalidAction {
    pub fn rejects(&self) -> bool {
        matches!(self, Self::Reject | Self::RejectClean)
    }

    pub fn cleans(&self) -> bool {
        matches!(self, Self::Clean | Self::RejectClean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order_matches_priority() {
        assert!(InvalidAction::Pass < InvalidAction::Clean);
        assert!(InvalidAction::Clean < InvalidAction::RejectClean);
        assert!(InvalidAction::RejectClean < InvalidAction::Reject);
        assert!(InvalidAction::Reject < InvalidAction::Discard);
        assert!(InvalidAction::Discard < InvalidAction::Abend);
    }

    #[test]
    fn test_max_picks_severest() {
        let actions = [
            InvalidAction::Clean,
            InvalidAction::Reject,
            InvalidAction::Pass,
        ];
        assert_eq!(
            actions.into_iter().max().expect("non-empty"),
            InvalidAction::Reject
        );
    }

    #[test]
    fn test_classification_helpers() {
        assert!(InvalidAction::RejectClean.rejects());
        assert!(InvalidAction::RejectClean.cleans());
        assert!(!InvalidAction::Discard.rejects());
        assert!(!InvalidAction::Pass.cleans());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&InvalidAction::RejectClean).expect("serialize"),
            "\"reject_clean\""
        );
    }
}
