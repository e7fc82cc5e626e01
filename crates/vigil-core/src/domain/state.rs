//! Status - Responsibility のライフサイクル状態

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a responsibility. Exactly one holds at any time.
///
/// State transitions:
/// - Active -> Missed (sweep: due time passed without completion)
/// - Active | Missed -> Completed (user completes)
/// - Active -> Snoozed -> Active (user snoozes, sweep wakes)
/// - any non-archived -> Archived (user archives)
/// - Archived -> Active (user unarchives, fresh cycle)
///
/// Recurring items never rest in Completed or Missed: resolving an occurrence
/// rolls the schedule forward and returns them to Active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Completed,
    Missed,
    Snoozed,
    Archived,
}

impl Status {
    /// Does the sweep still plan alerts for this status?
    ///
    /// Completed and Archived are resting states with nothing left to remind about.
    pub fn wants_alerts(self) -> bool {
        matches!(self, Status::Active | Status::Missed | Status::Snoozed)
    }

    /// Archived accepts no automatic transitions.
    pub fn is_archived(self) -> bool {
        matches!(self, Status::Archived)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Completed => "completed",
            Status::Missed => "missed",
            Status::Snoozed => "snoozed",
            Status::Archived => "archived",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::active(Status::Active, true)]
    #[case::missed(Status::Missed, true)]
    #[case::snoozed(Status::Snoozed, true)]
    #[case::completed(Status::Completed, false)]
    #[case::archived(Status::Archived, false)]
    fn alert_eligibility(#[case] status: Status, #[case] expected: bool) {
        assert_eq!(status.wants_alerts(), expected);
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&Status::Snoozed).unwrap();
        assert_eq!(json, "\"snoozed\"");
    }
}
