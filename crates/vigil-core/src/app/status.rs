//! StatusCounts - 状態ごとの件数（診断・ブリーフィング用）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Responsibility, Status};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub active: usize,
    pub completed: usize,
    pub missed: usize,
    pub snoozed: usize,
    pub archived: usize,
    /// Active items due at or before the evaluation instant.
    pub due_now: usize,
}

impl StatusCounts {
    pub fn tally<'a>(
        responsibilities: impl IntoIterator<Item = &'a Responsibility>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut counts = Self::default();
        for r in responsibilities {
            match r.status {
                Status::Active => {
                    counts.active += 1;
                    if r.schedule.datetime <= now {
                        counts.due_now += 1;
                    }
                }
                Status::Completed => counts.completed += 1,
                Status::Missed => counts.missed += 1,
                Status::Snoozed => counts.snoozed += 1,
                Status::Archived => counts.archived += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.active + self.completed + self.missed + self.snoozed + self.archived
    }

    /// Items that still need the user's attention.
    pub fn open(&self) -> usize {
        self.active + self.missed + self.snoozed
    }
}
