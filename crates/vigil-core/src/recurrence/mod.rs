//! Recurrence - 繰り返しルールの解釈
//!
//! Pure and deterministic: the same (rule, zone, instant) triple always yields
//! the same answer, which the sweep relies on for idempotent re-evaluation.

mod expander;
mod rule;

pub use self::expander::next_occurrence;
pub use self::rule::{Frequency, RecurrenceRule, RuleStart, Until};
