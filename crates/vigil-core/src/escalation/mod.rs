//! Escalation - アラート計画
//!
//! - **planner**: 純粋関数。due + rules → 時刻順の AlertEvent 列
//! - **policy**: 呼び出し側で適用する配送ポリシー（critical → full screen）

mod planner;
mod policy;

pub use self::planner::plan_alerts;
pub use self::policy::AlertPolicy;
