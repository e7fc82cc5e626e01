//! EscalationPlanner: due instant + reminder style + rules -> ordered alerts.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{AlertEvent, Channel, EscalationRule, ReminderStyle};

/// Plan the alerts of one occurrence.
///
/// - No rules: a single notification at `due` with the reminder style as strength.
/// - Otherwise one alert per rule at `due + offset`, sorted by fire time.
///   The sort is stable, so equal fire times keep declaration order.
///
/// Past alerts are kept; filtering against "now" is the caller's job.
pub fn plan_alerts(
    due: DateTime<Utc>,
    reminder_style: ReminderStyle,
    rules: &[EscalationRule],
) -> Vec<AlertEvent> {
    if rules.is_empty() {
        return vec![AlertEvent::new(due, Channel::Notification, reminder_style)];
    }

    let mut alerts: Vec<AlertEvent> = rules
        .iter()
        .map(|rule| {
            AlertEvent::new(offset_from(due, rule.offset_minutes), rule.channel, rule.strength)
        })
        .collect();
    alerts.sort_by_key(|alert| alert.fire_at);
    alerts
}

/// `due + offset`, with the offset clamped to the accepted rule range.
/// `Responsibility::validate` rejects rules outside it.
fn offset_from(due: DateTime<Utc>, offset_minutes: i64) -> DateTime<Utc> {
    let bound = EscalationRule::MAX_OFFSET_MINUTES;
    let offset = Duration::minutes(offset_minutes.clamp(-bound, bound));
    due.checked_add_signed(offset).unwrap_or(due)
}
