//! Domain model (ids, responsibility, status, alerts, events, errors).

pub mod alert;
pub mod errors;
pub mod events;
pub mod ids;
pub mod responsibility;
pub mod state;

pub use self::alert::{AlertEvent, AlertKey, AlertToken};
pub use self::errors::{
    ConfigError, DispatchError, EngineError, ErrorKind, RecurrenceError, StoreError,
    TransitionError,
};
pub use self::events::{DomainEvent, Rollover, Transition};
pub use self::ids::{ChecklistItemId, ResponsibilityId, UserId};
pub use self::responsibility::{
    Channel, ChecklistItem, EscalationRule, InvariantViolation, ReminderStyle, Responsibility,
    Schedule, ScheduleKind, Strength,
};
pub use self::state::Status;
