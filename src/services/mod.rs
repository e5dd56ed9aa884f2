pub mod advisory;
pub mod date_precision;
pub mod notifier;
pub mod recurrence;
pub mod reminder_sweep;
