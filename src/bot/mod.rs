//! Tick orchestration

pub mod telemetry;
pub mod tick;

pub use telemetry::{TickSummary, TickTelemetry};
pub use tick::BotContext;
