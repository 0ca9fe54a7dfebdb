//! Actor-based check engine
//!
//! Each actor runs as an independent async task communicating via Tokio
//! channels; callers talk to it through a cloneable handle.
//!
//! ## Architecture Overview
//!
//! ```text
//!   MonitorService ──register/unregister/run_now──┐
//!                                                 ▼
//!                                         ┌───────────────┐
//!                    timer tick ─────────▶│ SchedulerActor│
//!                                         └───────┬───────┘
//!                                                 │ spawns (≤ max_concurrent_checks)
//!                                                 ▼
//!                                         ┌───────────────┐
//!                                         │  CheckRunner  │ fetch → extract → detect
//!                                         └───────┬───────┘
//!                                                 │ commit + dispatch
//!                                 ┌───────────────┴───────────────┐
//!                                 ▼                               ▼
//!                         MonitorStore                     BroadcastHub
//!                                 ▲
//!                         ┌───────┴────────┐
//!                         │ RetentionActor │ daily cleanup
//!                         └────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Completions**: workers report back to the scheduler on an unbounded channel
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod check;
pub mod messages;
pub mod retention;
pub mod scheduler;

pub use check::CheckRunner;
pub use messages::{CheckOutcome, CheckReport, DueMonitor, RetentionStats, SchedulerStatus};
pub use retention::RetentionHandle;
pub use scheduler::SchedulerHandle;
