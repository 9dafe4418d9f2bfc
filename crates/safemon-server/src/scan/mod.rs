//! The scan pipeline: one orchestrated cycle, the reentrancy-guarded
//! trigger in front of it, and the interval scheduler driving the trigger.

pub mod error;
pub mod orchestrator;
pub mod scheduler;
pub mod trigger;

pub use error::{ScanError, ScanStage};
pub use orchestrator::ScanOrchestrator;
pub use scheduler::ScanScheduler;
pub use trigger::{ScanTrigger, TriggerError};
