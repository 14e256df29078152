pub mod evaluator;
pub mod lifecycle;
pub mod scheduler;

pub use evaluator::{evaluate, CloseDecision, CloseReason, Evaluation};
pub use lifecycle::{LifecycleMonitor, MonitorSnapshot};
pub use scheduler::ScanScheduler;
