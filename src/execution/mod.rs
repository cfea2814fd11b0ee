//! Job execution engine

pub mod config;
pub mod engine;
pub mod executor;
pub mod lifecycle;
pub mod scheduler;

pub use config::EngineConfig;
pub use engine::{EventHandler, EventSink, ExecutionEngine, ExecutionEvent};
pub use executor::{StepExecutor, StepOutcome};
pub use lifecycle::{job_machine, JobContext, JobData};
pub use scheduler::ExecutionScheduler;
