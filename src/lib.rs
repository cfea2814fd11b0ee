//! flowline - compile multi-document CI flows into execution graphs

pub mod agent;
pub mod cli;
pub mod core;
pub mod execution;

// Re-export commonly used types
pub use agent::{AgentDriver, AgentError, AgentResponse, DryRunDriver};
pub use core::{
    compile, load, merge, resolve, EffectiveStepProperties, ExecutionGraph, FlowDocument, GraphNode, JobRecord,
    JobStatus, NodeId, PipelineError, StateMachine, Status, StepDefaults, StepStatus, StepTree,
};
pub use execution::{EngineConfig, ExecutionEngine, ExecutionEvent};
