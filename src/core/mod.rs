//! Core domain models
//!
//! Documents are parsed and merged, materialized into a step tree and
//! compiled into an execution graph. Status changes go through the
//! transition engine.

pub mod config;
pub mod error;
pub mod merge;
pub mod path;
pub mod pipeline;
pub mod properties;
pub mod state;
pub mod step;
pub mod transition;

pub use config::{ContainerOptions, FileRule, FlowDocument, StepDocument};
pub use error::{PipelineError, Result};
pub use merge::{load, merge};
pub use path::NodePath;
pub use pipeline::*;
pub use properties::{resolve, EffectiveStepProperties, StepDefaults};
pub use state::*;
pub use step::*;
pub use transition::{action_fn, Action, Context, FnAction, Hook, SmError, StateMachine, Status, Transition};
