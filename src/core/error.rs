//! Compile-time error taxonomy

use thiserror::Error;

/// Errors raised while loading, merging and compiling pipeline documents.
///
/// All of them abort the pipeline before any step is dispatched.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed YAML, unknown keys or invalid field values
    #[error("format error: {message}")]
    Format {
        message: String,
        #[source]
        source: Option<serde_yaml::Error>,
    },

    /// Two documents define values that cannot be reconciled
    #[error("merge error on '{field}': {message}")]
    Merge { field: String, message: String },

    /// A step name is used more than once anywhere in the tree
    #[error("duplicate step name '{name}' at {path}")]
    DuplicateName { name: String, path: String },

    /// A `dependencies` entry names a step that does not exist
    #[error("step '{step}' depends on undefined step '{dependency}'")]
    UnresolvedDependency { step: String, dependency: String },

    /// The dependency graph contains a cycle
    #[error("cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
}

impl PipelineError {
    pub fn format(message: impl Into<String>) -> Self {
        PipelineError::Format {
            message: message.into(),
            source: None,
        }
    }

    pub fn merge(field: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Merge {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        PipelineError::Format {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
