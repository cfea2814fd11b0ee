//! Pipeline documents as written in YAML

use crate::core::error::{PipelineError, Result};
use crate::core::path::validate_name;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::HashSet;
use std::path::Path;

/// Name of the flow when the document does not set one
pub const DEFAULT_FLOW_NAME: &str = "root";

/// Container settings for the agent that runs a step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    #[serde(default, deserialize_with = "scalar_map", skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// Named set of workspace paths, used for caches and artifacts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRule {
    pub name: String,

    #[serde(default)]
    pub paths: Vec<String>,
}

impl FileRule {
    pub fn new(name: impl Into<String>, paths: &[&str]) -> Self {
        Self {
            name: name.into(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn validate(&self, kind: &str, step: &str) -> Result<()> {
        if !validate_name(&self.name) {
            return Err(PipelineError::format(format!(
                "step '{}' has {} with invalid name '{}'",
                step, kind, self.name
            )));
        }

        for path in &self.paths {
            if path.trim().is_empty() || path.starts_with('/') {
                return Err(PipelineError::format(format!(
                    "step '{}' {} '{}': path '{}' must be relative",
                    step, kind, self.name, path
                )));
            }
        }

        if has_overlap_or_duplicate(&self.paths) {
            return Err(PipelineError::format(format!(
                "step '{}' {} '{}': paths overlap or are duplicated",
                step, kind, self.name
            )));
        }

        Ok(())
    }
}

fn has_overlap_or_duplicate(paths: &[String]) -> bool {
    let normalized: Vec<String> = paths
        .iter()
        .map(|p| p.trim().trim_start_matches("./").trim_end_matches('/').to_string())
        .collect();

    for (i, a) in normalized.iter().enumerate() {
        for b in normalized.iter().skip(i + 1) {
            if a == b || b.starts_with(&format!("{}/", a)) || a.starts_with(&format!("{}/", b)) {
                return true;
            }
        }
    }
    false
}

/// Top-level flow document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowDocument {
    /// Schema version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    /// Flow name, used as the root path segment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, alias = "variables", deserialize_with = "scalar_map")]
    pub vars: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<ContainerOptions>,

    /// Agent selectors
    #[serde(default)]
    pub agents: Vec<String>,

    #[serde(default)]
    pub steps: IndexMap<String, StepDocument>,
}

/// One step, possibly a stage with nested steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDocument {
    #[serde(default, alias = "variables", deserialize_with = "scalar_map", skip_serializing_if = "IndexMap::is_empty")]
    pub vars: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<ContainerOptions>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub steps: IndexMap<String, StepDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pwsh: Option<String>,

    /// Legacy spelling of `bash`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Post steps run after the main chain regardless of its outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,

    /// Timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_failure: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configs: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caches: Vec<FileRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<FileRule>,
}

impl FlowDocument {
    /// Load a flow document from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }

    /// Parse a single flow document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Err(PipelineError::format("empty document"));
        }
        let doc: FlowDocument = serde_yaml::from_str(yaml)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Check names and file rules of every step
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if !validate_name(name) {
                return Err(PipelineError::format(format!("invalid flow name '{}'", name)));
            }
        }
        validate_steps(&self.steps)
    }

    /// Effective flow name
    pub fn flow_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_FLOW_NAME)
    }
}

impl StepDocument {
    /// Parse a single step document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Err(PipelineError::format("empty document"));
        }
        let doc: StepDocument = serde_yaml::from_str(yaml)?;
        doc.validate("<step>")?;
        Ok(doc)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.timeout == Some(0) {
            return Err(PipelineError::format(format!(
                "step '{}' timeout must be at least 1 second",
                name
            )));
        }

        for (kind, rules) in [("cache", &self.caches), ("artifact", &self.artifacts)] {
            let mut seen = HashSet::new();
            for rule in rules {
                rule.validate(kind, name)?;
                if !seen.insert(rule.name.as_str()) {
                    return Err(PipelineError::format(format!(
                        "step '{}' defines {} '{}' more than once",
                        name, kind, rule.name
                    )));
                }
            }
        }
        validate_steps(&self.steps)
    }

    /// A stage is a step with nested steps
    pub fn is_stage(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Bash body, falling back to the legacy `script` key
    pub fn effective_bash(&self) -> Option<&str> {
        self.bash.as_deref().or(self.script.as_deref())
    }
}

fn validate_steps(steps: &IndexMap<String, StepDocument>) -> Result<()> {
    for (name, step) in steps {
        if !validate_name(name) {
            return Err(PipelineError::format(format!("illegal step name '{}'", name)));
        }
        step.validate(name)?;
    }
    Ok(())
}

/// Accept any scalar as a variable value
fn scalar_map<'de, D>(deserializer: D) -> std::result::Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<IndexMap<String, Value>> = Option::deserialize(deserializer)?;
    let mut vars = IndexMap::new();

    for (key, value) in raw.unwrap_or_default() {
        let rendered = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            _ => {
                return Err(serde::de::Error::custom(format!(
                    "variable '{}' must be a scalar value",
                    key
                )))
            }
        };
        vars.insert(key, rendered);
    }

    Ok(vars)
}
