//! Hierarchical step paths

use crate::core::error::{PipelineError, Result};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

pub const PATH_SEPARATOR: &str = "/";

/// Maximum number of segments in a path, root included
pub const MAX_DEPTH: usize = 10;

const MAX_NAME_LEN: usize = 100;

fn reserved() -> &'static Regex {
    static RESERVED: OnceLock<Regex> = OnceLock::new();
    RESERVED.get_or_init(|| Regex::new(r"[*.;/]").expect("reserved character pattern"))
}

/// Check that a step or rule name is usable as a path segment
pub fn validate_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty() && name.chars().count() <= MAX_NAME_LEN && !reserved().is_match(name)
}

/// Path of a node in the step tree, e.g. `root/build/compile`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodePath {
    segments: Vec<String>,
}

impl NodePath {
    /// Create a single-segment path for a tree root
    pub fn root(name: &str) -> Result<Self> {
        Self::from_segments(vec![Self::segment(name)?])
    }

    /// Create the path of a child named `name` under this path
    pub fn child(&self, name: &str) -> Result<Self> {
        let mut segments = self.segments.clone();
        segments.push(Self::segment(name)?);
        Self::from_segments(segments)
    }

    /// Parse a `/`-joined path string
    pub fn parse(path: &str) -> Result<Self> {
        let segments = path
            .split(PATH_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::segment)
            .collect::<Result<Vec<_>>>()?;
        Self::from_segments(segments)
    }

    fn segment(name: &str) -> Result<String> {
        if !validate_name(name) {
            return Err(PipelineError::format(format!("illegal node name '{}'", name)));
        }
        Ok(name.trim().to_string())
    }

    fn from_segments(segments: Vec<String>) -> Result<Self> {
        if segments.is_empty() {
            return Err(PipelineError::format("empty node path is not allowed"));
        }
        if segments.len() > MAX_DEPTH {
            return Err(PipelineError::format(format!(
                "node path '{}' exceeds the depth limit of {}",
                segments.join(PATH_SEPARATOR),
                MAX_DEPTH
            )));
        }
        Ok(Self { segments })
    }

    /// Last segment
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    pub fn parent(&self) -> Option<NodePath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join(PATH_SEPARATOR))
    }
}

impl Serialize for NodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
