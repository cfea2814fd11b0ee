//! CLI command definitions

use crate::core::{load, FlowDocument};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Validate pipeline documents
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Pipeline YAML files, merged left to right
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output the merged document in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Print the execution graph
#[derive(Debug, Args, Clone)]
pub struct GraphCommand {
    /// Pipeline YAML files, merged left to right
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Print the effective properties of one step
#[derive(Debug, Args, Clone)]
pub struct ResolveCommand {
    /// Pipeline YAML files, merged left to right
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Step name
    #[arg(short, long)]
    pub step: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Dry-run a flow
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Pipeline YAML files, merged left to right
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Variable overrides (key=value)
    #[arg(long = "var", value_parser = parse_key_value)]
    pub vars: Vec<(String, String)>,

    /// Override the configured parallelism
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Print the final job record in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}

/// Read every file and merge the documents in order
pub fn load_flow(files: &[PathBuf]) -> Result<FlowDocument> {
    let mut texts = Vec::with_capacity(files.len());
    for file in files {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read pipeline file {}", file.display()))?;
        texts.push(text);
    }
    load(&texts).context("Failed to load pipeline documents")
}
