//! Overlaying pipeline documents
//!
//! Several YAML fragments combine into one effective flow. Merging is
//! additive: scalars from the overlay replace the base's, maps and lists are
//! unioned and nested `steps` are merged key by key. Nothing present only in
//! the base is ever removed.

use crate::core::config::{ContainerOptions, FileRule, FlowDocument, StepDocument};
use crate::core::error::{PipelineError, Result};
use indexmap::IndexMap;
use tracing::debug;

/// Merge `overlay` onto `base`, returning a new document
pub fn merge(base: &FlowDocument, overlay: &FlowDocument) -> Result<FlowDocument> {
    let mut merged = base.clone();

    match (merged.version, overlay.version) {
        (Some(a), Some(b)) if a != b => {
            return Err(PipelineError::merge(
                "version",
                format!("cannot merge version {} with version {}", a, b),
            ));
        }
        (None, Some(b)) => merged.version = Some(b),
        _ => {}
    }

    merge_scalar(&mut merged.name, &overlay.name);
    merge_map(&mut merged.vars, &overlay.vars, "vars")?;
    merge_scalar(&mut merged.condition, &overlay.condition);
    merge_docker(&mut merged.docker, &overlay.docker, "docker")?;
    merge_list(&mut merged.agents, &overlay.agents);
    merge_steps(&mut merged.steps, &overlay.steps, "steps")?;

    Ok(merged)
}

/// Parse every text and merge them left to right onto an empty flow
pub fn load<I, S>(texts: I) -> Result<FlowDocument>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut acc = FlowDocument::default();
    for (i, text) in texts.into_iter().enumerate() {
        let doc = FlowDocument::from_yaml(text.as_ref())?;
        debug!("Merging document #{} ({} top-level steps)", i + 1, doc.steps.len());
        acc = merge(&acc, &doc)?;
    }
    Ok(acc)
}

fn merge_step(base: &mut StepDocument, overlay: &StepDocument, field: &str) -> Result<()> {
    merge_map(&mut base.vars, &overlay.vars, &format!("{}.vars", field))?;
    merge_scalar(&mut base.condition, &overlay.condition);
    merge_docker(&mut base.docker, &overlay.docker, &format!("{}.docker", field))?;
    merge_list(&mut base.agents, &overlay.agents);

    // `script` is the legacy spelling of `bash`; either one from the overlay wins
    if let Some(bash) = overlay.effective_bash() {
        base.bash = Some(bash.to_string());
        base.script = None;
    }
    merge_scalar(&mut base.pwsh, &overlay.pwsh);
    merge_scalar(&mut base.post, &overlay.post);
    merge_scalar(&mut base.plugin, &overlay.plugin);
    merge_scalar(&mut base.retry, &overlay.retry);
    merge_scalar(&mut base.timeout, &overlay.timeout);
    merge_scalar(&mut base.allow_failure, &overlay.allow_failure);

    merge_list(&mut base.dependencies, &overlay.dependencies);
    merge_list(&mut base.exports, &overlay.exports);
    merge_list(&mut base.secrets, &overlay.secrets);
    merge_list(&mut base.configs, &overlay.configs);

    merge_rules(&mut base.caches, &overlay.caches, &format!("{}.caches", field))?;
    merge_rules(&mut base.artifacts, &overlay.artifacts, &format!("{}.artifacts", field))?;

    merge_steps(&mut base.steps, &overlay.steps, &format!("{}.steps", field))
}

fn merge_steps(
    base: &mut IndexMap<String, StepDocument>,
    overlay: &IndexMap<String, StepDocument>,
    field: &str,
) -> Result<()> {
    for (name, step) in overlay {
        match base.get_mut(name) {
            Some(existing) => merge_step(existing, step, &format!("{}.{}", field, name))?,
            None => {
                base.insert(name.clone(), step.clone());
            }
        }
    }
    Ok(())
}

fn merge_scalar<T: Clone>(base: &mut Option<T>, overlay: &Option<T>) {
    if overlay.is_some() {
        base.clone_from(overlay);
    }
}

fn merge_list(base: &mut Vec<String>, overlay: &[String]) {
    for item in overlay {
        if !base.contains(item) {
            base.push(item.clone());
        }
    }
}

fn merge_map(
    base: &mut IndexMap<String, String>,
    overlay: &IndexMap<String, String>,
    field: &str,
) -> Result<()> {
    for (key, value) in overlay {
        match base.get(key) {
            Some(existing) if existing != value => {
                return Err(PipelineError::merge(
                    format!("{}.{}", field, key),
                    format!("conflicting values '{}' and '{}'", existing, value),
                ));
            }
            Some(_) => {}
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

fn merge_rules(base: &mut Vec<FileRule>, overlay: &[FileRule], field: &str) -> Result<()> {
    for rule in overlay {
        match base.iter().find(|r| r.name == rule.name) {
            Some(existing) if existing != rule => {
                return Err(PipelineError::merge(
                    format!("{}.{}", field, rule.name),
                    "rule defined twice with different paths",
                ));
            }
            Some(_) => {}
            None => base.push(rule.clone()),
        }
    }
    Ok(())
}

fn merge_docker(
    base: &mut Option<ContainerOptions>,
    overlay: &Option<ContainerOptions>,
    field: &str,
) -> Result<()> {
    let Some(overlay) = overlay.as_ref() else {
        return Ok(());
    };

    let base = match base {
        Some(base) => base,
        None => {
            *base = Some(overlay.clone());
            return Ok(());
        }
    };

    merge_scalar(&mut base.image, &overlay.image);
    merge_scalar(&mut base.entrypoint, &overlay.entrypoint);
    merge_scalar(&mut base.command, &overlay.command);
    merge_scalar(&mut base.user, &overlay.user);
    merge_scalar(&mut base.network, &overlay.network);
    merge_map(
        &mut base.environment,
        &overlay.environment,
        &format!("{}.environment", field),
    )
}
