//! Test: combining several documents into one flow

use crate::helpers::*;
use flowline::core::{load, merge, FlowDocument, PipelineError, StepDefaults};

const BASE: &str = r#"
name: release
vars:
  TARGET: x86_64
steps:
  build:
    bash: cargo build --release
  test:
    bash: cargo test
"#;

const NOTIFY: &str = r#"
steps:
  notify:
    post: true
    bash: ./notify.sh
"#;

const TUNING: &str = r#"
vars:
  PROFILE: ci
steps:
  build:
    retry: 2
    timeout: 1200
"#;

#[test]
fn test_three_documents_merge_left_to_right() {
    let flow = load([BASE, NOTIFY, TUNING]).unwrap();

    let names: Vec<_> = flow.steps.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["build", "test", "notify"]);
    assert_eq!(flow.vars.len(), 2);

    let build = &flow.steps["build"];
    assert_eq!(build.bash.as_deref(), Some("cargo build --release"));
    assert_eq!(build.retry, Some(2));
    assert_eq!(build.timeout, Some(1200));
}

#[test]
fn test_merge_is_associative_for_disjoint_documents() {
    let [a, b, c] = [BASE, NOTIFY, TUNING].map(|t| FlowDocument::from_yaml(t).unwrap());

    let left = merge(&merge(&a, &b).unwrap(), &c).unwrap();
    let right = merge(&a, &merge(&b, &c).unwrap()).unwrap();
    assert_eq!(left, right);
}

#[test]
fn test_merged_flow_compiles_into_one_chain() {
    let graph = compile_yaml(&[BASE, NOTIFY, TUNING]);

    assert_eq!(graph.tree().root().name, "release");
    let notify = graph.get("notify").unwrap();
    assert_eq!(graph.name(notify.parents[0]), "test");
}

#[test]
fn test_overlay_cannot_redefine_a_variable() {
    let err = load([BASE, "vars:\n  TARGET: aarch64\n"]).unwrap_err();
    assert!(matches!(err, PipelineError::Merge { ref field, .. } if field == "vars.TARGET"));
    assert!(err.to_string().contains("x86_64"));
}

#[test]
fn test_nested_step_variable_conflict_names_full_field() {
    let a = "steps:\n  build:\n    bash: make\n    vars:\n      CC: gcc\n";
    let b = "steps:\n  build:\n    vars:\n      CC: clang\n";
    match load([a, b]).unwrap_err() {
        PipelineError::Merge { field, .. } => assert_eq!(field, "steps.build.vars.CC"),
        other => panic!("expected merge error, got {}", other),
    }
}

#[test]
fn test_overlay_legacy_script_wins_over_base_bash() {
    let overlay = "steps:\n  build:\n    script: cargo build --locked\n";
    let graph = compile_yaml(&[BASE, overlay]);

    let id = graph.tree().id_of("build").unwrap();
    let props = graph.resolve(id, &StepDefaults::default());
    assert_eq!(props.bash, vec!["cargo build --locked"]);
}

#[test]
fn test_unknown_key_is_format_error() {
    let err = load(["steps:\n  build:\n    bsah: make\n"]).unwrap_err();
    assert!(matches!(err, PipelineError::Format { .. }));
}

#[test]
fn test_step_without_body_fails_to_compile() {
    let flow = load(["steps:\n  empty:\n    timeout: 10\n"]).unwrap();
    assert!(matches!(
        flowline::core::compile(&flow).unwrap_err(),
        PipelineError::Format { .. }
    ));
}
