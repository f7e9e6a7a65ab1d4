//! Shared fixtures for the engine's unit tests.

use std::collections::{BTreeMap, BTreeSet};

use vellum_core::types::JobType;
use vellum_core::workflow::{State, Transition, TransitionOptions, Workflow};

fn mk_state(name: &str) -> State {
    State {
        name: name.to_string(),
        label: name.to_string(),
        tags: BTreeSet::new(),
        author_only: false,
        inbox: false,
        visible: false,
        published: name == "PUBLISHED",
    }
}

fn mk_transition(name: &str, source: Option<&str>, target: &str) -> Transition {
    Transition {
        name: name.to_string(),
        source_state: source.map(str::to_string),
        target_state: target.to_string(),
        required_scopes: Vec::new(),
        requires_job: false,
        job_type: None,
        label: name.to_string(),
        options: TransitionOptions::default(),
    }
}

/// Four-state editorial workflow: submit is immediate and reviewer-scoped,
/// publish is job-gated and stamps the published date, reject is a wildcard.
pub(crate) fn editorial_workflow() -> Workflow {
    let states: BTreeMap<String, State> = ["DRAFT", "PENDING", "PUBLISHED", "REJECTED"]
        .into_iter()
        .map(|name| (name.to_string(), mk_state(name)))
        .collect();

    Workflow {
        name: "editorial".to_string(),
        version: 1,
        initial_state: "DRAFT".to_string(),
        states,
        transitions: vec![
            mk_transition("submit", Some("DRAFT"), "PENDING"),
            Transition {
                requires_job: true,
                job_type: Some(JobType::Publish),
                required_scopes: vec!["submission:publish".to_string()],
                options: TransitionOptions {
                    sets_published_date: true,
                },
                ..mk_transition("publish", Some("PENDING"), "PUBLISHED")
            },
            mk_transition("reject", None, "REJECTED"),
        ],
    }
}

/// Editorial workflow with an extra VALIDATED state reached through a
/// check-gated transition that runs in process.
pub(crate) fn check_gated_workflow() -> Workflow {
    let mut workflow = editorial_workflow();
    workflow
        .states
        .insert("VALIDATED".to_string(), mk_state("VALIDATED"));
    workflow.transitions.push(Transition {
        requires_job: true,
        job_type: Some(JobType::Check),
        required_scopes: vec!["submission:review".to_string()],
        ..mk_transition("validate", Some("PENDING"), "VALIDATED")
    });
    workflow
}
