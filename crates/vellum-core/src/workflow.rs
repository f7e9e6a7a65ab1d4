//! Workflow definition: the configured state machine governing a submission
//! version's editorial status.
//!
//! A workflow is pure data. Transition legality is answered by lookups over
//! the loaded graph; shape problems (dangling targets, ambiguous edges) are
//! rejected eagerly at load time by [`crate::validation`], never at lookup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::JobType;

/// An editorial state. The boolean flags carry no behavior here; they are
/// read by downstream UI and by the attention-inbox query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub author_only: bool,
    #[serde(default)]
    pub inbox: bool,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransitionOptions {
    /// Stamp `published_at` on the submission version when the transition is
    /// finalized.
    #[serde(default)]
    pub sets_published_date: bool,
}

/// An edge in the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub name: String,
    /// `None` means the transition is valid from any state.
    #[serde(default)]
    pub source_state: Option<String>,
    pub target_state: String,
    #[serde(default)]
    pub required_scopes: Vec<String>,
    #[serde(default)]
    pub requires_job: bool,
    #[serde(default)]
    pub job_type: Option<JobType>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub options: TransitionOptions,
}

impl Transition {
    /// Whether this transition applies when moving from `from` to its target.
    pub fn matches(&self, from: &str, to: &str) -> bool {
        self.target_state == to
            && self
                .source_state
                .as_deref()
                .map(|source| source == from)
                .unwrap_or(true)
    }
}

/// A configured workflow, immutable once loaded for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub version: u32,
    pub initial_state: String,
    pub states: BTreeMap<String, State>,
    /// A workflow with no transitions is valid data; its versions just never
    /// leave the initial state.
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl Workflow {
    /// Find the transition for `(from, to)`: either an exact source match or
    /// a wildcard source, first match wins. Load-time validation guarantees
    /// there is at most one candidate per pair.
    pub fn valid_transition(&self, from: &str, to: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.matches(from, to))
    }

    /// All transitions available out of `status`, used to render actions.
    pub fn transitions_from(&self, status: &str) -> Vec<&Transition> {
        self.transitions
            .iter()
            .filter(|t| {
                t.source_state
                    .as_deref()
                    .map(|source| source == status)
                    .unwrap_or(true)
            })
            .collect()
    }

    /// All transitions into `status`, used to discover state predecessors.
    pub fn transitions_to(&self, status: &str) -> Vec<&Transition> {
        self.transitions
            .iter()
            .filter(|t| t.target_state == status)
            .collect()
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }
}
