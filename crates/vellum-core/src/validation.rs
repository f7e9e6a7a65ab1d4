//! Load-time validation for workflows and engine configuration.
//!
//! Workflow shape problems are rejected here, when a deployment loads its
//! configuration, so transition lookup never has to handle dangling targets
//! or ambiguous edges.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::types::JobType;
use crate::workflow::{Transition, Workflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

/// Whether two transitions are ambiguous: some `(from, to)` pair is matched
/// by both. A wildcard source overlaps every explicit source with the same
/// target.
fn edges_overlap(a: &Transition, b: &Transition) -> bool {
    if a.target_state != b.target_state {
        return false;
    }
    match (&a.source_state, &b.source_state) {
        (Some(left), Some(right)) => left == right,
        _ => true,
    }
}

impl Validate for Workflow {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if !self.states.contains_key(&self.initial_state) {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "workflow.initial_state.missing",
                message: format!(
                    "workflow '{}' initial state '{}' is not a defined state",
                    self.name, self.initial_state
                ),
            });
        }

        for transition in &self.transitions {
            if !self.states.contains_key(&transition.target_state) {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "workflow.transition.target_missing",
                    message: format!(
                        "transition '{}' targets unknown state '{}'",
                        transition.name, transition.target_state
                    ),
                });
            }

            if let Some(source) = &transition.source_state {
                if !self.states.contains_key(source) {
                    issues.push(ValidationIssue {
                        level: ValidationLevel::Error,
                        code: "workflow.transition.source_missing",
                        message: format!(
                            "transition '{}' leaves unknown state '{}'",
                            transition.name, source
                        ),
                    });
                }
            }

            if transition.requires_job && transition.job_type.is_none() {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "workflow.transition.job_type_missing",
                    message: format!(
                        "transition '{}' requires a job but names no job type",
                        transition.name
                    ),
                });
            }

            if !transition.requires_job && transition.job_type.is_some() {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Warning,
                    code: "workflow.transition.job_type_unused",
                    message: format!(
                        "transition '{}' names a job type but does not require a job",
                        transition.name
                    ),
                });
            }
        }

        for (index, left) in self.transitions.iter().enumerate() {
            for right in &self.transitions[index + 1..] {
                if edges_overlap(left, right) {
                    issues.push(ValidationIssue {
                        level: ValidationLevel::Error,
                        code: "workflow.transition.ambiguous_edge",
                        message: format!(
                            "transitions '{}' and '{}' both match an edge into '{}'",
                            left.name, right.name, left.target_state
                        ),
                    });
                }
            }
        }

        for (name, state) in &self.states {
            if !state.published {
                continue;
            }
            for transition in self.transitions_to(name) {
                let gated_by_publish = transition.requires_job
                    && transition.job_type == Some(JobType::Publish);
                if !gated_by_publish {
                    issues.push(ValidationIssue {
                        level: ValidationLevel::Error,
                        code: "workflow.published.requires_publish_job",
                        message: format!(
                            "state '{name}' is published but transition '{}' into it is not gated by a publish job",
                            transition.name
                        ),
                    });
                }
            }
        }

        issues
    }
}

impl Validate for EngineConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.token.issuer.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "token.issuer.empty",
                message: "handshake token issuer must not be empty".to_string(),
            });
        }

        if self.token.ttl_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "token.ttl.zero",
                message: "handshake token ttl must be greater than zero".to_string(),
            });
        }

        if self.jobs.check_concurrency == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "jobs.check_concurrency.zero",
                message: "check concurrency must be greater than zero".to_string(),
            });
        }

        if self.jobs.occ_max_retries == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "jobs.occ_max_retries.zero",
                message: "occ retry budget must be greater than zero".to_string(),
            });
        }

        if self.workflow_named(&self.workflows.default).is_none() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "workflows.default.unknown",
                message: format!(
                    "default workflow '{}' is not defined",
                    self.workflows.default
                ),
            });
        }

        for (collection, name) in &self.workflows.collections {
            if self.workflow_named(name).is_none() {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "workflows.collection.unknown",
                    message: format!(
                        "collection '{collection}' references undefined workflow '{name}'"
                    ),
                });
            }
        }

        for workflow in &self.workflow {
            issues.extend(workflow.validate());
        }

        issues
    }
}
