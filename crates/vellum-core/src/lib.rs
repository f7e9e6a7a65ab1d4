pub mod checks;
pub mod config;
pub mod events;
pub mod types;
pub mod validation;
pub mod workflow;

pub use checks::*;
pub use config::*;
pub use events::*;
pub use types::*;
pub use validation::*;
pub use workflow::*;

#[cfg(test)]
mod tests {
    use super::{parse_engine_config, CompiledReport, Job, JobId, JobStatus, JobType, SubmissionVersion, Validate, Workflow};
    use std::any::TypeId;

    #[test]
    fn crate_root_reexports_core_types() {
        let _ = TypeId::of::<Job>();
        let _ = TypeId::of::<JobId>();
        let _ = TypeId::of::<JobStatus>();
        let _ = TypeId::of::<JobType>();
        let _ = TypeId::of::<SubmissionVersion>();
        let _ = TypeId::of::<Workflow>();
        let _ = TypeId::of::<CompiledReport>();
    }

    #[test]
    fn crate_root_reexports_parse_and_validate_helpers() {
        let config = parse_engine_config(
            r#"
[site]
bind = "127.0.0.1:9843"
base_url = "https://press.example"

[token]
issuer = "vellum"
ttl_secs = 900

[workflows]
default = "editorial"

[[workflow]]
name = "editorial"
version = 1
initial_state = "DRAFT"

[workflow.states.DRAFT]
name = "DRAFT"
label = "Draft"
"#,
        )
        .expect("parse config");

        assert!(config.validate().is_empty());
    }
}
