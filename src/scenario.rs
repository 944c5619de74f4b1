//! Scenario files: one operation replayed against the simulator
//!
//! ```toml
//! operation = "create"
//!
//! [desired]
//! identifier = "orders"
//! engine = "postgres"
//! tags = [{ key = "env", value = "prod" }]
//!
//! [simulator]
//! settle_after = 2
//!
//! [[simulator.failures]]
//! api = "create_db_instance"
//! code = "AccessDenied"
//! message = "not authorized to tag"
//! ```

use crate::error::{Error, Result};
use crate::handlers::HandlerRequest;
use crate::model::{DbInstance, ObservedInstance, Tag};
use crate::sim::{API_CALLS, SimulatedDb};
use anyhow::Context;
use reconcile::{ErrorCategory, Operation, ProviderError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub operation: Operation,

    #[serde(default)]
    pub desired: DbInstance,

    /// Desired model of the last successful operation (updates)
    #[serde(default)]
    pub previous: Option<DbInstance>,

    #[serde(default)]
    pub system_tags: Vec<Tag>,

    #[serde(default)]
    pub stack_tags: Vec<Tag>,

    #[serde(default)]
    pub previous_stack_tags: Vec<Tag>,

    #[serde(default)]
    pub next_token: Option<String>,

    #[serde(default)]
    pub max_invocations: Option<usize>,

    #[serde(default)]
    pub simulator: SimulatorSpec,
}

/// Initial simulator state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSpec {
    /// Describe calls before a transitional status settles
    pub settle_after: u32,
    pub page_size: Option<usize>,
    pub instances: Vec<ObservedInstance>,
    pub failures: Vec<FailureSpec>,
    /// Statuses reported by the next describe calls, per instance
    pub scripts: Vec<ScriptSpec>,
}

/// An error injected into the next call of `api`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSpec {
    pub api: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub category: Option<ErrorCategory>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSpec {
    pub identifier: String,
    pub statuses: Vec<String>,
}

impl FailureSpec {
    pub fn to_error(&self) -> ProviderError {
        let category = self.category.unwrap_or(ErrorCategory::Service);
        ProviderError {
            code: self.code.clone(),
            category,
            message: self.message.clone(),
        }
    }
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;
        let scenario: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse scenario file: {}", path.display()))?;
        scenario
            .validate()
            .with_context(|| format!("In scenario file: {}", path.display()))?;

        log::debug!("Loaded scenario from {}", path.display());
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.operation != Operation::List && self.desired.identifier.is_empty() {
            return Err(Error::Scenario(format!(
                "{} needs desired.identifier",
                self.operation
            )));
        }
        if self.operation == Operation::Update && self.previous.is_none() {
            return Err(Error::Scenario("update needs a previous model".to_string()));
        }
        for failure in &self.simulator.failures {
            if !API_CALLS.contains(&failure.api.as_str()) {
                return Err(Error::Scenario(format!(
                    "unknown api '{}' (expected one of: {})",
                    failure.api,
                    API_CALLS.join(", ")
                )));
            }
            if failure.code.is_none() && failure.category.is_none() {
                return Err(Error::Scenario(format!(
                    "failure for '{}' needs a code or a category",
                    failure.api
                )));
            }
        }
        if let Some(script) = self
            .simulator
            .scripts
            .iter()
            .find(|s| !self.simulator.instances.iter().any(|i| i.identifier == s.identifier))
        {
            return Err(Error::Scenario(format!(
                "script for '{}' has no seeded instance",
                script.identifier
            )));
        }
        Ok(())
    }

    /// Fresh simulator in the scenario's initial state
    pub fn simulator(&self) -> SimulatedDb {
        let spec = &self.simulator;
        let mut db = SimulatedDb::new().settle_after(spec.settle_after);
        if let Some(size) = spec.page_size {
            db = db.page_size(size);
        }
        for instance in &spec.instances {
            db.seed(instance.clone());
        }
        for failure in &spec.failures {
            db.fail_next(&failure.api, failure.to_error());
        }
        for script in &spec.scripts {
            let statuses: Vec<&str> = script.statuses.iter().map(String::as_str).collect();
            db.script(&script.identifier, &statuses);
        }
        db
    }

    pub fn request(&self) -> HandlerRequest {
        HandlerRequest {
            desired: self.desired.clone(),
            previous: self.previous.clone(),
            system_tags: self.system_tags.clone(),
            stack_tags: self.stack_tags.clone(),
            previous_stack_tags: self.previous_stack_tags.clone(),
            next_token: self.next_token.clone(),
            ..HandlerRequest::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandlerConfig;
    use crate::handlers::{HandlerOutput, Handlers};
    use crate::host::{Host, Outcome};
    use crate::provider::DbApi;
    use reconcile::{ErrorKind, ManualClock, ProgressEvent};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CREATE: &str = r#"
operation = "create"
system_tags = [{ key = "aws:cloudformation:stack-name", value = "app" }]

[desired]
identifier = "orders"
engine = "postgres"
tags = [{ key = "env", value = "prod" }]

[simulator]
settle_after = 2

[[simulator.failures]]
api = "create_db_instance"
code = "AccessDenied"
message = "not authorized to tag"
"#;

    fn write(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_scenario() {
        let file = write(CREATE);
        let scenario = Scenario::load(file.path()).unwrap();

        assert_eq!(scenario.operation, Operation::Create);
        assert_eq!(scenario.desired.identifier, "orders");
        assert_eq!(scenario.simulator.settle_after, 2);

        let request = scenario.request();
        assert_eq!(request.system_tags.len(), 1);
        assert_eq!(request.desired_tags().all().len(), 2);
    }

    #[test]
    fn test_simulator_carries_failures() {
        let scenario: Scenario = toml::from_str(CREATE).unwrap();
        let db = scenario.simulator();

        let err = db
            .create_db_instance(&crate::translate::create_request(&scenario.desired, &[]))
            .unwrap_err();
        assert!(err.has_code("AccessDenied"));
    }

    #[test]
    fn test_unknown_api_is_rejected() {
        let file = write(&CREATE.replace("create_db_instance", "create_database"));
        let err = Scenario::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("unknown api 'create_database'"));
    }

    #[test]
    fn test_update_needs_previous() {
        let scenario: Scenario = toml::from_str(
            r#"
operation = "update"
[desired]
identifier = "orders"
"#,
        )
        .unwrap();
        assert!(matches!(scenario.validate(), Err(Error::Scenario(_))));
    }

    #[test]
    fn test_list_needs_no_identifier() {
        let scenario: Scenario = toml::from_str(r#"operation = "list""#).unwrap();
        assert!(scenario.validate().is_ok());
    }

    fn shipped(name: &str) -> Scenario {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("scenarios")
            .join(name);
        Scenario::load(&path).unwrap()
    }

    fn replay(scenario: &Scenario, db: &SimulatedDb) -> Outcome {
        let clock = ManualClock::default();
        let handlers = Handlers::new(db, HandlerConfig::default(), &clock);
        Host::new(handlers, &clock)
            .drive(scenario.operation, scenario.request())
            .unwrap()
    }

    #[test]
    fn test_shipped_soft_fail_scenario() {
        let scenario = shipped("create-soft-fail-tags.toml");
        let db = scenario.simulator();
        let outcome = replay(&scenario, &db);

        assert!(outcome.event.is_success(), "{:?}", outcome.event);
        assert_eq!(db.calls("create_db_instance"), 2);
        let keys: Vec<String> = db.tags("orders").into_iter().map(|t| t.key).collect();
        assert_eq!(keys, ["aws:cloudformation:stack-name", "team", "env"]);
        assert_eq!(db.roles("orders").len(), 1);
    }

    #[test]
    fn test_shipped_update_scenario_reboots() {
        let scenario = shipped("update-parameter-group.toml");
        let db = scenario.simulator();
        let outcome = replay(&scenario, &db);

        assert!(outcome.event.is_success(), "{:?}", outcome.event);
        assert_eq!(db.calls("reboot_db_instance"), 1);
        assert_eq!(db.tags("orders"), vec![Tag::new("env", "prod")]);
    }

    #[test]
    fn test_shipped_delete_scenario() {
        let scenario = shipped("delete-snapshot.toml");
        let db = scenario.simulator();
        let outcome = replay(&scenario, &db);

        assert!(outcome.event.is_success());
        assert!(outcome.invocations.len() > 1);
        assert!(db.instance("orders").is_none());
    }

    #[test]
    fn test_shipped_list_scenario() {
        let scenario = shipped("list-paged.toml");
        let db = scenario.simulator();
        let outcome = replay(&scenario, &db);

        match outcome.event {
            ProgressEvent::Success {
                observed: Some(HandlerOutput::Page(page)),
            } => {
                assert_eq!(page.instances.len(), 2);
                assert_eq!(page.next_token.as_deref(), Some("2"));
            }
            other => panic!("expected a page, got {other:?}"),
        }
    }

    #[test]
    fn test_shipped_terminal_scenario() {
        let scenario = shipped("update-terminal.toml");
        let db = scenario.simulator();
        let outcome = replay(&scenario, &db);

        assert_eq!(outcome.event.error_kind(), Some(ErrorKind::NotStabilized));
    }

    #[test]
    fn test_category_only_failure() {
        let failure = FailureSpec {
            api: "describe_db_instance".to_string(),
            code: None,
            category: Some(ErrorCategory::Throttling),
            message: "slow down".to_string(),
        };
        let err = failure.to_error();
        assert_eq!(err.code(), None);
        assert_eq!(err.category, ErrorCategory::Throttling);
    }
}
