//! Per-operation handlers for database instances
//!
//! Every handler is invoked with the desired model and the context returned
//! by its previous invocation, and answers with a [`HandlerEvent`]. The
//! pipelines are fixed per operation:
//!
//! | Operation | Stages |
//! |-----------|--------|
//! | Create | create, modify-after-create, tags, roles |
//! | Update | modify, reboot, tags, roles |
//! | Delete | delete, await-deletion |
//! | Read | describe only |
//! | List | one page of instances |

mod create;
mod delete;
mod list;
mod read;
mod update;

use crate::config::HandlerConfig;
use crate::model::{DbInstance, ObservedInstance, Tag};
use crate::provider::{DbApi, InstancePage};
use crate::tagging::TagSet;
use reconcile::{
    CallbackContext, Clock, Operation, Poller, ProgressEvent, ProviderError, StrategyTable,
};
use serde::Serialize;

/// What a successful handler returns
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HandlerOutput {
    Instance(ObservedInstance),
    Page(InstancePage),
}

pub type HandlerEvent = ProgressEvent<DbInstance, HandlerOutput>;

/// Inputs for one handler invocation
#[derive(Debug, Clone, Default)]
pub struct HandlerRequest {
    pub desired: DbInstance,
    /// Desired model of the last successful operation, for updates
    pub previous: Option<DbInstance>,
    pub system_tags: Vec<Tag>,
    pub stack_tags: Vec<Tag>,
    pub previous_stack_tags: Vec<Tag>,
    pub context: CallbackContext,
    /// Continuation token for List
    pub next_token: Option<String>,
}

impl HandlerRequest {
    pub fn new(desired: DbInstance) -> Self {
        Self {
            desired,
            ..Self::default()
        }
    }

    pub fn desired_tags(&self) -> TagSet {
        TagSet {
            system: self.system_tags.clone(),
            stack: self.stack_tags.clone(),
            resource: self.desired.tags.clone(),
        }
    }

    pub fn previous_tags(&self) -> TagSet {
        TagSet {
            system: self.system_tags.clone(),
            stack: self.previous_stack_tags.clone(),
            resource: self
                .previous
                .as_ref()
                .map(|p| p.tags.clone())
                .unwrap_or_default(),
        }
    }
}

/// API version used for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    Current,
    /// Still accepts DB security groups
    Legacy,
}

/// Handlers sharing one provider client, config and clock
pub struct Handlers<'a> {
    api: &'a dyn DbApi,
    legacy_api: &'a dyn DbApi,
    config: HandlerConfig,
    clock: &'a dyn Clock,
    versions: StrategyTable<DbInstance, ApiVersion>,
}

impl<'a> Handlers<'a> {
    pub fn new(api: &'a dyn DbApi, config: HandlerConfig, clock: &'a dyn Clock) -> Self {
        Self {
            api,
            legacy_api: api,
            config,
            clock,
            versions: StrategyTable::new()
                .when(DbInstance::uses_legacy_security_groups, ApiVersion::Legacy)
                .otherwise(ApiVersion::Current),
        }
    }

    /// Client used for models that need the legacy API version
    pub fn with_legacy_api(mut self, api: &'a dyn DbApi) -> Self {
        self.legacy_api = api;
        self
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn api_version(&self, model: &DbInstance) -> ApiVersion {
        self.versions
            .select(model)
            .copied()
            .unwrap_or(ApiVersion::Current)
    }

    /// Client for mutating calls on `model`
    fn client_for(&self, model: &DbInstance) -> &'a dyn DbApi {
        match self.api_version(model) {
            ApiVersion::Current => self.api,
            ApiVersion::Legacy => self.legacy_api,
        }
    }

    fn poller(&self) -> Poller<'a> {
        Poller::new(self.config.backoff_policy(), self.clock)
    }

    fn probe_threshold(&self) -> u32 {
        self.config.probe_threshold
    }

    /// Describe the instance for a success event
    fn read_output(&self, identifier: &str) -> Result<Option<HandlerOutput>, ProviderError> {
        self.api
            .describe_db_instance(identifier)
            .map(|observed| Some(HandlerOutput::Instance(observed)))
    }

    /// Run one invocation of `operation`
    pub fn handle(&self, operation: Operation, request: HandlerRequest) -> HandlerEvent {
        log::debug!("{operation} {}: invoked", request.desired.identifier);
        match operation {
            Operation::Create => create::handle(self, request),
            Operation::Read => read::handle(self, request),
            Operation::Update => update::handle(self, request),
            Operation::Delete => delete::handle(self, request),
            Operation::List => list::handle(self, request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedDb;
    use reconcile::ManualClock;

    #[test]
    fn test_legacy_api_selected_for_security_groups() {
        let db = SimulatedDb::new();
        let clock = ManualClock::default();
        let handlers = Handlers::new(&db, HandlerConfig::default(), &clock);

        let mut model = DbInstance::new("db1");
        assert_eq!(handlers.api_version(&model), ApiVersion::Current);

        model.db_security_groups = vec!["default".to_string()];
        assert_eq!(handlers.api_version(&model), ApiVersion::Legacy);
    }

    #[test]
    fn test_tag_sets_from_request() {
        let mut request = HandlerRequest::new(DbInstance {
            tags: vec![Tag::new("env", "prod")],
            ..DbInstance::new("db1")
        });
        request.previous = Some(DbInstance {
            tags: vec![Tag::new("env", "dev")],
            ..DbInstance::new("db1")
        });
        request.stack_tags = vec![Tag::new("team", "db")];

        assert_eq!(request.desired_tags().resource, vec![Tag::new("env", "prod")]);
        assert_eq!(request.previous_tags().resource, vec![Tag::new("env", "dev")]);
        assert!(request.previous_tags().stack.is_empty());
    }
}
