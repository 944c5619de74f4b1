//! In-memory control plane for tests and scenario replay
//!
//! Mutations put the instance into a transitional status that settles
//! after a configurable number of describe calls. Errors can be injected
//! per API call, and every call is counted.

use crate::model::{DbRole, GroupMembership, ObservedInstance, ObservedRole, Tag};
use crate::provider::{
    ApiResult, CreateInstanceRequest, DbApi, DeleteInstanceRequest, InstancePage,
    ModifyInstanceRequest, ReadReplicaRequest, RebootRequest, RestoreInstanceRequest, RoleRequest,
    TagRequest, UntagRequest,
};
use crate::rules::codes;
use crate::status::{AVAILABLE, DELETING, IN_SYNC, PENDING_REBOOT, ROLE_ACTIVE};
use reconcile::ProviderError;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};

/// Every API name the simulator answers to
pub const API_CALLS: &[&str] = &[
    "create_db_instance",
    "restore_db_instance_from_snapshot",
    "create_db_instance_read_replica",
    "modify_db_instance",
    "reboot_db_instance",
    "delete_db_instance",
    "describe_db_instance",
    "list_db_instances",
    "add_role_to_db_instance",
    "remove_role_from_db_instance",
    "add_tags_to_resource",
    "remove_tags_from_resource",
];

const ROLE_PENDING: &str = "PENDING";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settle {
    Available,
    Gone,
}

#[derive(Debug)]
struct SimInstance {
    observed: ObservedInstance,
    /// Describe calls left before the instance settles
    remaining: u32,
    settle: Settle,
    /// Statuses reported by the next describe calls, before anything else
    script: VecDeque<String>,
}

#[derive(Debug, Default)]
struct SimState {
    instances: BTreeMap<String, SimInstance>,
    failures: BTreeMap<String, VecDeque<ProviderError>>,
    calls: Vec<String>,
}

/// Simulated database control plane
#[derive(Debug)]
pub struct SimulatedDb {
    state: RefCell<SimState>,
    settle_after: u32,
    page_size: usize,
}

impl Default for SimulatedDb {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(identifier: &str) -> ProviderError {
    ProviderError::service(
        codes::DB_INSTANCE_NOT_FOUND,
        format!("DBInstance {identifier} not found."),
    )
}

fn settle(instance: &mut SimInstance) {
    let observed = &mut instance.observed;
    observed.status = AVAILABLE.to_string();
    observed.pending_modifications = false;
    for role in &mut observed.associated_roles {
        role.status = ROLE_ACTIVE.to_string();
    }
    for group in &mut observed.option_groups {
        group.status = IN_SYNC.to_string();
    }
    for group in &mut observed.parameter_groups {
        if group.status != PENDING_REBOOT {
            group.status = IN_SYNC.to_string();
        }
    }
}

impl SimulatedDb {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(SimState::default()),
            settle_after: 0,
            page_size: 20,
        }
    }

    /// Number of describe calls a transitional status survives
    pub fn settle_after(mut self, describes: u32) -> Self {
        self.settle_after = describes;
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Insert or replace an instance as-is
    pub fn seed(&self, observed: ObservedInstance) {
        let identifier = observed.identifier.clone();
        self.state.borrow_mut().instances.insert(
            identifier,
            SimInstance {
                observed,
                remaining: 0,
                settle: Settle::Available,
                script: VecDeque::new(),
            },
        );
    }

    /// Attach an active role to a seeded instance
    pub fn attach_role(&self, identifier: &str, role: &DbRole) {
        if let Some(instance) = self.state.borrow_mut().instances.get_mut(identifier) {
            instance.observed.associated_roles.push(ObservedRole {
                role_arn: role.role_arn.clone(),
                feature_name: role.feature_name.clone(),
                status: ROLE_ACTIVE.to_string(),
            });
        }
    }

    /// Report these statuses on the next describe calls
    pub fn script(&self, identifier: &str, statuses: &[&str]) {
        if let Some(instance) = self.state.borrow_mut().instances.get_mut(identifier) {
            instance
                .script
                .extend(statuses.iter().map(|s| (*s).to_string()));
        }
    }

    /// Fail the next call to `api` with `err`
    pub fn fail_next(&self, api: &str, err: ProviderError) {
        self.state
            .borrow_mut()
            .failures
            .entry(api.to_string())
            .or_default()
            .push_back(err);
    }

    /// How many times `api` was called
    pub fn calls(&self, api: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.as_str() == api)
            .count()
    }

    /// Every call in order
    pub fn call_log(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn instance(&self, identifier: &str) -> Option<ObservedInstance> {
        self.state
            .borrow()
            .instances
            .get(identifier)
            .map(|i| i.observed.clone())
    }

    pub fn tags(&self, identifier: &str) -> Vec<Tag> {
        self.instance(identifier)
            .map(|o| o.tags)
            .unwrap_or_default()
    }

    pub fn roles(&self, identifier: &str) -> Vec<DbRole> {
        self.instance(identifier)
            .map(|o| {
                o.associated_roles
                    .into_iter()
                    .map(|r| DbRole::new(r.role_arn, r.feature_name))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record the call and pop an injected failure, if any
    fn enter(&self, api: &str) -> ApiResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(api.to_string());
        match state.failures.get_mut(api).and_then(VecDeque::pop_front) {
            Some(err) => {
                log::debug!("sim {api}: injected '{err}'");
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Put an existing instance into `status` until it settles
    fn transition(
        &self,
        identifier: &str,
        status: &str,
        settle_to: Settle,
    ) -> ApiResult<ObservedInstance> {
        let mut state = self.state.borrow_mut();
        let instance = state
            .instances
            .get_mut(identifier)
            .ok_or_else(|| not_found(identifier))?;
        instance.observed.status = status.to_string();
        instance.remaining = self.settle_after;
        instance.settle = settle_to;
        if self.settle_after == 0 && settle_to == Settle::Available {
            settle(instance);
        }
        let observed = instance.observed.clone();
        if self.settle_after == 0 && settle_to == Settle::Gone {
            state.instances.remove(identifier);
        }
        Ok(observed)
    }

    fn insert_new(&self, observed: ObservedInstance) -> ApiResult<ObservedInstance> {
        let mut state = self.state.borrow_mut();
        if state.instances.contains_key(&observed.identifier) {
            return Err(ProviderError::service(
                codes::DB_INSTANCE_ALREADY_EXISTS,
                format!("DB instance already exists: {}", observed.identifier),
            ));
        }
        let mut instance = SimInstance {
            observed,
            remaining: self.settle_after,
            settle: Settle::Available,
            script: VecDeque::new(),
        };
        if self.settle_after == 0 {
            settle(&mut instance);
        }
        let snapshot = instance.observed.clone();
        state
            .instances
            .insert(snapshot.identifier.clone(), instance);
        Ok(snapshot)
    }

    fn creating(identifier: &str, tags: &[Tag]) -> ObservedInstance {
        ObservedInstance {
            identifier: identifier.to_string(),
            status: "creating".to_string(),
            tags: tags.to_vec(),
            endpoint: Some(format!("{identifier}.sim.local:5432")),
            ..ObservedInstance::default()
        }
    }

    fn reject_security_groups(groups: &[String]) -> ApiResult<()> {
        if groups.is_empty() {
            return Ok(());
        }
        Err(ProviderError::service(
            codes::INVALID_PARAMETER_COMBINATION,
            "DB security groups are only accepted by the legacy API",
        ))
    }

    fn create(&self, request: &CreateInstanceRequest) -> ApiResult<ObservedInstance> {
        let mut observed = Self::creating(&request.identifier, &request.tags);
        observed.engine = request.engine.clone();
        observed.engine_version = request.engine_version.clone();
        observed.instance_class = request.instance_class.clone();
        observed.allocated_storage = request.allocated_storage;
        if let Some(group) = &request.db_parameter_group {
            observed.parameter_groups = vec![GroupMembership::new(group, "applying")];
        }
        if let Some(group) = &request.option_group {
            observed.option_groups = vec![GroupMembership::new(group, "applying")];
        }
        self.insert_new(observed)
    }

    fn modify(&self, request: &ModifyInstanceRequest) -> ApiResult<ObservedInstance> {
        {
            let mut state = self.state.borrow_mut();
            let instance = state
                .instances
                .get_mut(&request.identifier)
                .ok_or_else(|| not_found(&request.identifier))?;
            let observed = &mut instance.observed;

            if let Some(group) = &request.db_parameter_group {
                let changed = observed.parameter_groups.iter().all(|g| &g.name != group);
                if changed {
                    observed.parameter_groups =
                        vec![GroupMembership::new(group, PENDING_REBOOT)];
                }
            }
            if let Some(group) = &request.option_group {
                observed.option_groups = vec![GroupMembership::new(group, "applying")];
            }
            if request.engine_version.is_some() {
                observed.engine_version = request.engine_version.clone();
            }
            if request.instance_class.is_some() {
                observed.instance_class = request.instance_class.clone();
            }
            if request.allocated_storage.is_some() {
                observed.allocated_storage = request.allocated_storage;
            }
            observed.pending_modifications = true;
        }
        self.transition(&request.identifier, "modifying", Settle::Available)
    }

    fn apply_tick(instance: &mut SimInstance) -> Option<Settle> {
        if instance.remaining == 0 {
            return None;
        }
        instance.remaining -= 1;
        (instance.remaining == 0).then_some(instance.settle)
    }

    fn describe(&self, identifier: &str) -> ApiResult<ObservedInstance> {
        let mut state = self.state.borrow_mut();
        let instance = state
            .instances
            .get_mut(identifier)
            .ok_or_else(|| not_found(identifier))?;

        if let Some(status) = instance.script.pop_front() {
            let mut observed = instance.observed.clone();
            observed.status = status;
            return Ok(observed);
        }

        match Self::apply_tick(instance) {
            Some(Settle::Available) => settle(instance),
            Some(Settle::Gone) => {
                state.instances.remove(identifier);
                return Err(not_found(identifier));
            }
            None => {}
        }
        Ok(instance.observed.clone())
    }

    /// Client view that accepts legacy security groups
    pub fn legacy(&self) -> LegacyClient<'_> {
        LegacyClient { db: self }
    }

    fn create_any(
        &self,
        request: &CreateInstanceRequest,
        legacy: bool,
    ) -> ApiResult<ObservedInstance> {
        if !legacy {
            Self::reject_security_groups(&request.db_security_groups)?;
        }
        self.create(request)
    }

    fn modify_any(
        &self,
        request: &ModifyInstanceRequest,
        legacy: bool,
    ) -> ApiResult<ObservedInstance> {
        if !legacy {
            Self::reject_security_groups(&request.db_security_groups)?;
        }
        self.modify(request)
    }
}

impl DbApi for SimulatedDb {
    fn create_db_instance(&self, request: &CreateInstanceRequest) -> ApiResult<ObservedInstance> {
        self.enter("create_db_instance")?;
        self.create_any(request, false)
    }

    fn restore_db_instance_from_snapshot(
        &self,
        request: &RestoreInstanceRequest,
    ) -> ApiResult<ObservedInstance> {
        self.enter("restore_db_instance_from_snapshot")?;
        let mut observed = Self::creating(&request.identifier, &request.tags);
        observed.instance_class = request.instance_class.clone();
        self.insert_new(observed)
    }

    fn create_db_instance_read_replica(
        &self,
        request: &ReadReplicaRequest,
    ) -> ApiResult<ObservedInstance> {
        self.enter("create_db_instance_read_replica")?;
        let source = self
            .instance(&request.source_identifier)
            .ok_or_else(|| not_found(&request.source_identifier))?;
        let mut observed = Self::creating(&request.identifier, &request.tags);
        observed.engine = source.engine;
        observed.engine_version = source.engine_version;
        observed.instance_class = request.instance_class.clone().or(source.instance_class);
        self.insert_new(observed)
    }

    fn modify_db_instance(&self, request: &ModifyInstanceRequest) -> ApiResult<ObservedInstance> {
        self.enter("modify_db_instance")?;
        self.modify_any(request, false)
    }

    fn reboot_db_instance(&self, request: &RebootRequest) -> ApiResult<ObservedInstance> {
        self.enter("reboot_db_instance")?;
        {
            let mut state = self.state.borrow_mut();
            let instance = state
                .instances
                .get_mut(&request.identifier)
                .ok_or_else(|| not_found(&request.identifier))?;
            for group in &mut instance.observed.parameter_groups {
                group.status = "applying".to_string();
            }
        }
        self.transition(&request.identifier, "rebooting", Settle::Available)
    }

    fn delete_db_instance(&self, request: &DeleteInstanceRequest) -> ApiResult<ObservedInstance> {
        self.enter("delete_db_instance")?;
        let already_deleting = self
            .instance(&request.identifier)
            .ok_or_else(|| not_found(&request.identifier))?
            .status
            == DELETING;
        if already_deleting {
            return Err(ProviderError::service(
                codes::INVALID_DB_INSTANCE_STATE,
                format!("Instance {} is already being deleted.", request.identifier),
            ));
        }
        self.transition(&request.identifier, DELETING, Settle::Gone)
    }

    fn describe_db_instance(&self, identifier: &str) -> ApiResult<ObservedInstance> {
        self.enter("describe_db_instance")?;
        self.describe(identifier)
    }

    fn list_db_instances(&self, next_token: Option<&str>) -> ApiResult<InstancePage> {
        self.enter("list_db_instances")?;
        let start = match next_token {
            Some(token) => token.parse::<usize>().map_err(|_| {
                ProviderError::service("InvalidParameterValue", format!("bad token {token}"))
            })?,
            None => 0,
        };

        let state = self.state.borrow();
        let instances: Vec<ObservedInstance> = state
            .instances
            .values()
            .skip(start)
            .take(self.page_size)
            .map(|i| i.observed.clone())
            .collect();
        let end = start + instances.len();
        let next_token = (end < state.instances.len()).then(|| end.to_string());
        Ok(InstancePage {
            instances,
            next_token,
        })
    }

    fn add_role_to_db_instance(&self, request: &RoleRequest) -> ApiResult<()> {
        self.enter("add_role_to_db_instance")?;
        let mut state = self.state.borrow_mut();
        let instance = state
            .instances
            .get_mut(&request.identifier)
            .ok_or_else(|| not_found(&request.identifier))?;
        let role = DbRole::new(&request.role_arn, &request.feature_name);
        if instance.observed.role(&role).is_some() {
            return Err(ProviderError::service(
                codes::ROLE_ALREADY_EXISTS,
                format!("Role {} is already associated", request.role_arn),
            ));
        }

        let status = if self.settle_after == 0 {
            ROLE_ACTIVE
        } else {
            ROLE_PENDING
        };
        instance.observed.associated_roles.push(ObservedRole {
            role_arn: request.role_arn.clone(),
            feature_name: request.feature_name.clone(),
            status: status.to_string(),
        });
        if self.settle_after > 0 {
            instance.remaining = self.settle_after;
            instance.settle = Settle::Available;
        }
        Ok(())
    }

    fn remove_role_from_db_instance(&self, request: &RoleRequest) -> ApiResult<()> {
        self.enter("remove_role_from_db_instance")?;
        let mut state = self.state.borrow_mut();
        let instance = state
            .instances
            .get_mut(&request.identifier)
            .ok_or_else(|| not_found(&request.identifier))?;
        let role = DbRole::new(&request.role_arn, &request.feature_name);
        if instance.observed.role(&role).is_none() {
            return Err(ProviderError::service(
                codes::ROLE_NOT_FOUND,
                format!("Role {} is not associated", request.role_arn),
            ));
        }
        instance.observed.associated_roles.retain(|r| !r.matches(&role));
        Ok(())
    }

    fn add_tags_to_resource(&self, request: &TagRequest) -> ApiResult<()> {
        self.enter("add_tags_to_resource")?;
        let mut state = self.state.borrow_mut();
        let instance = state
            .instances
            .get_mut(&request.identifier)
            .ok_or_else(|| not_found(&request.identifier))?;
        for tag in &request.tags {
            instance.observed.tags.retain(|t| t.key != tag.key);
            instance.observed.tags.push(tag.clone());
        }
        Ok(())
    }

    fn remove_tags_from_resource(&self, request: &UntagRequest) -> ApiResult<()> {
        self.enter("remove_tags_from_resource")?;
        let mut state = self.state.borrow_mut();
        let instance = state
            .instances
            .get_mut(&request.identifier)
            .ok_or_else(|| not_found(&request.identifier))?;
        instance
            .observed
            .tags
            .retain(|t| !request.keys.contains(&t.key));
        Ok(())
    }
}

/// The simulator seen through the legacy API version
///
/// Calls are recorded with a `legacy.` prefix.
#[derive(Debug, Clone, Copy)]
pub struct LegacyClient<'a> {
    db: &'a SimulatedDb,
}

impl LegacyClient<'_> {
    fn enter(&self, api: &str) -> ApiResult<()> {
        self.db.enter(&format!("legacy.{api}"))
    }
}

impl DbApi for LegacyClient<'_> {
    fn create_db_instance(&self, request: &CreateInstanceRequest) -> ApiResult<ObservedInstance> {
        self.enter("create_db_instance")?;
        self.db.create_any(request, true)
    }

    fn restore_db_instance_from_snapshot(
        &self,
        request: &RestoreInstanceRequest,
    ) -> ApiResult<ObservedInstance> {
        self.db.restore_db_instance_from_snapshot(request)
    }

    fn create_db_instance_read_replica(
        &self,
        request: &ReadReplicaRequest,
    ) -> ApiResult<ObservedInstance> {
        self.db.create_db_instance_read_replica(request)
    }

    fn modify_db_instance(&self, request: &ModifyInstanceRequest) -> ApiResult<ObservedInstance> {
        self.enter("modify_db_instance")?;
        self.db.modify_any(request, true)
    }

    fn reboot_db_instance(&self, request: &RebootRequest) -> ApiResult<ObservedInstance> {
        self.db.reboot_db_instance(request)
    }

    fn delete_db_instance(&self, request: &DeleteInstanceRequest) -> ApiResult<ObservedInstance> {
        self.db.delete_db_instance(request)
    }

    fn describe_db_instance(&self, identifier: &str) -> ApiResult<ObservedInstance> {
        self.db.describe_db_instance(identifier)
    }

    fn list_db_instances(&self, next_token: Option<&str>) -> ApiResult<InstancePage> {
        self.db.list_db_instances(next_token)
    }

    fn add_role_to_db_instance(&self, request: &RoleRequest) -> ApiResult<()> {
        self.db.add_role_to_db_instance(request)
    }

    fn remove_role_from_db_instance(&self, request: &RoleRequest) -> ApiResult<()> {
        self.db.remove_role_from_db_instance(request)
    }

    fn add_tags_to_resource(&self, request: &TagRequest) -> ApiResult<()> {
        self.db.add_tags_to_resource(request)
    }

    fn remove_tags_from_resource(&self, request: &UntagRequest) -> ApiResult<()> {
        self.db.remove_tags_from_resource(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(identifier: &str) -> CreateInstanceRequest {
        CreateInstanceRequest {
            identifier: identifier.to_string(),
            ..CreateInstanceRequest::default()
        }
    }

    #[test]
    fn test_created_instance_settles_after_describes() {
        let db = SimulatedDb::new().settle_after(2);
        let created = db.create_db_instance(&create("db1")).unwrap();
        assert_eq!(created.status, "creating");

        assert_eq!(db.describe_db_instance("db1").unwrap().status, "creating");
        assert_eq!(db.describe_db_instance("db1").unwrap().status, AVAILABLE);
        assert_eq!(db.calls("describe_db_instance"), 2);
    }

    #[test]
    fn test_duplicate_create_is_already_exists() {
        let db = SimulatedDb::new();
        db.create_db_instance(&create("db1")).unwrap();
        let err = db.create_db_instance(&create("db1")).unwrap_err();
        assert!(err.has_code(codes::DB_INSTANCE_ALREADY_EXISTS));
    }

    #[test]
    fn test_injected_failure_is_consumed_once() {
        let db = SimulatedDb::new();
        db.fail_next(
            "create_db_instance",
            ProviderError::service("InstanceQuotaExceeded", "quota"),
        );

        assert!(db.create_db_instance(&create("db1")).is_err());
        assert!(db.create_db_instance(&create("db1")).is_ok());
        assert_eq!(db.calls("create_db_instance"), 2);
    }

    #[test]
    fn test_delete_goes_away_and_rejects_second_delete() {
        let db = SimulatedDb::new().settle_after(1);
        db.seed(ObservedInstance {
            identifier: "db1".to_string(),
            status: AVAILABLE.to_string(),
            ..ObservedInstance::default()
        });
        let request = DeleteInstanceRequest {
            identifier: "db1".to_string(),
            skip_final_snapshot: true,
            final_snapshot_identifier: None,
        };

        db.delete_db_instance(&request).unwrap();
        let err = db.delete_db_instance(&request).unwrap_err();
        assert!(err.message.contains("already being deleted"));

        let err = db.describe_db_instance("db1").unwrap_err();
        assert!(err.has_code(codes::DB_INSTANCE_NOT_FOUND));
    }

    #[test]
    fn test_scripted_statuses_come_first() {
        let db = SimulatedDb::new();
        db.seed(ObservedInstance {
            identifier: "db1".to_string(),
            status: AVAILABLE.to_string(),
            ..ObservedInstance::default()
        });
        db.script("db1", &["modifying", "failed"]);

        assert_eq!(db.describe_db_instance("db1").unwrap().status, "modifying");
        assert_eq!(db.describe_db_instance("db1").unwrap().status, "failed");
        assert_eq!(db.describe_db_instance("db1").unwrap().status, AVAILABLE);
    }

    #[test]
    fn test_list_pages() {
        let db = SimulatedDb::new().page_size(2);
        for id in ["a", "b", "c"] {
            db.create_db_instance(&create(id)).unwrap();
        }

        let first = db.list_db_instances(None).unwrap();
        assert_eq!(first.instances.len(), 2);
        assert_eq!(first.next_token.as_deref(), Some("2"));

        let second = db.list_db_instances(first.next_token.as_deref()).unwrap();
        assert_eq!(second.instances.len(), 1);
        assert_eq!(second.next_token, None);
    }

    #[test]
    fn test_only_legacy_client_accepts_security_groups() {
        let db = SimulatedDb::new();
        let mut request = create("db1");
        request.db_security_groups = vec!["default".to_string()];

        let err = db.create_db_instance(&request).unwrap_err();
        assert!(err.has_code(codes::INVALID_PARAMETER_COMBINATION));

        db.legacy().create_db_instance(&request).unwrap();
        assert_eq!(db.calls("legacy.create_db_instance"), 1);
    }

    #[test]
    fn test_modified_parameter_group_needs_reboot() {
        let db = SimulatedDb::new();
        db.create_db_instance(&create("db1")).unwrap();
        db.modify_db_instance(&ModifyInstanceRequest {
            identifier: "db1".to_string(),
            db_parameter_group: Some("custom".to_string()),
            ..ModifyInstanceRequest::default()
        })
        .unwrap();

        let observed = db.describe_db_instance("db1").unwrap();
        assert_eq!(observed.parameter_groups[0].status, PENDING_REBOOT);

        db.reboot_db_instance(&RebootRequest {
            identifier: "db1".to_string(),
        })
        .unwrap();
        let observed = db.describe_db_instance("db1").unwrap();
        assert_eq!(observed.parameter_groups[0].status, IN_SYNC);
    }
}
