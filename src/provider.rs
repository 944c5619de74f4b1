//! Provider client contract
//!
//! The handlers only ever talk to the control plane through [`DbApi`].
//! Describing a missing instance must fail with a `DBInstanceNotFound`
//! coded [`ProviderError`].

use crate::model::{ObservedInstance, Tag};
use reconcile::ProviderError;
use serde::{Deserialize, Serialize};

pub type ApiResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    pub identifier: String,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub instance_class: Option<String>,
    pub allocated_storage: Option<u32>,
    pub db_parameter_group: Option<String>,
    pub option_group: Option<String>,
    pub db_security_groups: Vec<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RestoreInstanceRequest {
    pub identifier: String,
    pub snapshot_identifier: String,
    pub instance_class: Option<String>,
    pub option_group: Option<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReadReplicaRequest {
    pub identifier: String,
    pub source_identifier: String,
    pub instance_class: Option<String>,
    pub option_group: Option<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModifyInstanceRequest {
    pub identifier: String,
    pub engine_version: Option<String>,
    pub instance_class: Option<String>,
    pub allocated_storage: Option<u32>,
    pub db_parameter_group: Option<String>,
    pub option_group: Option<String>,
    pub db_security_groups: Vec<String>,
    pub apply_immediately: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebootRequest {
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteInstanceRequest {
    pub identifier: String,
    pub skip_final_snapshot: bool,
    pub final_snapshot_identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRequest {
    pub identifier: String,
    pub role_arn: String,
    pub feature_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRequest {
    pub identifier: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UntagRequest {
    pub identifier: String,
    pub keys: Vec<String>,
}

/// One page of a paginated list call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstancePage {
    pub instances: Vec<ObservedInstance>,
    pub next_token: Option<String>,
}

/// Control-plane operations on database instances
///
/// Mutating calls return the instance as the provider reported it at call
/// time; that snapshot is not a stabilization signal.
pub trait DbApi {
    fn create_db_instance(&self, request: &CreateInstanceRequest) -> ApiResult<ObservedInstance>;

    fn restore_db_instance_from_snapshot(
        &self,
        request: &RestoreInstanceRequest,
    ) -> ApiResult<ObservedInstance>;

    fn create_db_instance_read_replica(
        &self,
        request: &ReadReplicaRequest,
    ) -> ApiResult<ObservedInstance>;

    fn modify_db_instance(&self, request: &ModifyInstanceRequest) -> ApiResult<ObservedInstance>;

    fn reboot_db_instance(&self, request: &RebootRequest) -> ApiResult<ObservedInstance>;

    fn delete_db_instance(&self, request: &DeleteInstanceRequest) -> ApiResult<ObservedInstance>;

    fn describe_db_instance(&self, identifier: &str) -> ApiResult<ObservedInstance>;

    fn list_db_instances(&self, next_token: Option<&str>) -> ApiResult<InstancePage>;

    fn add_role_to_db_instance(&self, request: &RoleRequest) -> ApiResult<()>;

    fn remove_role_from_db_instance(&self, request: &RoleRequest) -> ApiResult<()>;

    fn add_tags_to_resource(&self, request: &TagRequest) -> ApiResult<()>;

    fn remove_tags_from_resource(&self, request: &UntagRequest) -> ApiResult<()>;
}
