//! Pure request builders, one per provider call

use crate::model::{DbInstance, DbRole, DeletionPolicy, Tag};
use crate::provider::{
    CreateInstanceRequest, DeleteInstanceRequest, ModifyInstanceRequest, ReadReplicaRequest,
    RebootRequest, RestoreInstanceRequest, RoleRequest, TagRequest, UntagRequest,
};

pub fn create_request(model: &DbInstance, tags: &[Tag]) -> CreateInstanceRequest {
    CreateInstanceRequest {
        identifier: model.identifier.clone(),
        engine: model.engine.clone(),
        engine_version: model.engine_version.clone(),
        instance_class: model.instance_class.clone(),
        allocated_storage: model.allocated_storage,
        db_parameter_group: model.db_parameter_group.clone(),
        option_group: model.option_group.clone(),
        db_security_groups: model.db_security_groups.clone(),
        tags: tags.to_vec(),
    }
}

/// Restore request; `None` when the model names no snapshot
pub fn restore_request(model: &DbInstance, tags: &[Tag]) -> Option<RestoreInstanceRequest> {
    let snapshot_identifier = model.snapshot_identifier.clone()?;
    Some(RestoreInstanceRequest {
        identifier: model.identifier.clone(),
        snapshot_identifier,
        instance_class: model.instance_class.clone(),
        option_group: model.option_group.clone(),
        tags: tags.to_vec(),
    })
}

/// Read replica request; `None` when the model names no source
pub fn read_replica_request(model: &DbInstance, tags: &[Tag]) -> Option<ReadReplicaRequest> {
    let source_identifier = model.source_identifier.clone()?;
    Some(ReadReplicaRequest {
        identifier: model.identifier.clone(),
        source_identifier,
        instance_class: model.instance_class.clone(),
        option_group: model.option_group.clone(),
        tags: tags.to_vec(),
    })
}

pub fn modify_request(model: &DbInstance) -> ModifyInstanceRequest {
    ModifyInstanceRequest {
        identifier: model.identifier.clone(),
        engine_version: model.engine_version.clone(),
        instance_class: model.instance_class.clone(),
        allocated_storage: model.allocated_storage,
        db_parameter_group: model.db_parameter_group.clone(),
        option_group: model.option_group.clone(),
        db_security_groups: model.db_security_groups.clone(),
        apply_immediately: true,
    }
}

pub fn reboot_request(model: &DbInstance) -> RebootRequest {
    RebootRequest {
        identifier: model.identifier.clone(),
    }
}

/// Identifier of the snapshot taken before a `Snapshot` policy delete
pub fn final_snapshot_identifier(identifier: &str) -> String {
    format!("{identifier}-final-snapshot")
}

pub fn delete_request(model: &DbInstance) -> DeleteInstanceRequest {
    match model.deletion_policy {
        DeletionPolicy::Delete => DeleteInstanceRequest {
            identifier: model.identifier.clone(),
            skip_final_snapshot: true,
            final_snapshot_identifier: None,
        },
        DeletionPolicy::Snapshot => DeleteInstanceRequest {
            identifier: model.identifier.clone(),
            skip_final_snapshot: false,
            final_snapshot_identifier: Some(final_snapshot_identifier(&model.identifier)),
        },
    }
}

pub fn role_request(identifier: &str, role: &DbRole) -> RoleRequest {
    RoleRequest {
        identifier: identifier.to_string(),
        role_arn: role.role_arn.clone(),
        feature_name: role.feature_name.clone(),
    }
}

pub fn tag_request(identifier: &str, tags: &[Tag]) -> TagRequest {
    TagRequest {
        identifier: identifier.to_string(),
        tags: tags.to_vec(),
    }
}

pub fn untag_request(identifier: &str, tags: &[Tag]) -> UntagRequest {
    UntagRequest {
        identifier: identifier.to_string(),
        keys: tags.iter().map(|t| t.key.clone()).collect(),
    }
}
