//! Catalog patch documents.
//!
//! The catalog applies a list of patches atomically per entity. An `Update`
//! carrying a `prevValue` is rejected by the catalog when the stored value has
//! moved on, which is how state transitions are guarded.

use crate::catalog::{InstanceState, Metadata, LAST_STATE_CHANGE_REASON};
use crate::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchOperation {
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub op: PatchOperation,
    pub field: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_value: Option<Value>,
    #[serde(default)]
    pub username: String,
}

impl Patch {
    pub fn new(
        op: PatchOperation,
        field: &str,
        value: &impl Serialize,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            op,
            field: field.to_owned(),
            value: serde_json::to_value(value)?,
            prev_value: None,
            username: String::new(),
        })
    }

    pub fn with_previous(
        op: PatchOperation,
        field: &str,
        value: &impl Serialize,
        previous: &impl Serialize,
    ) -> Result<Self, ModelError> {
        let mut patch = Self::new(op, field, value)?;
        patch.prev_value = Some(serde_json::to_value(previous)?);
        Ok(patch)
    }

    #[must_use]
    pub fn by(mut self, username: &str) -> Self {
        self.username = username.to_owned();
        self
    }
}

/// Patches moving an instance from `current` to `target`.
///
/// A non-empty `reason` is recorded under `LAST_STATE_CHANGE_REASON`.
pub fn instance_state_patches(
    reason: &str,
    current: InstanceState,
    target: InstanceState,
) -> Result<Vec<Patch>, ModelError> {
    let mut patches = vec![Patch::with_previous(
        PatchOperation::Update,
        "State",
        &target,
        &current,
    )?];
    if !reason.is_empty() {
        patches.push(Patch::new(
            PatchOperation::Add,
            "Metadata",
            &Metadata::new(LAST_STATE_CHANGE_REASON, reason),
        )?);
    }
    Ok(patches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_patch_carries_previous_value() {
        let patches =
            instance_state_patches("", InstanceState::Running, InstanceState::StopReq).unwrap();
        assert_eq!(patches.len(), 1);
        let json = serde_json::to_value(&patches[0]).unwrap();
        assert_eq!(json["op"], "Update");
        assert_eq!(json["field"], "State");
        assert_eq!(json["value"], "STOP_REQ");
        assert_eq!(json["prevValue"], "RUNNING");
    }

    #[test]
    fn state_patch_records_reason() {
        let patches = instance_state_patches(
            "StopInstance request made by: bob",
            InstanceState::Running,
            InstanceState::StopReq,
        )
        .unwrap();
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[1].op, PatchOperation::Add);
        assert_eq!(patches[1].field, "Metadata");
        assert_eq!(patches[1].value["key"], LAST_STATE_CHANGE_REASON);
        assert_eq!(patches[1].value["value"], "StopInstance request made by: bob");
    }

    #[test]
    fn plain_patch_omits_prev_value() {
        let patch = Patch::new(PatchOperation::Update, "Replication", &3)
            .unwrap()
            .by("alice");
        let json = serde_json::to_string(&patch).unwrap();
        assert!(!json.contains("prevValue"));
        assert!(json.contains("\"username\":\"alice\""));
    }
}
