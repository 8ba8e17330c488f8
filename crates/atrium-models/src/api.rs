//! Request and response bodies of the public REST API.

use crate::catalog::{AuditTrail, InstanceBinding, InstanceState, InstanceType, Metadata, Service};
use crate::template::RawTemplate;
use crate::ModelError;
use serde::{Deserialize, Serialize};

/// Message returned by every accepted asynchronous state change.
pub const ACCEPTED: &str = "Accepted";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn accepted() -> Self {
        Self {
            message: ACCEPTED.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OfferingPlan {
    pub name: String,
    pub free: bool,
    pub description: String,
    pub offering_id: String,
    pub id: String,
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Offering {
    pub name: String,
    pub display_name: String,
    pub provider: String,
    pub url: String,
    pub description: String,
    pub version: String,
    pub bindable: bool,
    pub id: String,
    pub tags: Vec<String>,
    pub state: String,
    pub offering_plans: Vec<OfferingPlan>,
    pub metadata: Vec<Metadata>,
    #[serde(rename = "broker_instance", skip_serializing_if = "Option::is_none")]
    pub broker_instance: Option<ServiceInstance>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceInstance {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub instance_type: InstanceType,
    pub offering_id: String,
    pub bindings: Vec<InstanceBinding>,
    pub metadata: Vec<Metadata>,
    pub state: InstanceState,
    pub audit_trail: AuditTrail,
    pub service_name: String,
    #[serde(rename = "planName")]
    pub service_plan_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceInstanceRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub instance_type: Option<InstanceType>,
    pub offering_id: String,
    pub bindings: Vec<InstanceBinding>,
    pub metadata: Vec<Metadata>,
}

impl ServiceInstanceRequest {
    pub fn validate(&self) -> Result<InstanceType, ModelError> {
        if self.name.is_empty() {
            return Err(ModelError::Invalid("name: zero value".to_owned()));
        }
        let Some(instance_type) = self.instance_type else {
            return Err(ModelError::Invalid(
                "type: value must be one of: [APPLICATION;SERVICE;SERVICE_BROKER]".to_owned(),
            ));
        };
        if self.offering_id.is_empty() {
            return Err(ModelError::Invalid("offeringId: zero value".to_owned()));
        }
        if self.metadata.is_empty() {
            return Err(ModelError::Invalid("metadata: zero value".to_owned()));
        }
        Ok(instance_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplicationInstance {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<InstanceType>,
    pub bindings: Vec<InstanceBinding>,
    pub metadata: Vec<Metadata>,
    pub state: String,
    pub audit_trail: AuditTrail,
    pub replication: i32,
    pub image_state: String,
    pub urls: Vec<String>,
    pub image_type: String,
    pub memory: String,
    #[serde(rename = "disk_quota")]
    pub disk_quota: String,
    #[serde(rename = "running_instances")]
    pub running_instances: i32,
}

/// Application manifest uploaded next to the application blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub name: String,
    #[serde(rename = "type")]
    pub image_type: String,
    pub instances: i32,
    pub bindings: Vec<String>,
    pub metadata: Vec<Metadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDeploy {
    pub broker_name: String,
    pub template: RawTemplate,
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateOfferingFromApplicationRequest {
    pub application_id: String,
    pub offering_name: String,
    pub offering_display_name: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleApplicationRequest {
    pub replicas: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceBindings {
    pub resources: Vec<InstanceBindingsResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceBindingsResource {
    pub entity: InstanceBindingsEntity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceBindingsEntity {
    pub app_guid: String,
    pub app_instance_name: String,
    pub service_instance_guid: String,
    pub service_instance_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceBindingRequest {
    pub application_id: String,
    pub service_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureRequest {
    pub exposed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformInfo {
    pub api_endpoint: String,
    pub cli_version: String,
    pub cli_url: String,
    pub platform_version: String,
    pub core_organization: String,
    pub external_tools: ExternalTools,
    pub cdh_version: String,
    pub k8s_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalTools {
    pub visualizations: Vec<PlatformTool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformTool {
    pub name: String,
    pub url: String,
    pub available: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformComponent {
    pub name: String,
    #[serde(rename = "imageVersion")]
    pub image_versions: String,
    pub signature: String,
    pub app_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_instance_request_requires_fields() {
        let mut req = ServiceInstanceRequest {
            name: "db".to_owned(),
            instance_type: Some(InstanceType::Service),
            offering_id: "svc1".to_owned(),
            bindings: vec![],
            metadata: vec![Metadata::new("PLAN_ID", "p1")],
        };
        assert_eq!(req.validate().unwrap(), InstanceType::Service);

        req.metadata.clear();
        assert!(req.validate().is_err());

        req.metadata.push(Metadata::new("PLAN_ID", "p1"));
        req.instance_type = None;
        assert!(req.validate().is_err());
    }

    #[test]
    fn unknown_instance_type_fails_to_parse() {
        let body = r#"{"name":"x","type":"DATABASE","offeringId":"o","metadata":[]}"#;
        assert!(serde_json::from_str::<ServiceInstanceRequest>(body).is_err());
    }

    #[test]
    fn offering_omits_missing_broker_instance() {
        let json = serde_json::to_value(Offering::default()).unwrap();
        assert!(json.get("broker_instance").is_none());
        assert!(json.get("offeringPlans").is_some());
    }

    #[test]
    fn application_instance_mixed_case_fields() {
        let json = serde_json::to_value(ApplicationInstance {
            running_instances: 2,
            disk_quota: "1024MB".to_owned(),
            ..ApplicationInstance::default()
        })
        .unwrap();
        assert_eq!(json["running_instances"], 2);
        assert_eq!(json["disk_quota"], "1024MB");
        assert!(json.get("imageState").is_some());
    }

    #[test]
    fn manifest_reads_image_type_from_type() {
        let manifest: Manifest =
            serde_json::from_str(r#"{"name":"app","type":"JAVA","instances":1}"#).unwrap();
        assert_eq!(manifest.image_type, "JAVA");
        assert!(manifest.bindings.is_empty());
    }
}
