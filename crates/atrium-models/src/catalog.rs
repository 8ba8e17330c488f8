use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const PLAN_ID: &str = "PLAN_ID";
pub const APPLICATION_IMAGE_ADDRESS: &str = "APPLICATION_IMAGE_ADDRESS";
pub const BROKER_TEMPLATE_ID: &str = "BROKER_TEMPLATE_ID";
pub const BROKER_OFFERING_PREFIX: &str = "BROKER_OFFERING_";
pub const BROKER_INSTANCE_ID: &str = "broker_instance_id";
pub const BROKER_SHORT_INSTANCE_ID: &str = "broker_short_instance_id";
pub const LAST_STATE_CHANGE_REASON: &str = "LAST_STATE_CHANGE_REASON";
pub const APPLICATION_ID: &str = "APPLICATION_ID";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "key")]
    pub id: String,
    pub value: String,
}

impl Metadata {
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// Value stored under `key`, or `None` if the key is absent.
pub fn metadata_value<'a>(metadata: &'a [Metadata], key: &str) -> Option<&'a str> {
    metadata
        .iter()
        .find(|m| m.id == key)
        .map(|m| m.value.as_str())
}

pub fn prefixed_offering_name(offering_name: &str) -> String {
    format!("{BROKER_OFFERING_PREFIX}{offering_name}")
}

pub fn application_image_id(application_id: &str) -> String {
    format!("app_{application_id}")
}

pub fn offering_image_id(offering_id: &str) -> String {
    format!("svc_{offering_id}")
}

/// Shorten a UUID into a name usable as a DNS label.
///
/// `"8a3ef6c2-1b2d-4e5f-9a0b-1c2d3e4f5a6b"` becomes `"x8a3ef6c21b2d4"`.
pub fn uuid_to_short_dns_name(uuid: &str) -> String {
    let head: String = uuid.chars().take(15).filter(|c| *c != '-').collect();
    format!("x{head}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditTrail {
    pub created_on: i64,
    pub created_by: String,
    pub last_updated_on: i64,
    pub last_update_by: String,
}

impl AuditTrail {
    pub fn by(username: &str) -> Self {
        Self {
            created_by: username.to_owned(),
            last_update_by: username.to_owned(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceType {
    Application,
    #[default]
    Service,
    ServiceBroker,
}

impl InstanceType {
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceType::Application => "APPLICATION",
            InstanceType::Service => "SERVICE",
            InstanceType::ServiceBroker => "SERVICE_BROKER",
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    #[default]
    Requested,
    Deploying,
    Failure,
    Stopped,
    StartReq,
    Starting,
    Running,
    StopReq,
    Stopping,
    DestroyReq,
    Destroying,
    Unavailable,
    Reconfiguration,
}

impl InstanceState {
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceState::Requested => "REQUESTED",
            InstanceState::Deploying => "DEPLOYING",
            InstanceState::Failure => "FAILURE",
            InstanceState::Stopped => "STOPPED",
            InstanceState::StartReq => "START_REQ",
            InstanceState::Starting => "STARTING",
            InstanceState::Running => "RUNNING",
            InstanceState::StopReq => "STOP_REQ",
            InstanceState::Stopping => "STOPPING",
            InstanceState::DestroyReq => "DESTROY_REQ",
            InstanceState::Destroying => "DESTROYING",
            InstanceState::Unavailable => "UNAVAILABLE",
            InstanceState::Reconfiguration => "RECONFIGURATION",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceBinding {
    pub id: String,
    pub data: BTreeMap<String, String>,
}

impl InstanceBinding {
    pub fn to(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub instance_type: InstanceType,
    pub class_id: String,
    pub bindings: Vec<InstanceBinding>,
    pub metadata: Vec<Metadata>,
    pub state: InstanceState,
    pub audit_trail: AuditTrail,
}

impl Instance {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        metadata_value(&self.metadata, key)
    }

    pub fn is_bound_to(&self, instance_id: &str) -> bool {
        self.bindings.iter().any(|b| b.id == instance_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    #[default]
    Deploying,
    Ready,
    Offline,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Deploying => write!(f, "DEPLOYING"),
            ServiceState::Ready => write!(f, "READY"),
            ServiceState::Offline => write!(f, "OFFLINE"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceDependency {
    pub service_id: String,
    pub service_name: String,
    pub plan_id: String,
    pub plan_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServicePlan {
    pub id: String,
    pub name: String,
    pub description: String,
    pub cost: String,
    pub dependencies: Vec<ServiceDependency>,
    pub audit_trail: AuditTrail,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub template_id: String,
    pub state: ServiceState,
    pub plans: Vec<ServicePlan>,
    pub audit_trail: AuditTrail,
    pub metadata: Vec<Metadata>,
    pub tags: Vec<String>,
}

impl Service {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        metadata_value(&self.metadata, key)
    }

    pub fn plan(&self, plan_id: &str) -> Option<&ServicePlan> {
        self.plans.iter().find(|p| p.id == plan_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceDependency {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_id: String,
    pub replication: i32,
    pub template_id: String,
    pub instance_dependencies: Vec<InstanceDependency>,
    pub metadata: Vec<Metadata>,
    pub audit_trail: AuditTrail,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageState {
    #[default]
    New,
    Pending,
    Building,
    Error,
    Ready,
}

impl fmt::Display for ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageState::New => write!(f, "NEW"),
            ImageState::Pending => write!(f, "PENDING"),
            ImageState::Building => write!(f, "BUILDING"),
            ImageState::Error => write!(f, "ERROR"),
            ImageState::Ready => write!(f, "READY"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlobType {
    #[default]
    #[serde(rename = "TARGZ")]
    TarGz,
    #[serde(rename = "JAR")]
    Jar,
    #[serde(rename = "EXEC")]
    Exec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Image {
    pub id: String,
    #[serde(rename = "type")]
    pub image_type: String,
    pub state: ImageState,
    pub blob_type: BlobType,
    pub audit_trail: AuditTrail,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateState {
    #[default]
    InProgress,
    Ready,
    Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub state: TemplateState,
    pub audit_trail: AuditTrail,
}
