//! Wire types shared by the Atrium gateway, its backends, and its client.
//!
//! This crate defines the catalog records (`Instance`, `Service`, `Application`,
//! `Image`, `Template`), JSON patch builders for catalog updates, the container
//! broker and identity payloads, the API-level DTOs returned to callers, and the
//! pure validation and filtering rules applied before any backend is touched.

pub mod api;
pub mod broker;
pub mod catalog;
pub mod filter;
pub mod identity;
pub mod patch;
pub mod template;
pub mod validate;

pub use api::{
    ApplicationInstance, CreateOfferingFromApplicationRequest, ExposureRequest,
    InstanceBindingRequest, InstanceBindings, InstanceBindingsEntity, InstanceBindingsResource,
    Manifest, MessageResponse, Offering, OfferingPlan, PlatformComponent, PlatformInfo,
    PlatformTool, ScaleApplicationRequest, ServiceDeploy, ServiceInstance,
    ServiceInstanceRequest, ACCEPTED,
};
pub use catalog::{
    Application, AuditTrail, BlobType, Image, ImageState, Instance, InstanceBinding,
    InstanceDependency, InstanceState, InstanceType, Metadata, Service, ServiceDependency,
    ServicePlan, ServiceState, Template, TemplateState,
};
pub use patch::{Patch, PatchOperation};
pub use template::{ComponentType, RawTemplate, TemplateBody};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
    #[error("{0}")]
    Invalid(String),
}
