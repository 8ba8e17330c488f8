//! Clients for the services the Atrium gateway orchestrates.
//!
//! Every backend is reached over HTTP and is hidden behind a `Send + Sync`
//! trait so the gateway can be driven against real services (`Http*` types,
//! built from environment variables) or against the in-memory doubles in
//! [`mock`].

pub mod blob_store;
pub mod catalog;
pub mod component_info;
pub mod config;
pub mod container_broker;
pub mod http;
pub mod image_factory;
pub mod mock;
pub mod template_repository;
pub mod uaa;
pub mod user_management;

pub use blob_store::{BlobStoreApi, HttpBlobStore};
pub use catalog::{CatalogApi, HttpCatalog};
pub use component_info::{ComponentInfoApi, HttpComponentInfo};
pub use config::{EndpointConfig, UaaConfig};
pub use container_broker::{ContainerBrokerApi, HttpContainerBroker};
pub use image_factory::{HttpImageFactory, ImageFactoryApi};
pub use template_repository::{HttpTemplateRepository, TemplateRepositoryApi};
pub use uaa::{HttpUaa, UaaApi};
pub use user_management::{HttpUserManagement, UserManagementApi};

use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

impl BackendError {
    /// HTTP status to report for this failure.
    pub fn status(&self) -> u16 {
        match self {
            BackendError::Status { status, .. } => *status,
            _ => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == 404
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Serialization(e.to_string())
    }
}

impl From<atrium_models::ModelError> for BackendError {
    fn from(e: atrium_models::ModelError) -> Self {
        BackendError::Serialization(e.to_string())
    }
}

/// The full set of services the gateway talks to.
#[derive(Clone)]
pub struct Backends {
    pub catalog: Arc<dyn CatalogApi>,
    pub container_broker: Arc<dyn ContainerBrokerApi>,
    pub blob_store: Arc<dyn BlobStoreApi>,
    pub template_repository: Arc<dyn TemplateRepositoryApi>,
    pub image_factory: Arc<dyn ImageFactoryApi>,
    pub uaa: Arc<dyn UaaApi>,
    pub user_management: Arc<dyn UserManagementApi>,
    pub component_info: Arc<dyn ComponentInfoApi>,
}

impl Backends {
    /// Build HTTP clients for every backend from the process environment.
    pub fn from_env() -> Result<Self, BackendError> {
        let info_url = std::env::var("CORE_COMPONENT_INFO_URL")
            .unwrap_or_else(|_| component_info::DEFAULT_INFO_URL.to_owned());
        Ok(Self {
            catalog: Arc::new(HttpCatalog::new(EndpointConfig::from_env("CATALOG")?)),
            container_broker: Arc::new(HttpContainerBroker::new(EndpointConfig::from_env(
                "CONTAINER_BROKER",
            )?)),
            blob_store: Arc::new(HttpBlobStore::new(EndpointConfig::from_env("BLOB_STORE")?)),
            template_repository: Arc::new(HttpTemplateRepository::new(EndpointConfig::from_env(
                "TEMPLATE_REPOSITORY",
            )?)),
            image_factory: Arc::new(HttpImageFactory::new(EndpointConfig::from_env(
                "IMAGE_FACTORY",
            )?)),
            uaa: Arc::new(HttpUaa::new(UaaConfig::from_env()?)),
            user_management: Arc::new(HttpUserManagement::new(
                EndpointConfig::address_from_env("USER_MANAGEMENT")?,
            )),
            component_info: Arc::new(HttpComponentInfo::new(&info_url)),
        })
    }
}
