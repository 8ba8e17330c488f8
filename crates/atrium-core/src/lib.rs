//! Orchestration for the Atrium control-plane gateway.
//!
//! The [`Gateway`] owns one client per backend and sequences calls across
//! them to create, delete, scale, bind and unbind application and service
//! instances. Every state change is a guarded catalog patch; the gateway keeps
//! no state of its own apart from a cache of core-component versions.

pub mod applications;
pub mod bindings;
pub mod lifecycle;
pub mod offerings;
pub mod platform;
pub mod services;
pub mod settings;
pub mod users;

pub use applications::BlobUpload;
pub use settings::{ConfigError, GatewaySettings, PlatformSettings};

use atrium_backends::{BackendError, Backends};
use atrium_models::broker::VersionsResponse;
use atrium_models::{AuditTrail, ModelError};
use std::fmt;
use std::sync::RwLock;
use thiserror::Error;

const KEY_NOT_FOUND: &str = "KEY NOT FOUND";

/// A failed gateway operation and the HTTP status to answer it with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }

    /// 404 when the message reports a missing key, 500 otherwise.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(status_from_message(&message), message)
    }
}

pub fn status_from_message(message: &str) -> u16 {
    if message.to_uppercase().contains(KEY_NOT_FOUND) {
        404
    } else {
        500
    }
}

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        Self::new(e.status(), e.to_string())
    }
}

impl From<ModelError> for ApiError {
    fn from(e: ModelError) -> Self {
        Self::bad_request(e.to_string())
    }
}

/// Prefix an error's message, keeping its status.
pub(crate) fn context<E: Into<ApiError>>(prefix: impl fmt::Display) -> impl FnOnce(E) -> ApiError {
    move |e| {
        let e = e.into();
        ApiError::new(e.status, format!("{prefix}: {}", e.message))
    }
}

/// Who is making a request, as established by the authorization layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub username: String,
    /// The caller's `Authorization` header, forwarded to user management.
    pub authorization: String,
}

impl RequestContext {
    pub fn new(username: &str, authorization: &str) -> Self {
        Self {
            username: username.to_owned(),
            authorization: authorization.to_owned(),
        }
    }

    pub fn audit_trail(&self) -> AuditTrail {
        AuditTrail::by(&self.username)
    }

    /// Reason recorded with a state change made by this caller.
    pub fn reason(&self, operation: &str) -> String {
        format!("{operation} request made by: {}", self.username)
    }
}

/// Entry point for every gateway operation.
pub struct Gateway {
    backends: Backends,
    settings: GatewaySettings,
    core_versions: RwLock<Vec<VersionsResponse>>,
}

impl Gateway {
    pub fn new(backends: Backends, settings: GatewaySettings) -> Self {
        Self {
            backends,
            settings,
            core_versions: RwLock::new(Vec::new()),
        }
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Check backends in a fixed order and report the first failure.
    pub fn health(&self) -> Result<(), ApiError> {
        self.backends
            .template_repository
            .health()
            .map_err(context("Cannot fetch Template Repository health"))?;
        self.backends
            .catalog
            .health()
            .map_err(context("Cannot fetch Catalog health"))?;
        self.backends
            .container_broker
            .health()
            .map_err(context("Cannot fetch Container Broker health"))?;
        self.backends
            .image_factory
            .health()
            .map_err(context("Cannot fetch Image Factory health"))?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_status_is_preserved() {
        let err: ApiError = BackendError::Status {
            status: 409,
            message: "conflict".to_owned(),
        }
        .into();
        assert_eq!(err.status, 409);

        let err: ApiError = BackendError::Transport("refused".to_owned()).into();
        assert_eq!(err.status, 500);
    }

    #[test]
    fn key_not_found_maps_to_404() {
        assert_eq!(status_from_message("Cannot fetch: key not found"), 404);
        assert_eq!(status_from_message("boom"), 500);
        assert_eq!(ApiError::from_message("Key not found").status, 404);
    }

    #[test]
    fn context_prefixes_message() {
        let err = context("Cannot fetch services")(ApiError::not_found("Key not found"));
        assert_eq!(err.status, 404);
        assert_eq!(err.message, "Cannot fetch services: Key not found");
    }

    #[test]
    fn health_reports_first_failure() {
        let (gateway, mocks) = testutil::gateway();
        gateway.health().unwrap();

        mocks.image_factory.set_healthy(false);
        mocks.catalog.set_healthy(false);
        let err = gateway.health().unwrap_err();
        assert_eq!(err.status, 500);
        assert!(err.message.starts_with("Cannot fetch Catalog health"));
    }
}
