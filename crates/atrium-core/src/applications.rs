//! User applications: an application record, its image, its blob and the
//! single instance the container broker runs for it.

use crate::{context, ApiError, Gateway, RequestContext};
use atrium_models::broker::VersionsResponse;
use atrium_models::catalog::application_image_id;
use atrium_models::filter::ItemFilter;
use atrium_models::validate::{limit_instance_number, validate_manifest};
use atrium_models::{
    Application, ApplicationInstance, BlobType, Image, ImageState, Instance, InstanceDependency,
    InstanceState, Manifest, MessageResponse, Patch, PatchOperation,
};
use std::collections::BTreeMap;
use std::sync::PoisonError;
use tracing::{error, info, warn};

const DEFAULT_MEMORY: &str = "256MB";
const DEFAULT_DISK_QUOTA: &str = "1024MB";
const WAITING_FOR_IMAGE: &str = "WAITING_FOR_IMAGE";
const ERROR_FETCH_IMAGE_STATE: &str = "ERROR_FETCH";
const ERROR_FETCH_IMAGE_TYPE: &str = "-";

/// An uploaded file from a multipart request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobUpload {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Image state and type as shown to callers; `ERROR_FETCH` when the
/// application has no image yet.
fn image_summary(image: Option<&Image>) -> (String, String) {
    match image {
        Some(image) => (image.state.to_string(), image.image_type.clone()),
        None => (
            ERROR_FETCH_IMAGE_STATE.to_owned(),
            ERROR_FETCH_IMAGE_TYPE.to_owned(),
        ),
    }
}

fn application_state(instance: Option<&Instance>, image_state: &str) -> String {
    match instance {
        Some(instance) => instance.state.to_string(),
        None if image_state == ImageState::Error.to_string()
            || image_state == ERROR_FETCH_IMAGE_STATE =>
        {
            InstanceState::Failure.to_string()
        }
        None => WAITING_FOR_IMAGE.to_owned(),
    }
}

fn application_dto(
    application: Application,
    instance: Option<Instance>,
    image: Option<&Image>,
) -> ApplicationInstance {
    let (image_state, image_type) = image_summary(image);
    let state = application_state(instance.as_ref(), &image_state);
    let instance_type = instance.as_ref().map(|i| i.instance_type);
    let instance = instance.unwrap_or_default();
    let urls = instance
        .metadata_value("urls")
        .unwrap_or_default()
        .split(',')
        .map(str::to_owned)
        .collect();
    ApplicationInstance {
        id: application.id,
        name: application.name,
        instance_type,
        bindings: instance.bindings,
        metadata: instance.metadata,
        state,
        audit_trail: instance.audit_trail,
        replication: application.replication,
        image_state,
        urls,
        image_type,
        memory: DEFAULT_MEMORY.to_owned(),
        disk_quota: DEFAULT_DISK_QUOTA.to_owned(),
        running_instances: application.replication,
    }
}

impl Gateway {
    fn application_dtos(
        &self,
        applications: Vec<Application>,
        instances: &[Instance],
    ) -> Result<Vec<ApplicationInstance>, ApiError> {
        applications
            .into_iter()
            .map(|application| {
                let image = if application.image_id.is_empty() {
                    warn!(
                        "found null reference to image in application: {}",
                        application.name
                    );
                    None
                } else {
                    let image = self
                        .backends
                        .catalog
                        .get_image(&application.image_id)
                        .map_err(|e| {
                            ApiError::internal(format!(
                                "Cannot fetch image {} from Catalog: {e}",
                                application.image_id
                            ))
                        })?;
                    Some(image)
                };
                let instance = instances
                    .iter()
                    .find(|i| i.class_id == application.id)
                    .cloned();
                Ok(application_dto(application, instance, image.as_ref()))
            })
            .collect()
    }

    pub fn list_applications(
        &self,
        filter: &ItemFilter,
    ) -> Result<Vec<ApplicationInstance>, ApiError> {
        let instances = self
            .backends
            .catalog
            .list_applications_instances()
            .map_err(|e| {
                ApiError::internal(format!(
                    "Cannot fetch application instances from Catalog: {e}"
                ))
            })?;
        let applications = self
            .backends
            .catalog
            .list_applications(filter)
            .map_err(|e| ApiError::internal(format!("Cannot fetch applications from Catalog: {e}")))?;
        self.application_dtos(applications, &instances)
            .map_err(|e| {
                ApiError::internal(format!("Cannot parse ApiApplicationInstance list: {}", e.message))
            })
    }

    pub fn get_application(&self, application_id: &str) -> Result<ApplicationInstance, ApiError> {
        let instances = self
            .backends
            .catalog
            .list_application_instances(application_id)
            .map_err(|e| {
                ApiError::from_message(format!(
                    "Cannot fetch application {application_id} instances from Catalog: {e}"
                ))
            })?;
        let application = self
            .backends
            .catalog
            .get_application(application_id)
            .map_err(|e| {
                ApiError::from_message(format!(
                    "Cannot fetch application {application_id} from Catalog: {e}"
                ))
            })?;
        self.application_dtos(vec![application], &instances)?
            .pop()
            .ok_or_else(|| ApiError::internal("Cannot create ApiApplicationInstance"))
    }

    /// Versions of the platform's own containers, fetched once and reused.
    fn core_components(&self) -> Result<Vec<VersionsResponse>, ApiError> {
        {
            let cached = self
                .core_versions
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if !cached.is_empty() {
                return Ok(cached.clone());
            }
        }
        let versions = self.backends.container_broker.get_versions().map_err(|e| {
            info!("unable to get platform versions: {e}");
            ApiError::from(e)
        })?;
        self.cache_core_versions(&versions);
        Ok(versions)
    }

    pub(crate) fn cache_core_versions(&self, versions: &[VersionsResponse]) {
        *self
            .core_versions
            .write()
            .unwrap_or_else(PoisonError::into_inner) = versions.to_vec();
    }

    /// Ids of the service instances named in `bindings`.
    fn instance_dependencies(&self, bindings: &[String]) -> Result<Vec<InstanceDependency>, ApiError> {
        let instances = self
            .backends
            .catalog
            .list_services_instances()
            .map_err(|e| {
                ApiError::bad_request(format!(
                    "cannot fetch application instances from catalog: {e}"
                ))
            })?;
        let mut dependencies = Vec::with_capacity(bindings.len());
        let mut missing = Vec::new();
        for binding in bindings {
            match instances.iter().find(|i| &i.name == binding) {
                Some(instance) => dependencies.push(InstanceDependency {
                    id: instance.id.clone(),
                }),
                None => missing.push(binding.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(ApiError::bad_request(format!(
                "following service instances don't exist: {}",
                missing.join(", ")
            )));
        }
        Ok(dependencies)
    }

    /// Register an application and upload its source for the image factory.
    pub fn create_application(
        &self,
        ctx: &RequestContext,
        manifest: Manifest,
        blob: Option<BlobUpload>,
    ) -> Result<Application, ApiError> {
        validate_manifest(&manifest)?;
        let core = self.core_components()?;
        if core.iter().any(|c| c.name == manifest.name) {
            return Err(ApiError::bad_request(format!(
                "Cannot create application with name: {}, this name is already used by core platform component",
                manifest.name
            )));
        }
        let instance_dependencies = self.instance_dependencies(&manifest.bindings)?;
        let blob = blob.ok_or_else(|| {
            error!("application {} sent without a blob", manifest.name);
            ApiError::internal("failed to read blob: request has no blob part")
        })?;
        info!("read {}", blob.file_name);

        let application = self.backends.catalog.add_application(&Application {
            name: manifest.name,
            replication: manifest.instances,
            template_id: self.settings.generic_application_template_id.clone(),
            instance_dependencies,
            metadata: manifest.metadata,
            audit_trail: ctx.audit_trail(),
            ..Application::default()
        })?;

        let image_id = application_image_id(&application.id);
        self.backends.catalog.add_image(&Image {
            id: image_id.clone(),
            image_type: manifest.image_type,
            state: ImageState::New,
            blob_type: BlobType::TarGz,
            audit_trail: ctx.audit_trail(),
        })?;

        let patch = Patch::new(PatchOperation::Update, "ImageId", &image_id)?.by(&ctx.username);
        let application = self
            .backends
            .catalog
            .update_application(&application.id, &[patch])?;

        self.backends
            .blob_store
            .store_blob(&image_id, &blob.file_name, blob.data)
            .map_err(|e| ApiError::internal(e.to_string()))?;
        self.mark_image_pending(ctx, &image_id)?;

        info!("application {} ({}) created", application.name, application.id);
        Ok(application)
    }

    /// Remove an application that never got an instance, or ask the broker
    /// to destroy the running one.
    pub fn delete_application(&self, ctx: &RequestContext, application_id: &str) -> Result<(), ApiError> {
        let application = self
            .backends
            .catalog
            .get_application(application_id)
            .map_err(|e| ApiError::not_found(e.to_string()))?;
        let instances = self
            .backends
            .catalog
            .list_application_instances(application_id)?;

        let Some(instance) = instances.into_iter().next() else {
            return self.remove_application(&application);
        };
        self.change_instance_state(
            ctx,
            &instance.id,
            &ctx.reason("DeleteInstance"),
            instance.state,
            InstanceState::DestroyReq,
        )?;
        Ok(())
    }

    fn remove_application(&self, application: &Application) -> Result<(), ApiError> {
        self.backends
            .catalog
            .delete_application(&application.id)
            .map_err(context(format!(
                "cannot delete application {:?} from Catalog",
                application.id
            )))?;
        if let Err(e) = self.backends.catalog.delete_image(&application.image_id) {
            warn!(
                "cannot delete image {:?} from Catalog. Status: {}. Error: {e}",
                application.image_id,
                e.status()
            );
        }
        if let Err(e) = self.backends.blob_store.delete_blob(&application.image_id) {
            warn!("cannot delete blob {:?}: {e}", application.image_id);
        }
        info!("application {} removed", application.id);
        Ok(())
    }

    pub fn application_logs(&self, application_id: &str) -> Result<BTreeMap<String, String>, ApiError> {
        let instance_id = self.application_instance_id(application_id)?;
        self.backends
            .container_broker
            .get_instance_logs(&instance_id)
            .map_err(context(format!(
                "Cannot fetch application instance {application_id} logs from Container Broker"
            )))
    }

    pub fn scale_application(
        &self,
        ctx: &RequestContext,
        application_id: &str,
        replicas: i32,
    ) -> Result<MessageResponse, ApiError> {
        let instance_id = self.application_instance_id(application_id)?;
        limit_instance_number(replicas)?;
        let instance = self.backends.catalog.get_instance(&instance_id)?;

        let patch = Patch::new(PatchOperation::Update, "Replication", &replicas)?.by(&ctx.username);
        self.backends
            .catalog
            .update_application(&instance.class_id, &[patch])?;
        self.change_instance_state(
            ctx,
            &instance_id,
            &ctx.reason("ScaleInstance"),
            instance.state,
            InstanceState::Reconfiguration,
        )?;
        Ok(MessageResponse::accepted())
    }

    pub fn start_application(
        &self,
        ctx: &RequestContext,
        application_id: &str,
    ) -> Result<MessageResponse, ApiError> {
        let application = self
            .backends
            .catalog
            .get_application(application_id)
            .map_err(|e| ApiError::not_found(e.to_string()))?;
        if application.replication == 0 {
            return Err(ApiError::bad_request(
                "Can't start app with 0 replicas, please scale it first",
            ));
        }
        let instance_id = self.application_instance_id(application_id)?;
        self.start_instance(ctx, &instance_id)
    }

    pub fn stop_application(
        &self,
        ctx: &RequestContext,
        application_id: &str,
    ) -> Result<MessageResponse, ApiError> {
        let instance_id = self.application_instance_id(application_id)?;
        self.stop_instance(ctx, &instance_id)
    }

    pub fn restart_application(
        &self,
        ctx: &RequestContext,
        application_id: &str,
    ) -> Result<MessageResponse, ApiError> {
        let instance_id = self.application_instance_id(application_id)?;
        self.restart_instance(ctx, &instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{alice, gateway};
    use atrium_backends::mock::MockBackends;
    use atrium_models::{InstanceType, Metadata};

    fn manifest(name: &str) -> Manifest {
        Manifest {
            name: name.to_owned(),
            image_type: "GO".to_owned(),
            instances: 1,
            ..Manifest::default()
        }
    }

    fn blob() -> Option<BlobUpload> {
        Some(BlobUpload {
            file_name: "app.tar.gz".to_owned(),
            data: b"tarball".to_vec(),
        })
    }

    fn core(mocks: &MockBackends) {
        mocks.container_broker.set_versions(vec![VersionsResponse {
            name: "catalog".to_owned(),
            ..VersionsResponse::default()
        }]);
    }

    fn running(mocks: &MockBackends, application: &Application, state: InstanceState) -> Instance {
        mocks.catalog.insert_instance(Instance {
            name: application.name.clone(),
            instance_type: InstanceType::Application,
            class_id: application.id.clone(),
            state,
            metadata: vec![Metadata::new("urls", "a.example.com,b.example.com")],
            ..Instance::default()
        })
    }

    #[test]
    fn create_registers_application_image_and_blob() {
        let (gateway, mocks) = gateway();
        core(&mocks);

        let app = gateway
            .create_application(&alice(), manifest("web"), blob())
            .unwrap();
        let image_id = application_image_id(&app.id);
        assert_eq!(app.image_id, image_id);
        assert_eq!(
            app.template_id,
            gateway.settings().generic_application_template_id
        );
        assert_eq!(app.replication, 1);

        let image = mocks.catalog.image(&image_id).unwrap();
        assert_eq!(image.state, ImageState::Pending);
        assert_eq!(image.blob_type, BlobType::TarGz);
        assert_eq!(image.image_type, "GO");
        assert_eq!(mocks.blob_store.blob(&image_id).unwrap(), b"tarball");
    }

    #[test]
    fn create_rejects_core_component_name() {
        let (gateway, mocks) = gateway();
        core(&mocks);
        let err = gateway
            .create_application(&alice(), manifest("catalog"), blob())
            .unwrap_err();
        assert_eq!(err.status, 400);
        assert!(err.message.contains("already used by core platform component"));
    }

    #[test]
    fn create_fails_when_versions_unavailable() {
        let (gateway, _mocks) = gateway();
        let err = gateway
            .create_application(&alice(), manifest("web"), blob())
            .unwrap_err();
        assert_eq!(err.status, 500);
    }

    #[test]
    fn create_lists_unknown_bindings() {
        let (gateway, mocks) = gateway();
        core(&mocks);
        mocks.catalog.insert_instance(Instance {
            name: "db".to_owned(),
            ..Instance::default()
        });
        let mut manifest = manifest("web");
        manifest.bindings = vec!["db".to_owned(), "mq".to_owned(), "kv".to_owned()];

        let err = gateway
            .create_application(&alice(), manifest, blob())
            .unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.message, "following service instances don't exist: mq, kv");
    }

    #[test]
    fn create_validates_manifest_and_blob() {
        let (gateway, mocks) = gateway();
        core(&mocks);
        let mut bad = manifest("web");
        bad.instances = 6;
        let err = gateway.create_application(&alice(), bad, blob()).unwrap_err();
        assert_eq!(err.message, "Maximum allowed replication is 5");

        let err = gateway
            .create_application(&alice(), manifest("web"), None)
            .unwrap_err();
        assert_eq!(err.status, 500);
        assert!(err.message.starts_with("failed to read blob"));
    }

    #[test]
    fn list_joins_instances_and_images() {
        let (gateway, mocks) = gateway();
        core(&mocks);
        let web = gateway
            .create_application(&alice(), manifest("web"), blob())
            .unwrap();
        running(&mocks, &web, InstanceState::Running);
        mocks.catalog.insert_application(Application {
            name: "broken".to_owned(),
            ..Application::default()
        });

        let apps = gateway.list_applications(&ItemFilter::default()).unwrap();
        assert_eq!(apps.len(), 2);
        let broken = apps.iter().find(|a| a.name == "broken").unwrap();
        assert_eq!(broken.state, "FAILURE");
        assert_eq!(broken.image_state, "ERROR_FETCH");
        assert_eq!(broken.image_type, "-");

        let web = apps.iter().find(|a| a.name == "web").unwrap();
        assert_eq!(web.state, "RUNNING");
        assert_eq!(web.image_state, "PENDING");
        assert_eq!(web.urls, vec!["a.example.com", "b.example.com"]);
        assert_eq!(web.memory, "256MB");
        assert_eq!(web.running_instances, 1);
    }

    #[test]
    fn application_without_instance_waits_for_image() {
        let (gateway, mocks) = gateway();
        core(&mocks);
        let web = gateway
            .create_application(&alice(), manifest("web"), blob())
            .unwrap();

        let dto = gateway.get_application(&web.id).unwrap();
        assert_eq!(dto.state, "WAITING_FOR_IMAGE");
        assert!(dto.instance_type.is_none());

        let err = gateway.get_application("missing").unwrap_err();
        assert_eq!(err.status, 404);
    }

    #[test]
    fn delete_without_instance_removes_everything() {
        let (gateway, mocks) = gateway();
        core(&mocks);
        let web = gateway
            .create_application(&alice(), manifest("web"), blob())
            .unwrap();

        gateway.delete_application(&alice(), &web.id).unwrap();
        assert!(mocks.catalog.application(&web.id).is_none());
        assert!(mocks.catalog.image(&web.image_id).is_none());
        assert!(mocks.blob_store.blob(&web.image_id).is_none());

        let err = gateway.delete_application(&alice(), &web.id).unwrap_err();
        assert_eq!(err.status, 404);
    }

    #[test]
    fn delete_with_instance_requests_destroy() {
        let (gateway, mocks) = gateway();
        core(&mocks);
        let web = gateway
            .create_application(&alice(), manifest("web"), blob())
            .unwrap();
        let instance = running(&mocks, &web, InstanceState::Running);

        gateway.delete_application(&alice(), &web.id).unwrap();
        assert_eq!(
            mocks.catalog.instance(&instance.id).unwrap().state,
            InstanceState::DestroyReq
        );
        assert!(mocks.catalog.application(&web.id).is_some());
    }

    #[test]
    fn scale_updates_replication_and_reconfigures() {
        let (gateway, mocks) = gateway();
        core(&mocks);
        let web = gateway
            .create_application(&alice(), manifest("web"), blob())
            .unwrap();
        let instance = running(&mocks, &web, InstanceState::Running);

        gateway.scale_application(&alice(), &web.id, 3).unwrap();
        assert_eq!(mocks.catalog.application(&web.id).unwrap().replication, 3);
        let instance = mocks.catalog.instance(&instance.id).unwrap();
        assert_eq!(instance.state, InstanceState::Reconfiguration);
        assert_eq!(
            instance.metadata_value(atrium_models::catalog::LAST_STATE_CHANGE_REASON),
            Some("ScaleInstance request made by: alice")
        );

        let err = gateway.scale_application(&alice(), &web.id, -1).unwrap_err();
        assert_eq!(err.message, "Minimum allowed replication is 0");
    }

    #[test]
    fn start_requires_replicas() {
        let (gateway, mocks) = gateway();
        let web = mocks.catalog.insert_application(Application {
            name: "web".to_owned(),
            replication: 0,
            ..Application::default()
        });
        let instance = running(&mocks, &web, InstanceState::Stopped);

        let err = gateway.start_application(&alice(), &web.id).unwrap_err();
        assert_eq!(err.status, 400);

        mocks.catalog.insert_application(Application {
            replication: 2,
            ..web.clone()
        });
        gateway.start_application(&alice(), &web.id).unwrap();
        assert_eq!(
            mocks.catalog.instance(&instance.id).unwrap().state,
            InstanceState::StartReq
        );
    }

    #[test]
    fn operations_need_exactly_one_instance() {
        let (gateway, mocks) = gateway();
        let web = mocks.catalog.insert_application(Application {
            name: "web".to_owned(),
            replication: 1,
            ..Application::default()
        });

        let err = gateway.stop_application(&alice(), &web.id).unwrap_err();
        assert_eq!(err.status, 404);

        running(&mocks, &web, InstanceState::Running);
        mocks.catalog.insert_instance(Instance {
            name: "web-2".to_owned(),
            instance_type: InstanceType::Application,
            class_id: web.id.clone(),
            ..Instance::default()
        });
        let err = gateway.restart_application(&alice(), &web.id).unwrap_err();
        assert_eq!(err.status, 500);
        assert!(err.message.starts_with("there are too many instances"));
    }
}
