//! Offerings: catalog services together with their deployment templates.
//!
//! An offering whose template contains a `broker` component is a broker
//! offering. Creating one also creates a SERVICE_BROKER instance that every
//! offering of the same deployment points at through its metadata; deleting
//! the last of those offerings stops and destroys that instance.

use crate::applications::BlobUpload;
use crate::services::service_instance_dto;
use crate::{context, ApiError, Gateway, RequestContext};
use atrium_models::catalog::{
    metadata_value, offering_image_id, prefixed_offering_name, uuid_to_short_dns_name,
    APPLICATION_ID, BROKER_INSTANCE_ID, BROKER_OFFERING_PREFIX, BROKER_SHORT_INSTANCE_ID,
    BROKER_TEMPLATE_ID, PLAN_ID,
};
use atrium_models::template::parse_raw_template;
use atrium_models::validate::{
    blob_type_from_file_name, validate_dns_label, validate_manifest, validate_offering_definition,
};
use atrium_models::{
    CreateOfferingFromApplicationRequest, Image, ImageState, Instance, InstanceBinding,
    InstanceState, InstanceType, Manifest, Metadata, Offering, OfferingPlan, Patch,
    PatchOperation, Service, ServiceDependency, ServiceDeploy, ServiceInstance,
    ServiceInstanceRequest, ServicePlan, ServiceState, Template, TemplateState,
};
use tracing::{debug, info, warn};

/// Instance id handed to the template repository when only the template's
/// component types are wanted.
const PLACEHOLDER_INSTANCE_ID: &str = "api-service-fake-template-id";

const DEFAULT_PLAN_NAME: &str = "standard";

fn offering_from_service(service: Service, broker_instance: Option<ServiceInstance>) -> Offering {
    let meta = |key: &str| service.metadata_value(key).unwrap_or_default().to_owned();
    let offering_plans = service
        .plans
        .iter()
        .map(|plan| OfferingPlan {
            name: plan.name.clone(),
            free: plan.cost.to_lowercase() == "free",
            description: plan.description.clone(),
            offering_id: service.id.clone(),
            id: plan.id.clone(),
            active: true,
        })
        .collect();
    Offering {
        display_name: meta("displayName"),
        provider: meta("provider"),
        url: meta("url"),
        version: meta("version"),
        state: service.state.to_string(),
        offering_plans,
        name: service.name,
        description: service.description,
        bindable: service.bindable,
        id: service.id,
        tags: service.tags,
        metadata: service.metadata,
        broker_instance,
    }
}

fn broker_offerings_count(instance: &Instance) -> usize {
    instance
        .metadata
        .iter()
        .filter(|m| m.id.starts_with(BROKER_OFFERING_PREFIX))
        .count()
}

fn service_state_patch(
    ctx: &RequestContext,
    current: ServiceState,
    target: ServiceState,
) -> Result<Patch, ApiError> {
    Ok(Patch::with_previous(PatchOperation::Update, "State", &target, &current)?.by(&ctx.username))
}

impl Gateway {
    pub fn list_offerings(&self) -> Result<Vec<Offering>, ApiError> {
        let services = self
            .backends
            .catalog
            .list_services()
            .map_err(|e| ApiError::internal(format!("Cannot fetch services from Catalog: {e}")))?;
        services
            .into_iter()
            .map(|service| self.offering(service))
            .collect()
    }

    pub fn get_offering(&self, offering_id: &str) -> Result<Offering, ApiError> {
        let service = self
            .backends
            .catalog
            .get_service(offering_id)
            .map_err(context("Cannot fetch service from Catalog"))?;
        self.offering(service)
    }

    fn offering(&self, service: Service) -> Result<Offering, ApiError> {
        let broker_instance = self
            .broker_instance_for(&service)
            .map_err(context("getServiceBrokerInstanceForService error"))?;
        Ok(offering_from_service(service, broker_instance))
    }

    fn broker_instance_for(&self, service: &Service) -> Result<Option<ServiceInstance>, ApiError> {
        let Some(broker_id) = service.metadata_value(BROKER_INSTANCE_ID) else {
            return Ok(None);
        };
        if broker_id.is_empty() {
            return Ok(None);
        }
        let instance = self.backends.catalog.get_instance(broker_id)?;
        let dto = service_instance_dto(service, instance)
            .map_err(|e| ApiError::internal(e.message))?;
        Ok(Some(dto))
    }

    /// Checks on an offering that need the catalog: every dependency must
    /// name a READY service and one of its plans.
    fn validate_offering(&self, service: &Service) -> Result<(), ApiError> {
        validate_offering_definition(service)?;
        for dependency in service.plans.iter().flat_map(|p| &p.dependencies) {
            let name = &dependency.service_name;
            let target = self
                .backends
                .catalog
                .get_service(&dependency.service_id)
                .map_err(|e| {
                    ApiError::bad_request(format!("Dependency: {name} service error: {e}"))
                })?;
            if target.state != ServiceState::Ready {
                return Err(ApiError::bad_request(format!(
                    "Dependency: {name} service has inappropriate state: {}",
                    target.state
                )));
            }
            if target.plan(&dependency.plan_id).is_none() {
                return Err(ApiError::bad_request(format!(
                    "Dependency: {} Plan does not exist!",
                    dependency.plan_name
                )));
            }
        }
        Ok(())
    }

    fn validate_broker_name(&self, broker_name: &str) -> Result<(), ApiError> {
        if broker_name.is_empty() {
            return Err(ApiError::bad_request("broker name cannont be empty!"));
        }
        validate_dns_label(broker_name)
            .map_err(|e| ApiError::bad_request(format!("broker name is invalid: {e}")))?;
        let instances = self
            .backends
            .catalog
            .list_instances()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        if instances.iter().any(|i| i.name == broker_name) {
            return Err(ApiError::bad_request(format!(
                "brokerName {broker_name} is already in use!"
            )));
        }
        Ok(())
    }

    fn add_service_in_deploying_state(
        &self,
        ctx: &RequestContext,
        mut service: Service,
        template_id: &str,
    ) -> Result<Service, ApiError> {
        service.state = ServiceState::Deploying;
        template_id.clone_into(&mut service.template_id);
        service.audit_trail = ctx.audit_trail();
        let added = self.backends.catalog.add_service(&service)?;
        debug!("catalog added service {} ({})", added.name, added.id);
        Ok(added)
    }

    fn mark_service_ready(&self, ctx: &RequestContext, service_id: &str) -> Result<Service, ApiError> {
        let patch = service_state_patch(ctx, ServiceState::Deploying, ServiceState::Ready)?;
        Ok(self.backends.catalog.update_service(service_id, &[patch])?)
    }

    /// Register a template, its services and, for broker templates, the
    /// broker instance serving them.
    pub fn create_offering(
        &self,
        ctx: &RequestContext,
        deploy: ServiceDeploy,
    ) -> Result<Vec<Service>, ApiError> {
        if deploy.services.is_empty() {
            return Err(ApiError::bad_request("No service is defined"));
        }
        for service in &deploy.services {
            self.validate_offering(service)?;
        }
        let is_broker = parse_raw_template(&deploy.template)?.is_service_broker();
        if is_broker {
            self.validate_broker_name(&deploy.broker_name)?;
        }

        let template = self.backends.catalog.add_template(&Template {
            id: String::new(),
            state: TemplateState::InProgress,
            audit_trail: ctx.audit_trail(),
        })?;
        self.backends
            .template_repository
            .create_template(&template.id, &deploy.template)?;
        let ready = Patch::with_previous(
            PatchOperation::Update,
            "State",
            &TemplateState::Ready,
            &TemplateState::InProgress,
        )?
        .by(&ctx.username);
        self.backends
            .catalog
            .update_template(&template.id, &[ready])?;

        let mut offerings = Vec::with_capacity(deploy.services.len());
        for service in deploy.services {
            let mut added = self.add_service_in_deploying_state(ctx, service, &template.id)?;
            if !is_broker {
                added = self.mark_service_ready(ctx, &added.id)?;
            }
            offerings.push(added);
        }

        if is_broker {
            let broker = self
                .create_broker_instance(ctx, &offerings, &deploy.broker_name, &template.id)
                .map_err(context("cannot add service broker instance to Catalog"))?;
            info!("service broker instance {} ({}) requested", broker.name, broker.id);
            let patches = [
                Patch::new(
                    PatchOperation::Add,
                    "Metadata",
                    &Metadata::new(BROKER_SHORT_INSTANCE_ID, uuid_to_short_dns_name(&broker.id)),
                )?,
                Patch::new(
                    PatchOperation::Add,
                    "Metadata",
                    &Metadata::new(BROKER_INSTANCE_ID, broker.id.clone()),
                )?,
            ];
            for offering in &mut offerings {
                *offering = self.backends.catalog.update_service(&offering.id, &patches)?;
            }
        }

        info!(
            "template {} registered with {} offering(s)",
            template.id,
            offerings.len()
        );
        Ok(offerings)
    }

    fn create_broker_instance(
        &self,
        ctx: &RequestContext,
        offerings: &[Service],
        broker_name: &str,
        template_id: &str,
    ) -> Result<Instance, ApiError> {
        let mut metadata = vec![Metadata::new(BROKER_TEMPLATE_ID, template_id)];
        metadata.extend(
            offerings
                .iter()
                .map(|o| Metadata::new(prefixed_offering_name(&o.name), o.id.clone())),
        );
        self.add_catalog_instance(
            ctx,
            ServiceInstanceRequest {
                name: broker_name.to_owned(),
                instance_type: Some(InstanceType::ServiceBroker),
                offering_id: String::new(),
                bindings: Vec::new(),
                metadata,
            },
        )
    }

    /// Register an offering backed by an uploaded binary, built by the
    /// image factory from image `svc_<offeringId>`.
    pub fn create_offering_from_binary(
        &self,
        ctx: &RequestContext,
        mut offering: Service,
        manifest: &Manifest,
        blob: Option<BlobUpload>,
    ) -> Result<Service, ApiError> {
        self.validate_offering(&offering)?;
        validate_manifest(manifest)?;
        let blob = blob.ok_or_else(|| ApiError::bad_request("missing blob file"))?;
        let blob_type = blob_type_from_file_name(&blob.file_name)?;
        info!("creating offering {} from {}", offering.name, blob.file_name);

        offering.state = ServiceState::Deploying;
        offering
            .template_id
            .clone_from(&self.settings.generic_service_template_id);
        offering.audit_trail = ctx.audit_trail();
        let service = self.backends.catalog.add_service(&offering)?;

        let image_id = offering_image_id(&service.id);
        self.backends.catalog.add_image(&Image {
            id: image_id.clone(),
            image_type: manifest.image_type.clone(),
            state: ImageState::New,
            blob_type,
            audit_trail: ctx.audit_trail(),
        })?;
        self.backends
            .blob_store
            .store_blob(&image_id, &blob.file_name, blob.data)
            .map_err(|e| ApiError::internal(e.to_string()))?;
        self.mark_image_pending(ctx, &image_id)?;

        info!("offering {} created from binary", service.id);
        Ok(service)
    }

    pub(crate) fn mark_image_pending(&self, ctx: &RequestContext, image_id: &str) -> Result<(), ApiError> {
        let patch = Patch::new(PatchOperation::Update, "State", &ImageState::Pending)?.by(&ctx.username);
        self.backends
            .catalog
            .update_image(image_id, &[patch])
            .map_err(|e| {
                ApiError::internal(format!("cannot update image {image_id} state: {e}"))
            })?;
        Ok(())
    }

    /// Publish a running application as an offering whose single plan
    /// depends on the services the application is bound to.
    pub fn create_offering_from_application(
        &self,
        ctx: &RequestContext,
        request: CreateOfferingFromApplicationRequest,
    ) -> Result<Service, ApiError> {
        let instance_id = self.application_instance_id(&request.application_id)?;
        let application = self
            .backends
            .catalog
            .get_application(&request.application_id)?;
        let instance = self.backends.catalog.get_instance(&instance_id)?;

        let dependencies = instance
            .bindings
            .iter()
            .map(|binding| self.binding_to_dependency(binding))
            .collect::<Result<Vec<_>, _>>()?;

        let mut metadata = application.metadata;
        metadata.extend(instance.metadata);
        metadata.push(Metadata::new("displayName", request.offering_display_name));
        metadata.push(Metadata::new("description", request.description.clone()));
        metadata.push(Metadata::new(APPLICATION_ID, request.application_id));

        let service = Service {
            name: request.offering_name,
            description: request.description,
            template_id: self.settings.generic_service_template_id.clone(),
            state: ServiceState::Deploying,
            plans: vec![ServicePlan {
                name: DEFAULT_PLAN_NAME.to_owned(),
                dependencies,
                ..ServicePlan::default()
            }],
            audit_trail: ctx.audit_trail(),
            metadata,
            tags: request.tags,
            ..Service::default()
        };
        let service = self.backends.catalog.add_service(&service)?;
        let service = self.mark_service_ready(ctx, &service.id)?;
        info!("offering {} created from application", service.id);
        Ok(service)
    }

    fn binding_to_dependency(&self, binding: &InstanceBinding) -> Result<ServiceDependency, ApiError> {
        let instance = self.backends.catalog.get_instance(&binding.id)?;
        if instance.instance_type != InstanceType::Service {
            return Err(ApiError::bad_request(format!(
                "This application has dependencies type: {} currently supported types: {}",
                instance.instance_type,
                InstanceType::Service
            )));
        }
        let service = self.backends.catalog.get_service(&instance.class_id)?;
        let plan_id = metadata_value(&instance.metadata, PLAN_ID).unwrap_or_default();
        let plan = self.backends.catalog.get_service_plan(&service.id, plan_id)?;
        Ok(ServiceDependency {
            service_id: service.id,
            service_name: service.name,
            plan_id: plan.id,
            plan_name: plan.name,
        })
    }

    /// Take an offering offline and remove it, cleaning up its broker
    /// instance and template when nothing else uses them.
    pub fn delete_offering(&self, ctx: &RequestContext, offering_id: &str) -> Result<(), ApiError> {
        let mut service = self
            .backends
            .catalog
            .get_service(offering_id)
            .map_err(context("cannot fetch service from Catalog"))?;
        let template = self
            .backends
            .template_repository
            .get_parsed_template(&service.template_id, PLACEHOLDER_INSTANCE_ID, "")
            .map_err(context("cannot fetch service templateType from Template Repository"))?;

        if service.state != ServiceState::Offline {
            let patch = service_state_patch(ctx, service.state, ServiceState::Offline)?;
            service = self.backends.catalog.update_service(offering_id, &[patch])?;
        }

        if template.is_service_broker() {
            self.remove_offering_from_broker(ctx, &service)
                .map_err(|e| ApiError::internal(e.message))?;
        }

        self.delete_service(offering_id)?;
        match self.delete_template(&service.template_id) {
            Err(e) if e.status == 405 => debug!("template {} kept: {e}", service.template_id),
            other => other?,
        }
        info!("offering {offering_id} deleted");
        Ok(())
    }

    fn remove_offering_from_broker(&self, ctx: &RequestContext, service: &Service) -> Result<(), ApiError> {
        let Some(broker_id) = service.metadata_value(BROKER_INSTANCE_ID).filter(|id| !id.is_empty())
        else {
            warn!(
                "service {:?} doesn't have {BROKER_INSTANCE_ID:?} key in metadata",
                service.id
            );
            return Ok(());
        };
        let broker = match self.backends.catalog.get_instance(broker_id) {
            Ok(instance) => instance,
            Err(e) => {
                warn!("cannot fetch service broker instance {broker_id}: {e}");
                return Ok(());
            }
        };

        let entry = Patch::new(
            PatchOperation::Delete,
            "Metadata",
            &Metadata::new(prefixed_offering_name(&service.name), ""),
        )?;
        match self.backends.catalog.update_instance(&broker.id, &[entry]) {
            Err(e) if e.is_not_found() => warn!(
                "service broker instance {:?} doesn't have offering {:?} entry in metadata",
                broker.id, service.name
            ),
            other => {
                other?;
            }
        }

        let broker = match self.backends.catalog.get_instance(broker_id) {
            Ok(instance) => instance,
            Err(e) => {
                warn!("cannot fetch service broker instance {broker_id}: {e}");
                return Ok(());
            }
        };
        if broker_offerings_count(&broker) == 0 {
            self.delete_broker_instance(ctx, &broker)?;
        }
        Ok(())
    }

    fn delete_broker_instance(&self, ctx: &RequestContext, broker: &Instance) -> Result<(), ApiError> {
        info!(
            "deleting service broker instance {:?} by {:?}",
            broker.id, ctx.username
        );
        if broker.state == InstanceState::Running {
            self.stop_instance(ctx, &broker.id)?;
            if !self.wait_for_instance_state(&broker.id, InstanceState::Stopped)? {
                warn!(
                    "service broker instance {:?} is not stopped yet, destroying anyway",
                    broker.id
                );
            }
        }
        self.delete_instance(ctx, &broker.id)?;
        Ok(())
    }

    fn delete_service(&self, service_id: &str) -> Result<(), ApiError> {
        let instances = self.backends.catalog.list_instances().map_err(|e| {
            ApiError::new(
                405,
                format!("Cannot determine if there is a service instance: Cannot fetch instances: {e}"),
            )
        })?;
        if instances.iter().any(|i| i.class_id == service_id) {
            return Err(ApiError::new(
                405,
                "There is an instance of service being deleted",
            ));
        }
        Ok(self.backends.catalog.delete_service(service_id)?)
    }

    /// Delete a template no service uses; generic templates are never deleted.
    fn delete_template(&self, template_id: &str) -> Result<(), ApiError> {
        let services = self.backends.catalog.list_services().map_err(|e| {
            ApiError::internal(format!(
                "Couldn't determine if template is used by any service when deleting offering: Cannot fetch services from Catalog: {e}"
            ))
        })?;
        if services.iter().any(|s| s.template_id == template_id)
            || self.settings.is_generic_template(template_id)
        {
            return Err(ApiError::new(
                405,
                "Cannot delete template because it's used by some service",
            ));
        }
        self.backends
            .template_repository
            .delete_template(template_id)
            .map_err(context(format!(
                "Cannot delete template {template_id:?} from Template Repository"
            )))
    }
}
