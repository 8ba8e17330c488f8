//! Service instances: creation with plan dependencies, listing, logs,
//! credentials and exposure.

use crate::{context, ApiError, Gateway, RequestContext};
use atrium_models::broker::{ContainerCredentials, ExposeRequest};
use atrium_models::catalog::{metadata_value, APPLICATION_IMAGE_ADDRESS, PLAN_ID};
use atrium_models::filter::{
    instances_by_class_id, instances_by_name, service_instances_by_offering_name,
    service_instances_by_plan_name,
};
pub use atrium_models::filter::ServiceFilters;
use atrium_models::{
    Instance, InstanceBinding, InstanceState, InstanceType, Metadata, Service, ServiceDependency,
    ServiceInstance, ServiceInstanceRequest, ServicePlan, ServiceState,
};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// The plan named by the `PLAN_ID` entry in `metadata`.
pub(crate) fn plan_for_metadata<'a>(
    service: &'a Service,
    metadata: &[Metadata],
    instance_name: &str,
) -> Result<&'a ServicePlan, ApiError> {
    let plan_id = metadata_value(metadata, PLAN_ID).unwrap_or_default();
    service.plan(plan_id).ok_or_else(|| {
        ApiError::bad_request(format!(
            "plan with id {plan_id:?} does not exist in offering {:?} with id {:?} - instance: {instance_name:?}",
            service.name, service.id
        ))
    })
}

/// Merge a catalog instance with its service. Only SERVICE instances
/// carry a plan.
pub(crate) fn service_instance_dto(
    service: &Service,
    instance: Instance,
) -> Result<ServiceInstance, ApiError> {
    let service_plan_name = if instance.instance_type == InstanceType::Service {
        plan_for_metadata(service, &instance.metadata, &instance.name)?
            .name
            .clone()
    } else {
        String::new()
    };
    Ok(ServiceInstance {
        id: instance.id,
        name: instance.name,
        instance_type: instance.instance_type,
        offering_id: service.id.clone(),
        bindings: instance.bindings,
        metadata: instance.metadata,
        state: instance.state,
        audit_trail: instance.audit_trail,
        service_name: service.name.clone(),
        service_plan_name,
    })
}

fn service_instance_dtos(services: &[Service], instances: Vec<Instance>) -> Vec<ServiceInstance> {
    instances
        .into_iter()
        .filter_map(|instance| {
            let Some(service) = services.iter().find(|s| s.id == instance.class_id) else {
                warn!(
                    "classId: {} of instance: {} cannot be found in services!",
                    instance.class_id, instance.id
                );
                return None;
            };
            service_instance_dto(service, instance)
                .map_err(|e| warn!("{e}"))
                .ok()
        })
        .collect()
}

fn dependency_request(parent_name: &str, dependency: &ServiceDependency) -> ServiceInstanceRequest {
    ServiceInstanceRequest {
        name: format!("{parent_name}-{}", dependency.service_name),
        instance_type: Some(InstanceType::Service),
        offering_id: dependency.service_id.clone(),
        bindings: Vec::new(),
        metadata: vec![Metadata::new(PLAN_ID, dependency.plan_id.clone())],
    }
}

impl Gateway {
    /// Add a REQUESTED instance for `request` to the catalog.
    pub(crate) fn add_catalog_instance(
        &self,
        ctx: &RequestContext,
        request: ServiceInstanceRequest,
    ) -> Result<Instance, ApiError> {
        let service_id = request.offering_id;
        let mut instance = Instance {
            id: String::new(),
            name: request.name,
            instance_type: request.instance_type.unwrap_or_default(),
            class_id: service_id.clone(),
            bindings: request.bindings,
            metadata: request.metadata,
            state: InstanceState::Requested,
            audit_trail: ctx.audit_trail(),
        };

        if instance.instance_type == InstanceType::Service {
            let service = self.backends.catalog.get_service(&service_id)?;
            if let Some(image) = service.metadata_value(APPLICATION_IMAGE_ADDRESS) {
                if !image.is_empty() {
                    instance
                        .metadata
                        .push(Metadata::new(APPLICATION_IMAGE_ADDRESS, image));
                }
            }
            Ok(self
                .backends
                .catalog
                .add_service_instance(&service_id, &instance)?)
        } else {
            Ok(self
                .backends
                .catalog
                .add_service_broker_instance(&service_id, &instance)?)
        }
    }

    /// Create a service instance, first creating and binding one instance
    /// per dependency of the chosen plan.
    pub fn create_service_instance(
        &self,
        ctx: &RequestContext,
        mut request: ServiceInstanceRequest,
    ) -> Result<ServiceInstance, ApiError> {
        request.validate()?;
        let service = self
            .backends
            .catalog
            .get_service(&request.offering_id)
            .map_err(context(format!(
                "Cannot fetch service {} from Catalog",
                request.offering_id
            )))?;
        if service.state != ServiceState::Ready {
            return Err(ApiError::bad_request(format!(
                "service {:?} has inappropriate state {:?}",
                service.id,
                service.state.to_string()
            )));
        }
        let plan = plan_for_metadata(&service, &request.metadata, &request.name)?;

        for dependency in &plan.dependencies {
            let instance = self
                .add_catalog_instance(ctx, dependency_request(&request.name, dependency))
                .map_err(context(format!(
                    "cannot add service instance {} dependency {} to Catalog",
                    request.offering_id, dependency.service_name
                )))?;
            request.bindings.push(InstanceBinding::to(instance.id));
        }

        let offering_id = request.offering_id.clone();
        let instance = self
            .add_catalog_instance(ctx, request)
            .map_err(context(format!(
                "cannot add service instance {offering_id} to Catalog"
            )))?;
        info!("service instance {} ({}) requested", instance.name, instance.id);
        service_instance_dto(&service, instance)
    }

    pub fn list_service_instances(
        &self,
        filters: &ServiceFilters,
    ) -> Result<Vec<ServiceInstance>, ApiError> {
        let mut instances = self
            .backends
            .catalog
            .list_services_instances()
            .map_err(context("Cannot fetch service instances from Catalog"))?;
        let services = self
            .backends
            .catalog
            .list_services()
            .map_err(context("Cannot fetch services from Catalog"))?;

        if !filters.offering_id.is_empty() {
            instances = instances_by_class_id(instances, &filters.offering_id);
        }
        if !filters.name.is_empty() {
            instances = instances_by_name(instances, &filters.name);
        }
        let mut result = service_instance_dtos(&services, instances);
        if !filters.offering_name.is_empty() {
            result = service_instances_by_offering_name(result, &filters.offering_name);
        }
        if !filters.plan_name.is_empty() {
            result = service_instances_by_plan_name(result, &filters.plan_name);
        }
        Ok(result)
    }

    pub fn get_service_instance(&self, instance_id: &str) -> Result<ServiceInstance, ApiError> {
        let instance = self
            .backends
            .catalog
            .get_instance(instance_id)
            .map_err(context(format!("Cannot fetch instance {instance_id} from Catalog")))?;
        let service = self
            .backends
            .catalog
            .get_service(&instance.class_id)
            .map_err(context(format!(
                "Cannot fetch service {} from Catalog",
                instance.class_id
            )))?;
        service_instance_dto(&service, instance).map_err(|e| {
            ApiError::internal(format!("Cannot create ApiServiceInstance: {}", e.message))
        })
    }

    pub fn service_instance_logs(
        &self,
        instance_id: &str,
    ) -> Result<BTreeMap<String, String>, ApiError> {
        self.backends
            .container_broker
            .get_instance_logs(instance_id)
            .map_err(context(format!(
                "Cannot fetch service instance {instance_id} logs from Container Broker"
            )))
    }

    pub fn service_instance_credentials(
        &self,
        instance_id: &str,
    ) -> Result<Vec<ContainerCredentials>, ApiError> {
        self.backends
            .container_broker
            .get_credentials(instance_id)
            .map_err(context(format!(
                "Cannot fetch instance {instance_id} credentials from Container Broker"
            )))
    }

    /// Expose the instance under its own name, or withdraw its hosts.
    pub fn expose_service_instance(
        &self,
        instance_id: &str,
        exposed: bool,
    ) -> Result<Vec<String>, ApiError> {
        let instance = self
            .backends
            .catalog
            .get_instance(instance_id)
            .map_err(context(format!("cannot fetch instance {instance_id} from Catalog")))?;
        if exposed {
            let request = ExposeRequest {
                hostname: instance.name,
            };
            return self
                .backends
                .container_broker
                .expose_instance(instance_id, &request)
                .map_err(context(format!("cannot expose instance {instance_id}")));
        }
        self.backends
            .container_broker
            .unexpose_instance(instance_id)
            .map_err(context(format!("cannot unexpose instance {instance_id}")))?;
        Ok(Vec::new())
    }
}
