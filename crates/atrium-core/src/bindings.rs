use crate::{context, ApiError, Gateway};
use atrium_models::{
    Instance, InstanceBindingRequest, InstanceBindings, InstanceBindingsEntity,
    InstanceBindingsResource, InstanceType, MessageResponse,
};
use tracing::info;

/// One end of a binding as named in a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingEnd {
    /// An application, resolved to its single instance.
    Application(String),
    /// A service instance id.
    Service(String),
}

impl BindingEnd {
    fn id(&self) -> &str {
        match self {
            BindingEnd::Application(id) | BindingEnd::Service(id) => id,
        }
    }
}

impl TryFrom<&InstanceBindingRequest> for BindingEnd {
    type Error = ApiError;

    fn try_from(request: &InstanceBindingRequest) -> Result<Self, Self::Error> {
        match (
            request.application_id.is_empty(),
            request.service_id.is_empty(),
        ) {
            (false, true) => Ok(BindingEnd::Application(request.application_id.clone())),
            (true, false) => Ok(BindingEnd::Service(request.service_id.clone())),
            _ => Err(ApiError::bad_request("exactly one of ids has to be filled")),
        }
    }
}

fn bindings_entity(binder: Instance) -> InstanceBindingsEntity {
    if binder.instance_type == InstanceType::Application {
        InstanceBindingsEntity {
            app_guid: binder.class_id,
            app_instance_name: binder.name,
            ..InstanceBindingsEntity::default()
        }
    } else {
        InstanceBindingsEntity {
            service_instance_guid: binder.id,
            service_instance_name: binder.name,
            ..InstanceBindingsEntity::default()
        }
    }
}

impl Gateway {
    /// Catalog instance id behind a binding end.
    fn binding_instance_id(&self, end: &BindingEnd) -> Result<String, ApiError> {
        match end {
            BindingEnd::Application(id) => self.application_instance_id(id),
            BindingEnd::Service(id) => Ok(self.service_instance(id)?.id),
        }
    }

    /// Instances bound to `dst`.
    pub fn instance_bindings(&self, dst: &BindingEnd) -> Result<InstanceBindings, ApiError> {
        let instance_id = self.binding_instance_id(dst)?;
        let binders = self
            .backends
            .catalog
            .get_instance_bindings(&instance_id)
            .map_err(context(format!(
                "Cannot fetch instance {instance_id} bindings from Catalog"
            )))?;
        Ok(InstanceBindings {
            resources: binders
                .into_iter()
                .map(|binder| InstanceBindingsResource {
                    entity: bindings_entity(binder),
                })
                .collect(),
        })
    }

    /// Bind the instance named in `request` to `dst`.
    pub fn bind(
        &self,
        dst: &BindingEnd,
        request: &InstanceBindingRequest,
    ) -> Result<MessageResponse, ApiError> {
        let dst_instance_id = self.binding_instance_id(dst)?;
        let src = BindingEnd::try_from(request)?;
        let src_instance_id = self.binding_instance_id(&src)?;

        let response = self
            .backends
            .container_broker
            .bind_instance(&src_instance_id, &dst_instance_id)
            .map_err(context(format!(
                "Cannot bind instance {src_instance_id} to {}",
                dst.id()
            )))?;
        info!("bound {src_instance_id} to {dst_instance_id}");
        Ok(response)
    }

    /// Remove the binding of `src` from `dst`.
    pub fn unbind(&self, dst: &BindingEnd, src: &BindingEnd) -> Result<MessageResponse, ApiError> {
        let dst_instance_id = self.binding_instance_id(dst)?;
        let src_instance_id = self.binding_instance_id(src)?;

        let response = self
            .backends
            .container_broker
            .unbind_instance(&src_instance_id, &dst_instance_id)
            .map_err(context(format!(
                "cannot unbind instance {dst_instance_id:?} from {src_instance_id:?}"
            )))?;
        info!("unbound {src_instance_id} from {dst_instance_id}");
        Ok(response)
    }
}
