//! Instance state transitions shared by applications, services and offerings.
//!
//! Every transition is a guarded catalog patch: the `State` update carries the
//! expected current state, so a concurrent change makes the catalog refuse it.

use crate::{context, ApiError, Gateway, RequestContext};
use atrium_models::patch::instance_state_patches;
use atrium_models::{Instance, InstanceState, InstanceType, MessageResponse};
use tracing::{debug, info, warn};

impl Gateway {
    /// Patch `instance_id` from `current` to `target`, recording `reason`.
    pub(crate) fn change_instance_state(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        reason: &str,
        current: InstanceState,
        target: InstanceState,
    ) -> Result<Instance, ApiError> {
        let patches: Vec<_> = instance_state_patches(reason, current, target)?
            .into_iter()
            .map(|p| p.by(&ctx.username))
            .collect();
        info!("instance {instance_id}: {current} -> {target}");
        Ok(self
            .backends
            .catalog
            .update_instance(instance_id, &patches)?)
    }

    pub fn stop_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<MessageResponse, ApiError> {
        self.change_instance_state(
            ctx,
            instance_id,
            &ctx.reason("StopInstance"),
            InstanceState::Running,
            InstanceState::StopReq,
        )?;
        Ok(MessageResponse::accepted())
    }

    pub fn start_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<MessageResponse, ApiError> {
        self.change_instance_state(
            ctx,
            instance_id,
            &ctx.reason("StartInstance"),
            InstanceState::Stopped,
            InstanceState::StartReq,
        )?;
        Ok(MessageResponse::accepted())
    }

    /// Move the instance from whatever state it is in to `RECONFIGURATION`.
    pub fn restart_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<MessageResponse, ApiError> {
        let instance = self.backends.catalog.get_instance(instance_id)?;
        self.change_instance_state(
            ctx,
            instance_id,
            &ctx.reason("RestartInstance"),
            instance.state,
            InstanceState::Reconfiguration,
        )?;
        Ok(MessageResponse::accepted())
    }

    /// Request destruction of an instance nothing else is bound to.
    pub fn delete_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<MessageResponse, ApiError> {
        let instance = self.backends.catalog.get_instance(instance_id)?;
        self.ensure_unbound(&instance)?;
        self.change_instance_state(
            ctx,
            instance_id,
            &ctx.reason("DeleteInstance"),
            instance.state,
            InstanceState::DestroyReq,
        )
        .map_err(context(format!(
            "Cannot update service instance {instance_id} state to '{}' in Catalog",
            InstanceState::DestroyReq
        )))?;
        Ok(MessageResponse::accepted())
    }

    fn ensure_unbound(&self, target: &Instance) -> Result<(), ApiError> {
        let instances = self.backends.catalog.list_instances()?;
        let binder = instances.iter().find(|i| i.is_bound_to(&target.id));
        if let Some(binder) = binder {
            let binder_id = if binder.instance_type == InstanceType::Application {
                &binder.class_id
            } else {
                &binder.id
            };
            return Err(ApiError::forbidden(format!(
                "Instance: {} is bound to other instance: {}, id: {binder_id}",
                target.name, binder.name
            )));
        }
        Ok(())
    }

    /// Poll the catalog until the instance reaches `target`.
    ///
    /// Returns `false` once the retries run out without reaching it; only a
    /// failed catalog read is an error.
    pub(crate) fn wait_for_instance_state(
        &self,
        instance_id: &str,
        target: InstanceState,
    ) -> Result<bool, ApiError> {
        for attempt in 0..self.settings.wait_retries {
            let instance = self
                .backends
                .catalog
                .get_instance(instance_id)
                .map_err(context(format!("cannot retrieve Instance {instance_id} from Catalog")))?;
            if instance.state == target {
                return Ok(true);
            }
            debug!(
                "instance {instance_id} is {}, waiting for {target} (attempt {})",
                instance.state,
                attempt + 1
            );
            std::thread::sleep(self.settings.wait_interval);
        }
        warn!(
            "instance {instance_id} did not reach {target} after {} attempts",
            self.settings.wait_retries
        );
        Ok(false)
    }

    /// The id of the single instance running an application.
    pub(crate) fn application_instance_id(&self, application_id: &str) -> Result<String, ApiError> {
        let instances = self
            .backends
            .catalog
            .list_application_instances(application_id)
            .map_err(context(format!(
                "cannot fetch instance of application with id {application_id} from Catalog"
            )))?;
        match instances.as_slice() {
            [] => Err(ApiError::not_found(format!(
                "there are no instances of application with id {application_id} yet."
            ))),
            [instance] => Ok(instance.id.clone()),
            _ => Err(ApiError::internal(format!(
                "there are too many instances of application with id {application_id} yet."
            ))),
        }
    }

    /// Fetch an instance and make sure it is a SERVICE instance.
    pub(crate) fn service_instance(&self, instance_id: &str) -> Result<Instance, ApiError> {
        let instance = self
            .backends
            .catalog
            .get_instance(instance_id)
            .map_err(context(format!(
                "cannot find service instance with id {instance_id} in Catalog"
            )))?;
        if instance.instance_type != InstanceType::Service {
            return Err(ApiError::not_found(format!(
                "specified instance id {instance_id} is not pointing to a service instance"
            )));
        }
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{alice, gateway};
    use atrium_models::catalog::LAST_STATE_CHANGE_REASON;
    use atrium_models::{Instance, InstanceBinding, InstanceState, InstanceType};

    fn instance(name: &str, state: InstanceState) -> Instance {
        Instance {
            name: name.to_owned(),
            instance_type: InstanceType::Service,
            state,
            ..Instance::default()
        }
    }

    #[test]
    fn stop_records_reason_and_user() {
        let (gateway, mocks) = gateway();
        let db = mocks
            .catalog
            .insert_instance(instance("db", InstanceState::Running));

        gateway.stop_instance(&alice(), &db.id).unwrap();

        let db = mocks.catalog.instance(&db.id).unwrap();
        assert_eq!(db.state, InstanceState::StopReq);
        assert_eq!(
            db.metadata_value(LAST_STATE_CHANGE_REASON),
            Some("StopInstance request made by: alice")
        );
        assert_eq!(db.audit_trail.last_update_by, "alice");
    }

    #[test]
    fn start_requires_stopped_instance() {
        let (gateway, mocks) = gateway();
        let db = mocks
            .catalog
            .insert_instance(instance("db", InstanceState::Running));

        let err = gateway.start_instance(&alice(), &db.id).unwrap_err();
        assert_eq!(err.status, 409);
        assert_eq!(
            mocks.catalog.instance(&db.id).unwrap().state,
            InstanceState::Running
        );
    }

    #[test]
    fn restart_moves_any_state_to_reconfiguration() {
        let (gateway, mocks) = gateway();
        let db = mocks
            .catalog
            .insert_instance(instance("db", InstanceState::Failure));

        gateway.restart_instance(&alice(), &db.id).unwrap();
        assert_eq!(
            mocks.catalog.instance(&db.id).unwrap().state,
            InstanceState::Reconfiguration
        );
    }

    #[test]
    fn delete_refuses_bound_instance() {
        let (gateway, mocks) = gateway();
        let db = mocks
            .catalog
            .insert_instance(instance("db", InstanceState::Running));
        mocks.catalog.insert_instance(Instance {
            name: "web".to_owned(),
            instance_type: InstanceType::Application,
            class_id: "app-1".to_owned(),
            bindings: vec![InstanceBinding::to(&db.id)],
            ..Instance::default()
        });

        let err = gateway.delete_instance(&alice(), &db.id).unwrap_err();
        assert_eq!(err.status, 403);
        assert_eq!(
            err.message,
            "Instance: db is bound to other instance: web, id: app-1"
        );
    }

    #[test]
    fn delete_requests_destroy() {
        let (gateway, mocks) = gateway();
        let db = mocks
            .catalog
            .insert_instance(instance("db", InstanceState::Stopped));

        gateway.delete_instance(&alice(), &db.id).unwrap();
        assert_eq!(
            mocks.catalog.instance(&db.id).unwrap().state,
            InstanceState::DestroyReq
        );
    }

    #[test]
    fn wait_returns_once_state_is_reached() {
        let (gateway, mocks) = gateway();
        let db = mocks
            .catalog
            .insert_instance(instance("db", InstanceState::StopReq));
        mocks
            .catalog
            .settle(InstanceState::StopReq, InstanceState::Stopped);

        assert!(gateway
            .wait_for_instance_state(&db.id, InstanceState::Stopped)
            .unwrap());
    }

    #[test]
    fn wait_gives_up_after_retries() {
        let (gateway, mocks) = gateway();
        let db = mocks
            .catalog
            .insert_instance(instance("db", InstanceState::StopReq));

        assert!(!gateway
            .wait_for_instance_state(&db.id, InstanceState::Stopped)
            .unwrap());
        let err = gateway
            .wait_for_instance_state("missing", InstanceState::Stopped)
            .unwrap_err();
        assert_eq!(err.status, 404);
    }

    #[test]
    fn non_service_instance_is_rejected() {
        let (gateway, mocks) = gateway();
        let web = mocks.catalog.insert_instance(Instance {
            name: "web".to_owned(),
            instance_type: InstanceType::Application,
            ..Instance::default()
        });

        let err = gateway.service_instance(&web.id).unwrap_err();
        assert_eq!(err.status, 404);
        let err = gateway.service_instance("missing").unwrap_err();
        assert_eq!(err.status, 404);
        assert!(err.message.starts_with("cannot find service instance"));
    }
}
