//! In-memory backends for tests.
//!
//! Each double keeps its records behind a `Mutex` and answers with the same
//! status codes as the real service, so gateway code paths that depend on a
//! backend's 404 or 409 behave the same way against a mock.

use crate::{
    Backends, BackendError, BlobStoreApi, CatalogApi, ComponentInfoApi, ContainerBrokerApi,
    ImageFactoryApi, TemplateRepositoryApi, UaaApi, UserManagementApi,
};
use atrium_models::broker::{ConfigMap, ContainerCredentials, ExposeRequest, VersionsResponse};
use atrium_models::filter::ItemFilter;
use atrium_models::identity::{
    InvitationResponse, LoginResponse, PasswordChange, TokenInfo, UaaUser,
};
use atrium_models::template::parse_raw_template;
use atrium_models::{
    Application, Image, Instance, InstanceBinding, InstanceState, InstanceType, MessageResponse,
    Patch, PatchOperation, RawTemplate, Service, ServicePlan, Template, TemplateBody,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn status(status: u16, message: impl Into<String>) -> BackendError {
    BackendError::Status {
        status,
        message: message.into(),
    }
}

fn not_found() -> BackendError {
    status(404, "Key not found")
}

fn unhealthy(name: &str) -> BackendError {
    status(500, format!("{name} is unhealthy"))
}

/// Patch field names are PascalCase; stored JSON is camelCase.
fn json_field(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Apply catalog patches to a record the way the catalog does: `Update`
/// replaces the field after checking `prevValue`, `Add` appends to list
/// fields (replacing an entry with the same `key`), `Delete` removes a
/// matching list entry.
fn apply_patches<T: Serialize + DeserializeOwned>(
    record: &T,
    patches: &[Patch],
) -> Result<T, BackendError> {
    let mut value = serde_json::to_value(record)?;
    let Some(object) = value.as_object_mut() else {
        return Err(status(400, "record is not an object"));
    };

    for patch in patches {
        let field = json_field(&patch.field);
        let same_entry = |item: &Value| match patch.value.get("key") {
            Some(key) => item.get("key") == Some(key),
            None => *item == patch.value,
        };
        match patch.op {
            PatchOperation::Update => {
                if let Some(ref previous) = patch.prev_value {
                    let current = object.get(&field).cloned().unwrap_or(Value::Null);
                    if current != *previous {
                        return Err(status(
                            409,
                            format!("{} is {current}, expected {previous}", patch.field),
                        ));
                    }
                }
                object.insert(field, patch.value.clone());
            }
            PatchOperation::Add => match object.get_mut(&field) {
                Some(Value::Array(items)) => {
                    items.retain(|item| !same_entry(item));
                    items.push(patch.value.clone());
                }
                _ => {
                    object.insert(field, patch.value.clone());
                }
            },
            PatchOperation::Delete => match object.get_mut(&field) {
                Some(Value::Array(items)) => {
                    let before = items.len();
                    items.retain(|item| !same_entry(item));
                    if items.len() == before {
                        return Err(not_found());
                    }
                }
                _ => return Err(not_found()),
            },
        }
        if let Some(Value::Object(audit)) = object.get_mut("auditTrail") {
            audit.insert(
                "lastUpdatedOn".to_owned(),
                Value::from(chrono::Utc::now().timestamp()),
            );
            audit.insert(
                "lastUpdateBy".to_owned(),
                Value::from(patch.username.clone()),
            );
        }
    }
    Ok(serde_json::from_value(value)?)
}

#[derive(Default)]
struct CatalogState {
    services: BTreeMap<String, Service>,
    instances: BTreeMap<String, Instance>,
    applications: BTreeMap<String, Application>,
    images: BTreeMap<String, Image>,
    templates: BTreeMap<String, Template>,
    settle: HashMap<InstanceState, InstanceState>,
    next_id: u64,
    unhealthy: bool,
}

impl CatalogState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:08x}-0000-4000-8000-{:012x}", self.next_id, self.next_id)
    }

    fn stamp(&self, audit: &mut atrium_models::AuditTrail) {
        let now = chrono::Utc::now().timestamp();
        audit.created_on = now;
        audit.last_updated_on = now;
    }

    fn add_instance(&mut self, instance: &Instance) -> Result<Instance, BackendError> {
        if self.instances.values().any(|i| i.name == instance.name) {
            return Err(status(
                409,
                format!("instance with name: {} already exists", instance.name),
            ));
        }
        let mut instance = instance.clone();
        instance.id = self.next_id();
        self.stamp(&mut instance.audit_trail);
        self.instances.insert(instance.id.clone(), instance.clone());
        Ok(instance)
    }
}

/// Catalog double.
///
/// Instance state changes can be made to complete on the next read with
/// [`MockCatalog::settle`], standing in for the container broker moving an
/// instance out of a `*_REQ` state.
#[derive(Default)]
pub struct MockCatalog {
    state: Mutex<CatalogState>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// An instance read in state `from` is moved to `to` first.
    pub fn settle(&self, from: InstanceState, to: InstanceState) {
        lock(&self.state).settle.insert(from, to);
    }

    pub fn set_healthy(&self, healthy: bool) {
        lock(&self.state).unhealthy = !healthy;
    }

    pub fn insert_service(&self, mut service: Service) -> Service {
        let mut state = lock(&self.state);
        if service.id.is_empty() {
            service.id = state.next_id();
        }
        for plan in &mut service.plans {
            if plan.id.is_empty() {
                plan.id = state.next_id();
            }
        }
        state.services.insert(service.id.clone(), service.clone());
        service
    }

    pub fn insert_instance(&self, mut instance: Instance) -> Instance {
        let mut state = lock(&self.state);
        if instance.id.is_empty() {
            instance.id = state.next_id();
        }
        state.instances.insert(instance.id.clone(), instance.clone());
        instance
    }

    pub fn insert_application(&self, mut application: Application) -> Application {
        let mut state = lock(&self.state);
        if application.id.is_empty() {
            application.id = state.next_id();
        }
        state
            .applications
            .insert(application.id.clone(), application.clone());
        application
    }

    pub fn insert_image(&self, image: Image) -> Image {
        lock(&self.state)
            .images
            .insert(image.id.clone(), image.clone());
        image
    }

    pub fn service(&self, id: &str) -> Option<Service> {
        lock(&self.state).services.get(id).cloned()
    }

    pub fn services(&self) -> Vec<Service> {
        lock(&self.state).services.values().cloned().collect()
    }

    pub fn instance(&self, id: &str) -> Option<Instance> {
        lock(&self.state).instances.get(id).cloned()
    }

    pub fn instances(&self) -> Vec<Instance> {
        lock(&self.state).instances.values().cloned().collect()
    }

    pub fn application(&self, id: &str) -> Option<Application> {
        lock(&self.state).applications.get(id).cloned()
    }

    pub fn applications(&self) -> Vec<Application> {
        lock(&self.state).applications.values().cloned().collect()
    }

    pub fn image(&self, id: &str) -> Option<Image> {
        lock(&self.state).images.get(id).cloned()
    }

    pub fn template(&self, id: &str) -> Option<Template> {
        lock(&self.state).templates.get(id).cloned()
    }

    fn bind(&self, src_id: &str, dst_id: &str) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        if !state.instances.contains_key(src_id) {
            return Err(not_found());
        }
        let dst = state.instances.get_mut(dst_id).ok_or_else(not_found)?;
        if !dst.is_bound_to(src_id) {
            dst.bindings.push(InstanceBinding::to(src_id));
        }
        Ok(())
    }

    fn unbind(&self, src_id: &str, dst_id: &str) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        let dst = state.instances.get_mut(dst_id).ok_or_else(not_found)?;
        dst.bindings.retain(|b| b.id != src_id);
        Ok(())
    }
}

impl CatalogApi for MockCatalog {
    fn list_services(&self) -> Result<Vec<Service>, BackendError> {
        Ok(self.services())
    }

    fn get_service(&self, service_id: &str) -> Result<Service, BackendError> {
        self.service(service_id).ok_or_else(not_found)
    }

    fn get_service_plan(
        &self,
        service_id: &str,
        plan_id: &str,
    ) -> Result<ServicePlan, BackendError> {
        self.get_service(service_id)?
            .plan(plan_id)
            .cloned()
            .ok_or_else(not_found)
    }

    fn add_service(&self, service: &Service) -> Result<Service, BackendError> {
        let mut state = lock(&self.state);
        if state.services.values().any(|s| s.name == service.name) {
            return Err(status(
                409,
                format!("service with name: {} already exists", service.name),
            ));
        }
        let mut service = service.clone();
        service.id = state.next_id();
        for plan in &mut service.plans {
            plan.id = state.next_id();
        }
        state.stamp(&mut service.audit_trail);
        state.services.insert(service.id.clone(), service.clone());
        Ok(service)
    }

    fn update_service(&self, service_id: &str, patches: &[Patch]) -> Result<Service, BackendError> {
        let mut state = lock(&self.state);
        let current = state.services.get(service_id).ok_or_else(not_found)?;
        let updated = apply_patches(current, patches)?;
        state.services.insert(service_id.to_owned(), updated.clone());
        Ok(updated)
    }

    fn delete_service(&self, service_id: &str) -> Result<(), BackendError> {
        lock(&self.state)
            .services
            .remove(service_id)
            .map(|_| ())
            .ok_or_else(not_found)
    }

    fn list_instances(&self) -> Result<Vec<Instance>, BackendError> {
        Ok(self.instances())
    }

    fn list_services_instances(&self) -> Result<Vec<Instance>, BackendError> {
        Ok(self
            .instances()
            .into_iter()
            .filter(|i| i.instance_type == InstanceType::Service)
            .collect())
    }

    fn list_applications_instances(&self) -> Result<Vec<Instance>, BackendError> {
        Ok(self
            .instances()
            .into_iter()
            .filter(|i| i.instance_type == InstanceType::Application)
            .collect())
    }

    fn get_instance(&self, instance_id: &str) -> Result<Instance, BackendError> {
        let mut state = lock(&self.state);
        let next = {
            let instance = state.instances.get(instance_id).ok_or_else(not_found)?;
            state.settle.get(&instance.state).copied()
        };
        let instance = state.instances.get_mut(instance_id).ok_or_else(not_found)?;
        if let Some(next) = next {
            instance.state = next;
        }
        Ok(instance.clone())
    }

    fn get_instance_bindings(&self, instance_id: &str) -> Result<Vec<Instance>, BackendError> {
        let state = lock(&self.state);
        let instance = state.instances.get(instance_id).ok_or_else(not_found)?;
        Ok(instance
            .bindings
            .iter()
            .filter_map(|b| state.instances.get(&b.id).cloned())
            .collect())
    }

    fn add_service_instance(
        &self,
        service_id: &str,
        instance: &Instance,
    ) -> Result<Instance, BackendError> {
        let mut state = lock(&self.state);
        if !state.services.contains_key(service_id) {
            return Err(not_found());
        }
        let mut instance = instance.clone();
        instance.class_id = service_id.to_owned();
        state.add_instance(&instance)
    }

    fn add_service_broker_instance(
        &self,
        service_id: &str,
        instance: &Instance,
    ) -> Result<Instance, BackendError> {
        let mut instance = instance.clone();
        instance.class_id = service_id.to_owned();
        lock(&self.state).add_instance(&instance)
    }

    fn update_instance(
        &self,
        instance_id: &str,
        patches: &[Patch],
    ) -> Result<Instance, BackendError> {
        let mut state = lock(&self.state);
        let current = state.instances.get(instance_id).ok_or_else(not_found)?;
        let updated = apply_patches(current, patches)?;
        state
            .instances
            .insert(instance_id.to_owned(), updated.clone());
        Ok(updated)
    }

    fn list_applications(&self, filter: &ItemFilter) -> Result<Vec<Application>, BackendError> {
        let mut applications = self.applications();
        applications.sort_by(|a, b| a.name.cmp(&b.name));
        if filter.sort.as_deref() == Some("desc") {
            applications.reverse();
        }
        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l as usize);
        Ok(applications.into_iter().skip(offset).take(limit).collect())
    }

    fn get_application(&self, application_id: &str) -> Result<Application, BackendError> {
        self.application(application_id).ok_or_else(not_found)
    }

    fn list_application_instances(
        &self,
        application_id: &str,
    ) -> Result<Vec<Instance>, BackendError> {
        let state = lock(&self.state);
        if !state.applications.contains_key(application_id) {
            return Err(not_found());
        }
        Ok(state
            .instances
            .values()
            .filter(|i| {
                i.instance_type == InstanceType::Application && i.class_id == application_id
            })
            .cloned()
            .collect())
    }

    fn add_application(&self, application: &Application) -> Result<Application, BackendError> {
        let mut state = lock(&self.state);
        let mut application = application.clone();
        application.id = state.next_id();
        state.stamp(&mut application.audit_trail);
        state
            .applications
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn update_application(
        &self,
        application_id: &str,
        patches: &[Patch],
    ) -> Result<Application, BackendError> {
        let mut state = lock(&self.state);
        let current = state
            .applications
            .get(application_id)
            .ok_or_else(not_found)?;
        let updated = apply_patches(current, patches)?;
        state
            .applications
            .insert(application_id.to_owned(), updated.clone());
        Ok(updated)
    }

    fn delete_application(&self, application_id: &str) -> Result<(), BackendError> {
        lock(&self.state)
            .applications
            .remove(application_id)
            .map(|_| ())
            .ok_or_else(not_found)
    }

    fn get_image(&self, image_id: &str) -> Result<Image, BackendError> {
        self.image(image_id).ok_or_else(not_found)
    }

    fn add_image(&self, image: &Image) -> Result<Image, BackendError> {
        let mut state = lock(&self.state);
        if state.images.contains_key(&image.id) {
            return Err(status(409, format!("image {} already exists", image.id)));
        }
        let mut image = image.clone();
        state.stamp(&mut image.audit_trail);
        state.images.insert(image.id.clone(), image.clone());
        Ok(image)
    }

    fn update_image(&self, image_id: &str, patches: &[Patch]) -> Result<Image, BackendError> {
        let mut state = lock(&self.state);
        let current = state.images.get(image_id).ok_or_else(not_found)?;
        let updated = apply_patches(current, patches)?;
        state.images.insert(image_id.to_owned(), updated.clone());
        Ok(updated)
    }

    fn delete_image(&self, image_id: &str) -> Result<(), BackendError> {
        lock(&self.state)
            .images
            .remove(image_id)
            .map(|_| ())
            .ok_or_else(not_found)
    }

    fn add_template(&self, template: &Template) -> Result<Template, BackendError> {
        let mut state = lock(&self.state);
        let mut template = template.clone();
        template.id = state.next_id();
        state.stamp(&mut template.audit_trail);
        state.templates.insert(template.id.clone(), template.clone());
        Ok(template)
    }

    fn update_template(
        &self,
        template_id: &str,
        patches: &[Patch],
    ) -> Result<Template, BackendError> {
        let mut state = lock(&self.state);
        let current = state.templates.get(template_id).ok_or_else(not_found)?;
        let updated = apply_patches(current, patches)?;
        state
            .templates
            .insert(template_id.to_owned(), updated.clone());
        Ok(updated)
    }

    fn health(&self) -> Result<(), BackendError> {
        if lock(&self.state).unhealthy {
            return Err(unhealthy("catalog"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct BrokerState {
    versions: Option<Vec<VersionsResponse>>,
    logs: BTreeMap<String, BTreeMap<String, String>>,
    credentials: BTreeMap<String, Vec<ContainerCredentials>>,
    config_maps: BTreeMap<String, ConfigMap>,
    exposed: BTreeMap<String, Vec<String>>,
    binds: Vec<(String, String)>,
    unbinds: Vec<(String, String)>,
    unhealthy: bool,
}

/// Container broker double. When wired to a [`MockCatalog`], bind and
/// unbind update the destination instance's bindings like the real broker.
#[derive(Default)]
pub struct MockContainerBroker {
    state: Mutex<BrokerState>,
    catalog: Option<Arc<MockCatalog>>,
}

impl MockContainerBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wired_to(catalog: Arc<MockCatalog>) -> Self {
        Self {
            state: Mutex::default(),
            catalog: Some(catalog),
        }
    }

    /// Without versions set, `get_versions` fails with a 500.
    pub fn set_versions(&self, versions: Vec<VersionsResponse>) {
        lock(&self.state).versions = Some(versions);
    }

    pub fn set_logs(&self, instance_id: &str, logs: BTreeMap<String, String>) {
        lock(&self.state).logs.insert(instance_id.to_owned(), logs);
    }

    pub fn set_credentials(&self, instance_id: &str, credentials: Vec<ContainerCredentials>) {
        lock(&self.state)
            .credentials
            .insert(instance_id.to_owned(), credentials);
    }

    pub fn set_config_map(&self, name: &str, config_map: ConfigMap) {
        lock(&self.state)
            .config_maps
            .insert(name.to_owned(), config_map);
    }

    pub fn set_healthy(&self, healthy: bool) {
        lock(&self.state).unhealthy = !healthy;
    }

    pub fn binds(&self) -> Vec<(String, String)> {
        lock(&self.state).binds.clone()
    }

    pub fn unbinds(&self) -> Vec<(String, String)> {
        lock(&self.state).unbinds.clone()
    }

    pub fn exposed(&self, instance_id: &str) -> Option<Vec<String>> {
        lock(&self.state).exposed.get(instance_id).cloned()
    }
}

impl ContainerBrokerApi for MockContainerBroker {
    fn get_versions(&self) -> Result<Vec<VersionsResponse>, BackendError> {
        lock(&self.state)
            .versions
            .clone()
            .ok_or_else(|| status(500, "versions unavailable"))
    }

    fn get_instance_logs(
        &self,
        instance_id: &str,
    ) -> Result<BTreeMap<String, String>, BackendError> {
        lock(&self.state)
            .logs
            .get(instance_id)
            .cloned()
            .ok_or_else(not_found)
    }

    fn get_credentials(
        &self,
        instance_id: &str,
    ) -> Result<Vec<ContainerCredentials>, BackendError> {
        lock(&self.state)
            .credentials
            .get(instance_id)
            .cloned()
            .ok_or_else(not_found)
    }

    fn bind_instance(&self, src_id: &str, dst_id: &str) -> Result<MessageResponse, BackendError> {
        if let Some(ref catalog) = self.catalog {
            catalog.bind(src_id, dst_id)?;
        }
        lock(&self.state)
            .binds
            .push((src_id.to_owned(), dst_id.to_owned()));
        Ok(MessageResponse::accepted())
    }

    fn unbind_instance(
        &self,
        src_id: &str,
        dst_id: &str,
    ) -> Result<MessageResponse, BackendError> {
        if let Some(ref catalog) = self.catalog {
            catalog.unbind(src_id, dst_id)?;
        }
        lock(&self.state)
            .unbinds
            .push((src_id.to_owned(), dst_id.to_owned()));
        Ok(MessageResponse::accepted())
    }

    fn expose_instance(
        &self,
        instance_id: &str,
        request: &ExposeRequest,
    ) -> Result<Vec<String>, BackendError> {
        let hosts = vec![format!("{}.example.com", request.hostname)];
        lock(&self.state)
            .exposed
            .insert(instance_id.to_owned(), hosts.clone());
        Ok(hosts)
    }

    fn unexpose_instance(&self, instance_id: &str) -> Result<MessageResponse, BackendError> {
        lock(&self.state).exposed.remove(instance_id);
        Ok(MessageResponse::accepted())
    }

    fn get_config_map(&self, name: &str) -> Result<ConfigMap, BackendError> {
        lock(&self.state)
            .config_maps
            .get(name)
            .cloned()
            .ok_or_else(not_found)
    }

    fn health(&self) -> Result<(), BackendError> {
        if lock(&self.state).unhealthy {
            return Err(unhealthy("container broker"));
        }
        Ok(())
    }
}

/// Blob store double keyed by blob id.
#[derive(Default)]
pub struct MockBlobStore {
    blobs: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blob(&self, blob_id: &str) -> Option<Vec<u8>> {
        lock(&self.blobs).get(blob_id).map(|(_, data)| data.clone())
    }

    pub fn file_name(&self, blob_id: &str) -> Option<String> {
        lock(&self.blobs).get(blob_id).map(|(name, _)| name.clone())
    }
}

impl BlobStoreApi for MockBlobStore {
    fn store_blob(
        &self,
        blob_id: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<(), BackendError> {
        let mut blobs = lock(&self.blobs);
        if blobs.contains_key(blob_id) {
            return Err(status(409, format!("blob {blob_id} already exists")));
        }
        blobs.insert(blob_id.to_owned(), (file_name.to_owned(), data));
        Ok(())
    }

    fn delete_blob(&self, blob_id: &str) -> Result<(), BackendError> {
        lock(&self.blobs)
            .remove(blob_id)
            .map(|_| ())
            .ok_or_else(not_found)
    }
}

#[derive(Default)]
struct RepositoryState {
    templates: BTreeMap<String, RawTemplate>,
    unhealthy: bool,
}

#[derive(Default)]
pub struct MockTemplateRepository {
    state: Mutex<RepositoryState>,
}

impl MockTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_template(&self, template_id: &str, template: RawTemplate) {
        lock(&self.state)
            .templates
            .insert(template_id.to_owned(), template);
    }

    pub fn template(&self, template_id: &str) -> Option<RawTemplate> {
        lock(&self.state).templates.get(template_id).cloned()
    }

    pub fn set_healthy(&self, healthy: bool) {
        lock(&self.state).unhealthy = !healthy;
    }
}

impl TemplateRepositoryApi for MockTemplateRepository {
    fn create_template(
        &self,
        template_id: &str,
        template: &RawTemplate,
    ) -> Result<(), BackendError> {
        let mut template = template.clone();
        template.insert("id".to_owned(), Value::from(template_id));
        let mut state = lock(&self.state);
        if state.templates.contains_key(template_id) {
            return Err(status(409, format!("template {template_id} already exists")));
        }
        state.templates.insert(template_id.to_owned(), template);
        Ok(())
    }

    fn get_parsed_template(
        &self,
        template_id: &str,
        _instance_id: &str,
        _plan_name: &str,
    ) -> Result<TemplateBody, BackendError> {
        let raw = self.template(template_id).ok_or_else(not_found)?;
        Ok(parse_raw_template(&raw)?)
    }

    fn delete_template(&self, template_id: &str) -> Result<(), BackendError> {
        lock(&self.state)
            .templates
            .remove(template_id)
            .map(|_| ())
            .ok_or_else(not_found)
    }

    fn health(&self) -> Result<(), BackendError> {
        if lock(&self.state).unhealthy {
            return Err(unhealthy("template repository"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockImageFactory {
    unhealthy: Mutex<bool>,
}

impl MockImageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_healthy(&self, healthy: bool) {
        *lock(&self.unhealthy) = !healthy;
    }
}

impl ImageFactoryApi for MockImageFactory {
    fn health(&self) -> Result<(), BackendError> {
        if *lock(&self.unhealthy) {
            return Err(unhealthy("image factory"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct UaaState {
    passwords: HashMap<String, String>,
    roles: HashMap<String, Vec<String>>,
    tokens: HashMap<String, TokenInfo>,
}

/// Identity double. Each known user has one fixed token, `<username>-token`.
#[derive(Default)]
pub struct MockUaa {
    state: Mutex<UaaState>,
}

impl MockUaa {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user and return the bearer token issued to them.
    pub fn add_user(&self, username: &str, password: &str, roles: &[&str]) -> String {
        let token = format!("{username}-token");
        let scope: Vec<String> = roles.iter().map(|r| (*r).to_owned()).collect();
        let mut state = lock(&self.state);
        state
            .passwords
            .insert(username.to_owned(), password.to_owned());
        state.roles.insert(username.to_owned(), scope.clone());
        state.tokens.insert(
            token.clone(),
            TokenInfo {
                user_id: format!("{username}-id"),
                user_name: username.to_owned(),
                email: format!("{username}@example.com"),
                client_id: "atrium".to_owned(),
                scope,
                exp: chrono::Utc::now().timestamp() + 3600,
            },
        );
        token
    }
}

impl UaaApi for MockUaa {
    fn login(&self, username: &str, password: &str) -> Result<LoginResponse, BackendError> {
        let state = lock(&self.state);
        if state.passwords.get(username).map(String::as_str) != Some(password) {
            return Err(status(401, "Bad credentials"));
        }
        let scope = state.roles.get(username).cloned().unwrap_or_default();
        Ok(LoginResponse {
            access_token: format!("{username}-token"),
            refresh_token: format!("{username}-refresh"),
            token_type: "bearer".to_owned(),
            expires_in: 3599,
            scope: scope.join(" "),
            jti: format!("{username}-jti"),
        })
    }

    fn validate_token(&self, token: &str) -> Result<TokenInfo, BackendError> {
        lock(&self.state)
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| status(400, "Invalid access token"))
    }
}

#[derive(Default)]
struct UserManagementState {
    invitations: BTreeSet<String>,
    users: BTreeMap<String, Vec<UaaUser>>,
    password_changes: Vec<PasswordChange>,
    last_authorization: Option<String>,
}

#[derive(Default)]
pub struct MockUserManagement {
    state: Mutex<UserManagementState>,
}

impl MockUserManagement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, org_id: &str, user: UaaUser) {
        lock(&self.state)
            .users
            .entry(org_id.to_owned())
            .or_default()
            .push(user);
    }

    pub fn users(&self, org_id: &str) -> Vec<UaaUser> {
        lock(&self.state)
            .users
            .get(org_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn invitations(&self) -> Vec<String> {
        lock(&self.state).invitations.iter().cloned().collect()
    }

    pub fn password_changes(&self) -> Vec<PasswordChange> {
        lock(&self.state).password_changes.clone()
    }

    /// The `Authorization` header of the most recent call.
    pub fn last_authorization(&self) -> Option<String> {
        lock(&self.state).last_authorization.clone()
    }

    fn seen(&self, authorization: &str) -> MutexGuard<'_, UserManagementState> {
        let mut state = lock(&self.state);
        state.last_authorization = Some(authorization.to_owned());
        state
    }
}

impl UserManagementApi for MockUserManagement {
    fn invite_user(
        &self,
        authorization: &str,
        email: &str,
    ) -> Result<InvitationResponse, BackendError> {
        let mut state = self.seen(authorization);
        if !state.invitations.insert(email.to_owned()) {
            return Err(status(409, format!("user {email} already invited")));
        }
        Ok(InvitationResponse {
            state: "NEW".to_owned(),
            details: format!("invitation sent to {email}"),
        })
    }

    fn resend_invitation(&self, authorization: &str, email: &str) -> Result<(), BackendError> {
        let state = self.seen(authorization);
        if !state.invitations.contains(email) {
            return Err(not_found());
        }
        Ok(())
    }

    fn list_invitations(&self, authorization: &str) -> Result<Vec<String>, BackendError> {
        Ok(self.seen(authorization).invitations.iter().cloned().collect())
    }

    fn delete_invitation(&self, authorization: &str, email: &str) -> Result<(), BackendError> {
        if self.seen(authorization).invitations.remove(email) {
            Ok(())
        } else {
            Err(not_found())
        }
    }

    fn list_users(&self, authorization: &str, org_id: &str) -> Result<Vec<UaaUser>, BackendError> {
        Ok(self
            .seen(authorization)
            .users
            .get(org_id)
            .cloned()
            .unwrap_or_default())
    }

    fn delete_user(
        &self,
        authorization: &str,
        org_id: &str,
        user_guid: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.seen(authorization);
        let users = state.users.get_mut(org_id).ok_or_else(not_found)?;
        let before = users.len();
        users.retain(|u| u.guid != user_guid);
        if users.len() == before {
            return Err(not_found());
        }
        Ok(())
    }

    fn change_password(
        &self,
        authorization: &str,
        change: &PasswordChange,
    ) -> Result<(), BackendError> {
        self.seen(authorization)
            .password_changes
            .push(change.clone());
        Ok(())
    }
}

/// Component `/info` double; unknown components fail like an unreachable host.
#[derive(Default)]
pub struct MockComponentInfo {
    versions: Mutex<HashMap<String, String>>,
}

impl MockComponentInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_version(&self, component: &str, version: &str) {
        lock(&self.versions).insert(component.to_owned(), version.to_owned());
    }
}

impl ComponentInfoApi for MockComponentInfo {
    fn app_version(&self, component: &str) -> Result<String, BackendError> {
        lock(&self.versions)
            .get(component)
            .cloned()
            .ok_or_else(|| BackendError::Transport(format!("{component}: connection refused")))
    }
}

/// One mock per backend, with typed handles kept for seeding and assertions.
#[derive(Clone)]
pub struct MockBackends {
    pub catalog: Arc<MockCatalog>,
    pub container_broker: Arc<MockContainerBroker>,
    pub blob_store: Arc<MockBlobStore>,
    pub template_repository: Arc<MockTemplateRepository>,
    pub image_factory: Arc<MockImageFactory>,
    pub uaa: Arc<MockUaa>,
    pub user_management: Arc<MockUserManagement>,
    pub component_info: Arc<MockComponentInfo>,
}

impl Default for MockBackends {
    fn default() -> Self {
        let catalog = Arc::new(MockCatalog::new());
        Self {
            container_broker: Arc::new(MockContainerBroker::wired_to(Arc::clone(&catalog))),
            catalog,
            blob_store: Arc::new(MockBlobStore::new()),
            template_repository: Arc::new(MockTemplateRepository::new()),
            image_factory: Arc::new(MockImageFactory::new()),
            uaa: Arc::new(MockUaa::new()),
            user_management: Arc::new(MockUserManagement::new()),
            component_info: Arc::new(MockComponentInfo::new()),
        }
    }
}

impl MockBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backends(&self) -> Backends {
        Backends {
            catalog: self.catalog.clone(),
            container_broker: self.container_broker.clone(),
            blob_store: self.blob_store.clone(),
            template_repository: self.template_repository.clone(),
            image_factory: self.image_factory.clone(),
            uaa: self.uaa.clone(),
            user_management: self.user_management.clone(),
            component_info: self.component_info.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_models::catalog::LAST_STATE_CHANGE_REASON;
    use atrium_models::patch::instance_state_patches;
    use atrium_models::Metadata;

    fn running_instance(catalog: &MockCatalog) -> Instance {
        catalog.insert_instance(Instance {
            name: "db".to_owned(),
            state: InstanceState::Running,
            metadata: vec![Metadata::new("PLAN_ID", "p1")],
            ..Instance::default()
        })
    }

    #[test]
    fn state_update_checks_previous_value() {
        let catalog = MockCatalog::new();
        let instance = running_instance(&catalog);

        let patches = instance_state_patches(
            "Stop request made by: alice",
            InstanceState::Running,
            InstanceState::StopReq,
        )
        .unwrap();
        let updated = catalog.update_instance(&instance.id, &patches).unwrap();
        assert_eq!(updated.state, InstanceState::StopReq);
        assert_eq!(
            updated.metadata_value(LAST_STATE_CHANGE_REASON),
            Some("Stop request made by: alice")
        );

        let stale = catalog.update_instance(&instance.id, &patches).unwrap_err();
        assert_eq!(stale.status(), 409);
    }

    #[test]
    fn add_metadata_replaces_same_key() {
        let catalog = MockCatalog::new();
        let instance = running_instance(&catalog);
        let patch = Patch::new(
            PatchOperation::Add,
            "Metadata",
            &Metadata::new("PLAN_ID", "p2"),
        )
        .unwrap();
        let updated = catalog.update_instance(&instance.id, &[patch]).unwrap();
        assert_eq!(updated.metadata.len(), 1);
        assert_eq!(updated.metadata_value("PLAN_ID"), Some("p2"));
    }

    #[test]
    fn delete_missing_metadata_is_not_found() {
        let catalog = MockCatalog::new();
        let instance = running_instance(&catalog);
        let patch = Patch::new(
            PatchOperation::Delete,
            "Metadata",
            &Metadata::new("BROKER_OFFERING_x", ""),
        )
        .unwrap();
        let err = catalog.update_instance(&instance.id, &[patch]).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn settle_advances_state_on_read() {
        let catalog = MockCatalog::new();
        let instance = catalog.insert_instance(Instance {
            state: InstanceState::StopReq,
            ..Instance::default()
        });
        catalog.settle(InstanceState::StopReq, InstanceState::Stopped);
        assert_eq!(
            catalog.get_instance(&instance.id).unwrap().state,
            InstanceState::Stopped
        );
    }

    #[test]
    fn wired_broker_records_bindings_in_catalog() {
        let mocks = MockBackends::new();
        let app = mocks.catalog.insert_instance(Instance {
            name: "web".to_owned(),
            instance_type: InstanceType::Application,
            ..Instance::default()
        });
        let db = running_instance(&mocks.catalog);

        mocks.container_broker.bind_instance(&db.id, &app.id).unwrap();
        let bound = mocks.catalog.get_instance_bindings(&app.id).unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].id, db.id);

        mocks
            .container_broker
            .unbind_instance(&db.id, &app.id)
            .unwrap();
        assert!(mocks.catalog.get_instance_bindings(&app.id).unwrap().is_empty());
    }

    #[test]
    fn uaa_issues_token_for_known_user() {
        let uaa = MockUaa::new();
        let token = uaa.add_user("alice", "pw", &["tap.user"]);
        let login = uaa.login("alice", "pw").unwrap();
        assert_eq!(login.access_token, token);
        assert_eq!(uaa.validate_token(&token).unwrap().user_name, "alice");
        assert_eq!(uaa.login("alice", "nope").unwrap_err().status(), 401);
    }
}
