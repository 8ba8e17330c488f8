use crate::http::{JsonClient, Method};
use crate::{BackendError, EndpointConfig};
use atrium_models::filter::ItemFilter;
use atrium_models::{Application, Image, Instance, Patch, Service, ServicePlan, Template};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

const API_PREFIX: &str = "/api/v1";

/// The catalog: source of truth for services, instances, applications, images and templates.
pub trait CatalogApi: Send + Sync {
    fn list_services(&self) -> Result<Vec<Service>, BackendError>;
    fn get_service(&self, service_id: &str) -> Result<Service, BackendError>;
    fn get_service_plan(&self, service_id: &str, plan_id: &str)
        -> Result<ServicePlan, BackendError>;
    fn add_service(&self, service: &Service) -> Result<Service, BackendError>;
    fn update_service(&self, service_id: &str, patches: &[Patch]) -> Result<Service, BackendError>;
    fn delete_service(&self, service_id: &str) -> Result<(), BackendError>;

    fn list_instances(&self) -> Result<Vec<Instance>, BackendError>;
    fn list_services_instances(&self) -> Result<Vec<Instance>, BackendError>;
    fn list_applications_instances(&self) -> Result<Vec<Instance>, BackendError>;
    fn get_instance(&self, instance_id: &str) -> Result<Instance, BackendError>;
    fn get_instance_bindings(&self, instance_id: &str) -> Result<Vec<Instance>, BackendError>;
    fn add_service_instance(
        &self,
        service_id: &str,
        instance: &Instance,
    ) -> Result<Instance, BackendError>;
    fn add_service_broker_instance(
        &self,
        service_id: &str,
        instance: &Instance,
    ) -> Result<Instance, BackendError>;
    fn update_instance(&self, instance_id: &str, patches: &[Patch])
        -> Result<Instance, BackendError>;

    fn list_applications(&self, filter: &ItemFilter) -> Result<Vec<Application>, BackendError>;
    fn get_application(&self, application_id: &str) -> Result<Application, BackendError>;
    fn list_application_instances(
        &self,
        application_id: &str,
    ) -> Result<Vec<Instance>, BackendError>;
    fn add_application(&self, application: &Application) -> Result<Application, BackendError>;
    fn update_application(
        &self,
        application_id: &str,
        patches: &[Patch],
    ) -> Result<Application, BackendError>;
    fn delete_application(&self, application_id: &str) -> Result<(), BackendError>;

    fn get_image(&self, image_id: &str) -> Result<Image, BackendError>;
    fn add_image(&self, image: &Image) -> Result<Image, BackendError>;
    fn update_image(&self, image_id: &str, patches: &[Patch]) -> Result<Image, BackendError>;
    fn delete_image(&self, image_id: &str) -> Result<(), BackendError>;

    fn add_template(&self, template: &Template) -> Result<Template, BackendError>;
    fn update_template(&self, template_id: &str, patches: &[Patch])
        -> Result<Template, BackendError>;

    fn health(&self) -> Result<(), BackendError>;
}

pub struct HttpCatalog {
    client: JsonClient,
}

impl HttpCatalog {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            client: JsonClient::new(&config),
        }
    }
}

fn path(suffix: &str) -> String {
    format!("{API_PREFIX}/{suffix}")
}

impl CatalogApi for HttpCatalog {
    fn list_services(&self) -> Result<Vec<Service>, BackendError> {
        self.client.get(&path("services"), 200)
    }

    fn get_service(&self, service_id: &str) -> Result<Service, BackendError> {
        self.client.get(&path(&format!("services/{service_id}")), 200)
    }

    fn get_service_plan(
        &self,
        service_id: &str,
        plan_id: &str,
    ) -> Result<ServicePlan, BackendError> {
        self.client
            .get(&path(&format!("services/{service_id}/plans/{plan_id}")), 200)
    }

    fn add_service(&self, service: &Service) -> Result<Service, BackendError> {
        self.client
            .send(Method::Post, &path("services"), service, 201)
    }

    fn update_service(&self, service_id: &str, patches: &[Patch]) -> Result<Service, BackendError> {
        self.client.send(
            Method::Patch,
            &path(&format!("services/{service_id}")),
            &patches,
            200,
        )
    }

    fn delete_service(&self, service_id: &str) -> Result<(), BackendError> {
        self.client
            .delete(&path(&format!("services/{service_id}")), 204)
    }

    fn list_instances(&self) -> Result<Vec<Instance>, BackendError> {
        self.client.get(&path("instances"), 200)
    }

    fn list_services_instances(&self) -> Result<Vec<Instance>, BackendError> {
        self.client.get(&path("services/instances"), 200)
    }

    fn list_applications_instances(&self) -> Result<Vec<Instance>, BackendError> {
        self.client.get(&path("applications/instances"), 200)
    }

    fn get_instance(&self, instance_id: &str) -> Result<Instance, BackendError> {
        self.client
            .get(&path(&format!("instances/{instance_id}")), 200)
    }

    fn get_instance_bindings(&self, instance_id: &str) -> Result<Vec<Instance>, BackendError> {
        self.client
            .get(&path(&format!("instances/{instance_id}/bindings")), 200)
    }

    fn add_service_instance(
        &self,
        service_id: &str,
        instance: &Instance,
    ) -> Result<Instance, BackendError> {
        self.client.send(
            Method::Post,
            &path(&format!("services/{service_id}/instances")),
            instance,
            201,
        )
    }

    fn add_service_broker_instance(
        &self,
        service_id: &str,
        instance: &Instance,
    ) -> Result<Instance, BackendError> {
        let mut instance = instance.clone();
        instance.class_id = service_id.to_owned();
        self.client
            .send(Method::Post, &path("instances"), &instance, 201)
    }

    fn update_instance(
        &self,
        instance_id: &str,
        patches: &[Patch],
    ) -> Result<Instance, BackendError> {
        self.client.send(
            Method::Patch,
            &path(&format!("instances/{instance_id}")),
            &patches,
            200,
        )
    }

    fn list_applications(&self, filter: &ItemFilter) -> Result<Vec<Application>, BackendError> {
        let mut url = path("applications");
        if !filter.is_empty() {
            let query: Vec<String> = filter
                .query_pairs()
                .into_iter()
                .map(|(k, v)| format!("{k}={}", utf8_percent_encode(&v, NON_ALPHANUMERIC)))
                .collect();
            url = format!("{url}?{}", query.join("&"));
        }
        self.client.get(&url, 200)
    }

    fn get_application(&self, application_id: &str) -> Result<Application, BackendError> {
        self.client
            .get(&path(&format!("applications/{application_id}")), 200)
    }

    fn list_application_instances(
        &self,
        application_id: &str,
    ) -> Result<Vec<Instance>, BackendError> {
        self.client.get(
            &path(&format!("applications/{application_id}/instances")),
            200,
        )
    }

    fn add_application(&self, application: &Application) -> Result<Application, BackendError> {
        self.client
            .send(Method::Post, &path("applications"), application, 201)
    }

    fn update_application(
        &self,
        application_id: &str,
        patches: &[Patch],
    ) -> Result<Application, BackendError> {
        self.client.send(
            Method::Patch,
            &path(&format!("applications/{application_id}")),
            &patches,
            200,
        )
    }

    fn delete_application(&self, application_id: &str) -> Result<(), BackendError> {
        self.client
            .delete(&path(&format!("applications/{application_id}")), 204)
    }

    fn get_image(&self, image_id: &str) -> Result<Image, BackendError> {
        self.client.get(&path(&format!("images/{image_id}")), 200)
    }

    fn add_image(&self, image: &Image) -> Result<Image, BackendError> {
        self.client.send(Method::Post, &path("images"), image, 201)
    }

    fn update_image(&self, image_id: &str, patches: &[Patch]) -> Result<Image, BackendError> {
        self.client.send(
            Method::Patch,
            &path(&format!("images/{image_id}")),
            &patches,
            200,
        )
    }

    fn delete_image(&self, image_id: &str) -> Result<(), BackendError> {
        self.client
            .delete(&path(&format!("images/{image_id}")), 204)
    }

    fn add_template(&self, template: &Template) -> Result<Template, BackendError> {
        self.client
            .send(Method::Post, &path("templates"), template, 201)
    }

    fn update_template(
        &self,
        template_id: &str,
        patches: &[Patch],
    ) -> Result<Template, BackendError> {
        self.client.send(
            Method::Patch,
            &path(&format!("templates/{template_id}")),
            &patches,
            200,
        )
    }

    fn health(&self) -> Result<(), BackendError> {
        self.client
            .execute(Method::Get, &self.client.url("/healthz"), None, "", None, 200)
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_models::patch::instance_state_patches;
    use atrium_models::InstanceState;

    #[test]
    fn get_instance_parses_body() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/api/v1/instances/i1")
            .with_status(200)
            .with_body(r#"{"id":"i1","name":"db","type":"SERVICE","state":"RUNNING"}"#)
            .create();

        let catalog = HttpCatalog::new(EndpointConfig::new(&server.url()));
        let instance = catalog.get_instance("i1").unwrap();
        assert_eq!(instance.name, "db");
        assert_eq!(instance.state, InstanceState::Running);
    }

    #[test]
    fn update_instance_sends_patch_list() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("PATCH", "/api/v1/instances/i1")
            .match_body(mockito::Matcher::Regex(
                r#""value":"STOP_REQ","prevValue":"RUNNING""#.to_owned(),
            ))
            .with_status(200)
            .with_body(r#"{"id":"i1","state":"STOP_REQ"}"#)
            .create();

        let catalog = HttpCatalog::new(EndpointConfig::new(&server.url()));
        let patches =
            instance_state_patches("", InstanceState::Running, InstanceState::StopReq).unwrap();
        let updated = catalog.update_instance("i1", &patches).unwrap();
        assert_eq!(updated.state, InstanceState::StopReq);
        mock.assert();
    }

    #[test]
    fn add_service_expects_created() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/api/v1/services")
            .with_status(409)
            .with_body("service exists")
            .create();

        let catalog = HttpCatalog::new(EndpointConfig::new(&server.url()));
        let err = catalog.add_service(&Service::default()).unwrap_err();
        assert_eq!(err.status(), 409);
    }

    #[test]
    fn list_applications_forwards_filter() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/v1/applications?limit=2&offset=4")
            .with_status(200)
            .with_body("[]")
            .create();

        let catalog = HttpCatalog::new(EndpointConfig::new(&server.url()));
        let filter = ItemFilter {
            limit: Some(2),
            offset: Some(4),
            sort: None,
        };
        assert!(catalog.list_applications(&filter).unwrap().is_empty());
        mock.assert();
    }

    #[test]
    fn list_applications_encodes_sort_value() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/v1/applications")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("limit".to_owned(), "10".to_owned()),
                mockito::Matcher::UrlEncoded("sort".to_owned(), "name&limit=999".to_owned()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create();

        let catalog = HttpCatalog::new(EndpointConfig::new(&server.url()));
        let filter = ItemFilter {
            limit: Some(10),
            offset: None,
            sort: Some("name&limit=999".to_owned()),
        };
        assert!(catalog.list_applications(&filter).unwrap().is_empty());
        mock.assert();
    }
}
