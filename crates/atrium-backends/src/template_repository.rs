use crate::http::{JsonClient, Method};
use crate::{BackendError, EndpointConfig};
use atrium_models::{RawTemplate, TemplateBody};

/// Storage for deployment templates.
pub trait TemplateRepositoryApi: Send + Sync {
    fn create_template(&self, template_id: &str, template: &RawTemplate)
        -> Result<(), BackendError>;
    /// The template with its placeholders filled for `instance_id` and `plan_name`.
    fn get_parsed_template(
        &self,
        template_id: &str,
        instance_id: &str,
        plan_name: &str,
    ) -> Result<TemplateBody, BackendError>;
    fn delete_template(&self, template_id: &str) -> Result<(), BackendError>;
    fn health(&self) -> Result<(), BackendError>;
}

pub struct HttpTemplateRepository {
    client: JsonClient,
}

impl HttpTemplateRepository {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            client: JsonClient::new(&config),
        }
    }
}

impl TemplateRepositoryApi for HttpTemplateRepository {
    fn create_template(
        &self,
        template_id: &str,
        template: &RawTemplate,
    ) -> Result<(), BackendError> {
        let mut template = template.clone();
        template.insert("id".to_owned(), serde_json::Value::from(template_id));
        let url = self.client.url("/api/v1/templates");
        let body = serde_json::to_vec(&template)?;
        self.client
            .execute(Method::Post, &url, None, "application/json", Some(&body), 201)
            .map(|_| ())
    }

    fn get_parsed_template(
        &self,
        template_id: &str,
        instance_id: &str,
        plan_name: &str,
    ) -> Result<TemplateBody, BackendError> {
        self.client.get(
            &format!(
                "/api/v1/parsed_template/{template_id}?serviceId={instance_id}&planName={plan_name}"
            ),
            200,
        )
    }

    fn delete_template(&self, template_id: &str) -> Result<(), BackendError> {
        self.client
            .delete(&format!("/api/v1/templates/{template_id}"), 204)
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

    #[test]
    fn create_template_injects_id() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/v1/templates")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"id":"t1","body":[]}"#.to_owned(),
            ))
            .with_status(201)
            .create();

        let repo = HttpTemplateRepository::new(EndpointConfig::new(&server.url()));
        let mut raw = RawTemplate::new();
        raw.insert("body".to_owned(), serde_json::json!([]));
        repo.create_template("t1", &raw).unwrap();
        mock.assert();
    }

    #[test]
    fn parsed_template_reports_broker() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/api/v1/parsed_template/t1?serviceId=x&planName=")
            .with_status(200)
            .with_body(r#"{"id":"t1","body":[{"componentType":"broker"}],"hooks":null}"#)
            .create();

        let repo = HttpTemplateRepository::new(EndpointConfig::new(&server.url()));
        let body = repo.get_parsed_template("t1", "x", "").unwrap();
        assert!(body.is_service_broker());
    }

    #[test]
    fn delete_template_expects_no_content() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("DELETE", "/api/v1/templates/t1")
            .with_status(200)
            .create();

        let repo = HttpTemplateRepository::new(EndpointConfig::new(&server.url()));
        assert_eq!(repo.delete_template("t1").unwrap_err().status(), 200);
    }
}
