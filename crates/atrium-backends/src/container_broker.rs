use crate::http::{JsonClient, Method};
use crate::{BackendError, EndpointConfig};
use atrium_models::broker::{ConfigMap, ContainerCredentials, ExposeRequest, VersionsResponse};
use atrium_models::MessageResponse;
use std::collections::BTreeMap;

/// The container broker places, exposes and wires running containers.
pub trait ContainerBrokerApi: Send + Sync {
    fn get_versions(&self) -> Result<Vec<VersionsResponse>, BackendError>;
    fn get_instance_logs(&self, instance_id: &str)
        -> Result<BTreeMap<String, String>, BackendError>;
    fn get_credentials(&self, instance_id: &str)
        -> Result<Vec<ContainerCredentials>, BackendError>;
    fn bind_instance(&self, src_id: &str, dst_id: &str) -> Result<MessageResponse, BackendError>;
    fn unbind_instance(&self, src_id: &str, dst_id: &str)
        -> Result<MessageResponse, BackendError>;
    fn expose_instance(
        &self,
        instance_id: &str,
        request: &ExposeRequest,
    ) -> Result<Vec<String>, BackendError>;
    fn unexpose_instance(&self, instance_id: &str) -> Result<MessageResponse, BackendError>;
    fn get_config_map(&self, name: &str) -> Result<ConfigMap, BackendError>;
    fn health(&self) -> Result<(), BackendError>;
}

pub struct HttpContainerBroker {
    client: JsonClient,
}

impl HttpContainerBroker {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            client: JsonClient::new(&config),
        }
    }
}

impl ContainerBrokerApi for HttpContainerBroker {
    fn get_versions(&self) -> Result<Vec<VersionsResponse>, BackendError> {
        self.client.get("/api/v1/versions", 200)
    }

    fn get_instance_logs(
        &self,
        instance_id: &str,
    ) -> Result<BTreeMap<String, String>, BackendError> {
        self.client
            .get(&format!("/api/v1/service/{instance_id}/logs"), 200)
    }

    fn get_credentials(
        &self,
        instance_id: &str,
    ) -> Result<Vec<ContainerCredentials>, BackendError> {
        self.client
            .get(&format!("/api/v1/service/{instance_id}/credentials"), 200)
    }

    fn bind_instance(&self, src_id: &str, dst_id: &str) -> Result<MessageResponse, BackendError> {
        self.client.send(
            Method::Post,
            &format!("/api/v1/bind/{src_id}/{dst_id}"),
            &serde_json::Value::Null,
            202,
        )
    }

    fn unbind_instance(
        &self,
        src_id: &str,
        dst_id: &str,
    ) -> Result<MessageResponse, BackendError> {
        self.client.send(
            Method::Post,
            &format!("/api/v1/unbind/{src_id}/{dst_id}"),
            &serde_json::Value::Null,
            202,
        )
    }

    fn expose_instance(
        &self,
        instance_id: &str,
        request: &ExposeRequest,
    ) -> Result<Vec<String>, BackendError> {
        self.client.send(
            Method::Post,
            &format!("/api/v1/service/{instance_id}/expose"),
            request,
            200,
        )
    }

    fn unexpose_instance(&self, instance_id: &str) -> Result<MessageResponse, BackendError> {
        let url = self
            .client
            .url(&format!("/api/v1/service/{instance_id}/expose"));
        let body = self
            .client
            .execute(Method::Delete, &url, None, "", None, 202)?;
        crate::http::decode::<Option<MessageResponse>>(&body).map(Option::unwrap_or_default)
    }

    fn get_config_map(&self, name: &str) -> Result<ConfigMap, BackendError> {
        self.client.get(&format!("/api/v1/configmap/{name}"), 200)
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
    fn bind_posts_to_src_and_dst() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/v1/bind/src1/dst1")
            .with_status(202)
            .with_body(r#"{"message":"Accepted"}"#)
            .create();

        let broker = HttpContainerBroker::new(EndpointConfig::new(&server.url()));
        let resp = broker.bind_instance("src1", "dst1").unwrap();
        assert_eq!(resp.message, "Accepted");
        mock.assert();
    }

    #[test]
    fn expose_returns_hosts() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/api/v1/service/i1/expose")
            .match_body(mockito::Matcher::JsonString(r#"{"hostname":"web"}"#.to_owned()))
            .with_status(200)
            .with_body(r#"["web.example.com"]"#)
            .create();

        let broker = HttpContainerBroker::new(EndpointConfig::new(&server.url()));
        let hosts = broker
            .expose_instance(
                "i1",
                &ExposeRequest {
                    hostname: "web".to_owned(),
                },
            )
            .unwrap();
        assert_eq!(hosts, vec!["web.example.com"]);
    }

    #[test]
    fn unexpose_tolerates_empty_body() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("DELETE", "/api/v1/service/i1/expose")
            .with_status(202)
            .create();

        let broker = HttpContainerBroker::new(EndpointConfig::new(&server.url()));
        assert_eq!(broker.unexpose_instance("i1").unwrap(), MessageResponse::default());
    }

    #[test]
    fn logs_are_a_container_map() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/api/v1/service/i1/logs")
            .with_status(200)
            .with_body(r#"{"web-1":"started"}"#)
            .create();

        let broker = HttpContainerBroker::new(EndpointConfig::new(&server.url()));
        let logs = broker.get_instance_logs("i1").unwrap();
        assert_eq!(logs.get("web-1").map(String::as_str), Some("started"));
    }
}
