//! Typed blocking client for the Atrium REST API.
//!
//! Every call goes to `/api/v3`. JSON calls use `ureq`; the two multipart
//! uploads (applications and binary offerings) use `reqwest`.
//!
//! ```no_run
//! use atrium_client::ApiClient;
//!
//! let mut client = ApiClient::new("http://localhost:8080");
//! client.login("admin", "secret")?;
//! for offering in client.list_offerings()? {
//!     println!("{}", offering.name);
//! }
//! # Ok::<(), atrium_client::ClientError>(())
//! ```

use atrium_models::broker::ContainerCredentials;
use atrium_models::filter::{ItemFilter, ServiceFilters};
use atrium_models::identity::{
    ChangePasswordRequest, InvitationRequest, InvitationResponse, LoginResponse, UaaUser,
};
use atrium_models::{
    Application, ApplicationInstance, CreateOfferingFromApplicationRequest, ExposureRequest,
    InstanceBindingRequest, InstanceBindings, Manifest, MessageResponse, Offering,
    PlatformComponent, PlatformInfo, ScaleApplicationRequest, Service, ServiceDeploy,
    ServiceInstance, ServiceInstanceRequest,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::blocking::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use thiserror::Error;
use tracing::debug;

const API_PREFIX: &str = "/api/v3";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Status the server answered with, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn status_error(status: u16, body: &[u8]) -> ClientError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
    ClientError::Status { status, message }
}

fn transport(e: impl std::fmt::Display) -> ClientError {
    ClientError::Transport(e.to_string())
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string()
}

fn with_query(path: &str, pairs: &[(&str, String)]) -> String {
    if pairs.is_empty() {
        return path.to_owned();
    }
    let query: Vec<String> = pairs
        .iter()
        .map(|(key, value)| format!("{key}={}", encode(value)))
        .collect();
    format!("{path}?{}", query.join("&"))
}

/// Body-less calls decode to `()`.
fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ClientError> {
    if data.is_empty() {
        return Ok(serde_json::from_str("null")?);
    }
    Ok(serde_json::from_slice(data)?)
}

pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    agent: ureq::Agent,
    upload: reqwest::blocking::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: None,
            agent,
            upload: reqwest::blocking::Client::new(),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_owned());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url)
    }

    fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|token| format!("bearer {token}"))
    }

    fn execute(
        &self,
        method: Method,
        url: &str,
        authorization: Option<&str>,
        body: Option<&[u8]>,
        expected: u16,
    ) -> Result<Vec<u8>, ClientError> {
        debug!("{} {url}", method.as_str());
        let json = "application/json";
        let result = match (method, body) {
            (Method::Get, _) => with_auth(self.agent.get(url), authorization).call(),
            (Method::Delete, None) => with_auth(self.agent.delete(url), authorization).call(),
            (Method::Delete, Some(body)) => with_auth(self.agent.delete(url), authorization)
                .header("Content-Type", json)
                .force_send_body()
                .send(body),
            (Method::Post, body) => with_auth(self.agent.post(url), authorization)
                .header("Content-Type", json)
                .send(body.unwrap_or_default()),
            (Method::Put, body) => with_auth(self.agent.put(url), authorization)
                .header("Content-Type", json)
                .send(body.unwrap_or_default()),
        };
        let resp = result.map_err(|e| ClientError::Transport(format!("{url}: {e}")))?;

        let status = resp.status().as_u16();
        let mut data = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut data)
            .map_err(transport)?;
        if status != expected {
            return Err(status_error(status, &data));
        }
        Ok(data)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let data = self.execute(
            Method::Get,
            &self.url(path),
            self.bearer().as_deref(),
            None,
            200,
        )?;
        decode(&data)
    }

    fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        expected: u16,
    ) -> Result<T, ClientError> {
        let payload = serde_json::to_vec(body)?;
        let data = self.execute(
            method,
            &self.url(path),
            self.bearer().as_deref(),
            Some(&payload),
            expected,
        )?;
        decode(&data)
    }

    fn delete(&self, path: &str, expected: u16) -> Result<Vec<u8>, ClientError> {
        self.execute(
            Method::Delete,
            &self.url(path),
            self.bearer().as_deref(),
            None,
            expected,
        )
    }

    fn upload<T: DeserializeOwned>(&self, path: &str, form: Form) -> Result<T, ClientError> {
        let url = self.url(path);
        debug!("POST {url} (multipart)");
        let mut req = self.upload.post(&url).multipart(form);
        if let Some(authorization) = self.bearer() {
            req = req.header("Authorization", authorization);
        }
        let resp = req
            .send()
            .map_err(|e| ClientError::Transport(format!("{url}: {e}")))?;
        let status = resp.status().as_u16();
        let data = resp.bytes().map_err(transport)?;
        if status != 202 {
            return Err(status_error(status, &data));
        }
        decode(&data)
    }

    /// Exchange credentials for a token, which later calls then use.
    pub fn login(&mut self, username: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let basic = format!("Basic {}", STANDARD.encode(format!("{username}:{password}")));
        let data = self.execute(Method::Get, &self.url("/login"), Some(&basic), None, 200)?;
        let response: LoginResponse = decode(&data)?;
        self.token = Some(response.access_token.clone());
        Ok(response)
    }

    /// `GET /healthz`.
    pub fn health(&self) -> Result<(), ClientError> {
        let url = format!("{}/healthz", self.base_url);
        self.execute(Method::Get, &url, None, None, 200)?;
        Ok(())
    }

    pub fn platform_info(&self) -> Result<PlatformInfo, ClientError> {
        self.get("/platform_info")
    }

    pub fn platform_components(&self) -> Result<Vec<PlatformComponent>, ClientError> {
        self.get("/platform_components")
    }

    // Offerings

    pub fn list_offerings(&self) -> Result<Vec<Offering>, ClientError> {
        self.get("/offerings")
    }

    pub fn get_offering(&self, offering_id: &str) -> Result<Offering, ClientError> {
        self.get(&format!("/offerings/{}", encode(offering_id)))
    }

    pub fn create_offering(&self, deploy: &ServiceDeploy) -> Result<Vec<Service>, ClientError> {
        self.send(Method::Post, "/offerings", deploy, 202)
    }

    pub fn create_offering_from_binary(
        &self,
        offering: &Service,
        manifest: &Manifest,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<Service, ClientError> {
        let form = Form::new()
            .text("offering", serde_json::to_string(offering)?)
            .text("manifest", serde_json::to_string(manifest)?)
            .part("blob", Part::bytes(data).file_name(file_name.to_owned()));
        self.upload("/offerings/binary", form)
    }

    pub fn create_offering_from_application(
        &self,
        request: &CreateOfferingFromApplicationRequest,
    ) -> Result<Service, ClientError> {
        self.send(Method::Post, "/offerings/application", request, 200)
    }

    pub fn delete_offering(&self, offering_id: &str) -> Result<(), ClientError> {
        self.delete(&format!("/offerings/{}", encode(offering_id)), 202)?;
        Ok(())
    }

    // Applications

    pub fn list_applications(
        &self,
        filter: &ItemFilter,
    ) -> Result<Vec<ApplicationInstance>, ClientError> {
        self.get(&with_query("/applications", &filter.query_pairs()))
    }

    pub fn get_application(&self, application_id: &str) -> Result<ApplicationInstance, ClientError> {
        self.get(&format!("/applications/{}", encode(application_id)))
    }

    pub fn create_application(
        &self,
        manifest: &Manifest,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<Application, ClientError> {
        let form = Form::new()
            .text("manifest", serde_json::to_string(manifest)?)
            .part("blob", Part::bytes(data).file_name(file_name.to_owned()));
        self.upload("/applications", form)
    }

    pub fn delete_application(&self, application_id: &str) -> Result<(), ClientError> {
        self.delete(&format!("/applications/{}", encode(application_id)), 204)?;
        Ok(())
    }

    pub fn application_logs(
        &self,
        application_id: &str,
    ) -> Result<BTreeMap<String, String>, ClientError> {
        self.get(&format!("/applications/{}/logs", encode(application_id)))
    }

    pub fn scale_application(
        &self,
        application_id: &str,
        replicas: i32,
    ) -> Result<MessageResponse, ClientError> {
        self.send(
            Method::Put,
            &format!("/applications/{}/scale", encode(application_id)),
            &ScaleApplicationRequest { replicas },
            202,
        )
    }

    fn instance_action(
        &self,
        kind: &str,
        id: &str,
        action: &str,
    ) -> Result<MessageResponse, ClientError> {
        self.send(
            Method::Put,
            &format!("/{kind}/{}/{action}", encode(id)),
            &serde_json::Value::Null,
            202,
        )
    }

    pub fn start_application(&self, application_id: &str) -> Result<MessageResponse, ClientError> {
        self.instance_action("applications", application_id, "start")
    }

    pub fn stop_application(&self, application_id: &str) -> Result<MessageResponse, ClientError> {
        self.instance_action("applications", application_id, "stop")
    }

    pub fn restart_application(
        &self,
        application_id: &str,
    ) -> Result<MessageResponse, ClientError> {
        self.instance_action("applications", application_id, "restart")
    }

    pub fn application_bindings(&self, application_id: &str) -> Result<InstanceBindings, ClientError> {
        self.get(&format!("/applications/{}/bindings", encode(application_id)))
    }

    pub fn bind_to_application(
        &self,
        application_id: &str,
        request: &InstanceBindingRequest,
    ) -> Result<MessageResponse, ClientError> {
        self.send(
            Method::Post,
            &format!("/applications/{}/bindings", encode(application_id)),
            request,
            202,
        )
    }

    /// Remove the binding of service instance `service_id` from an application.
    pub fn unbind_service_from_application(
        &self,
        application_id: &str,
        service_id: &str,
    ) -> Result<MessageResponse, ClientError> {
        let path = format!(
            "/applications/{}/bindings/services/{}",
            encode(application_id),
            encode(service_id)
        );
        decode(&self.delete(&path, 202)?)
    }

    pub fn unbind_application_from_application(
        &self,
        application_id: &str,
        src_application_id: &str,
    ) -> Result<MessageResponse, ClientError> {
        let path = format!(
            "/applications/{}/bindings/applications/{}",
            encode(application_id),
            encode(src_application_id)
        );
        decode(&self.delete(&path, 202)?)
    }

    // Services

    pub fn list_services(&self, filters: &ServiceFilters) -> Result<Vec<ServiceInstance>, ClientError> {
        self.get(&with_query("/services", &filters.query_pairs()))
    }

    pub fn get_service(&self, instance_id: &str) -> Result<ServiceInstance, ClientError> {
        self.get(&format!("/services/{}", encode(instance_id)))
    }

    pub fn create_service(
        &self,
        request: &ServiceInstanceRequest,
    ) -> Result<ServiceInstance, ClientError> {
        self.send(Method::Post, "/services", request, 202)
    }

    pub fn delete_service(&self, instance_id: &str) -> Result<(), ClientError> {
        self.delete(&format!("/services/{}", encode(instance_id)), 202)?;
        Ok(())
    }

    pub fn service_logs(&self, instance_id: &str) -> Result<BTreeMap<String, String>, ClientError> {
        self.get(&format!("/services/{}/logs", encode(instance_id)))
    }

    pub fn service_credentials(
        &self,
        instance_id: &str,
    ) -> Result<Vec<ContainerCredentials>, ClientError> {
        self.get(&format!("/services/{}/credentials", encode(instance_id)))
    }

    /// Expose or hide a service instance; returns the exposed hosts.
    pub fn expose_service(&self, instance_id: &str, exposed: bool) -> Result<Vec<String>, ClientError> {
        self.send(
            Method::Put,
            &format!("/services/{}/expose", encode(instance_id)),
            &ExposureRequest { exposed },
            200,
        )
    }

    pub fn start_service(&self, instance_id: &str) -> Result<MessageResponse, ClientError> {
        self.instance_action("services", instance_id, "start")
    }

    pub fn stop_service(&self, instance_id: &str) -> Result<MessageResponse, ClientError> {
        self.instance_action("services", instance_id, "stop")
    }

    pub fn restart_service(&self, instance_id: &str) -> Result<MessageResponse, ClientError> {
        self.instance_action("services", instance_id, "restart")
    }

    pub fn service_bindings(&self, instance_id: &str) -> Result<InstanceBindings, ClientError> {
        self.get(&format!("/services/{}/bindings", encode(instance_id)))
    }

    pub fn bind_to_service(
        &self,
        instance_id: &str,
        request: &InstanceBindingRequest,
    ) -> Result<MessageResponse, ClientError> {
        self.send(
            Method::Post,
            &format!("/services/{}/bindings", encode(instance_id)),
            request,
            202,
        )
    }

    pub fn unbind_service_from_service(
        &self,
        instance_id: &str,
        src_service_id: &str,
    ) -> Result<MessageResponse, ClientError> {
        let path = format!(
            "/services/{}/bindings/services/{}",
            encode(instance_id),
            encode(src_service_id)
        );
        decode(&self.delete(&path, 202)?)
    }

    pub fn unbind_application_from_service(
        &self,
        instance_id: &str,
        application_id: &str,
    ) -> Result<MessageResponse, ClientError> {
        let path = format!(
            "/services/{}/bindings/applications/{}",
            encode(instance_id),
            encode(application_id)
        );
        decode(&self.delete(&path, 202)?)
    }

    // Users

    pub fn invite_user(&self, email: &str) -> Result<InvitationResponse, ClientError> {
        self.send(Method::Post, "/users/invitations", &invitation(email), 201)
    }

    pub fn resend_invitation(&self, email: &str) -> Result<(), ClientError> {
        self.send(Method::Post, "/users/invitations/resend", &invitation(email), 201)
    }

    pub fn list_invitations(&self) -> Result<Vec<String>, ClientError> {
        self.get("/users/invitations")
    }

    pub fn delete_invitation(&self, email: &str) -> Result<(), ClientError> {
        self.send(Method::Delete, "/users/invitations", &invitation(email), 204)
    }

    pub fn list_users(&self) -> Result<Vec<UaaUser>, ClientError> {
        self.get("/users")
    }

    pub fn delete_user(&self, email: &str) -> Result<(), ClientError> {
        self.send(Method::Delete, "/users", &invitation(email), 204)
    }

    pub fn change_password(&self, current_password: &str, new_password: &str) -> Result<(), ClientError> {
        let request = ChangePasswordRequest {
            current_password: current_password.to_owned(),
            new_password: new_password.to_owned(),
        };
        self.send(Method::Put, "/users/current/password", &request, 200)
    }

    /// Download a CLI binary, e.g. `linux64`.
    pub fn cli_resource(&self, resource_id: &str) -> Result<Vec<u8>, ClientError> {
        self.execute(
            Method::Get,
            &self.url(&format!("/resources/cli/{}", encode(resource_id))),
            self.bearer().as_deref(),
            None,
            200,
        )
    }
}

fn with_auth<B>(
    req: ureq::RequestBuilder<B>,
    authorization: Option<&str>,
) -> ureq::RequestBuilder<B> {
    match authorization {
        Some(value) => req.header("Authorization", value),
        None => req,
    }
}

fn invitation(email: &str) -> InvitationRequest {
    InvitationRequest {
        email: email.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn login_stores_token_for_later_calls() {
        let mut server = mockito::Server::new();
        let login = server
            .mock("GET", "/api/v3/login")
            .match_header(
                "authorization",
                format!("Basic {}", STANDARD.encode("alice:secret")).as_str(),
            )
            .with_status(200)
            .with_body(r#"{"access_token":"tok-1","token_type":"bearer"}"#)
            .create();
        let offerings = server
            .mock("GET", "/api/v3/offerings")
            .match_header("authorization", "bearer tok-1")
            .with_status(200)
            .with_body(r#"[{"name":"redis","id":"o1"}]"#)
            .create();

        let mut client = ApiClient::new(&server.url());
        let response = client.login("alice", "secret").unwrap();
        assert_eq!(response.access_token, "tok-1");
        assert_eq!(client.token(), Some("tok-1"));

        let list = client.list_offerings().unwrap();
        assert_eq!(list[0].name, "redis");
        login.assert();
        offerings.assert();
    }

    #[test]
    fn error_body_message_is_surfaced() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/api/v3/applications/missing")
            .with_status(404)
            .with_body(r#"{"message":"Key not found"}"#)
            .create();

        let client = ApiClient::new(&server.url()).with_token("t");
        let err = client.get_application("missing").unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "HTTP 404: Key not found");
    }

    #[test]
    fn list_filters_become_query_parameters() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/v3/services")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("offeringName".into(), "my db".into()),
                Matcher::UrlEncoded("planName".into(), "free".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create();

        let client = ApiClient::new(&server.url()).with_token("t");
        let filters = ServiceFilters {
            offering_name: "my db".to_owned(),
            plan_name: "free".to_owned(),
            ..ServiceFilters::default()
        };
        assert!(client.list_services(&filters).unwrap().is_empty());
        mock.assert();
    }

    #[test]
    fn scale_sends_replicas() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("PUT", "/api/v3/applications/a1/scale")
            .match_body(Matcher::Json(serde_json::json!({ "replicas": 3 })))
            .with_status(202)
            .with_body(r#"{"message":"Accepted"}"#)
            .create();

        let client = ApiClient::new(&server.url()).with_token("t");
        let response = client.scale_application("a1", 3).unwrap();
        assert_eq!(response, MessageResponse::accepted());
        mock.assert();
    }

    #[test]
    fn delete_user_carries_email_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("DELETE", "/api/v3/users")
            .match_body(Matcher::Json(serde_json::json!({ "email": "bob@example.com" })))
            .with_status(204)
            .create();

        let client = ApiClient::new(&server.url()).with_token("t");
        client.delete_user("bob@example.com").unwrap();
        mock.assert();
    }

    #[test]
    fn application_upload_is_multipart() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/v3/applications")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=".to_owned()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="manifest""#.to_owned()),
                Matcher::Regex(r#"filename="app.tar.gz""#.to_owned()),
            ]))
            .with_status(202)
            .with_body(r#"{"id":"a1","name":"web"}"#)
            .create();

        let client = ApiClient::new(&server.url()).with_token("t");
        let manifest = Manifest {
            name: "web".to_owned(),
            image_type: "GO".to_owned(),
            instances: 1,
            ..Manifest::default()
        };
        let app = client
            .create_application(&manifest, "app.tar.gz", b"tarball".to_vec())
            .unwrap();
        assert_eq!(app.id, "a1");
        mock.assert();
    }

    #[test]
    fn unreachable_server_is_transport_error() {
        let client = ApiClient::new("http://127.0.0.1:1");
        let err = client.health().unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(err.status(), None);
    }
}
