//! HTTP front end of the Atrium gateway.
//!
//! Serves the versioned REST API (see [`routes`]) plus the unversioned
//! `/api` probe and `/healthz`. Each request is authorized against UAA
//! and then handed to the [`Gateway`].
//!
//! The [`TestServer`] helper starts a server on a random port for integration testing.

pub mod request;
pub mod routes;

use atrium_backends::BackendError;
use atrium_core::{ApiError, ConfigError, Gateway, RequestContext};
use atrium_models::filter::{ItemFilter, ServiceFilters};
use atrium_models::identity::{
    ChangePasswordRequest, InvitationRequest, ADMIN_ROLE, USER_ROLE,
};
use atrium_models::{
    CreateOfferingFromApplicationRequest, ExposureRequest, InstanceBindingRequest, Manifest,
    ScaleApplicationRequest, Service, ServiceDeploy, ServiceInstanceRequest,
};
use request::{basic_credentials, header_value, read_json, MultipartForm, Query};
use routes::{cli_resource_file, strip_version_prefix, Access, Endpoint, InstanceAction};
use serde::Serialize;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{debug, error, info};

type HttpResponse = Response<Cursor<Vec<u8>>>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {message}")]
    Bind { addr: String, message: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Server-side knobs that the gateway does not know about.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Directory holding the downloadable CLI binaries.
    pub resources_dir: PathBuf,
    /// Skip token checks and act as `admin` on every request.
    pub disable_auth: bool,
}

pub struct Api {
    gateway: Gateway,
    config: ServerConfig,
}

impl Api {
    pub fn new(gateway: Gateway, config: ServerConfig) -> Self {
        Self { gateway, config }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }
}

fn header(name: &str, value: &str) -> Result<Header, ApiError> {
    Header::from_bytes(name, value)
        .map_err(|()| ApiError::internal(format!("invalid header {name}: {value}")))
}

fn respond_json(status: u16, body: &impl Serialize) -> Result<HttpResponse, ApiError> {
    let data = serde_json::to_vec(body)
        .map_err(|e| ApiError::internal(format!("cannot serialize response: {e}")))?;
    Ok(Response::from_data(data)
        .with_status_code(StatusCode(status))
        .with_header(header("Content-Type", "application/json")?))
}

fn respond_empty(status: u16) -> HttpResponse {
    Response::from_data(Vec::new()).with_status_code(StatusCode(status))
}

fn respond_err(req: Request, err: &ApiError) {
    let body = serde_json::json!({ "message": err.message }).to_string();
    let mut response = Response::from_string(body).with_status_code(StatusCode(err.status));
    if let Ok(content_type) = header("Content-Type", "application/json") {
        response.add_header(content_type);
    }
    let _ = req.respond(response);
}

impl Api {
    fn authenticate(&self, req: &Request, access: Access) -> Result<RequestContext, ApiError> {
        let authorization = header_value(req, "Authorization").unwrap_or_default();
        if access == Access::Public {
            return Ok(RequestContext::default());
        }
        if self.config.disable_auth {
            return Ok(RequestContext::new("admin", &authorization));
        }
        let roles: &[&str] = match access {
            Access::Admin => &[ADMIN_ROLE],
            _ => &[USER_ROLE, ADMIN_ROLE],
        };
        self.gateway.authorize(&authorization, roles)
    }

    fn login(&self, req: &Request) -> Result<HttpResponse, ApiError> {
        let (username, password) = header_value(req, "Authorization")
            .as_deref()
            .and_then(basic_credentials)
            .ok_or_else(|| ApiError::bad_request("No credentials provided"))?;
        respond_json(200, &self.gateway.login(&username, &password)?)
    }

    fn cli_resource(&self, resource_id: &str) -> Result<HttpResponse, ApiError> {
        let file_name = cli_resource_file(resource_id)
            .ok_or_else(|| ApiError::not_found(format!("Unknown resource id: {resource_id}")))?;
        let data = fs::read(self.config.resources_dir.join(file_name)).map_err(|e| {
            error!("cannot read {file_name}: {e}");
            ApiError::internal(format!(
                "Resource is not available: {file_name} (unable to access resource file)"
            ))
        })?;
        Ok(Response::from_data(data)
            .with_header(header("Content-Type", "application/octet-stream")?)
            .with_header(header(
                "Content-Disposition",
                &format!("attachment; filename=\"{file_name}\""),
            )?))
    }

    fn instance_action(
        &self,
        ctx: &RequestContext,
        id: &str,
        action: InstanceAction,
        is_application: bool,
    ) -> Result<HttpResponse, ApiError> {
        let gateway = &self.gateway;
        let response = match (action, is_application) {
            (InstanceAction::Stop, true) => gateway.stop_application(ctx, id)?,
            (InstanceAction::Start, true) => gateway.start_application(ctx, id)?,
            (InstanceAction::Restart, true) => gateway.restart_application(ctx, id)?,
            (InstanceAction::Stop, false) => gateway.stop_instance(ctx, id)?,
            (InstanceAction::Start, false) => gateway.start_instance(ctx, id)?,
            (InstanceAction::Restart, false) => gateway.restart_instance(ctx, id)?,
        };
        respond_json(202, &response)
    }

    #[allow(clippy::too_many_lines)]
    fn dispatch(
        &self,
        endpoint: Endpoint<'_>,
        method: &Method,
        query: &Query,
        ctx: &RequestContext,
        req: &mut Request,
    ) -> Result<HttpResponse, ApiError> {
        let gateway = &self.gateway;
        match (endpoint, method) {
            (Endpoint::Login, _) => self.login(req),
            (Endpoint::PlatformInfo, _) => respond_json(200, &gateway.platform_info()),
            (Endpoint::PlatformComponents, _) => respond_json(200, &gateway.platform_components()),

            (Endpoint::Offerings, Method::Get) => respond_json(200, &gateway.list_offerings()?),
            (Endpoint::Offerings, _) => {
                let deploy: ServiceDeploy = read_json(req)?;
                respond_json(202, &gateway.create_offering(ctx, deploy)?)
            }
            (Endpoint::OfferingsBinary, _) => {
                let mut form = MultipartForm::from_request(req)?;
                let offering: Service = form.json("offering")?;
                let manifest: Manifest = form.json("manifest")?;
                let blob = form.take_file("blob");
                respond_json(
                    202,
                    &gateway.create_offering_from_binary(ctx, offering, &manifest, blob)?,
                )
            }
            (Endpoint::OfferingFromApplication, _) => {
                let request: CreateOfferingFromApplicationRequest = read_json(req)?;
                respond_json(200, &gateway.create_offering_from_application(ctx, request)?)
            }
            (Endpoint::Offering(id), Method::Get) => respond_json(200, &gateway.get_offering(id)?),
            (Endpoint::Offering(id), _) => {
                gateway.delete_offering(ctx, id)?;
                Ok(respond_empty(202))
            }

            (Endpoint::Applications, Method::Get) => {
                let filter = ItemFilter {
                    limit: query.parse_u32("limit")?,
                    offset: query.parse_u32("offset")?,
                    sort: query.get("sort").map(str::to_owned),
                };
                respond_json(200, &gateway.list_applications(&filter)?)
            }
            (Endpoint::Applications, _) => {
                let mut form = MultipartForm::from_request(req)?;
                let manifest: Manifest = form.json("manifest")?;
                let blob = form.take_file("blob");
                respond_json(202, &gateway.create_application(ctx, manifest, blob)?)
            }
            (Endpoint::Application(id), Method::Get) => {
                respond_json(200, &gateway.get_application(id)?)
            }
            (Endpoint::Application(id), _) => {
                gateway.delete_application(ctx, id)?;
                Ok(respond_empty(204))
            }
            (Endpoint::ApplicationLogs(id), _) => respond_json(200, &gateway.application_logs(id)?),
            (Endpoint::ApplicationScale(id), _) => {
                let request: ScaleApplicationRequest = read_json(req)?;
                respond_json(202, &gateway.scale_application(ctx, id, request.replicas)?)
            }
            (Endpoint::ApplicationAction(id, action), _) => {
                self.instance_action(ctx, id, action, true)
            }

            (Endpoint::Services, Method::Get) => {
                let param = |key: &str| query.get_ignore_case(key).unwrap_or_default().to_owned();
                let filters = ServiceFilters {
                    offering_id: param("offeringId"),
                    name: param("name"),
                    offering_name: param("offeringName"),
                    plan_name: param("planName"),
                };
                respond_json(200, &gateway.list_service_instances(&filters)?)
            }
            (Endpoint::Services, _) => {
                let request: ServiceInstanceRequest = read_json(req)?;
                respond_json(202, &gateway.create_service_instance(ctx, request)?)
            }
            (Endpoint::Service(id), Method::Get) => {
                respond_json(200, &gateway.get_service_instance(id)?)
            }
            (Endpoint::Service(id), _) => {
                gateway.delete_instance(ctx, id)?;
                Ok(respond_empty(202))
            }
            (Endpoint::ServiceLogs(id), _) => {
                respond_json(200, &gateway.service_instance_logs(id)?)
            }
            (Endpoint::ServiceCredentials(id), _) => {
                respond_json(200, &gateway.service_instance_credentials(id)?)
            }
            (Endpoint::ServiceExpose(id), _) => {
                let request: ExposureRequest = read_json(req)?;
                respond_json(200, &gateway.expose_service_instance(id, request.exposed)?)
            }
            (Endpoint::ServiceAction(id, action), _) => {
                self.instance_action(ctx, id, action, false)
            }

            (Endpoint::Bindings(dst), Method::Get) => {
                respond_json(200, &gateway.instance_bindings(&dst)?)
            }
            (Endpoint::Bindings(dst), _) => {
                let request: InstanceBindingRequest = read_json(req)?;
                respond_json(202, &gateway.bind(&dst, &request)?)
            }
            (Endpoint::Unbind { dst, src }, _) => respond_json(202, &gateway.unbind(&dst, &src)?),

            (Endpoint::Users, Method::Get) => respond_json(200, &gateway.list_users(ctx)?),
            (Endpoint::Users, _) => {
                let request: InvitationRequest = read_json(req)?;
                gateway.delete_user(ctx, &request)?;
                Ok(respond_empty(204))
            }
            (Endpoint::Invitations, Method::Get) => {
                respond_json(200, &gateway.list_invitations(ctx)?)
            }
            (Endpoint::Invitations, Method::Post) => {
                let request: InvitationRequest = read_json(req)?;
                respond_json(201, &gateway.invite_user(ctx, &request)?)
            }
            (Endpoint::Invitations, _) => {
                let request: InvitationRequest = read_json(req)?;
                gateway.delete_invitation(ctx, &request)?;
                Ok(respond_empty(204))
            }
            (Endpoint::ResendInvitation, _) => {
                let request: InvitationRequest = read_json(req)?;
                gateway.resend_invitation(ctx, &request)?;
                Ok(respond_empty(201))
            }
            (Endpoint::CurrentUserPassword, _) => {
                let request: ChangePasswordRequest = read_json(req)?;
                gateway.change_password(ctx, request)?;
                Ok(respond_empty(200))
            }
            (Endpoint::CliResource(id), _) => self.cli_resource(id),
        }
    }

    fn health(&self) -> Result<HttpResponse, ApiError> {
        self.gateway.health()?;
        Ok(respond_empty(200))
    }

    fn root() -> Result<HttpResponse, ApiError> {
        Ok(respond_empty(200).with_header(header("X-Platform", "TAP")?))
    }

    fn route(&self, req: &mut Request, method: &Method, url: &str) -> Result<HttpResponse, ApiError> {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        match (path, method) {
            ("/api", Method::Get) => return Self::root(),
            ("/healthz", Method::Get) => return self.health(),
            _ => {}
        }

        let endpoint = strip_version_prefix(path)
            .and_then(Endpoint::parse)
            .map(|endpoint| endpoint.for_method(method))
            .ok_or_else(|| ApiError::not_found(format!("no route for {path}")))?;
        let access = endpoint
            .access(method)
            .ok_or_else(|| ApiError::new(405, format!("method {method} not allowed on {path}")))?;
        let ctx = self.authenticate(req, access)?;
        self.dispatch(endpoint, method, &Query::parse(query), &ctx, req)
    }
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(api: &Api, mut req: Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    match api.route(&mut req, &method, &url) {
        Ok(response) => {
            let _ = req.respond(response);
        }
        Err(e) => {
            if e.status >= 500 {
                error!("{method} {url}: {} {e}", e.status);
            } else {
                debug!("{method} {url}: {} {e}", e.status);
            }
            respond_err(req, &e);
        }
    }
}

fn bind(addr: &str) -> Result<Server, ServerError> {
    Server::http(addr).map_err(|e| ServerError::Bind {
        addr: addr.to_owned(),
        message: e.to_string(),
    })
}

/// Start the server loop, blocking the current thread. Each request is
/// handled on its own thread.
pub fn run_server(api: &Arc<Api>, addr: &str) -> Result<(), ServerError> {
    let server = bind(addr)?;
    info!("listening on {addr}");
    for request in server.incoming_requests() {
        let api = Arc::clone(api);
        std::thread::spawn(move || handle_request(&api, request));
    }
    Ok(())
}

/// A test helper that runs the API on a random port in a background thread.
///
/// The server listens on `127.0.0.1:{port}`. Dropping the `TestServer`
/// stops it.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    server: Arc<Server>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    /// Start a test server in front of `gateway`.
    /// Binds to `127.0.0.1:0` (random port).
    pub fn start(gateway: Gateway, config: ServerConfig) -> Result<Self, ServerError> {
        let server = Arc::new(bind("127.0.0.1:0")?);
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| ServerError::Bind {
                addr: "127.0.0.1:0".to_owned(),
                message: "not an IP address".to_owned(),
            })?;
        let url = format!("http://127.0.0.1:{port}");

        let api = Arc::new(Api::new(gateway, config));
        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&api, request);
            }
        });

        Ok(Self {
            url,
            port,
            server,
            handle: Some(handle),
        })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
