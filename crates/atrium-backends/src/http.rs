//! Shared JSON-over-HTTP plumbing for the backend clients.

use crate::{BackendError, EndpointConfig};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// Value of a `Basic` authorization header.
pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Decode a `Basic` authorization header into `(username, password)`.
pub fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_owned(), pass.to_owned()))
}

/// A ureq agent bound to one backend address.
///
/// Statuses are never turned into transport errors; each call names the
/// status it expects and anything else becomes [`BackendError::Status`]
/// carrying the backend's own code and body.
pub struct JsonClient {
    base_url: String,
    authorization: Option<String>,
    agent: ureq::Agent,
}

impl JsonClient {
    pub fn new(config: &EndpointConfig) -> Self {
        let authorization = if config.username.is_empty() && config.password.is_empty() {
            None
        } else {
            Some(basic_auth(&config.username, &config.password))
        };
        Self::with_authorization(&config.url, authorization, DEFAULT_TIMEOUT)
    }

    pub fn with_authorization(
        base_url: &str,
        authorization: Option<String>,
        timeout: Duration,
    ) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            authorization,
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    /// Send a request and return the raw body when the status matches.
    pub fn execute(
        &self,
        method: Method,
        url: &str,
        authorization: Option<&str>,
        content_type: &str,
        body: Option<&[u8]>,
        expected: u16,
    ) -> Result<Vec<u8>, BackendError> {
        tracing::debug!("{} {url}", method.as_str());
        let authorization = authorization.or(self.authorization.as_deref());
        let result = match method {
            Method::Get => with_auth(self.agent.get(url), authorization).call(),
            Method::Delete => with_auth(self.agent.delete(url), authorization).call(),
            Method::Post => with_auth(self.agent.post(url), authorization)
                .header("Content-Type", content_type)
                .send(body.unwrap_or_default()),
            Method::Put => with_auth(self.agent.put(url), authorization)
                .header("Content-Type", content_type)
                .send(body.unwrap_or_default()),
            Method::Patch => with_auth(self.agent.patch(url), authorization)
                .header("Content-Type", content_type)
                .send(body.unwrap_or_default()),
        };
        let resp = result.map_err(|e| BackendError::Transport(format!("{url}: {e}")))?;

        let status = resp.status().as_u16();
        let mut reader = resp.into_body().into_reader();
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if status != expected {
            return Err(BackendError::Status {
                status,
                message: format!(
                    "bad response status: {status}, expected status was: {expected}, response body: {}",
                    String::from_utf8_lossy(&data)
                ),
            });
        }
        Ok(data)
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str, expected: u16) -> Result<T, BackendError> {
        let data = self.execute(Method::Get, &self.url(path), None, "", None, expected)?;
        decode(&data)
    }

    pub fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        expected: u16,
    ) -> Result<T, BackendError> {
        let payload = serde_json::to_vec(body)?;
        let data = self.execute(
            method,
            &self.url(path),
            None,
            "application/json",
            Some(&payload),
            expected,
        )?;
        decode(&data)
    }

    pub fn delete(&self, path: &str, expected: u16) -> Result<(), BackendError> {
        self.execute(Method::Delete, &self.url(path), None, "", None, expected)?;
        Ok(())
    }
}

fn with_auth<B>(req: ureq::RequestBuilder<B>, authorization: Option<&str>) -> ureq::RequestBuilder<B> {
    match authorization {
        Some(value) => req.header("Authorization", value),
        None => req,
    }
}

/// Decode a JSON body; an empty body decodes as JSON `null`.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, BackendError> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_str("null").map_err(BackendError::from);
    }
    serde_json::from_slice(data).map_err(BackendError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn basic_auth_roundtrip() {
        let header = basic_auth("admin", "pa:ss");
        assert!(header.starts_with("Basic "));
        assert_eq!(
            parse_basic_auth(&header),
            Some(("admin".to_owned(), "pa:ss".to_owned()))
        );
        assert_eq!(parse_basic_auth("Bearer abc"), None);
        assert_eq!(parse_basic_auth("Basic !!!"), None);
    }

    #[test]
    fn get_sends_basic_auth() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/things")
            .match_header("authorization", basic_auth("u", "p").as_str())
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create();

        let client = JsonClient::new(&EndpointConfig::new(&server.url()).with_credentials("u", "p"));
        let value: Value = client.get("/things", 200).unwrap();
        assert_eq!(value["ok"], true);
        mock.assert();
    }

    #[test]
    fn unexpected_status_keeps_code_and_body() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body(r#"{"message":"Key not found"}"#)
            .create();

        let client = JsonClient::new(&EndpointConfig::new(&server.url()));
        let err = client.get::<Value>("/missing", 200).unwrap_err();
        assert_eq!(err.status(), 404);
        assert!(err.to_string().contains("Key not found"));
    }

    #[test]
    fn empty_body_decodes_as_unit() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("DELETE", "/x").with_status(204).create();
        let client = JsonClient::new(&EndpointConfig::new(&server.url()));
        client.delete("/x", 204).unwrap();
        decode::<()>(b"").unwrap();
    }
}
