use crate::http::{basic_auth, decode};
use crate::{BackendError, UaaConfig};
use atrium_models::identity::{LoginResponse, TokenInfo};
use std::io::Read;

/// OAuth2 token issuing and introspection.
pub trait UaaApi: Send + Sync {
    fn login(&self, username: &str, password: &str) -> Result<LoginResponse, BackendError>;
    fn validate_token(&self, token: &str) -> Result<TokenInfo, BackendError>;
}

pub struct HttpUaa {
    config: UaaConfig,
    agent: ureq::Agent,
}

impl HttpUaa {
    pub fn new(config: UaaConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { config, agent }
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Vec<u8>, BackendError> {
        tracing::debug!("POST {url}");
        let resp = self
            .agent
            .post(url)
            .header(
                "Authorization",
                &basic_auth(&self.config.client_id, &self.config.client_secret),
            )
            .header("Accept", "application/json")
            .send_form(form.iter().copied())
            .map_err(|e| BackendError::Transport(format!("{url}: {e}")))?;

        let status = resp.status().as_u16();
        let mut body = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        if status != 200 {
            return Err(BackendError::Status {
                status,
                message: format!(
                    "bad response status: {status}, expected status was: 200, response body: {}",
                    String::from_utf8_lossy(&body)
                ),
            });
        }
        Ok(body)
    }
}

impl UaaApi for HttpUaa {
    fn login(&self, username: &str, password: &str) -> Result<LoginResponse, BackendError> {
        let body = self.post_form(
            &self.config.token_uri,
            &[
                ("grant_type", "password"),
                ("response_type", "token"),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("username", username),
                ("password", password),
            ],
        )?;
        decode(&body)
    }

    fn validate_token(&self, token: &str) -> Result<TokenInfo, BackendError> {
        let body = self.post_form(&self.config.check_token_uri, &[("token", token)])?;
        decode(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> UaaConfig {
        UaaConfig {
            token_uri: format!("{url}/oauth/token"),
            check_token_uri: format!("{url}/check_token"),
            client_id: "gateway".to_owned(),
            client_secret: "s3cret".to_owned(),
        }
    }

    #[test]
    fn login_uses_password_grant() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/oauth/token")
            .match_header("authorization", basic_auth("gateway", "s3cret").as_str())
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex("grant_type=password".to_owned()),
                mockito::Matcher::Regex("username=alice".to_owned()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token":"abc","token_type":"bearer","expires_in":3600}"#)
            .create();

        let uaa = HttpUaa::new(config(&server.url()));
        let login = uaa.login("alice", "pw").unwrap();
        assert_eq!(login.access_token, "abc");
        assert_eq!(login.expires_in, 3600);
        mock.assert();
    }

    #[test]
    fn validate_token_reads_scope() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/check_token")
            .match_body(mockito::Matcher::Regex("token=tok".to_owned()))
            .with_status(200)
            .with_body(r#"{"user_name":"alice","email":"a@x.io","scope":["tap.user"]}"#)
            .create();

        let uaa = HttpUaa::new(config(&server.url()));
        let token = uaa.validate_token("tok").unwrap();
        assert_eq!(token.user_name, "alice");
        assert_eq!(token.scope, vec!["tap.user"]);
    }

    #[test]
    fn rejected_login_keeps_status() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(401)
            .with_body(r#"{"error":"unauthorized"}"#)
            .create();

        let uaa = HttpUaa::new(config(&server.url()));
        assert_eq!(uaa.login("alice", "bad").unwrap_err().status(), 401);
    }
}
