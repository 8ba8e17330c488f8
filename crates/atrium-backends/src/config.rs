use crate::BackendError;

/// Address and basic-auth credentials of one backend service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl EndpointConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: normalize_url(url),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_owned();
        self.password = password.to_owned();
        self
    }

    /// Read `<NAME>_HOST`, `<NAME>_PORT`, `<NAME>_USER` and `<NAME>_PASS`.
    pub fn from_env(name: &str) -> Result<Self, BackendError> {
        Self::from_vars(name, |key| std::env::var(key).ok())
    }

    /// Like [`EndpointConfig::from_env`] but without credentials.
    pub fn address_from_env(name: &str) -> Result<Self, BackendError> {
        let config = Self::from_env(name)?;
        Ok(Self::new(&config.url))
    }

    pub fn from_vars(
        name: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, BackendError> {
        let host = lookup(&format!("{name}_HOST"))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BackendError::Config(format!("{name}_HOST is not set")))?;
        let address = match lookup(&format!("{name}_PORT")).filter(|p| !p.is_empty()) {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };
        Ok(Self::new(&address).with_credentials(
            &lookup(&format!("{name}_USER")).unwrap_or_default(),
            &lookup(&format!("{name}_PASS")).unwrap_or_default(),
        ))
    }
}

/// UAA endpoints and the OAuth client the gateway logs in as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UaaConfig {
    pub token_uri: String,
    pub check_token_uri: String,
    pub client_id: String,
    pub client_secret: String,
}

impl UaaConfig {
    pub fn from_env() -> Result<Self, BackendError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BackendError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| BackendError::Config(format!("{key} is not set")))
        };
        Ok(Self {
            token_uri: required("SSO_TOKEN_URI")?,
            check_token_uri: required("SSO_CHECK_TOKEN_URI")?,
            client_id: required("SSO_CLIENT")?,
            client_secret: lookup("SSO_SECRET").unwrap_or_default(),
        })
    }
}

fn normalize_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_owned()
    } else {
        format!("https://{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn endpoint_from_vars_adds_scheme_and_port() {
        let env = vars(&[
            ("CATALOG_HOST", "catalog.default"),
            ("CATALOG_PORT", "8080"),
            ("CATALOG_USER", "admin"),
            ("CATALOG_PASS", "secret"),
        ]);
        let config = EndpointConfig::from_vars("CATALOG", |k| env.get(k).cloned()).unwrap();
        assert_eq!(config.url, "https://catalog.default:8080");
        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "secret");
    }

    #[test]
    fn endpoint_keeps_explicit_scheme() {
        let config = EndpointConfig::new("http://127.0.0.1:9000/");
        assert_eq!(config.url, "http://127.0.0.1:9000");
    }

    #[test]
    fn missing_host_is_a_config_error() {
        let env = vars(&[("CATALOG_USER", "admin")]);
        let err = EndpointConfig::from_vars("CATALOG", |k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, BackendError::Config(_)));
        assert!(err.to_string().contains("CATALOG_HOST"));
    }

    #[test]
    fn uaa_requires_client() {
        let env = vars(&[
            ("SSO_TOKEN_URI", "http://uaa/oauth/token"),
            ("SSO_CHECK_TOKEN_URI", "http://uaa/check_token"),
        ]);
        assert!(UaaConfig::from_vars(|k| env.get(k).cloned()).is_err());

        let env = vars(&[
            ("SSO_TOKEN_URI", "http://uaa/oauth/token"),
            ("SSO_CHECK_TOKEN_URI", "http://uaa/check_token"),
            ("SSO_CLIENT", "gateway"),
        ]);
        let config = UaaConfig::from_vars(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.client_id, "gateway");
        assert!(config.client_secret.is_empty());
    }
}
