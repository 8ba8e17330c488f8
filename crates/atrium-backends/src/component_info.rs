use crate::http::{decode, JsonClient, Method};
use crate::BackendError;
use atrium_models::broker::ComponentInfo;
use std::time::Duration;

/// Where a core component serves its build info; `{name}` is the component.
pub const DEFAULT_INFO_URL: &str = "http://{name}.default:80/info";

const INFO_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads the application version a core component reports about itself.
pub trait ComponentInfoApi: Send + Sync {
    fn app_version(&self, component: &str) -> Result<String, BackendError>;
}

pub struct HttpComponentInfo {
    url_template: String,
    client: JsonClient,
}

impl HttpComponentInfo {
    pub fn new(url_template: &str) -> Self {
        Self {
            url_template: url_template.to_owned(),
            client: JsonClient::with_authorization("", None, INFO_TIMEOUT),
        }
    }

    fn info_url(&self, component: &str) -> String {
        self.url_template.replace("{name}", component)
    }
}

impl ComponentInfoApi for HttpComponentInfo {
    fn app_version(&self, component: &str) -> Result<String, BackendError> {
        let url = self.info_url(component);
        let body = self.client.execute(Method::Get, &url, None, "", None, 200)?;
        let info: Option<ComponentInfo> = decode(&body)?;
        Ok(info.map(|i| i.app.version).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_app_version() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/catalog/info")
            .with_status(200)
            .with_body(r#"{"app":{"version":"0.4.2"}}"#)
            .create();

        let info = HttpComponentInfo::new(&format!("{}/{{name}}/info", server.url()));
        assert_eq!(info.app_version("catalog").unwrap(), "0.4.2");
        mock.assert();
    }

    #[test]
    fn empty_body_means_no_version() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/blob-store/info").with_status(200).create();

        let info = HttpComponentInfo::new(&format!("{}/{{name}}/info", server.url()));
        assert_eq!(info.app_version("blob-store").unwrap(), "");
    }

    #[test]
    fn default_template_targets_cluster_dns() {
        let info = HttpComponentInfo::new(DEFAULT_INFO_URL);
        assert_eq!(info.info_url("catalog"), "http://catalog.default:80/info");
    }
}
