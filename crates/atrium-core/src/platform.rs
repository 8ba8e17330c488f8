//! Platform information: static facts about the installation and the
//! versions of the core components running it.

use crate::Gateway;
use atrium_models::api::ExternalTools;
use atrium_models::broker::VersionsResponse;
use atrium_models::{PlatformComponent, PlatformInfo, PlatformTool};
use std::thread;
use tracing::{error, warn};

impl Gateway {
    pub fn platform_info(&self) -> PlatformInfo {
        let platform = &self.settings.platform;
        let api_endpoint = format!("https://api.{}", platform.domain);
        PlatformInfo {
            cli_url: format!("{api_endpoint}/cli?ver={}", platform.cli_version),
            api_endpoint,
            cli_version: platform.cli_version.clone(),
            platform_version: platform.tap_version.clone(),
            core_organization: platform.core_organization.clone(),
            external_tools: ExternalTools {
                visualizations: self.visualisation_tools(),
            },
            cdh_version: platform.cdh_version.clone(),
            k8s_version: platform.k8s_version.clone(),
        }
    }

    /// Tools whose config map exists and says whether they are available.
    fn visualisation_tools(&self) -> Vec<PlatformTool> {
        self.settings
            .platform
            .visualisations
            .iter()
            .filter_map(|name| {
                let config_map = self
                    .backends
                    .container_broker
                    .get_config_map(name)
                    .map_err(|e| warn!("Unable to get configMap for {name}: {e}"))
                    .ok()?;
                let available = config_map.data.get("available").map(String::as_str);
                let available = match available.map(str::parse::<bool>) {
                    Some(Ok(available)) => available,
                    _ => {
                        warn!("configMap {name} has no valid 'available' entry: {available:?}");
                        return None;
                    }
                };
                Some(PlatformTool {
                    name: name.clone(),
                    url: config_map.data.get("uri").cloned().unwrap_or_default(),
                    available,
                })
            })
            .collect()
    }

    /// Core component versions, with each component's self-reported
    /// application version fetched in parallel.
    pub fn platform_components(&self) -> Vec<PlatformComponent> {
        let versions = match self.backends.container_broker.get_versions() {
            Ok(versions) => versions,
            Err(e) => {
                error!("Cannot fetch platform versions from Container Broker: {e}");
                return Vec::new();
            }
        };
        self.cache_core_versions(&versions);

        thread::scope(|scope| {
            let handles: Vec<_> = versions
                .into_iter()
                .map(|version| scope.spawn(move || self.platform_component(version)))
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| handle.join().ok())
                .collect()
        })
    }

    fn platform_component(&self, version: VersionsResponse) -> PlatformComponent {
        let app_version = self
            .backends
            .component_info
            .app_version(&version.name)
            .unwrap_or_else(|e| {
                warn!("cannot fetch app version of {}: {e}", version.name);
                String::new()
            });
        PlatformComponent {
            name: version.name,
            image_versions: version.image_versions,
            signature: version.signature,
            app_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GatewaySettings, PlatformSettings};
    use atrium_backends::mock::MockBackends;
    use atrium_models::broker::ConfigMap;
    use std::collections::BTreeMap;

    fn gateway_with_platform() -> (Gateway, MockBackends) {
        let mocks = MockBackends::new();
        let settings = GatewaySettings::default().with_platform(PlatformSettings {
            domain: "example.com".to_owned(),
            tap_version: "0.8.0".to_owned(),
            cli_version: "0.8.1".to_owned(),
            core_organization: "core".to_owned(),
            visualisations: vec!["kibana".to_owned(), "grafana".to_owned(), "zeppelin".to_owned()],
            ..PlatformSettings::default()
        });
        (Gateway::new(mocks.backends(), settings), mocks)
    }

    fn config_map(pairs: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            data: pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn info_reports_endpoints_and_versions() {
        let (gateway, _mocks) = gateway_with_platform();
        let info = gateway.platform_info();
        assert_eq!(info.api_endpoint, "https://api.example.com");
        assert_eq!(info.cli_url, "https://api.example.com/cli?ver=0.8.1");
        assert_eq!(info.platform_version, "0.8.0");
        assert_eq!(info.core_organization, "core");
        assert!(info.external_tools.visualizations.is_empty());
    }

    #[test]
    fn only_valid_visualisations_are_listed() {
        let (gateway, mocks) = gateway_with_platform();
        mocks.container_broker.set_config_map(
            "kibana",
            config_map(&[("available", "true"), ("uri", "https://kibana.example.com")]),
        );
        mocks
            .container_broker
            .set_config_map("grafana", config_map(&[("available", "maybe")]));

        let tools = gateway.platform_info().external_tools.visualizations;
        assert_eq!(
            tools,
            vec![PlatformTool {
                name: "kibana".to_owned(),
                url: "https://kibana.example.com".to_owned(),
                available: true,
            }]
        );
    }

    #[test]
    fn components_carry_app_versions() {
        let (gateway, mocks) = gateway_with_platform();
        mocks.container_broker.set_versions(vec![
            VersionsResponse {
                name: "catalog".to_owned(),
                image_versions: "catalog:1.2".to_owned(),
                signature: "sha256:aa".to_owned(),
            },
            VersionsResponse {
                name: "blob-store".to_owned(),
                image_versions: "blob-store:0.4".to_owned(),
                signature: "sha256:bb".to_owned(),
            },
        ]);
        mocks.component_info.set_version("catalog", "1.2.3");

        let components = gateway.platform_components();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].name, "catalog");
        assert_eq!(components[0].image_versions, "catalog:1.2");
        assert_eq!(components[0].app_version, "1.2.3");
        assert_eq!(components[1].name, "blob-store");
        assert_eq!(components[1].app_version, "");
    }

    #[test]
    fn components_empty_when_versions_fail() {
        let (gateway, _mocks) = gateway_with_platform();
        assert!(gateway.platform_components().is_empty());
    }

    #[test]
    fn components_refresh_core_version_cache() {
        let (gateway, mocks) = gateway_with_platform();
        mocks.container_broker.set_versions(vec![VersionsResponse {
            name: "catalog".to_owned(),
            ..VersionsResponse::default()
        }]);
        gateway.platform_components();

        let cached = gateway
            .core_versions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].name, "catalog");
    }
}
