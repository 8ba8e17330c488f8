use std::time::Duration;
use thiserror::Error;

pub const GENERIC_SERVICE_TEMPLATE_ID: &str = "0e7d1029-216c-454d-8caa-33a91c5b02df";
pub const GENERIC_APPLICATION_TEMPLATE_ID: &str = "52b31177-fef1-49af-7aa4-90382f7be43e";
pub const DEFAULT_ORG: &str = "00000000-0000-0000-0000-000000000000";
pub const DEFAULT_WAIT_RETRIES: u32 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: String, value: String },
}

/// Values reported by `/platform_info`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformSettings {
    pub domain: String,
    pub tap_version: String,
    pub cli_version: String,
    pub cdh_version: String,
    pub k8s_version: String,
    pub core_organization: String,
    /// Config map names probed for external visualisation tools.
    pub visualisations: Vec<String>,
}

impl PlatformSettings {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).unwrap_or_default();
        Self {
            domain: var("DOMAIN"),
            tap_version: var("TAP_VERSION"),
            cli_version: var("CLI_VERSION"),
            cdh_version: var("CDH_VERSION"),
            k8s_version: var("K8S_VERSION"),
            core_organization: var("CORE_ORGANIZATION"),
            visualisations: var("VISUALISATIONS_LIST")
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }
}

/// Gateway-wide knobs that are not backend addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub generic_service_template_id: String,
    pub generic_application_template_id: String,
    /// Organization whose users `/users` manages.
    pub default_org: String,
    pub wait_retries: u32,
    pub wait_interval: Duration,
    pub platform: PlatformSettings,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            generic_service_template_id: GENERIC_SERVICE_TEMPLATE_ID.to_owned(),
            generic_application_template_id: GENERIC_APPLICATION_TEMPLATE_ID.to_owned(),
            default_org: DEFAULT_ORG.to_owned(),
            wait_retries: DEFAULT_WAIT_RETRIES,
            wait_interval: Duration::from_secs(1),
            platform: PlatformSettings::default(),
        }
    }
}

impl GatewaySettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let set = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let wait_retries = match set("WAITING_FOR_INSTANCE_STATE_RETRIES") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "WAITING_FOR_INSTANCE_STATE_RETRIES".to_owned(),
                    value,
                })?,
            None => defaults.wait_retries,
        };

        Ok(Self {
            generic_service_template_id: set("GENERIC_SERVICE_TEMPLATE_ID")
                .unwrap_or(defaults.generic_service_template_id),
            generic_application_template_id: set("GENERIC_APPLICATION_TEMPLATE_ID")
                .unwrap_or(defaults.generic_application_template_id),
            default_org: set("DEFAULT_ORG").unwrap_or(defaults.default_org),
            wait_retries,
            wait_interval: defaults.wait_interval,
            platform: PlatformSettings::from_vars(&lookup),
        })
    }

    #[must_use]
    pub fn with_wait(mut self, retries: u32, interval: Duration) -> Self {
        self.wait_retries = retries;
        self.wait_interval = interval;
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: PlatformSettings) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub fn with_default_org(mut self, org: &str) -> Self {
        org.clone_into(&mut self.default_org);
        self
    }

    pub fn is_generic_template(&self, template_id: &str) -> bool {
        template_id == self.generic_service_template_id
            || template_id == self.generic_application_template_id
    }
}
