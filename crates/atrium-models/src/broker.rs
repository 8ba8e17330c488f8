use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One platform container as reported by the container broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VersionsResponse {
    pub name: String,
    pub image_versions: String,
    pub signature: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerCredentials {
    pub name: String,
    pub envs: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigMap {
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposeRequest {
    pub hostname: String,
}

/// Body of a core component's `/info` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentInfo {
    pub app: AppInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInfo {
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_info_tolerates_extra_fields() {
        let info: ComponentInfo =
            serde_json::from_str(r#"{"app":{"version":"0.8.1","name":"catalog"},"git":{}}"#)
                .unwrap();
        assert_eq!(info.app.version, "0.8.1");
    }

    #[test]
    fn versions_response_defaults_missing_fields() {
        let v: VersionsResponse = serde_json::from_str(r#"{"name":"catalog"}"#).unwrap();
        assert_eq!(v.name, "catalog");
        assert!(v.signature.is_empty());
    }
}
