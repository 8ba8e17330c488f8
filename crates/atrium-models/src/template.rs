use crate::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A deployment template exactly as submitted by an operator.
pub type RawTemplate = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentType(String);

impl ComponentType {
    pub const BROKER: &'static str = "broker";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_broker(&self) -> bool {
        self.0 == Self::BROKER
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    #[serde(default, rename = "componentType")]
    pub component_type: ComponentType,
}

/// The component list of a template; everything else is opaque here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateBody {
    #[serde(default)]
    pub body: Vec<Component>,
}

impl TemplateBody {
    /// A template containing a `broker` component deploys a service broker.
    pub fn is_service_broker(&self) -> bool {
        self.body.iter().any(|c| c.component_type.is_broker())
    }
}

/// Extract the component types from the `body` of a raw template.
pub fn parse_raw_template(raw: &RawTemplate) -> Result<TemplateBody, ModelError> {
    let Some(body) = raw.get("body") else {
        return Ok(TemplateBody::default());
    };
    let components: Vec<Component> = serde_json::from_value(body.clone())
        .map_err(|e| ModelError::InvalidTemplate(format!("body is not a component list: {e}")))?;
    Ok(TemplateBody { body: components })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawTemplate {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn empty_template_has_no_components() {
        let body = parse_raw_template(&RawTemplate::new()).unwrap();
        assert_eq!(body, TemplateBody::default());
        assert!(!body.is_service_broker());
    }

    #[test]
    fn components_keep_their_order() {
        let template = raw(json!({
            "body": [
                {"componentType": "fakeType1", "secrets": []},
                {"componentType": "fakeType2"},
                {"componentType": "fakeType3"}
            ],
            "hooks": {}
        }));
        let body = parse_raw_template(&template).unwrap();
        let types: Vec<&str> = body.body.iter().map(|c| c.component_type.as_str()).collect();
        assert_eq!(types, ["fakeType1", "fakeType2", "fakeType3"]);
    }

    #[test]
    fn non_array_body_is_rejected() {
        let template = raw(json!({"body": "wrongType1"}));
        assert!(matches!(
            parse_raw_template(&template),
            Err(ModelError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn broker_component_marks_template() {
        let template = raw(json!({
            "body": [{"componentType": "instance"}, {"componentType": "broker"}]
        }));
        assert!(parse_raw_template(&template).unwrap().is_service_broker());
    }
}
