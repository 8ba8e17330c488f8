use crate::api::Manifest;
use crate::catalog::{BlobType, Service};
use crate::ModelError;
use std::path::Path;

pub const ALLOWED_IMAGE_TYPES: &[&str] = &["JAVA", "GO", "NODEJS", "PYTHON2.7", "PYTHON3.4"];

pub const MAX_REPLICATION: i32 = 5;
pub const MIN_REPLICATION: i32 = 0;

const DNS_LABEL_MAX_LEN: usize = 63;

pub fn validate_image_type(image_type: &str) -> Result<(), ModelError> {
    if ALLOWED_IMAGE_TYPES.contains(&image_type) {
        return Ok(());
    }
    Err(ModelError::Invalid(format!(
        "Type {image_type} not allowed. Allowed types include: [{}]",
        ALLOWED_IMAGE_TYPES.join(" ")
    )))
}

pub fn limit_instance_number(instances: i32) -> Result<(), ModelError> {
    if instances > MAX_REPLICATION {
        return Err(ModelError::Invalid(format!(
            "Maximum allowed replication is {MAX_REPLICATION}"
        )));
    }
    if instances < MIN_REPLICATION {
        return Err(ModelError::Invalid(format!(
            "Minimum allowed replication is {MIN_REPLICATION}"
        )));
    }
    Ok(())
}

pub fn validate_manifest(manifest: &Manifest) -> Result<(), ModelError> {
    validate_image_type(&manifest.image_type)?;
    limit_instance_number(manifest.instances)
}

/// Checks on an offering definition that need no catalog lookups.
pub fn validate_offering_definition(service: &Service) -> Result<(), ModelError> {
    if service.name.is_empty() {
        return Err(ModelError::Invalid(
            "Service name should not be empty".to_owned(),
        ));
    }
    if service.plans.is_empty() {
        return Err(ModelError::Invalid(
            "Service must have at least one plan".to_owned(),
        ));
    }
    for dependency in service.plans.iter().flat_map(|p| &p.dependencies) {
        if dependency.service_id.is_empty() || dependency.plan_id.is_empty() {
            return Err(ModelError::Invalid(format!(
                "Dependency: {} service error: ServiceId and PlanId should not be empty!",
                dependency.service_name
            )));
        }
    }
    Ok(())
}

/// Lowercase RFC 1123 label: alphanumerics and inner dashes, at most 63 bytes.
pub fn validate_dns_label(name: &str) -> Result<(), ModelError> {
    let bytes = name.as_bytes();
    let valid_char = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let ok = !bytes.is_empty()
        && bytes.len() <= DNS_LABEL_MAX_LEN
        && bytes.first().is_some_and(valid_char)
        && bytes.last().is_some_and(valid_char)
        && bytes.iter().all(|b| valid_char(b) || *b == b'-');
    if ok {
        Ok(())
    } else {
        Err(ModelError::Invalid(format!(
            "value '{name}' is not a lowercase DNS label"
        )))
    }
}

/// Blob type of an uploaded offering binary, judged by its file extension.
pub fn blob_type_from_file_name(file_name: &str) -> Result<BlobType, ModelError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_uppercase)
        .unwrap_or_default();
    if extension == "JAR" {
        return Ok(BlobType::Jar);
    }
    Err(ModelError::Invalid(format!(
        "unrecognizable binary format {extension} in file name {file_name}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ServiceDependency, ServicePlan};

    #[test]
    fn image_type_allow_list() {
        for t in ALLOWED_IMAGE_TYPES {
            assert!(validate_image_type(t).is_ok());
        }
        let err = validate_image_type("RUBY").unwrap_err().to_string();
        assert!(err.starts_with("Type RUBY not allowed"));
        assert!(validate_image_type("java").is_err());
    }

    #[test]
    fn replication_bounds() {
        assert!(limit_instance_number(0).is_ok());
        assert!(limit_instance_number(5).is_ok());
        assert_eq!(
            limit_instance_number(6).unwrap_err().to_string(),
            "Maximum allowed replication is 5"
        );
        assert_eq!(
            limit_instance_number(-1).unwrap_err().to_string(),
            "Minimum allowed replication is 0"
        );
    }

    #[test]
    fn manifest_validation_checks_type_then_count() {
        let mut manifest = Manifest {
            name: "app".to_owned(),
            image_type: "GO".to_owned(),
            instances: 1,
            ..Manifest::default()
        };
        assert!(validate_manifest(&manifest).is_ok());
        manifest.instances = 9;
        assert!(validate_manifest(&manifest).is_err());
    }

    #[test]
    fn offering_definition_rules() {
        let mut service = Service::default();
        assert_eq!(
            validate_offering_definition(&service).unwrap_err().to_string(),
            "Service name should not be empty"
        );
        service.name = "redis".to_owned();
        assert_eq!(
            validate_offering_definition(&service).unwrap_err().to_string(),
            "Service must have at least one plan"
        );
        service.plans.push(ServicePlan {
            name: "free".to_owned(),
            dependencies: vec![ServiceDependency {
                service_name: "zk".to_owned(),
                service_id: "s".to_owned(),
                ..ServiceDependency::default()
            }],
            ..ServicePlan::default()
        });
        let err = validate_offering_definition(&service).unwrap_err().to_string();
        assert!(err.starts_with("Dependency: zk service error"));
        service.plans[0].dependencies[0].plan_id = "p".to_owned();
        assert!(validate_offering_definition(&service).is_ok());
    }

    #[test]
    fn dns_labels() {
        assert!(validate_dns_label("my-broker1").is_ok());
        assert!(validate_dns_label("a").is_ok());
        assert!(validate_dns_label("").is_err());
        assert!(validate_dns_label("-broker").is_err());
        assert!(validate_dns_label("broker-").is_err());
        assert!(validate_dns_label("Broker").is_err());
        assert!(validate_dns_label("my_broker").is_err());
        assert!(validate_dns_label(&"a".repeat(64)).is_err());
    }

    #[test]
    fn only_jar_binaries_are_recognized() {
        assert_eq!(blob_type_from_file_name("app.jar").unwrap(), BlobType::Jar);
        assert_eq!(blob_type_from_file_name("APP.JAR").unwrap(), BlobType::Jar);
        let err = blob_type_from_file_name("app.tar.gz").unwrap_err().to_string();
        assert!(err.contains("unrecognizable binary format GZ"));
        assert!(blob_type_from_file_name("noext").is_err());
    }
}
