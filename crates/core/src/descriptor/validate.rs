use std::collections::HashSet;

use super::path::parse_path;
use super::{DescriptorError, EndpointDescriptor, EndpointSet, ParamKind};

/// Response key every generate endpoint must map.
pub const TASK_ID_KEY: &str = "taskId";
/// Response key every upload endpoint must map.
pub const IMAGE_URL_KEY: &str = "imageUrl";
/// Response keys the polling loop reads.
pub const STATUS_KEY: &str = "status";
pub const VIDEO_URL_KEY: &str = "videoUrl";
pub const THUMBNAIL_URL_KEY: &str = "thumbnailUrl";

/// Check the structural invariants of one descriptor:
/// - parameter keys are non-empty, well-formed and unique
/// - select parameters have options
/// - response keys are unique
pub fn validate_descriptor(descriptor: &EndpointDescriptor) -> Result<(), DescriptorError> {
    let mut seen = HashSet::new();
    for param in &descriptor.params {
        if param.key.trim().is_empty() {
            return Err(DescriptorError::EmptyKey);
        }
        parse_path(&param.key)?;
        if !seen.insert(param.key.as_str()) {
            return Err(DescriptorError::DuplicateParamKey(param.key.clone()));
        }
        if let ParamKind::Select { options } = &param.kind {
            if options.is_empty() {
                return Err(DescriptorError::EmptySelectOptions(param.key.clone()));
            }
        }
    }

    let mut seen = HashSet::new();
    for field in &descriptor.response_mapping {
        if field.key.trim().is_empty() {
            return Err(DescriptorError::EmptyKey);
        }
        parse_path(&field.path)?;
        if !seen.insert(field.key.as_str()) {
            return Err(DescriptorError::DuplicateResponseKey(field.key.clone()));
        }
    }

    Ok(())
}

fn require_mapping(
    descriptor: &EndpointDescriptor,
    endpoint: &str,
    key: &str,
) -> Result<(), DescriptorError> {
    if descriptor.mapping(key).is_none() {
        return Err(DescriptorError::MissingResponseMapping {
            endpoint: endpoint.to_string(),
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Validate all endpoints of a provider, including the required response keys.
pub fn validate_endpoint_set(set: &EndpointSet) -> Result<(), DescriptorError> {
    validate_descriptor(&set.generate)?;
    require_mapping(&set.generate, "generate", TASK_ID_KEY)?;

    validate_descriptor(&set.poll_status)?;

    if let Some(upload) = &set.upload {
        validate_descriptor(upload)?;
        require_mapping(upload, "upload", IMAGE_URL_KEY)?;
    }

    Ok(())
}
