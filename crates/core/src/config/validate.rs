use std::collections::HashSet;

use super::{types::Config, ConfigError};
use crate::descriptor::validate_endpoint_set;

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Validate configuration
/// Currently validates:
/// - Server port is not 0, poll interval is positive
/// - Provider ids are unique, at most one default per tool kind
/// - Every provider has valid endpoints (explicit or preset) and a key
/// - Encrypted keys have a user id to decrypt with
/// - Stage providers refer to configured providers
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.orchestrator.poll_interval_ms == 0 {
        return Err(invalid("orchestrator.poll_interval_ms must be greater than 0"));
    }

    let mut ids = HashSet::new();
    let mut defaults = HashSet::new();
    for provider in &config.providers {
        if provider.id.trim().is_empty() {
            return Err(invalid("provider id cannot be empty"));
        }
        if !ids.insert(provider.id.as_str()) {
            return Err(invalid(format!("duplicate provider id: {}", provider.id)));
        }
        if provider.is_default && !defaults.insert(provider.tool_kind) {
            return Err(invalid(format!(
                "more than one default provider for {}",
                provider.tool_kind
            )));
        }

        let Some(endpoints) = provider.resolve_endpoints() else {
            return Err(invalid(format!(
                "provider {} needs either endpoints or a preset",
                provider.id
            )));
        };
        validate_endpoint_set(&endpoints)
            .map_err(|e| invalid(format!("provider {}: {}", provider.id, e)))?;

        if !provider.has_key() {
            return Err(invalid(format!("provider {} has no API key", provider.id)));
        }
        if provider.encrypted_api_key.is_some()
            && config
                .credentials
                .user_id
                .as_deref()
                .is_none_or(|u| u.is_empty())
        {
            return Err(invalid(format!(
                "provider {} has an encrypted key but credentials.user_id is not set",
                provider.id
            )));
        }
    }

    for (stage, id) in [
        ("base_provider", &config.orchestrator.base_provider),
        ("derived_provider", &config.orchestrator.derived_provider),
    ] {
        if let Some(id) = id {
            if !ids.contains(id.as_str()) {
                return Err(invalid(format!(
                    "orchestrator.{} refers to unknown provider {}",
                    stage, id
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::encrypt_secret;
    use crate::descriptor::{EndpointDescriptor, EndpointSet, HttpMethod};
    use crate::provider::{ProviderConfig, ToolKind};
    use crate::testing::fixtures::video_provider;

    fn config_with(providers: Vec<ProviderConfig>) -> Config {
        Config {
            providers,
            ..Default::default()
        }
    }

    fn assert_invalid(config: &Config, needle: &str) {
        match validate_config(config) {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains(needle), "{} does not mention {}", msg, needle)
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        let config = config_with(vec![video_provider("sora", "https://api.example.com")]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        assert_invalid(&config, "server.port");
    }

    #[test]
    fn test_validate_poll_interval() {
        let mut config = Config::default();
        config.orchestrator.poll_interval_ms = 0;
        assert_invalid(&config, "poll_interval_ms");
    }

    #[test]
    fn test_duplicate_provider_id() {
        let config = config_with(vec![
            video_provider("sora", "https://a"),
            video_provider("sora", "https://b"),
        ]);
        assert_invalid(&config, "duplicate provider id");
    }

    #[test]
    fn test_two_defaults_for_same_kind() {
        let config = config_with(vec![
            video_provider("a", "https://a").as_default(),
            video_provider("b", "https://b").as_default(),
        ]);
        assert_invalid(&config, "more than one default");
    }

    #[test]
    fn test_provider_without_endpoints() {
        let config = config_with(vec![ProviderConfig::new(
            "bare",
            ToolKind::VideoGen,
            "https://a",
        )
        .with_api_key("k")]);
        assert_invalid(&config, "endpoints or a preset");
    }

    #[test]
    fn test_invalid_descriptor() {
        let endpoints = EndpointSet {
            generate: EndpointDescriptor::new(HttpMethod::Post, "/videos"),
            poll_status: EndpointDescriptor::new(HttpMethod::Get, "/videos/{taskId}"),
            upload: None,
        };
        let config = config_with(vec![ProviderConfig::new("x", ToolKind::VideoGen, "https://a")
            .with_api_key("k")
            .with_endpoints(endpoints)]);
        assert_invalid(&config, "taskId");
    }

    #[test]
    fn test_missing_key() {
        let mut provider = video_provider("sora", "https://a");
        provider.api_key = None;
        assert_invalid(&config_with(vec![provider]), "no API key");
    }

    #[test]
    fn test_encrypted_key_requires_user_id() {
        let mut provider = video_provider("sora", "https://a");
        provider.api_key = None;
        provider.encrypted_api_key = Some(encrypt_secret("sk", "user-42").unwrap());

        let mut config = config_with(vec![provider]);
        assert_invalid(&config, "credentials.user_id");

        config.credentials.user_id = Some("user-42".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_unknown_stage_provider() {
        let mut config = config_with(vec![video_provider("sora", "https://a")]);
        config.orchestrator.derived_provider = Some("sora-pro".to_string());
        assert_invalid(&config, "derived_provider");
    }
}
