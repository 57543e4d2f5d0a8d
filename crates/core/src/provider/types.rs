//! Provider configuration and call result types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credentials::EncryptedSecret;
use crate::descriptor::{EndpointPreset, EndpointSet};

/// What kind of content a provider produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    TextChat,
    ImageGen,
    VideoGen,
    MusicGen,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::TextChat => "text_chat",
            ToolKind::ImageGen => "image_gen",
            ToolKind::VideoGen => "video_gen",
            ToolKind::MusicGen => "music_gen",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the API key is presented to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthScheme {
    #[serde(default = "default_auth_header")]
    pub header: String,
    #[serde(default = "default_auth_prefix")]
    pub prefix: String,
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

fn default_auth_prefix() -> String {
    "Bearer ".to_string()
}

impl Default for AuthScheme {
    fn default() -> Self {
        Self {
            header: default_auth_header(),
            prefix: default_auth_prefix(),
        }
    }
}

/// One configured generation provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub tool_kind: ToolKind,
    pub base_url: String,
    /// Plaintext API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// API key sealed with the credential vault.
    #[serde(default)]
    pub encrypted_api_key: Option<EncryptedSecret>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub auth: AuthScheme,
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
    /// Per-request timeout. No timeout when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub preset: Option<EndpointPreset>,
    #[serde(default)]
    pub endpoints: Option<EndpointSet>,
}

impl ProviderConfig {
    pub fn new(id: impl Into<String>, tool_kind: ToolKind, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            tool_kind,
            base_url: base_url.into(),
            api_key: None,
            encrypted_api_key: None,
            model_name: None,
            is_default: false,
            auth: AuthScheme::default(),
            extra_headers: BTreeMap::new(),
            timeout_secs: None,
            preset: None,
            endpoints: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_endpoints(mut self, endpoints: EndpointSet) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn with_preset(mut self, preset: EndpointPreset) -> Self {
        self.preset = Some(preset);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Explicit endpoints win over the preset.
    pub fn resolve_endpoints(&self) -> Option<EndpointSet> {
        self.endpoints
            .clone()
            .or_else(|| self.preset.map(|p| p.endpoints()))
    }

    pub fn has_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty()) || self.encrypted_api_key.is_some()
    }

    pub fn summary(&self) -> ProviderSummary {
        let endpoints = self.resolve_endpoints();
        ProviderSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            tool_kind: self.tool_kind,
            base_url: self.base_url.clone(),
            model_name: self.model_name.clone(),
            is_default: self.is_default,
            has_key: self.has_key(),
            supports_upload: endpoints.as_ref().is_some_and(|e| e.upload.is_some()),
        }
    }
}

/// Provider description safe to expose over the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub id: String,
    pub name: Option<String>,
    pub tool_kind: ToolKind,
    pub base_url: String,
    pub model_name: Option<String>,
    pub is_default: bool,
    pub has_key: bool,
    pub supports_upload: bool,
}

/// Caller values for a generate call.
///
/// Keys declared by the generate descriptor override that parameter's
/// default and are coerced to its type. Other keys are placed verbatim at
/// their dot-path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl GenerateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_prompt(self, prompt: impl Into<String>) -> Self {
        self.with_value("prompt", prompt.into())
    }

    pub fn extend(&mut self, values: BTreeMap<String, Value>) {
        self.values.extend(values);
    }
}

/// A task accepted by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTask {
    pub task_id: String,
    pub raw: Value,
}

/// One observation of a remote task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: Option<String>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Every mapped field, including those above.
    pub fields: BTreeMap<String, Value>,
    /// The unmodified response body.
    pub raw: Value,
}

/// A file hosted by the provider after upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub image_url: String,
    pub raw: Value,
}
