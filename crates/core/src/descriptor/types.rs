//! Declarative endpoint descriptor types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised by malformed descriptors or by materializing them.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DescriptorError {
    #[error("parameter key is empty")]
    EmptyKey,

    #[error("duplicate parameter key: {0}")]
    DuplicateParamKey(String),

    #[error("duplicate response key: {0}")]
    DuplicateResponseKey(String),

    #[error("select parameter {0} has no options")]
    EmptySelectOptions(String),

    #[error("path {key} collides with an existing value at {at}")]
    PathCollision { key: String, at: String },

    #[error("required parameter {0} has no value")]
    MissingRequired(String),

    #[error("{endpoint} endpoint must map response key {key}")]
    MissingResponseMapping { endpoint: String, key: String },

    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },
}

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[default]
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether requests with this method carry a body.
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

/// The type of a parameter, with the data only some types carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Select {
        #[serde(default)]
        options: Vec<Value>,
    },
    File,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Select { .. } => "select",
            ParamKind::File => "file",
        }
    }
}

/// One request parameter of an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamField {
    /// Dot-path key (`metadata.n` expands to `{"metadata": {"n": ..}}`).
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub kind: ParamKind,
    /// Default value.
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

impl ParamField {
    pub fn new(key: impl Into<String>, kind: ParamKind, value: Value) -> Self {
        Self {
            key: key.into(),
            label: String::new(),
            kind,
            value,
            required: false,
            remark: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, ParamKind::File)
    }
}

/// Maps an internal key to a dot-path in the response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseField {
    pub key: String,
    #[serde(default)]
    pub label: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

impl ResponseField {
    pub fn new(key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: String::new(),
            path: path.into(),
            remark: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Declarative description of one HTTP operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    /// Path relative to the provider base URL, may contain `{taskId}`.
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub params: Vec<ParamField>,
    #[serde(default, alias = "response_mapping")]
    pub response_mapping: Vec<ResponseField>,
}

impl EndpointDescriptor {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            params: Vec::new(),
            response_mapping: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: ParamField) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_mapping(mut self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.response_mapping.push(ResponseField::new(key, path));
        self
    }

    pub fn param(&self, key: &str) -> Option<&ParamField> {
        self.params.iter().find(|p| p.key == key)
    }

    pub fn mapping(&self, key: &str) -> Option<&ResponseField> {
        self.response_mapping.iter().find(|m| m.key == key)
    }

    /// The first `file` parameter, which names the multipart file field.
    pub fn file_param(&self) -> Option<&ParamField> {
        self.params.iter().find(|p| p.is_file())
    }

    pub fn is_multipart(&self) -> bool {
        self.method.has_body() && self.file_param().is_some()
    }
}

/// The three endpoints every provider exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSet {
    pub generate: EndpointDescriptor,
    #[serde(alias = "status", alias = "poll_status")]
    pub poll_status: EndpointDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<EndpointDescriptor>,
}
