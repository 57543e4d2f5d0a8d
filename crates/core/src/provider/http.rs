//! HTTP provider adapter driven by endpoint descriptors.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{multipart, Client, Method, RequestBuilder};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::credentials::decrypt_secret;
use crate::descriptor::{
    set_by_path, validate_endpoint_set, EndpointDescriptor, EndpointSet, IMAGE_URL_KEY,
    STATUS_KEY, TASK_ID_KEY, THUMBNAIL_URL_KEY, VIDEO_URL_KEY,
};
use crate::metrics;
use crate::usage::{excerpt, CallOperation, CallOutcome, UsageEvent, UsageHandle};

use super::extract::{extract, parse_body};
use super::materialize::materialize;
use super::{
    GenerateRequest, GeneratedTask, ProviderAdapter, ProviderConfig, ProviderError,
    StatusSnapshot, ToolKind, UploadedFile,
};

/// Parameter key the configured model name is sent under.
const MODEL_KEY: &str = "model";
/// Multipart field name when the upload descriptor declares no file param.
const DEFAULT_FILE_FIELD: &str = "file";

/// A successful HTTP exchange.
struct Exchange {
    status: u16,
    text: String,
}

/// Provider adapter speaking HTTP via reqwest.
pub struct HttpProviderAdapter {
    client: Client,
    config: ProviderConfig,
    endpoints: EndpointSet,
    user_id: Option<String>,
    usage: Option<UsageHandle>,
}

impl HttpProviderAdapter {
    /// Build an adapter, validating the provider's endpoints up front.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let endpoints = config
            .resolve_endpoints()
            .ok_or_else(|| ProviderError::Unsupported {
                provider: config.id.clone(),
                operation: "generate".to_string(),
            })?;
        validate_endpoint_set(&endpoints)?;

        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            config,
            endpoints,
            user_id: None,
            usage: None,
        })
    }

    /// User id used to decrypt an encrypted API key.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_usage(mut self, usage: UsageHandle) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn api_key(&self) -> Result<Option<String>, ProviderError> {
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(Some(key.to_string()));
        }
        match &self.config.encrypted_api_key {
            Some(secret) => {
                let user_id = self.user_id.as_deref().unwrap_or_default();
                Ok(Some(decrypt_secret(secret, user_id)?))
            }
            None => Ok(None),
        }
    }

    fn url(&self, template: &str, task_id: Option<&str>) -> String {
        let mut path = template.to_string();
        if let Some(task_id) = task_id {
            path = path.replace("{taskId}", &urlencoding::encode(task_id));
        }
        let base = self.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    fn request(
        &self,
        descriptor: &EndpointDescriptor,
        task_id: Option<&str>,
    ) -> Result<RequestBuilder, ProviderError> {
        let method = Method::from_bytes(descriptor.method.as_str().as_bytes())
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let mut builder = self
            .client
            .request(method, self.url(&descriptor.path, task_id));

        if let Some(key) = self.api_key()? {
            builder = builder.header(
                self.config.auth.header.as_str(),
                format!("{}{}", self.config.auth.prefix, key),
            );
        }
        for (name, value) in &self.config.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        Ok(builder)
    }

    /// Attach a materialized body: JSON for body methods, query string otherwise.
    fn attach_body(
        descriptor: &EndpointDescriptor,
        builder: RequestBuilder,
        body: &Map<String, Value>,
    ) -> RequestBuilder {
        if descriptor.method.has_body() {
            builder.json(body)
        } else if body.is_empty() {
            builder
        } else {
            builder.query(&form_pairs(body))
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Exchange, ProviderError> {
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }
        Ok(Exchange {
            status: status.as_u16(),
            text,
        })
    }

    /// Record metrics and a usage event. Successful polls are too frequent
    /// to log; failed ones are kept.
    #[allow(clippy::too_many_arguments)]
    async fn report(
        &self,
        operation: CallOperation,
        started: Instant,
        error: Option<&ProviderError>,
        http_status: Option<u16>,
        task_id: Option<&str>,
        request: Option<String>,
        response: Option<&str>,
    ) {
        let elapsed = started.elapsed();
        let outcome = if error.is_some() {
            CallOutcome::Failure
        } else {
            CallOutcome::Success
        };

        metrics::PROVIDER_CALLS
            .with_label_values(&[
                self.config.id.as_str(),
                operation.as_str(),
                if error.is_some() { "failure" } else { "success" },
            ])
            .inc();
        metrics::PROVIDER_CALL_DURATION
            .with_label_values(&[self.config.id.as_str(), operation.as_str()])
            .observe(elapsed.as_secs_f64());

        if operation == CallOperation::PollStatus && error.is_none() {
            return;
        }
        if let Some(usage) = &self.usage {
            usage
                .emit(UsageEvent::ProviderCall {
                    provider_id: self.config.id.clone(),
                    tool_kind: self.config.tool_kind,
                    model: self.config.model_name.clone(),
                    operation,
                    outcome,
                    duration_ms: elapsed.as_millis() as u64,
                    http_status: http_status.or_else(|| error.and_then(|e| e.http_status())),
                    error: error.map(|e| e.to_string()),
                    task_id: task_id.map(String::from),
                    request,
                    response: response.map(excerpt),
                })
                .await;
        }
    }

    /// Caller values with the configured model filled in.
    fn generate_values(&self, request: GenerateRequest) -> BTreeMap<String, Value> {
        let mut values = request.values;
        if let Some(model) = &self.config.model_name {
            values
                .entry(MODEL_KEY.to_string())
                .or_insert_with(|| Value::String(model.clone()));
        }
        values
    }

    fn build_generate_body(
        &self,
        values: &BTreeMap<String, Value>,
    ) -> Result<Map<String, Value>, ProviderError> {
        let descriptor = &self.endpoints.generate;
        let mut payload = materialize(&descriptor.params, values)?;

        for (key, value) in values {
            if descriptor.param(key).is_none() {
                set_by_path(&mut payload.body, key, value.clone())?;
            }
        }
        Ok(payload.body)
    }

    async fn generate_inner(
        &self,
        body: &Map<String, Value>,
    ) -> Result<(Exchange, GeneratedTask), ProviderError> {
        let descriptor = &self.endpoints.generate;
        let builder = Self::attach_body(descriptor, self.request(descriptor, None)?, body);
        let exchange = self.execute(builder).await?;

        let raw = parse_body(&exchange.text);
        let fields = extract(&descriptor.response_mapping, &raw);
        let task_id = fields
            .string(TASK_ID_KEY)
            .ok_or_else(|| missing(descriptor, TASK_ID_KEY))?;

        Ok((exchange, GeneratedTask { task_id, raw }))
    }

    async fn poll_inner(
        &self,
        descriptor: &EndpointDescriptor,
        task_id: &str,
    ) -> Result<Exchange, ProviderError> {
        let payload = materialize(&descriptor.params, &BTreeMap::new())?;
        let builder = Self::attach_body(
            descriptor,
            self.request(descriptor, Some(task_id))?,
            &payload.body,
        );
        self.execute(builder).await
    }

    async fn upload_inner(
        &self,
        descriptor: &EndpointDescriptor,
        path: &Path,
    ) -> Result<(Exchange, UploadedFile), ProviderError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_FILE_FIELD.to_string());
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let field = descriptor
            .file_param()
            .map(|p| p.key.clone())
            .unwrap_or_else(|| DEFAULT_FILE_FIELD.to_string());

        let payload = materialize(&descriptor.params, &BTreeMap::new())?;
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.as_ref())?;
        let mut form = multipart::Form::new().part(field, part);
        for (key, value) in form_pairs(&payload.body) {
            form = form.text(key, value);
        }

        let exchange = self
            .execute(self.request(descriptor, None)?.multipart(form))
            .await?;
        let raw = parse_body(&exchange.text);
        let fields = extract(&descriptor.response_mapping, &raw);
        let image_url = fields
            .string(IMAGE_URL_KEY)
            .ok_or_else(|| missing(descriptor, IMAGE_URL_KEY))?;

        Ok((exchange, UploadedFile { image_url, raw }))
    }
}

fn missing(descriptor: &EndpointDescriptor, key: &str) -> ProviderError {
    ProviderError::MissingField {
        key: key.to_string(),
        path: descriptor
            .mapping(key)
            .map(|m| m.path.clone())
            .unwrap_or_default(),
    }
}

/// Flatten top-level body fields into string pairs for query strings and forms.
fn form_pairs(body: &Map<String, Value>) -> Vec<(String, String)> {
    body.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect()
}

#[async_trait]
impl ProviderAdapter for HttpProviderAdapter {
    fn provider_id(&self) -> &str {
        &self.config.id
    }

    fn tool_kind(&self) -> ToolKind {
        self.config.tool_kind
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedTask, ProviderError> {
        let started = Instant::now();
        let values = self.generate_values(request);
        let body = self.build_generate_body(&values)?;
        let request_text = serde_json::to_string(&body).ok().map(|s| excerpt(&s));

        debug!(provider = %self.config.id, "Submitting generate request");
        match self.generate_inner(&body).await {
            Ok((exchange, task)) => {
                self.report(
                    CallOperation::Generate,
                    started,
                    None,
                    Some(exchange.status),
                    Some(&task.task_id),
                    request_text,
                    Some(&exchange.text),
                )
                .await;
                Ok(task)
            }
            Err(e) => {
                warn!(provider = %self.config.id, error = %e, "Generate request failed");
                self.report(
                    CallOperation::Generate,
                    started,
                    Some(&e),
                    None,
                    None,
                    request_text,
                    None,
                )
                .await;
                Err(e)
            }
        }
    }

    async fn poll_status(&self, task_id: &str) -> Result<StatusSnapshot, ProviderError> {
        let started = Instant::now();
        let descriptor = &self.endpoints.poll_status;

        let exchange = match self.poll_inner(descriptor, task_id).await {
            Ok(exchange) => exchange,
            Err(e) => {
                self.report(
                    CallOperation::PollStatus,
                    started,
                    Some(&e),
                    None,
                    Some(task_id),
                    None,
                    None,
                )
                .await;
                return Err(e);
            }
        };
        self.report(
            CallOperation::PollStatus,
            started,
            None,
            Some(exchange.status),
            Some(task_id),
            None,
            None,
        )
        .await;

        let raw = parse_body(&exchange.text);
        let fields = extract(&descriptor.response_mapping, &raw);
        Ok(StatusSnapshot {
            status: fields.string(STATUS_KEY),
            video_url: fields.string(VIDEO_URL_KEY),
            thumbnail_url: fields.string(THUMBNAIL_URL_KEY),
            fields: fields.into_map(),
            raw,
        })
    }

    async fn upload(&self, path: &Path) -> Result<UploadedFile, ProviderError> {
        let descriptor = self
            .endpoints
            .upload
            .as_ref()
            .ok_or_else(|| ProviderError::Unsupported {
                provider: self.config.id.clone(),
                operation: "upload".to_string(),
            })?;

        let started = Instant::now();
        let request_text = Some(path.display().to_string());
        match self.upload_inner(descriptor, path).await {
            Ok((exchange, uploaded)) => {
                debug!(provider = %self.config.id, url = %uploaded.image_url, "Uploaded file");
                self.report(
                    CallOperation::Upload,
                    started,
                    None,
                    Some(exchange.status),
                    None,
                    request_text,
                    Some(&exchange.text),
                )
                .await;
                Ok(uploaded)
            }
            Err(e) => {
                warn!(provider = %self.config.id, error = %e, "Upload failed");
                self.report(CallOperation::Upload, started, Some(&e), None, None, request_text, None)
                    .await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{EndpointPreset, HttpMethod, ParamField, ParamKind};
    use serde_json::json;

    fn adapter(config: ProviderConfig) -> HttpProviderAdapter {
        HttpProviderAdapter::new(config).unwrap()
    }

    fn sora() -> ProviderConfig {
        ProviderConfig::new("sora", ToolKind::VideoGen, "https://api.example.com/v1/")
            .with_api_key("sk-test")
            .with_preset(EndpointPreset::Sora)
    }

    #[test]
    fn test_url_joins_and_encodes_task_id() {
        let a = adapter(sora());
        assert_eq!(
            a.url("/videos/{taskId}", Some("abc/1 2")),
            "https://api.example.com/v1/videos/abc%2F1%202"
        );
        assert_eq!(a.url("uploads", None), "https://api.example.com/v1/uploads");
    }

    #[test]
    fn test_generate_body_merges_declared_and_free_values() {
        let a = adapter(sora().with_model("sora-2-pro"));
        let values = a.generate_values(
            GenerateRequest::new()
                .with_prompt("a cat surfing")
                .with_value("duration", "15")
                .with_value("metadata.character_url", "https://x/base.mp4"),
        );
        let body = Value::Object(a.build_generate_body(&values).unwrap());

        assert_eq!(body["model"], json!("sora-2-pro"));
        assert_eq!(body["duration"], json!(15));
        assert_eq!(body["prompt"], json!("a cat surfing"));
        assert_eq!(body["metadata"]["n"], json!(1));
        assert_eq!(body["metadata"]["character_url"], json!("https://x/base.mp4"));
    }

    #[test]
    fn test_model_name_added_when_undeclared() {
        let endpoints = EndpointSet {
            generate: EndpointDescriptor::new(HttpMethod::Post, "/gen")
                .with_param(ParamField::new("steps", ParamKind::Number, json!(20)))
                .with_mapping("taskId", "id"),
            poll_status: EndpointDescriptor::new(HttpMethod::Get, "/gen/{taskId}"),
            upload: None,
        };
        let a = adapter(
            ProviderConfig::new("img", ToolKind::ImageGen, "http://localhost")
                .with_endpoints(endpoints)
                .with_model("flux"),
        );
        let values = a.generate_values(GenerateRequest::new());
        let body = a.build_generate_body(&values).unwrap();
        assert_eq!(body["model"], json!("flux"));
        assert_eq!(body["steps"], json!(20));
    }

    #[test]
    fn test_new_rejects_provider_without_endpoints() {
        let config = ProviderConfig::new("bare", ToolKind::VideoGen, "http://localhost");
        assert!(matches!(
            HttpProviderAdapter::new(config),
            Err(ProviderError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_form_pairs_stringify() {
        let body: Map<String, Value> = serde_json::from_value(json!({
            "a": "x", "b": 2, "c": true, "d": null
        }))
        .unwrap();
        assert_eq!(
            form_pairs(&body),
            vec![
                ("a".to_string(), "x".to_string()),
                ("b".to_string(), "2".to_string()),
                ("c".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_encrypted_key_requires_user_id() {
        let mut config = sora();
        config.api_key = None;
        config.encrypted_api_key =
            Some(crate::credentials::encrypt_secret("sk-sealed", "user-1").unwrap());

        let without = adapter(config.clone());
        assert!(matches!(
            without.api_key(),
            Err(ProviderError::Credential(_))
        ));

        let with = adapter(config).with_user_id("user-1");
        assert_eq!(with.api_key().unwrap().as_deref(), Some("sk-sealed"));
    }
}
