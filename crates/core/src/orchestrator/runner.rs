//! Pipeline orchestrator implementation.
//!
//! Drives each entity through its stages:
//! - Base: optional source image upload, generate, poll, cache the clip
//! - Derived: generate from the base clip URL, poll, cache
//!
//! Every record mutation goes to the task store first, then to the
//! in-memory view, then to the update callback. Polling loops are tokio
//! tasks; at most one runs per entity.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::cache::{
    hash_file, is_local_ref, local_path_of, ArtifactCache, UploadRecord, UploadRecordStore,
};
use crate::metrics;
use crate::poller::{FailureKind, PollEvent, PollObserver, PollOutcome, PollingLoop};
use crate::provider::{GenerateRequest, ProviderAdapter, ProviderRegistry, ToolKind};
use crate::task::{Stage, TaskError, TaskRecord, TaskStatus, TaskStore};
use crate::usage::{UsageEvent, UsageHandle};

use super::config::OrchestratorConfig;
use super::types::{
    BaseStageRequest, DerivedStageRequest, OrchestratorError, SourceImage, StageHandle,
};

/// Called with every persisted record snapshot.
pub type UpdateCallback = Arc<dyn Fn(&TaskRecord) + Send + Sync>;

/// The pipeline orchestrator.
///
/// Cheap to clone; clones share the active set, the view map and the session.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn TaskStore>,
    registry: ProviderRegistry,
    cache: ArtifactCache,
    uploads: Option<Arc<dyn UploadRecordStore>>,
    usage: Option<UsageHandle>,
    on_update: Option<UpdateCallback>,

    // Runtime state
    session_id: String,
    active: Arc<RwLock<HashSet<String>>>,
    views: Arc<RwLock<HashMap<String, TaskRecord>>>,
}

impl PipelineOrchestrator {
    /// Create an orchestrator with a fresh session id.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn TaskStore>,
        registry: ProviderRegistry,
        cache: ArtifactCache,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            cache,
            uploads: None,
            usage: None,
            on_update: None,
            session_id: uuid::Uuid::new_v4().to_string(),
            active: Arc::new(RwLock::new(HashSet::new())),
            views: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_upload_records(mut self, uploads: Arc<dyn UploadRecordStore>) -> Self {
        self.uploads = Some(uploads);
        self
    }

    pub fn with_usage(mut self, usage: UsageHandle) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_update_callback(mut self, callback: UpdateCallback) -> Self {
        self.on_update = Some(callback);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Id of this orchestrator instance, written to records it polls.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    // =========================================================================
    // Stage entry points
    // =========================================================================

    /// Start the base stage for an entity.
    pub async fn start_base_stage(
        &self,
        request: BaseStageRequest,
    ) -> Result<StageHandle, OrchestratorError> {
        let entity_id = request.entity_id.clone();
        self.claim(&entity_id).await?;

        match self.submit_base(request).await {
            Ok((record, adapter)) => Ok(self.launch(record, adapter)),
            Err(e) => {
                self.release(&entity_id).await;
                Err(e)
            }
        }
    }

    /// Start the derived stage for an entity.
    pub async fn start_derived_stage(
        &self,
        request: DerivedStageRequest,
    ) -> Result<StageHandle, OrchestratorError> {
        let entity_id = request.entity_id.clone();
        self.claim(&entity_id).await?;

        match self.submit_derived(request).await {
            Ok((record, adapter)) => Ok(self.launch(record, adapter)),
            Err(e) => {
                self.release(&entity_id).await;
                Err(e)
            }
        }
    }

    /// Re-enter polling for the entity's in-progress record, if another
    /// session owns it. Never calls `generate`.
    pub async fn resume(&self, entity_id: &str) -> Result<Option<StageHandle>, OrchestratorError> {
        match self.store.load_in_progress(entity_id)? {
            Some(record) => self.resume_record(record).await,
            None => Ok(None),
        }
    }

    /// Resume every in-progress record left behind by earlier sessions.
    ///
    /// A record that cannot be resumed is logged and skipped.
    pub async fn resume_all(&self) -> Result<Vec<StageHandle>, OrchestratorError> {
        let records = self.store.list_in_progress()?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        info!("Found {} in-progress records to resume", records.len());
        let mut handles = Vec::new();
        for record in records {
            let record_id = record.id.clone();
            match self.resume_record(record).await {
                Ok(Some(handle)) => handles.push(handle),
                Ok(None) => {}
                Err(e) => warn!(record_id = %record_id, error = %e, "Failed to resume record"),
            }
        }
        info!("Resumed {} stages", handles.len());
        Ok(handles)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Latest record for an entity, optionally restricted to one stage.
    pub fn latest(
        &self,
        entity_id: &str,
        stage: Option<Stage>,
    ) -> Result<Option<TaskRecord>, OrchestratorError> {
        Ok(self.store.load_latest(entity_id, stage)?)
    }

    /// All records for an entity, newest first.
    pub fn history(&self, entity_id: &str) -> Result<Vec<TaskRecord>, OrchestratorError> {
        Ok(self.store.list_for_entity(entity_id)?)
    }

    /// Last snapshot this session wrote for the entity.
    pub async fn view(&self, entity_id: &str) -> Option<TaskRecord> {
        self.views.read().await.get(entity_id).cloned()
    }

    pub async fn is_active(&self, entity_id: &str) -> bool {
        self.active.read().await.contains(entity_id)
    }

    pub async fn active_entities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.read().await.iter().cloned().collect();
        ids.sort();
        ids
    }

    // =========================================================================
    // Guard
    // =========================================================================

    /// Reserve the entity's loop slot. Runs before any provider call.
    async fn claim(&self, entity_id: &str) -> Result<(), OrchestratorError> {
        let mut active = self.active.write().await;
        if active.contains(entity_id) || self.store.load_in_progress(entity_id)?.is_some() {
            debug!(entity_id = %entity_id, "Rejected stage start, one is already running");
            return Err(OrchestratorError::StageInProgress {
                entity_id: entity_id.to_string(),
            });
        }
        active.insert(entity_id.to_string());
        Ok(())
    }

    async fn release(&self, entity_id: &str) {
        self.active.write().await.remove(entity_id);
    }

    // =========================================================================
    // Submission
    // =========================================================================

    fn resolve_adapter(
        &self,
        explicit: Option<&str>,
        configured: Option<&str>,
    ) -> Result<Arc<dyn ProviderAdapter>, OrchestratorError> {
        self.registry
            .resolve(explicit, configured, ToolKind::VideoGen)
            .map_err(OrchestratorError::ProviderNotFound)
    }

    async fn submit_base(
        &self,
        request: BaseStageRequest,
    ) -> Result<(TaskRecord, Arc<dyn ProviderAdapter>), OrchestratorError> {
        let adapter = self.resolve_adapter(
            request.provider_id.as_deref(),
            self.config.base_provider.as_deref(),
        )?;

        let mut generate = GenerateRequest::new().with_prompt(request.prompt);
        generate.extend(request.overrides);

        if let Some(image) = request.source_image {
            let url = self.resolve_source_image(&adapter, image).await?;
            generate
                .values
                .insert(self.config.source_image_key.clone(), Value::String(url));
        }

        let record = self
            .submit(&adapter, &request.entity_id, Stage::Base, generate)
            .await?;
        Ok((record, adapter))
    }

    async fn submit_derived(
        &self,
        request: DerivedStageRequest,
    ) -> Result<(TaskRecord, Arc<dyn ProviderAdapter>), OrchestratorError> {
        let adapter = self.resolve_adapter(
            request.provider_id.as_deref(),
            self.config.derived_provider.as_deref(),
        )?;

        let base_url = match request.base_asset_url {
            Some(url) => url,
            None => self
                .latest_base_asset(&request.entity_id)?
                .ok_or_else(|| OrchestratorError::MissingBaseAsset(request.entity_id.clone()))?,
        };

        let mut generate = GenerateRequest::new();
        if let Some(prompt) = request.prompt {
            generate = generate.with_prompt(prompt);
        }
        generate.extend(request.overrides);
        generate
            .values
            .insert(self.config.derived_input_key.clone(), Value::String(base_url));

        let record = self
            .submit(&adapter, &request.entity_id, Stage::Derived, generate)
            .await?;
        Ok((record, adapter))
    }

    /// Remote URL of the newest completed base record.
    fn latest_base_asset(&self, entity_id: &str) -> Result<Option<String>, TaskError> {
        let records = self.store.list_for_entity(entity_id)?;
        Ok(records
            .into_iter()
            .filter(|r| r.stage == Stage::Base && r.status == TaskStatus::Completed)
            .find_map(|r| r.video_url))
    }

    /// Turn a source image into a URL the provider can fetch.
    async fn resolve_source_image(
        &self,
        adapter: &Arc<dyn ProviderAdapter>,
        image: SourceImage,
    ) -> Result<String, OrchestratorError> {
        let path = match image {
            SourceImage::Remote { url } if is_local_ref(&url) => local_path_of(&url)
                .ok_or_else(|| OrchestratorError::Upload(format!("bad local reference: {}", url)))?,
            SourceImage::Remote { url } => return Ok(url),
            SourceImage::Local { path } => path,
        };
        self.upload_once(adapter, &path).await
    }

    /// Upload a local file, reusing an earlier upload of the same content
    /// to the same provider.
    async fn upload_once(
        &self,
        adapter: &Arc<dyn ProviderAdapter>,
        path: &Path,
    ) -> Result<String, OrchestratorError> {
        let provider_id = adapter.provider_id().to_string();

        let Some(uploads) = &self.uploads else {
            let uploaded = adapter.upload(path).await?;
            return Ok(uploaded.image_url);
        };

        let (content_hash, size_bytes) = hash_file(path)
            .await
            .map_err(|e| OrchestratorError::Upload(format!("{}: {}", path.display(), e)))?;

        match uploads.get(&content_hash, &provider_id) {
            Ok(Some(existing)) => {
                metrics::UPLOAD_CACHE.with_label_values(&["hit"]).inc();
                debug!(path = %path.display(), url = %existing.remote_url, "Reusing uploaded image");
                return Ok(existing.remote_url);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Upload record lookup failed, uploading again"),
        }
        metrics::UPLOAD_CACHE.with_label_values(&["miss"]).inc();

        let uploaded = adapter.upload(path).await?;
        let record = UploadRecord {
            content_hash,
            provider_id,
            local_path: path.display().to_string(),
            remote_url: uploaded.image_url.clone(),
            size_bytes,
            mime_type: mime_guess::from_path(path)
                .first()
                .map(|m| m.essence_str().to_string()),
            created_at: Utc::now(),
        };
        if let Err(e) = uploads.save(&record) {
            warn!(error = %e, "Failed to save upload record");
        }
        Ok(uploaded.image_url)
    }

    async fn submit(
        &self,
        adapter: &Arc<dyn ProviderAdapter>,
        entity_id: &str,
        stage: Stage,
        request: GenerateRequest,
    ) -> Result<TaskRecord, OrchestratorError> {
        let generated = adapter.generate(request).await?;

        let mut record = TaskRecord::new(entity_id, stage, adapter.provider_id(), &generated.task_id);
        record.poller_session = Some(self.session_id.clone());
        record.append_log(
            format!("submitted to {} as task {}", adapter.provider_id(), generated.task_id),
            Some(0.0),
        );
        self.persist(&record).await?;

        metrics::STAGES_STARTED
            .with_label_values(&[stage.as_str()])
            .inc();
        self.emit(UsageEvent::TaskSubmitted {
            record_id: record.id.clone(),
            entity_id: record.entity_id.clone(),
            stage,
            provider_id: record.provider_id.clone(),
            task_id: record.task_id.clone(),
        })
        .await;

        info!(
            entity_id = %entity_id,
            stage = %stage,
            provider = %adapter.provider_id(),
            task_id = %record.task_id,
            "Stage submitted"
        );
        Ok(record)
    }

    // =========================================================================
    // Resumption
    // =========================================================================

    async fn resume_record(
        &self,
        mut record: TaskRecord,
    ) -> Result<Option<StageHandle>, OrchestratorError> {
        if record.poller_session.as_deref() == Some(self.session_id.as_str()) {
            debug!(record_id = %record.id, "Record already polled by this session");
            return Ok(None);
        }

        {
            let mut active = self.active.write().await;
            if !active.insert(record.entity_id.clone()) {
                return Ok(None);
            }
        }

        let Some(adapter) = self.registry.get(&record.provider_id) else {
            self.release(&record.entity_id).await;
            return Err(OrchestratorError::ProviderNotFound(record.provider_id));
        };

        record.poller_session = Some(self.session_id.clone());
        record.resumed_at = Some(Utc::now());
        record.append_log("resumed polling after restart", None);
        if let Err(e) = self.persist(&record).await {
            self.release(&record.entity_id).await;
            return Err(e.into());
        }

        metrics::STAGES_RESUMED.inc();
        self.emit(UsageEvent::TaskResumed {
            record_id: record.id.clone(),
            entity_id: record.entity_id.clone(),
            stage: record.stage,
            task_id: record.task_id.clone(),
            session: self.session_id.clone(),
        })
        .await;

        info!(
            entity_id = %record.entity_id,
            stage = %record.stage,
            task_id = %record.task_id,
            "Resuming stage"
        );
        Ok(Some(self.launch(record, adapter)))
    }

    // =========================================================================
    // Driving a stage
    // =========================================================================

    fn launch(&self, record: TaskRecord, adapter: Arc<dyn ProviderAdapter>) -> StageHandle {
        let this = self.clone();
        let snapshot = record.clone();
        let join = tokio::spawn(async move { this.drive(record, adapter).await });
        StageHandle::new(snapshot, join)
    }

    /// Poll to a terminal state, cache the artifact and persist the outcome.
    async fn drive(self, record: TaskRecord, adapter: Arc<dyn ProviderAdapter>) -> TaskRecord {
        metrics::ACTIVE_LOOPS.inc();

        let task_id = record.task_id.clone();
        let entity_id = record.entity_id.clone();
        let observer = StageObserver {
            orchestrator: &self,
            record: Mutex::new(record),
        };

        let outcome = PollingLoop::new(adapter, self.config.poller())
            .run(&task_id, &observer)
            .await;
        let mut record = observer.record.into_inner();

        match outcome {
            PollOutcome::Succeeded {
                video_url: Some(video_url),
                thumbnail_url,
                ..
            } => {
                self.complete(&mut record, video_url, thumbnail_url).await;
            }
            PollOutcome::Succeeded { video_url: None, .. } => {
                self.fail(&mut record, "provider reported success without a video URL")
                    .await;
            }
            PollOutcome::Failed { reason, kind } => {
                if kind == FailureKind::Transport {
                    warn!(task_id = %task_id, "Giving up on unreachable provider");
                }
                self.fail(&mut record, &reason).await;
            }
        }

        let result = record.status.as_str();
        let elapsed = (Utc::now() - record.created_at).num_milliseconds().max(0) as f64 / 1000.0;
        metrics::STAGES_FINISHED
            .with_label_values(&[record.stage.as_str(), result])
            .inc();
        metrics::STAGE_DURATION
            .with_label_values(&[record.stage.as_str(), result])
            .observe(elapsed);
        metrics::ACTIVE_LOOPS.dec();

        self.release(&entity_id).await;
        record
    }

    async fn complete(
        &self,
        record: &mut TaskRecord,
        video_url: String,
        thumbnail_url: Option<String>,
    ) {
        let local = self.cache.ensure_local(&video_url, &record.task_id).await;

        record.video_url = Some(video_url.clone());
        record.thumbnail_url = thumbnail_url;
        if is_local_ref(&local) {
            record.local_ref = Some(local);
        }
        record.status = TaskStatus::Completed;
        record.append_log("completed", Some(100.0));
        self.persist_logged(record).await;

        self.emit(UsageEvent::TaskCompleted {
            record_id: record.id.clone(),
            entity_id: record.entity_id.clone(),
            stage: record.stage,
            task_id: record.task_id.clone(),
            video_url,
            local_ref: record.local_ref.clone(),
        })
        .await;

        info!(
            entity_id = %record.entity_id,
            stage = %record.stage,
            task_id = %record.task_id,
            cached = record.local_ref.is_some(),
            "Stage completed"
        );
    }

    async fn fail(&self, record: &mut TaskRecord, reason: &str) {
        record.error = Some(reason.to_string());
        record.status = TaskStatus::Failed;
        record.append_log(format!("failed: {}", reason), None);
        self.persist_logged(record).await;

        self.emit(UsageEvent::TaskFailed {
            record_id: record.id.clone(),
            entity_id: record.entity_id.clone(),
            stage: record.stage,
            task_id: Some(record.task_id.clone()),
            error: reason.to_string(),
        })
        .await;

        info!(
            entity_id = %record.entity_id,
            stage = %record.stage,
            task_id = %record.task_id,
            reason = %reason,
            "Stage failed"
        );
    }

    // =========================================================================
    // Write-through
    // =========================================================================

    /// Store, then view, then callback.
    async fn persist(&self, record: &TaskRecord) -> Result<(), TaskError> {
        self.store.save(record)?;
        self.views
            .write()
            .await
            .insert(record.entity_id.clone(), record.clone());
        if let Some(callback) = &self.on_update {
            callback(record);
        }
        Ok(())
    }

    async fn persist_logged(&self, record: &TaskRecord) {
        if let Err(e) = self.persist(record).await {
            error!(record_id = %record.id, error = %e, "Failed to persist task record");
        }
    }

    async fn emit(&self, event: UsageEvent) {
        if let Some(usage) = &self.usage {
            usage.emit(event).await;
        }
    }
}

/// Writes loop events into the record as log lines.
struct StageObserver<'a> {
    orchestrator: &'a PipelineOrchestrator,
    record: Mutex<TaskRecord>,
}

#[async_trait]
impl PollObserver for StageObserver<'_> {
    async fn on_event(&self, event: PollEvent) {
        let (message, progress) = match event {
            PollEvent::StatusChanged { status } => (format!("provider status: {}", status), None),
            PollEvent::Progress { progress } => {
                (format!("progress {:.0}%", progress), Some(progress))
            }
            PollEvent::TransientFailure {
                attempt,
                max,
                error,
            } => (
                format!("status poll failed ({}/{}): {}", attempt, max, error),
                None,
            ),
        };

        let mut record = self.record.lock().await;
        record.append_log(message, progress);
        self.orchestrator.persist_logged(&record).await;
    }
}
