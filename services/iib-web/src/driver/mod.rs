//! Build driver (C8): the per-request orchestration algorithm (SPEC_FULL.md
//! §4.8), run by the worker plane once a task is dequeued from its queue.
//! Composes the C2-C5 trait boundaries (artifact transport, git, pipeline,
//! notifications) around the eleven-step add/rm/merge/create-empty/fbc/
//! deprecations algorithm, with two lighter flows for the two request types
//! that never touch a Git-managed catalog, plus compensating rollback on
//! any failure past the index.db push.

mod catalog;

pub use catalog::ProcessCatalogTool;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use iib_id::RequestId;
use thiserror::Error;
use tracing::{error, instrument, warn};

use iib_events::BuildState;

use crate::domain::{Request, RequestPayload};
use crate::git::{self, GitError, MergeRequestDetails};
use crate::messaging;
use crate::pipeline::PipelineError;
use crate::state::AppState;
use crate::transport::{self, TransportError};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Db(#[from] crate::db::DbError),
    #[error("bundle {bundle} failed validation: {reason}")]
    BundleValidation { bundle: String, reason: String },
    #[error("the request has no from_index/target_index to operate on")]
    MissingSubject,
    #[error("{0}")]
    Other(String),
}

/// Operator tooling (opm-equivalent) invoked against `index.db` and the
/// checked-out `configs/` tree. SPEC_FULL.md §4.8 step 4 marks the exact
/// tool invocation out of core scope, so — exactly as with `GitDriver`,
/// `ArtifactTransport`, and `PipelineClient` — this crate specifies it as a
/// trait boundary rather than shelling out itself.
#[async_trait]
pub trait CatalogTool: Send + Sync {
    /// Mutate `index_db_path` in place per `request`'s payload, returning
    /// the opm version used and the resulting set of architectures.
    async fn apply(
        &self,
        request: &Request,
        index_db_path: &PathBuf,
        configs_dir: &PathBuf,
    ) -> Result<CatalogMutation, DriverError>;

    /// Inspect one bundle pullspec (step 5's bounded validation pool).
    async fn validate_bundle(&self, pullspec: &str) -> Result<(), DriverError>;

    /// Walk one bundle's replaces/skips/channel edges, returning the
    /// directly related bundle pullspecs (used by recursive-related-bundles).
    async fn related_bundles(&self, pullspec: &str) -> Result<Vec<String>, DriverError>;
}

#[derive(Debug, Clone, Default)]
pub struct CatalogMutation {
    pub opm_version: String,
    pub architectures: Vec<String>,
}

/// What step 6 captured, needed by failure compensation.
struct PushCapture {
    overwrite_digest: Option<String>,
    overwrite_ref: String,
}

/// What step 8 captured, needed by failure compensation. `None` until a
/// commit has actually landed.
enum CommitCapture {
    None,
    Direct,
    MergeRequest(MergeRequestDetails),
}

pub struct BuildDriver {
    state: AppState,
}

/// Append a `RequestState` row and notify (SPEC_FULL.md §4.6 `add_state`
/// paired with §4.5's per-request and, on a terminal transition, per-batch
/// envelopes). The single path that is allowed to call
/// `RequestStore::append_state` directly: everything that drives a request
/// to a new state — the build driver's own phase/terminal announcements,
/// and the dispatcher's scheduling-failure path (SPEC_FULL.md §4.7 step 6)
/// — goes through this function so a transition is never persisted without
/// also being notified.
pub(crate) async fn announce(state: &AppState, request_id: RequestId, new_state: BuildState, reason: &str) {
    match state.db().requests().append_state(request_id, new_state, reason).await {
        Ok(_) => {
            notify_request(state, request_id).await;
            if new_state.is_terminal() {
                notify_batch_if_terminal(state, request_id).await;
            }
        }
        Err(e) => warn!(error = %e, reason, "failed to append request state"),
    }
}

/// Per-request notification body (SPEC_FULL.md §4.5: "the request's public
/// JSON (non-verbose)"), built the same way `api::v1::builds::notify_creation`
/// builds the creation-time one, so every transition after creation carries
/// the same shape rather than a truncated stub.
async fn notify_request(state: &AppState, request_id: RequestId) {
    let config = state.config();
    let Ok(Some(request)) = state.db().requests().get(request_id, false).await else {
        warn!(%request_id, "failed to load request for its own transition notification");
        return;
    };
    let annotations = match state.db().batches().get(request.batch_id).await {
        Ok(Some(batch)) => batch.annotations,
        _ => serde_json::Value::Null,
    };
    let public_json = crate::api::v1::builds::to_public_json(&request, &annotations, config, false);
    let envelope = messaging::per_request_envelope(&config.messaging.build_state_destination, public_json, config.messaging.durable);
    state.notifier().send(&envelope).await;
}

/// SPEC_FULL.md §4.5: the batch envelope is emitted on creation (handled in
/// `api::v1::builds`) or "when the batch has reached a terminal state (no
/// request left in-progress)". Every request-level terminal transition
/// checks whether it was the last one still in progress and, if so, fires
/// the batch envelope here.
async fn notify_batch_if_terminal(state: &AppState, request_id: RequestId) {
    let config = state.config();
    let Ok(Some(request)) = state.db().requests().get(request_id, false).await else {
        return;
    };
    let Ok(batch) = state.db().batches().get(request.batch_id).await else {
        return;
    };
    let Some(batch) = batch else { return };
    let Ok(member_states) = state.db().batches().member_states(batch.id).await else {
        return;
    };
    if member_states.iter().any(|s| !s.is_terminal()) {
        return;
    }
    let derived = crate::domain::Batch::derived_state(member_states);

    use crate::db::RequestFilters;
    let Ok((members, _)) = state
        .db()
        .requests()
        .list(RequestFilters { state: None, batch: Some(batch.id) }, 1, i64::MAX)
        .await
    else {
        return;
    };

    let mut request_ids: Vec<_> = members.iter().map(|r| r.id).collect();
    request_ids.sort();
    let body = iib_events::BatchStateBody {
        batch: batch.id,
        annotations: batch.annotations.clone(),
        requests: members
            .iter()
            .map(|r| iib_events::BatchRequestSummary {
                id: r.id,
                organization: crate::api::v1::builds::organization_of(&r.payload),
                request_type: r.payload.request_type(),
            })
            .collect(),
        request_ids,
        state: derived,
        user: members.first().and_then(|r| r.user_id.clone()),
    };
    let envelope = messaging::per_batch_envelope(&config.messaging.batch_state_destination, &body, config.messaging.durable);
    state.notifier().send(&envelope).await;
}

impl BuildDriver {
    pub fn new(state: &AppState) -> Self {
        Self { state: state.clone() }
    }

    /// Entry point for the worker plane: run to completion, never
    /// propagating a panic-worthy error past this call — every failure path
    /// ends in a `failed` state transition instead.
    #[instrument(skip(self), fields(request_id = %request_id))]
    pub async fn run(&self, request_id: RequestId) {
        let request = match self.state.db().requests().get(request_id, true).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                error!("worker picked up a request id that no longer exists");
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to load request for the worker plane");
                return;
            }
        };

        let outcome = match &request.payload {
            RequestPayload::RegenerateBundle(_) => self.run_regenerate_bundle(&request).await,
            RequestPayload::RecursiveRelatedBundles(_) => self.run_recursive_related_bundles(&request).await,
            _ => self.run_catalog_request(&request).await,
        };

        if let Err(e) = outcome {
            error!(error = %e, "build driver run failed");
            self.fail(request_id, &format!("{e}")).await;
        }
    }

    async fn announce(&self, request_id: RequestId, state: BuildState, reason: &str) {
        announce(&self.state, request_id, state, reason).await;
    }

    async fn fail(&self, request_id: RequestId, reason: &str) {
        self.announce(request_id, BuildState::Failed, reason).await;
    }

    /// The eleven-step algorithm for add/rm/merge/create-empty/fbc/
    /// deprecations requests (SPEC_FULL.md §4.8). Cleans up its temp
    /// workspace on every exit path.
    async fn run_catalog_request(&self, request: &Request) -> Result<(), DriverError> {
        let request_id = request.id;

        self.announce(request_id, BuildState::InProgress, "Preparing the request workspace").await;
        let workspace = std::env::temp_dir().join(format!("iib-request-{request_id}"));
        tokio::fs::create_dir_all(&workspace)
            .await
            .map_err(|e| DriverError::Other(format!("failed to create workspace: {e}")))?;
        let _cleanup = WorkspaceGuard(workspace.clone());

        self.run_catalog_request_in(request, &workspace).await
    }

    async fn run_catalog_request_in(&self, request: &Request, workspace: &PathBuf) -> Result<(), DriverError> {
        let request_id = request.id;
        let config = self.state.config().clone();

        let from_index = request.payload.git_subject().ok_or(DriverError::MissingSubject)?.to_string();
        let overwrite_from_index = request.payload.overwrite_from_index();

        // Step 2: resolve git repo.
        self.announce(request_id, BuildState::InProgress, "Cloning the catalog repository").await;
        let repo_url = config
            .git
            .index_to_gitlab_push_map
            .get(&git_repo_key(&from_index))
            .cloned()
            .ok_or_else(|| DriverError::Git(GitError::NoRepoMapping { repo: from_index.clone() }))?;
        let branch = git::branch_for_index(&from_index).to_string();
        let (token_name, token) = config
            .git
            .index_configs_gitlab_tokens_map
            .get(&repo_url)
            .cloned()
            .ok_or_else(|| DriverError::Git(GitError::NoCredentials { git_url: repo_url.clone() }))?;

        let checkout = workspace.join("checkout");
        self.state.git().clone_repo(&repo_url, &branch, &token_name, &token, &checkout).await?;
        self.state.git().configure_user(&checkout, "iib-bot", "iib-bot@example.com").await?;

        // Step 3: fetch index.db.
        self.announce(request_id, BuildState::InProgress, "Fetching the index database").await;
        let artifact_dir = workspace.join("artifact");
        tokio::fs::create_dir_all(&artifact_dir)
            .await
            .map_err(|e| DriverError::Other(format!("failed to create artifact dir: {e}")))?;
        let source_ref = transport::index_db_pullspec(&config.index_db_artifact_template, &from_index, &from_index);
        let index_db_path = self.pull_index_db(&source_ref, &artifact_dir, &config).await?;

        // Step 4: apply mutation.
        self.announce(request_id, BuildState::InProgress, "Applying the catalog mutation").await;
        let configs_dir = checkout.join("configs");
        let mutation = self.state.catalog().apply(request, &index_db_path, &configs_dir).await?;

        // Step 5: validate bundles in parallel (add only).
        if let RequestPayload::Add(add) = &request.payload {
            if !add.bundles.is_empty() {
                self.announce(request_id, BuildState::InProgress, "Validating bundles").await;
                self.validate_bundles(&add.bundles).await?;
            }
        }

        // Step 6: push index.db.
        self.announce(request_id, BuildState::InProgress, "Pushing the index database").await;
        let image_name = image_name_of(&from_index).to_string();
        let request_tag = format!("{image_name}-{branch}-{request_id}");
        let request_ref =
            transport::index_db_pullspec(&config.index_db_artifact_template, &request_tag, &from_index);
        self.state
            .transport()
            .push(&request_ref, &index_db_path, "application/vnd.iib.index-db", &HashMap::new(), None)
            .await?;

        let overwrite_tag = format!("{image_name}-{branch}");
        let overwrite_ref =
            transport::index_db_pullspec(&config.index_db_artifact_template, &overwrite_tag, &from_index);
        let mut push_capture = PushCapture { overwrite_digest: None, overwrite_ref: overwrite_ref.clone() };
        if overwrite_from_index {
            push_capture.overwrite_digest = self.state.transport().digest(&overwrite_ref).await.ok();
            self.state
                .transport()
                .push(&overwrite_ref, &index_db_path, "application/vnd.iib.index-db", &HashMap::new(), None)
                .await?;
        }

        // From here on, any failure must run compensation before returning.
        match self
            .commit_trigger_and_build(request, &checkout, &repo_url, &branch, &mutation, overwrite_from_index)
            .await
        {
            Ok((capture, image_url)) => self.replicate_and_finalize(request, &capture, &image_url).await,
            Err((capture, e)) => {
                self.compensate(request_id, &capture, &push_capture, overwrite_from_index).await;
                Err(e)
            }
        }
    }

    /// Step 3's ImageStream cache-sync policy (SPEC_FULL.md §4.2): compare
    /// the source artifact's digest against the mirrored ImageStream tag's
    /// digest and pull from whichever side the decision names. A failed
    /// ImageStream digest lookup is treated the same as "no ImageStream
    /// digest yet" rather than propagated, since the policy only ever
    /// reads it to decide where to pull *from*.
    async fn pull_index_db(
        &self,
        source_ref: &str,
        artifact_dir: &PathBuf,
        config: &crate::config::Config,
    ) -> Result<PathBuf, DriverError> {
        if !config.use_imagestream_cache {
            return self.state.transport().pull(source_ref, artifact_dir, None).await.map_err(Into::into);
        }

        let repo = config
            .imagestream_source_repository
            .as_deref()
            .ok_or_else(|| DriverError::Other("use_imagestream_cache is set but no imagestream_source_repository is configured".to_string()))?;
        let tag = source_ref.rsplit(':').next().unwrap_or(source_ref);
        let imagestream_ref = format!("{repo}:{tag}");

        let source_digest = self.state.transport().digest(source_ref).await?;
        let imagestream_digest = self.state.transport().digest(&imagestream_ref).await.ok();

        match transport::cache_sync_decision(true, &source_digest, imagestream_digest.as_deref()) {
            transport::CacheSyncDecision::PullFromImageStream => {
                self.state.transport().pull(&imagestream_ref, artifact_dir, None).await.map_err(Into::into)
            }
            transport::CacheSyncDecision::RefreshThenPullFromSource | transport::CacheSyncDecision::PullFromSourceDirectly => {
                self.state.transport().pull(source_ref, artifact_dir, None).await.map_err(Into::into)
            }
        }
    }

    async fn validate_bundles(&self, bundles: &[String]) -> Result<(), DriverError> {
        let pool_size = self.state.config().bundle_validation_pool_size.max(1);
        let mut remaining: Vec<String> = bundles.to_vec();
        let catalog = self.state.catalog();

        while !remaining.is_empty() {
            let batch: Vec<String> = remaining.drain(..remaining.len().min(pool_size)).collect();
            let mut handles = Vec::with_capacity(batch.len());
            for pullspec in batch {
                let catalog = catalog.clone();
                handles.push(tokio::spawn(async move {
                    let result = catalog.validate_bundle(&pullspec).await;
                    (pullspec, result)
                }));
            }
            for handle in handles {
                let (pullspec, result) = handle
                    .await
                    .map_err(|e| DriverError::Other(format!("bundle validation task panicked: {e}")))?;
                if let Err(e) = result {
                    return Err(DriverError::BundleValidation { bundle: pullspec, reason: e.to_string() });
                }
            }
        }
        Ok(())
    }

    /// Steps 7-9: write build metadata, commit/trigger the build, wait for
    /// the pipeline, and resolve the built image reference. Once a commit
    /// has landed, every subsequent error is returned alongside the
    /// `CommitCapture` so the caller can still compensate.
    #[allow(clippy::too_many_arguments)]
    async fn commit_trigger_and_build(
        &self,
        request: &Request,
        checkout: &PathBuf,
        repo_url: &str,
        branch: &str,
        mutation: &CatalogMutation,
        overwrite_from_index: bool,
    ) -> Result<(CommitCapture, String), (CommitCapture, DriverError)> {
        let request_id = request.id;

        self.announce(request_id, BuildState::InProgress, "Writing build metadata").await;
        let mut arches = mutation.architectures.clone();
        arches.sort();
        let metadata = serde_json::json!({
            "opm_version": mutation.opm_version,
            "labels": {"version": branch, "distribution_scope": distribution_scope_of(&request.payload)},
            "binary_image": request.binary_image,
            "request_id": request_id.value(),
            "arches": arches,
        });
        let metadata_path = checkout.join("iib-build-metadata.json");
        if let Err(e) = tokio::fs::write(&metadata_path, serde_json::to_vec_pretty(&metadata).unwrap_or_default())
            .await
        {
            return Err((CommitCapture::None, DriverError::Other(format!("failed to write build metadata: {e}"))));
        }

        self.announce(request_id, BuildState::InProgress, "Committing and triggering the build").await;
        let (capture, commit_sha) = if overwrite_from_index {
            if let Err(e) = self.state.git().commit_and_push(request_id, checkout, repo_url, branch, None).await {
                return Err((CommitCapture::None, e.into()));
            }
            match self.state.git().get_last_commit_sha(checkout).await {
                Ok(sha) => (CommitCapture::Direct, sha),
                Err(e) => return Err((CommitCapture::Direct, e.into())),
            }
        } else {
            let mr = match self.state.git().create_mr(request_id, checkout, repo_url, branch, None).await {
                Ok(mr) => mr,
                Err(e) => return Err((CommitCapture::None, e.into())),
            };
            match self.state.git().get_last_commit_sha(checkout).await {
                Ok(sha) => (CommitCapture::MergeRequest(mr), sha),
                Err(e) => return Err((CommitCapture::MergeRequest(mr), e.into())),
            }
        };

        self.announce(request_id, BuildState::InProgress, "Waiting for the build pipeline").await;
        let runs = match self.state.pipeline().find_pipelinerun(&commit_sha).await {
            Ok(runs) => runs,
            Err(e) => return Err((capture, e.into())),
        };
        let Some(name) = runs.first().map(|r| r.name.clone()) else {
            return Err((
                capture,
                DriverError::Pipeline(PipelineError::NotFound {
                    commit_sha,
                    attempts: self.state.config().total_attempts,
                }),
            ));
        };
        let run = match self
            .state
            .pipeline()
            .wait_for_pipeline_completion(&name, self.state.config().konflux.pipeline_timeout)
            .await
        {
            Ok(run) => run,
            Err(e) => return Err((capture, e.into())),
        };
        match self.state.pipeline().get_pipelinerun_image_url(&run) {
            Ok(image_url) => Ok((capture, image_url)),
            Err(e) => Err((capture, e.into())),
        }
    }

    /// Steps 10-11: replicate the image to every configured tag, close the
    /// MR (if any), and transition to `complete`.
    async fn replicate_and_finalize(
        &self,
        request: &Request,
        capture: &CommitCapture,
        image_url: &str,
    ) -> Result<(), DriverError> {
        let request_id = request.id;

        self.announce(request_id, BuildState::InProgress, "Replicating the built image").await;
        let mut tags: Vec<String> = request.build_tags.clone();
        tags.push(request_id.to_string());
        for tag in &tags {
            let dst = replace_tag(&self.state.config().image_push_template, tag);
            self.state.transport().copy(image_url, &dst).await?;
        }

        self.announce(request_id, BuildState::InProgress, "Finalizing").await;
        if let CommitCapture::MergeRequest(mr) = capture {
            if let Err(e) = self.state.git().close_mr(mr, &mr.mr_url).await {
                warn!(error = %e, "failed to close the throw-away merge request (best effort)");
            }
        }

        self.announce(request_id, BuildState::Complete, "The request completed successfully").await;
        Ok(())
    }

    /// Failure compensation (SPEC_FULL.md §4.8 "Failure compensation").
    /// Errors encountered while compensating are logged, never shadowing
    /// the original failure that triggered compensation.
    async fn compensate(
        &self,
        request_id: RequestId,
        capture: &CommitCapture,
        push: &PushCapture,
        overwrite_from_index: bool,
    ) {
        match capture {
            CommitCapture::None => {}
            CommitCapture::MergeRequest(mr) => {
                if let Err(e) = self.state.git().close_mr(mr, &mr.mr_url).await {
                    warn!(error = %e, "compensation: failed to close merge request");
                }
            }
            CommitCapture::Direct => {
                if let Err(e) = self.state.git().revert_last_commit(request_id, &push.overwrite_ref).await {
                    warn!(error = %e, "compensation: failed to revert the direct commit");
                }
            }
        }

        if overwrite_from_index {
            if let Some(digest) = &push.overwrite_digest {
                let src = format!("{}@{digest}", strip_tag(&push.overwrite_ref));
                if let Err(e) = self.state.transport().copy(&src, &push.overwrite_ref).await {
                    warn!(error = %e, "compensation: failed to restore the overwritten tag's digest");
                }
            }
        }
    }

    async fn run_regenerate_bundle(&self, request: &Request) -> Result<(), DriverError> {
        let request_id = request.id;
        let RequestPayload::RegenerateBundle(payload) = &request.payload else {
            return Err(DriverError::Other("expected a regenerate-bundle payload".to_string()));
        };
        let source = payload.from_bundle_image.clone().ok_or(DriverError::MissingSubject)?;

        self.announce(request_id, BuildState::InProgress, "Pulling the source bundle image").await;
        let workspace = std::env::temp_dir().join(format!("iib-regen-{request_id}"));
        tokio::fs::create_dir_all(&workspace)
            .await
            .map_err(|e| DriverError::Other(format!("failed to create workspace: {e}")))?;
        let _cleanup = WorkspaceGuard(workspace.clone());
        let local_path = self.state.transport().pull(&source, &workspace, None).await?;

        self.announce(request_id, BuildState::InProgress, "Regenerating the bundle").await;
        let mutation = self.state.catalog().apply(request, &local_path, &workspace).await?;
        let _ = mutation;

        self.announce(request_id, BuildState::InProgress, "Pushing the regenerated bundle").await;
        let mut tags: Vec<String> = request.build_tags.clone();
        tags.push(request_id.to_string());
        for tag in &tags {
            let dst = replace_tag(&self.state.config().image_push_template, tag);
            self.state
                .transport()
                .push(&dst, &local_path, "application/vnd.oci.image.manifest.v1+json", &HashMap::new(), None)
                .await?;
        }

        self.announce(request_id, BuildState::Complete, "The request completed successfully").await;
        Ok(())
    }

    async fn run_recursive_related_bundles(&self, request: &Request) -> Result<(), DriverError> {
        let request_id = request.id;
        let RequestPayload::RecursiveRelatedBundles(payload) = &request.payload else {
            return Err(DriverError::Other("expected a recursive-related-bundles payload".to_string()));
        };
        let parent = payload.parent_bundle_image.clone().ok_or(DriverError::MissingSubject)?;

        self.announce(request_id, BuildState::InProgress, "Walking the related-bundles graph").await;
        let catalog = self.state.catalog();
        let mut seen = std::collections::HashSet::new();
        let mut frontier = vec![parent];
        let mut related = Vec::new();
        while let Some(bundle) = frontier.pop() {
            if !seen.insert(bundle.clone()) {
                continue;
            }
            let neighbors = catalog.related_bundles(&bundle).await?;
            for neighbor in neighbors {
                if !seen.contains(&neighbor) {
                    frontier.push(neighbor.clone());
                }
                related.push(neighbor);
            }
        }

        if let Some(dir) = &self.state.config().request_recursive_related_bundles_dir {
            let path = dir.join(format!("{request_id}.json"));
            let _ = tokio::fs::create_dir_all(dir).await;
            let _ = tokio::fs::write(&path, serde_json::to_vec_pretty(&related).unwrap_or_default()).await;
        }

        self.announce(request_id, BuildState::Complete, "The request completed successfully").await;
        Ok(())
    }
}

/// Cleans up a request's workspace directory on every exit path, including
/// early returns via `?` (SPEC_FULL.md §5 "guaranteed cleaned on all exit
/// paths").
struct WorkspaceGuard(PathBuf);

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        let path = self.0.clone();
        tokio::spawn(async move {
            let _ = tokio::fs::remove_dir_all(&path).await;
        });
    }
}

fn git_repo_key(from_index: &str) -> String {
    from_index.split(['@', ':']).next().unwrap_or(from_index).to_string()
}

fn image_name_of(from_index: &str) -> &str {
    from_index.rsplit('/').next().unwrap_or(from_index).split(['@', ':']).next().unwrap_or(from_index)
}

fn distribution_scope_of(payload: &RequestPayload) -> &'static str {
    let scope = match payload {
        RequestPayload::Add(p) => p.distribution_scope,
        RequestPayload::Rm(p) => p.distribution_scope,
        RequestPayload::MergeIndexImage(p) => p.distribution_scope,
        RequestPayload::FbcOperations(p) => p.distribution_scope,
        _ => None,
    };
    scope.map(|s| s.as_str()).unwrap_or("prod")
}

fn replace_tag(template: &str, tag: &str) -> String {
    template.replace("{tag}", tag)
}

fn strip_tag(reference: &str) -> &str {
    reference.rsplit_once(':').map(|(repo, _)| repo).unwrap_or(reference)
}
