//! Application state shared across request handlers and the worker plane.

use std::sync::Arc;

use crate::cache::InspectCache;
use crate::config::Config;
use crate::db::Database;
use crate::driver::CatalogTool;
use crate::git::GitDriver;
use crate::messaging::NotificationSender;
use crate::pipeline::PipelineClient;
use crate::transport::ArtifactTransport;
use crate::worker::QueueRegistry;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor, and
/// to the build driver running inside each worker queue's task.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: Database,
    cache: InspectCache,
    git: Arc<dyn GitDriver>,
    pipeline: Arc<dyn PipelineClient>,
    transport: Arc<dyn ArtifactTransport>,
    notifier: Arc<NotificationSender>,
    catalog: Arc<dyn CatalogTool>,
    queues: QueueRegistry,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        db: Database,
        cache: InspectCache,
        git: Arc<dyn GitDriver>,
        pipeline: Arc<dyn PipelineClient>,
        transport: Arc<dyn ArtifactTransport>,
        notifier: Arc<NotificationSender>,
        catalog: Arc<dyn CatalogTool>,
    ) -> Self {
        let queues = QueueRegistry::with_capacity(config.worker_pool_size);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                cache,
                git,
                pipeline,
                transport,
                notifier,
                catalog,
                queues,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    pub fn cache(&self) -> &InspectCache {
        &self.inner.cache
    }

    pub fn git(&self) -> Arc<dyn GitDriver> {
        self.inner.git.clone()
    }

    pub fn pipeline(&self) -> Arc<dyn PipelineClient> {
        self.inner.pipeline.clone()
    }

    pub fn transport(&self) -> Arc<dyn ArtifactTransport> {
        self.inner.transport.clone()
    }

    pub fn notifier(&self) -> Arc<NotificationSender> {
        self.inner.notifier.clone()
    }

    pub fn catalog(&self) -> Arc<dyn CatalogTool> {
        self.inner.catalog.clone()
    }

    pub fn queues(&self) -> &QueueRegistry {
        &self.inner.queues
    }
}
