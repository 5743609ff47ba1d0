use std::path::Path;

use tracing::{info, warn};

use crate::chart;
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::inspector::runtime::RuntimeInspector;
use crate::inspector::ImageInfo;
use crate::progress::Spinner;
use crate::repo::RepoStore;

/// Clone → enumerate charts → resolve image → inspect image.
pub struct Pipeline {
    repos: RepoStore,
    inspector: RuntimeInspector,
    progress: Option<Spinner>,
}

impl Pipeline {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            repos: config.repo_store(),
            inspector: RuntimeInspector::new(&config.runtime.binary_path, config.command_timeout),
            progress: None,
        }
    }

    /// Attach a spinner that follows the stages.
    pub fn set_progress(&mut self, spinner: Spinner) {
        self.inspector.set_progress(spinner.clone());
        self.progress = Some(spinner);
    }

    fn step(&self, done: impl Into<String>, next: impl Into<String>) {
        if let Some(spinner) = &self.progress {
            spinner.finish(done);
            spinner.resume(next);
        }
    }

    /// Run every stage for `repo_url`. The first failure aborts the run and
    /// is returned unchanged.
    pub async fn run(&self, repo_url: &str) -> Result<ImageInfo, PipelineError> {
        let result = self.run_stages(repo_url).await;
        match &result {
            Ok(info) => info!(repo = repo_url, image = %info.name(), size = %info.size(), layers = info.layers(), "pipeline finished"),
            Err(e) => warn!(repo = repo_url, error = %e, "pipeline failed"),
        }
        result
    }

    async fn run_stages(&self, repo_url: &str) -> Result<ImageInfo, PipelineError> {
        let checkout = self.repos.clone_repo(repo_url, self.progress.as_ref()).await?;
        self.step(
            format!("Cloned into {}", checkout.path().display()),
            "Resolving chart image ...",
        );

        let result = self.resolve_and_inspect(checkout.path()).await;
        checkout.release().await;
        result
    }

    async fn resolve_and_inspect(&self, repo_root: &Path) -> Result<ImageInfo, PipelineError> {
        let root = repo_root.to_path_buf();
        let image = tokio::task::spawn_blocking(move || {
            let candidates = chart::enumerate(&root)?;
            chart::resolve(&candidates)
        })
        .await
        .unwrap_or_else(|e| std::panic::resume_unwind(e.into_panic()))?;
        self.step(
            format!("Resolved image {image}"),
            format!("Inspecting {image} ..."),
        );

        Ok(self.inspector.inspect(&image).await?)
    }
}
