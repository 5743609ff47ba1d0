use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use super::{parse_inspect_output, ImageInfo, InspectError};
use crate::chart::ImageReference;
use crate::exec;
use crate::progress::Spinner;

/// Reads image metadata via the container runtime CLI (`docker`/`podman`),
/// pulling the image first when it is not available locally.
pub struct RuntimeInspector {
    cmd: PathBuf,
    timeout: Duration,
    progress: Option<Spinner>,
}

impl RuntimeInspector {
    pub fn new(cmd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            cmd: cmd.into(),
            timeout,
            progress: None,
        }
    }

    /// Attach a spinner for status updates.
    pub fn set_progress(&mut self, spinner: Spinner) {
        self.progress = Some(spinner);
    }

    fn runtime_name(&self) -> String {
        self.cmd.display().to_string()
    }

    /// `images -q` prints the image id when the image exists locally.
    /// A failed query is treated the same as an absent image.
    async fn is_present(&self, image: &str) -> bool {
        let mut cmd = exec::command(&self.cmd);
        cmd.args(["images", "-q", image]);

        match exec::output(&mut cmd, self.timeout).await {
            Ok(out) if out.status.success() => !String::from_utf8_lossy(&out.stdout).trim().is_empty(),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                warn!(image, error = %stderr.trim(), "image presence query failed");
                false
            }
            Err(e) => {
                warn!(image, error = %e, "image presence query failed");
                false
            }
        }
    }

    /// Pull with the runtime's own progress output on the console.
    async fn pull(&self, image: &str) -> Result<(), InspectError> {
        info!(image, "pulling image");
        if let Some(spinner) = &self.progress {
            spinner.suspend();
        }

        let mut cmd = exec::command(&self.cmd);
        cmd.args(["pull", image]);
        let status = exec::status(&mut cmd, self.timeout)
            .await
            .map_err(|e| InspectError::Pull {
                image: image.to_string(),
                message: e.to_string(),
            })?;

        if let Some(spinner) = &self.progress {
            spinner.resume(format!("Inspecting {image} ..."));
        }

        if !status.success() {
            return Err(InspectError::Pull {
                image: image.to_string(),
                message: format!("'{} pull' exited with {status}", self.runtime_name()),
            });
        }
        Ok(())
    }

    async fn query(&self, image: &str) -> Result<String, InspectError> {
        let query_failed = |message: String| InspectError::Query {
            image: image.to_string(),
            message,
        };

        let mut cmd = exec::command(&self.cmd);
        cmd.args(["image", "inspect", image]);
        let out = exec::output(&mut cmd, self.timeout)
            .await
            .map_err(|e| query_failed(e.to_string()))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(query_failed(format!(
                "'{} image inspect' failed: {}",
                self.runtime_name(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    /// Make sure `image` is available locally, then read its size and layer count.
    pub async fn inspect(&self, image: &ImageReference) -> Result<ImageInfo, InspectError> {
        let name = image.to_string();

        if self.is_present(&name).await {
            info!(image = %name, "image already exists locally");
        } else {
            self.pull(&name).await?;
        }

        let json = self.query(&name).await?;
        let record = parse_inspect_output(&json)?;
        let info = ImageInfo::new(name, &record);

        info!(image = %info.name(), size = %info.size(), layers = info.layers(), "inspected image");
        Ok(info)
    }
}
