pub mod runtime;

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum InspectError {
    #[error("failed to pull image {image}: {message}")]
    Pull { image: String, message: String },

    #[error("failed to inspect image {image}: {message}")]
    Query { image: String, message: String },

    #[error("failed to parse inspect data")]
    Unparseable,

    #[error("malformed inspection metadata: {0}")]
    Malformed(serde_json::Error),
}

/// Size and layer count of a resolved image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageInfo {
    name: String,
    size: String,
    layers: usize,
}

impl ImageInfo {
    pub fn new(name: impl Into<String>, record: &InspectRecord) -> Self {
        Self {
            name: name.into(),
            size: format_size(record.size),
            layers: record.rootfs.layers.len(),
        }
    }

    /// The image reference this info describes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decimal megabytes with two decimals, e.g. `1.50 MB`.
    pub fn size(&self) -> &str {
        &self.size
    }

    pub fn layers(&self) -> usize {
        self.layers
    }
}

// --- `image inspect` JSON output ---

/// The fields of one `image inspect` record that we consume.
#[derive(Debug, Deserialize)]
pub struct InspectRecord {
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "RootFS")]
    pub rootfs: InspectRootFS,
}

#[derive(Debug, Deserialize)]
pub struct InspectRootFS {
    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
}

/// Parse `image inspect` output: a JSON array whose first record describes the image.
pub fn parse_inspect_output(json: &str) -> Result<InspectRecord, InspectError> {
    let records: Vec<serde_json::Value> =
        serde_json::from_str(json.trim()).map_err(|_| InspectError::Unparseable)?;
    let first = records.into_iter().next().ok_or(InspectError::Unparseable)?;
    serde_json::from_value(first).map_err(InspectError::Malformed)
}

pub fn format_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1_000_000.0)
}
