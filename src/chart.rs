//! Helm chart discovery and image reference resolution.
//!
//! A repository checkout keeps its charts under `charts/<name>/`. Each chart
//! declares its application version in `Chart.yaml` and its default image in
//! `values.yaml`; the two are combined into a single `repository:tag`.

use std::fmt;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::value::{MapAccessDeserializer, SeqAccessDeserializer};
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};

pub const CHARTS_DIR: &str = "charts";
pub const CHART_FILE: &str = "Chart.yaml";
pub const VALUES_FILE: &str = "values.yaml";

#[derive(thiserror::Error, Debug)]
pub enum ChartError {
    #[error("failed to read charts directory {}: {source}", .path.display())]
    ChartsDirUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no valid Helm chart found")]
    NoValidChart,
}

/// A directory believed to hold a chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartCandidate {
    pub path: PathBuf,
}

impl ChartCandidate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// A resolved `<repository>:<tag>` image reference. The repository is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    repository: String,
    tag: String,
}

impl ImageReference {
    /// Returns `None` when `repository` is empty.
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Option<Self> {
        let repository = repository.into();
        if repository.is_empty() {
            return None;
        }
        Some(Self {
            repository,
            tag: tag.into(),
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// The subset of Chart.yaml the resolver reads.
#[derive(Debug, Default, Deserialize)]
struct ChartDocument {
    #[serde(rename = "appVersion", default)]
    app_version: Option<String>,
}

/// The subset of values.yaml the resolver reads.
#[derive(Debug, Default, Deserialize)]
struct ValuesDocument {
    #[serde(default)]
    image: Option<ImageValues>,
    #[serde(rename = "<<", default)]
    merge: Option<MergeSources<ValuesDocument>>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageValues {
    #[serde(default)]
    repository: Option<String>,
    #[serde(default)]
    tag: Option<String>,
    #[serde(rename = "<<", default)]
    merge: Option<MergeSources<ImageValues>>,
}

/// The target of a YAML merge key: one mapping or a list of mappings.
/// Keys set directly on the merging mapping win, then earlier sources.
#[derive(Debug)]
struct MergeSources<T>(Vec<T>);

impl<'de, T: Deserialize<'de>> Deserialize<'de> for MergeSources<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SourcesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for SourcesVisitor<T> {
            type Value = MergeSources<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping or a list of mappings")
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
                T::deserialize(MapAccessDeserializer::new(map)).map(|one| MergeSources(vec![one]))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Self::Value, A::Error> {
                Vec::<T>::deserialize(SeqAccessDeserializer::new(seq)).map(MergeSources)
            }
        }

        deserializer.deserialize_any(SourcesVisitor(PhantomData))
    }
}

impl ValuesDocument {
    /// The `image` mapping after merge keys are applied at both levels.
    fn into_image(self) -> ImageValues {
        let image = self.image.or_else(|| {
            self.merge
                .into_iter()
                .flat_map(|sources| sources.0)
                .find_map(|source| source.into_image().into_option())
        });
        image.map(ImageValues::merged).unwrap_or_default()
    }
}

impl ImageValues {
    fn merged(self) -> Self {
        let mut out = Self {
            repository: self.repository,
            tag: self.tag,
            merge: None,
        };
        for source in self.merge.into_iter().flat_map(|sources| sources.0) {
            let source = source.merged();
            out.repository = out.repository.or(source.repository);
            out.tag = out.tag.or(source.tag);
        }
        out
    }

    fn into_option(self) -> Option<Self> {
        if self.repository.is_none() && self.tag.is_none() && self.merge.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

/// Parse the first YAML document, falling back to an empty one on malformed
/// content. Scalars are read as their literal text, so `tag: 1.10` stays `1.10`.
fn parse_lenient<T>(path: &Path, contents: &str) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    let Some(document) = serde_yaml::Deserializer::from_str(contents).next() else {
        return T::default();
    };
    match T::deserialize(document) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed YAML");
            T::default()
        }
    }
}

/// List the chart directories under `<repo_root>/charts`, sorted by name.
///
/// A missing `charts` directory is not an error: the result is simply empty.
pub fn enumerate(repo_root: &Path) -> Result<Vec<ChartCandidate>, ChartError> {
    let charts_dir = repo_root.join(CHARTS_DIR);
    let unreadable = |source| ChartError::ChartsDirUnreadable {
        path: charts_dir.clone(),
        source,
    };

    match fs::metadata(&charts_dir) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            warn!(path = %charts_dir.display(), "'charts' is not a directory");
            return Ok(Vec::new());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(repo = %repo_root.display(), "no 'charts' directory found");
            return Ok(Vec::new());
        }
        Err(e) => return Err(unreadable(e)),
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(&charts_dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        if entry.file_type().map_err(unreadable)?.is_dir() {
            entries.push(entry.path());
        }
    }
    entries.sort();

    Ok(entries
        .into_iter()
        .inspect(|path| debug!(path = %path.display(), "found chart directory"))
        .map(ChartCandidate::new)
        .collect())
}

/// Whether `path` exists. Errors other than "not found" count as present so
/// that the subsequent read reports them.
fn exists(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(_) => true,
        Err(e) => e.kind() != io::ErrorKind::NotFound,
    }
}

fn read(path: &Path) -> Result<String, ChartError> {
    fs::read_to_string(path).map_err(|source| ChartError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve a single candidate. `Ok(None)` means the candidate is skipped.
fn resolve_candidate(candidate: &ChartCandidate) -> Result<Option<ImageReference>, ChartError> {
    let chart_path = candidate.path.join(CHART_FILE);
    let values_path = candidate.path.join(VALUES_FILE);

    for required in [&chart_path, &values_path] {
        if !exists(required) {
            warn!(chart = %candidate.path.display(), file = %required.display(), "missing chart file, skipping");
            return Ok(None);
        }
    }

    let chart: ChartDocument = parse_lenient(&chart_path, &read(&chart_path)?);
    let values: ValuesDocument = parse_lenient(&values_path, &read(&values_path)?);

    let ImageValues { repository, tag, .. } = values.into_image();
    let tag = tag
        .filter(|t| !t.is_empty())
        .or(chart.app_version)
        .unwrap_or_default();

    let reference = ImageReference::new(repository.unwrap_or_default(), tag);
    if reference.is_none() {
        warn!(chart = %candidate.path.display(), "no image repository in values.yaml, skipping");
    }
    Ok(reference)
}

/// Return the image reference of the first candidate that yields one.
///
/// Candidates missing either chart file, or whose values declare no image
/// repository, are skipped. Read failures on files that exist are returned.
pub fn resolve(candidates: &[ChartCandidate]) -> Result<ImageReference, ChartError> {
    for candidate in candidates {
        debug!(chart = %candidate.path.display(), "checking chart");
        if let Some(reference) = resolve_candidate(candidate)? {
            info!(
                repository = reference.repository(),
                tag = reference.tag(),
                chart = %candidate.path.display(),
                "resolved image"
            );
            return Ok(reference);
        }
    }
    Err(ChartError::NoValidChart)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_log::test;

    type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

    fn write_chart(root: &Path, name: &str, chart: Option<&str>, values: Option<&str>) -> PathBuf {
        let dir = root.join(CHARTS_DIR).join(name);
        fs::create_dir_all(&dir).unwrap();
        if let Some(chart) = chart {
            fs::write(dir.join(CHART_FILE), chart).unwrap();
        }
        if let Some(values) = values {
            fs::write(dir.join(VALUES_FILE), values).unwrap();
        }
        dir
    }

    #[test]
    fn test_enumerate_without_charts_dir_is_empty() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(CHART_FILE), "appVersion: 1.0.0")?;

        assert!(enumerate(temp_dir.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_enumerate_charts_file_is_empty() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(CHARTS_DIR), "not a directory")?;

        assert!(enumerate(temp_dir.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_enumerate_lists_only_directories() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_chart(temp_dir.path(), "web", None, None);
        write_chart(temp_dir.path(), "api", None, None);
        fs::write(temp_dir.path().join(CHARTS_DIR).join("README.md"), "# charts")?;

        let candidates = enumerate(temp_dir.path())?;
        let charts = temp_dir.path().join(CHARTS_DIR);
        assert_eq!(
            candidates,
            vec![
                ChartCandidate::new(charts.join("api")),
                ChartCandidate::new(charts.join("web")),
            ]
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_enumerate_unreadable_charts_dir_fails() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new()?;
        write_chart(temp_dir.path(), "api", None, None);
        let charts = temp_dir.path().join(CHARTS_DIR);
        fs::set_permissions(&charts, fs::Permissions::from_mode(0o000))?;

        // root ignores permission bits
        let readable = fs::read_dir(&charts).is_ok();
        let result = enumerate(temp_dir.path());
        fs::set_permissions(&charts, fs::Permissions::from_mode(0o755))?;

        if !readable {
            assert!(matches!(result, Err(ChartError::ChartsDirUnreadable { .. })));
        }
        Ok(())
    }

    #[test]
    fn test_resolve_empty_candidates_is_not_found() {
        let result = resolve(&[]);
        assert!(matches!(result, Err(ChartError::NoValidChart)));
    }

    #[test]
    fn test_resolve_falls_back_to_app_version() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_chart(
            temp_dir.path(),
            "api",
            Some("apiVersion: v2\nname: api\nversion: 0.1.0\nappVersion: 1.2.0\n"),
            Some("image:\n  repository: example/api\n  tag: \"\"\n"),
        );

        let reference = resolve(&enumerate(temp_dir.path())?)?;
        assert_eq!(reference.to_string(), "example/api:1.2.0");
        Ok(())
    }

    #[test]
    fn test_resolve_prefers_explicit_tag() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_chart(
            temp_dir.path(),
            "api",
            Some("appVersion: 1.2.0\n"),
            Some("image:\n  repository: example/api\n  tag: v9\n"),
        );

        let reference = resolve(&enumerate(temp_dir.path())?)?;
        assert_eq!(reference.repository(), "example/api");
        assert_eq!(reference.tag(), "v9");
        Ok(())
    }

    #[test]
    fn test_resolve_skips_chart_missing_values() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_chart(temp_dir.path(), "api", Some("appVersion: 1.2.0\n"), None);
        write_chart(
            temp_dir.path(),
            "web",
            Some("appVersion: 2.0.0\n"),
            Some("image:\n  repository: example/web\n  tag: v3\n"),
        );

        let reference = resolve(&enumerate(temp_dir.path())?)?;
        assert_eq!(reference.to_string(), "example/web:v3");
        Ok(())
    }

    #[test]
    fn test_resolve_without_required_files_is_not_found() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_chart(temp_dir.path(), "api", Some("appVersion: 1.2.0\n"), None);
        write_chart(temp_dir.path(), "web", None, Some("image:\n  repository: example/web\n"));

        let result = resolve(&enumerate(temp_dir.path())?);
        assert!(matches!(result, Err(ChartError::NoValidChart)));
        Ok(())
    }

    #[test]
    fn test_resolve_first_match_wins() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let first = write_chart(
            temp_dir.path(),
            "zeta",
            Some("appVersion: 1.0.0\n"),
            Some("image:\n  repository: example/zeta\n"),
        );
        let second = write_chart(
            temp_dir.path(),
            "alpha",
            Some("appVersion: 2.0.0\n"),
            Some("image:\n  repository: example/alpha\n"),
        );

        let candidates = vec![ChartCandidate::new(first), ChartCandidate::new(second)];
        for _ in 0..3 {
            assert_eq!(resolve(&candidates)?.to_string(), "example/zeta:1.0.0");
        }
        Ok(())
    }

    #[test]
    fn test_resolve_skips_empty_repository() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_chart(
            temp_dir.path(),
            "a-library",
            Some("appVersion: 1.0.0\n"),
            Some("replicaCount: 2\n"),
        );
        write_chart(
            temp_dir.path(),
            "b-app",
            Some("appVersion: 3.1.4\n"),
            Some("image:\n  repository: example/app\n"),
        );

        let reference = resolve(&enumerate(temp_dir.path())?)?;
        assert_eq!(reference.to_string(), "example/app:3.1.4");
        Ok(())
    }

    #[test]
    fn test_resolve_treats_malformed_yaml_as_absent() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_chart(
            temp_dir.path(),
            "broken",
            Some("appVersion: 1.0.0\n"),
            Some("image: [unterminated\n"),
        );
        write_chart(
            temp_dir.path(),
            "good",
            Some("invalid: yaml: content: ["),
            Some("image:\n  repository: example/good\n  tag: stable\n"),
        );

        let reference = resolve(&enumerate(temp_dir.path())?)?;
        assert_eq!(reference.to_string(), "example/good:stable");
        Ok(())
    }

    #[test]
    fn test_resolve_accepts_numeric_versions() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_chart(
            temp_dir.path(),
            "api",
            Some("appVersion: 7\n"),
            Some("image:\n  repository: example/api\n  tag:\n"),
        );

        let reference = resolve(&enumerate(temp_dir.path())?)?;
        assert_eq!(reference.to_string(), "example/api:7");
        Ok(())
    }

    #[test]
    fn test_resolve_keeps_float_like_tag_text() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_chart(
            temp_dir.path(),
            "api",
            Some("appVersion: 1.0.0\n"),
            Some("image:\n  repository: example/api\n  tag: 1.10\n"),
        );
        let candidates = enumerate(temp_dir.path())?;
        assert_eq!(resolve(&candidates)?.to_string(), "example/api:1.10");

        let temp_dir = TempDir::new()?;
        write_chart(
            temp_dir.path(),
            "api",
            Some("appVersion: 2.10\n"),
            Some("image:\n  repository: example/api\n"),
        );
        let candidates = enumerate(temp_dir.path())?;
        assert_eq!(resolve(&candidates)?.to_string(), "example/api:2.10");
        Ok(())
    }

    #[test]
    fn test_resolve_applies_merge_keys() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_chart(
            temp_dir.path(),
            "api",
            Some("appVersion: 1.0.0\n"),
            Some(
                "defaults: &img\n  repository: example/api\n  tag: v1\n\
                 image:\n  <<: *img\n  tag: v2\n",
            ),
        );

        let reference = resolve(&enumerate(temp_dir.path())?)?;
        assert_eq!(reference.to_string(), "example/api:v2");
        Ok(())
    }

    #[test]
    fn test_resolve_applies_top_level_merge_list() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_chart(
            temp_dir.path(),
            "api",
            Some("appVersion: 0.10\n"),
            Some(
                "base: &base\n  image:\n    repository: example/base\n\
                 other: &other\n  replicaCount: 2\n\
                 <<: [*other, *base]\n",
            ),
        );

        let reference = resolve(&enumerate(temp_dir.path())?)?;
        assert_eq!(reference.to_string(), "example/base:0.10");
        Ok(())
    }

    #[test]
    fn test_resolve_reads_first_document_only() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_chart(
            temp_dir.path(),
            "api",
            Some("appVersion: 1.2.0\n---\n"),
            Some("image:\n  repository: example/api\n---\nimage:\n  repository: example/other\n"),
        );

        let reference = resolve(&enumerate(temp_dir.path())?)?;
        assert_eq!(reference.to_string(), "example/api:1.2.0");
        Ok(())
    }

    #[test]
    fn test_resolve_propagates_read_errors() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = write_chart(temp_dir.path(), "api", Some("appVersion: 1.0.0\n"), None);
        // A directory where the values file should be exists but cannot be read.
        fs::create_dir(dir.join(VALUES_FILE))?;

        let result = resolve(&enumerate(temp_dir.path())?);
        assert!(matches!(result, Err(ChartError::FileRead { .. })));
        Ok(())
    }

    #[test]
    fn test_image_reference_requires_repository() {
        assert!(ImageReference::new("", "1.0").is_none());
        let reference = ImageReference::new("nginx", "1.27").unwrap();
        assert_eq!(reference.to_string(), "nginx:1.27");
    }
}
