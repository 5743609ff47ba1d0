use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::Serialize;

/// Container runtimes whose CLI speaks `images -q`, `pull` and `image inspect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Docker,
    Podman,
}

impl RuntimeKind {
    const ALL: [RuntimeKind; 2] = [RuntimeKind::Docker, RuntimeKind::Podman];

    pub fn binary_name(self) -> &'static str {
        match self {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Podman => "podman",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.binary_name() == name)
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeInfo {
    pub kind: RuntimeKind,
    pub binary_path: PathBuf,
}

/// Every supported runtime found on `PATH`, docker first.
pub fn detect() -> Vec<RuntimeInfo> {
    RuntimeKind::ALL
        .into_iter()
        .filter_map(|kind| {
            find_on_path(kind.binary_name()).map(|binary_path| RuntimeInfo { kind, binary_path })
        })
        .collect()
}

/// Pick the runtime to use. `preferred` is either a runtime name or a path to
/// a runtime binary; without it the first detected runtime wins.
pub fn select(preferred: Option<&str>) -> Result<RuntimeInfo> {
    let Some(preferred) = preferred else {
        return match detect().into_iter().next() {
            Some(rt) => Ok(rt),
            None => bail!("No container runtime detected. Install Docker or Podman."),
        };
    };

    if let Some(kind) = RuntimeKind::from_name(preferred) {
        return match find_on_path(kind.binary_name()) {
            Some(binary_path) => Ok(RuntimeInfo { kind, binary_path }),
            None => bail!("Runtime '{preferred}' was requested but is not on PATH"),
        };
    }

    let path = Path::new(preferred);
    if !is_executable(path) {
        bail!("Unknown runtime '{preferred}' (expected docker, podman, or a path to one)");
    }
    let kind = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(RuntimeKind::from_name)
        .unwrap_or(RuntimeKind::Docker);
    Ok(RuntimeInfo {
        kind,
        binary_path: path.to_path_buf(),
    })
}

fn find_on_path(binary: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_select_explicit_binary_path() {
        let temp_dir = TempDir::new().unwrap();
        let bin = temp_dir.path().join("podman");
        fs::write(&bin, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();

        let rt = select(Some(bin.to_str().unwrap())).unwrap();
        assert_eq!(rt.kind, RuntimeKind::Podman);
        assert_eq!(rt.binary_path, bin);
    }

    #[test]
    fn test_select_rejects_unknown_runtime() {
        let err = select(Some("containerd-nope")).unwrap_err();
        assert!(err.to_string().contains("Unknown runtime"));
    }

    #[test]
    fn test_non_executable_file_is_not_a_runtime() {
        let temp_dir = TempDir::new().unwrap();
        let bin = temp_dir.path().join("docker");
        fs::write(&bin, "").unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o644)).unwrap();

        assert!(!is_executable(&bin));
    }
}
