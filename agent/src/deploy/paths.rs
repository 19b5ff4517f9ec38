//! Working directory resolution with traversal checks

use std::path::{Component, Path, PathBuf};

use crate::errors::DeployError;
use crate::models::Project;
use crate::storage::layout::{HostLayout, StorageLayout};

/// Join an untrusted relative path onto `base`, refusing anything that escapes it.
///
/// Purely lexical: nothing is read from the filesystem.
pub fn safe_join(base: &Path, rel: &str) -> Result<PathBuf, DeployError> {
    if base.as_os_str().is_empty() {
        return Err(DeployError::validation("base is required"));
    }

    let rel = rel.trim();
    if rel.is_empty() || rel == "." {
        return Ok(clean(base));
    }

    let normalized = rel.replace('\\', "/");
    if normalized.split('/').any(|part| part == "..") {
        return Err(DeployError::validation("invalid path: contains '..'"));
    }
    if normalized.starts_with('/') || has_volume_prefix(&normalized) {
        return Err(DeployError::validation("invalid path: must be relative"));
    }

    let base = clean(base);
    let joined = clean(&base.join(&normalized));
    if base != Path::new(".") && !joined.starts_with(&base) {
        return Err(DeployError::validation("invalid path: escapes base dir"));
    }
    Ok(joined)
}

/// Build and run root of a project inside the worker's filesystem
pub fn work_dir(layout: &StorageLayout, project: &Project) -> Result<PathBuf, DeployError> {
    let repo_dir = layout.repo_dir(&project.id);
    if project.repo_subdir.is_empty() {
        return Ok(repo_dir);
    }
    safe_join(&repo_dir, &project.repo_subdir)
}

/// Same root as seen by the container engine host, when the two differ
pub fn host_work_dir(
    host: Option<&HostLayout>,
    project: &Project,
) -> Result<Option<PathBuf>, DeployError> {
    let Some(host) = host else {
        return Ok(None);
    };
    let repo_dir = host.repo_dir(&project.id);
    if project.repo_subdir.is_empty() {
        return Ok(Some(repo_dir));
    }
    safe_join(&repo_dir, &project.repo_subdir).map(Some)
}

/// Lexical path cleaning: drops `.` segments, folds `..` into its parent
pub fn clean(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

fn has_volume_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
