//! Git repository synchronization

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use git2::build::CheckoutBuilder;
use git2::{Oid, Repository};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::errors::DeployError;

static COMMIT_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A[0-9a-fA-F]{40}\z").expect("valid regex"));

const FETCH_REFSPECS: [&str; 2] = [
    "+refs/heads/*:refs/remotes/origin/*",
    "+refs/tags/*:refs/tags/*",
];

/// How the working copy was brought up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Existing copy fetched in place
    Fetched,
    /// No usable copy existed
    Cloned,
    /// Fetch failed, copy was wiped and cloned again
    Recloned,
}

/// Source synchronization seam
#[async_trait]
pub trait SourceSync: Send + Sync {
    /// Bring `dest` to `git_ref` of `url`; an empty ref keeps whatever the
    /// clone or fetch produced
    async fn sync(&self, url: &str, git_ref: &str, dest: &Path) -> Result<SyncOutcome, DeployError>;
}

/// libgit2-backed synchronizer
pub struct GitSync;

#[async_trait]
impl SourceSync for GitSync {
    async fn sync(&self, url: &str, git_ref: &str, dest: &Path) -> Result<SyncOutcome, DeployError> {
        let url = url.to_string();
        let git_ref = git_ref.to_string();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || sync_repository(&url, &git_ref, &dest)).await?
    }
}

/// Blocking clone-or-fetch followed by checkout
pub fn sync_repository(url: &str, git_ref: &str, dest: &Path) -> Result<SyncOutcome, DeployError> {
    if url.is_empty() {
        return Err(DeployError::validation("git url is required"));
    }
    if dest.as_os_str().is_empty() {
        return Err(DeployError::validation("dest dir is required"));
    }

    let mut outcome = SyncOutcome::Cloned;
    if let Ok(repo) = Repository::open(dest) {
        match fetch(&repo) {
            Ok(()) => {
                debug!("Fetched {} into {}", url, dest.display());
                checkout_ref(&repo, git_ref)?;
                return Ok(SyncOutcome::Fetched);
            }
            Err(e) => {
                warn!("Fetch in {} failed, cloning fresh: {}", dest.display(), e);
                outcome = SyncOutcome::Recloned;
            }
        }
    }

    match std::fs::remove_dir_all(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!("Cloning {} into {}", url, dest.display());
    let repo = Repository::clone(url, dest)?;
    checkout_ref(&repo, git_ref)?;
    Ok(outcome)
}

fn fetch(repo: &Repository) -> Result<(), git2::Error> {
    let mut remote = repo.find_remote("origin")?;
    remote.fetch(&FETCH_REFSPECS, None, None)
}

fn checkout_ref(repo: &Repository, git_ref: &str) -> Result<(), DeployError> {
    if git_ref.is_empty() {
        return Ok(());
    }
    let oid = resolve_ref(repo, git_ref)?;
    let commit = repo.find_commit(oid)?;

    // forced so files written by an earlier deploy never block the switch
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
    repo.set_head_detached(commit.id())?;

    debug!("Checked out {} at {}", git_ref, commit.id());
    Ok(())
}

/// Commit named by `git_ref`: full hash, then reference names, then revision
/// expressions, first match wins
fn resolve_ref(repo: &Repository, git_ref: &str) -> Result<Oid, DeployError> {
    if COMMIT_HASH.is_match(git_ref) {
        return Ok(Oid::from_str(git_ref)?);
    }

    let references = [
        git_ref.to_string(),
        format!("refs/remotes/origin/{git_ref}"),
        format!("refs/tags/{git_ref}"),
        format!("refs/heads/{git_ref}"),
    ];
    for name in &references {
        let Ok(reference) = repo.find_reference(name) else {
            continue;
        };
        if let Ok(commit) = reference.peel_to_commit() {
            return Ok(commit.id());
        }
    }

    let revisions = [
        git_ref.to_string(),
        format!("origin/{git_ref}"),
        format!("refs/remotes/origin/{git_ref}"),
        format!("refs/tags/{git_ref}"),
        format!("refs/heads/{git_ref}"),
    ];
    for rev in &revisions {
        let Ok(object) = repo.revparse_single(rev) else {
            continue;
        };
        if let Ok(commit) = object.peel_to_commit() {
            return Ok(commit.id());
        }
    }

    Err(DeployError::Sync(format!("unknown git_ref: {git_ref:?}")))
}

/// Remove a working copy; a missing directory is not an error
pub async fn remove_working_copy(dest: PathBuf) -> Result<(), DeployError> {
    match tokio::fs::remove_dir_all(&dest).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
