//! Version control collaborator
//!
//! The workflow executor asks the VCS which branch a project is on to decide
//! whether an existing context is stale. Strategies use it to discover the
//! work branch and the origin repository. [`Git2VcsService`] answers these
//! queries with git2 on the blocking thread pool.

use async_trait::async_trait;
use git2::{ErrorCode, Repository};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::workflow::Project;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("No git repository found at {path}")]
    RepositoryNotFound { path: PathBuf },
    #[error("HEAD of {path} is not on a branch")]
    DetachedHead { path: PathBuf },
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("Git task did not complete: {0}")]
    Blocking(String),
}

/// Queries a project's working tree.
#[async_trait]
pub trait VcsService: Send + Sync {
    /// Short name of the checked out branch
    async fn current_branch(&self, project: &Project) -> Result<String, VcsError>;

    /// URL of `remote`, or `None` when the remote is not configured
    async fn remote_url(&self, project: &Project, remote: &str) -> Result<Option<String>, VcsError>;
}

/// [`VcsService`] backed by git2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Git2VcsService;

impl Git2VcsService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VcsService for Git2VcsService {
    async fn current_branch(&self, project: &Project) -> Result<String, VcsError> {
        let path = project.path.clone();
        tokio::task::spawn_blocking(move || read_current_branch(&path))
            .await
            .map_err(|e| VcsError::Blocking(e.to_string()))?
    }

    async fn remote_url(&self, project: &Project, remote: &str) -> Result<Option<String>, VcsError> {
        let path = project.path.clone();
        let remote = remote.to_string();
        tokio::task::spawn_blocking(move || read_remote_url(&path, &remote))
            .await
            .map_err(|e| VcsError::Blocking(e.to_string()))?
    }
}

fn open_repository(path: &Path) -> Result<Repository, VcsError> {
    Repository::open(path).map_err(|e| match e.code() {
        ErrorCode::NotFound => VcsError::RepositoryNotFound {
            path: path.to_path_buf(),
        },
        _ => VcsError::Git(e),
    })
}

fn read_current_branch(path: &Path) -> Result<String, VcsError> {
    let repo = open_repository(path)?;
    let detached = || VcsError::DetachedHead {
        path: path.to_path_buf(),
    };

    let branch = match repo.head() {
        Ok(head) if head.is_branch() => head.shorthand().map(str::to_string).ok_or_else(detached),
        Ok(_) => Err(detached()),
        // A branch without commits yet: HEAD still names it symbolically
        Err(e) if e.code() == ErrorCode::UnbornBranch => {
            let head = repo.find_reference("HEAD")?;
            let name = head
                .symbolic_target()
                .and_then(|target| target.strip_prefix("refs/heads/"))
                .map(str::to_string);
            name.ok_or_else(detached)
        }
        Err(e) => Err(e.into()),
    };
    branch
}

fn read_remote_url(path: &Path, remote: &str) -> Result<Option<String>, VcsError> {
    let repo = open_repository(path)?;
    let remote = match repo.find_remote(remote) {
        Ok(remote) => remote,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(remote.url().map(str::to_string))
}

/// Repository coordinates taken from a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepository {
    pub host: String,
    pub owner: String,
    pub name: String,
}

/// Parse SSH (`git@host:owner/repo.git`, `ssh://git@host/owner/repo.git`) and
/// HTTPS (`https://host/owner/repo.git`) remote URLs.
pub fn parse_remote_url(url: &str) -> Option<RemoteRepository> {
    let url = url.trim();
    let (host, path) = if let Some(rest) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("ssh://"))
    {
        rest.split_once('/')?
    } else {
        // scp-like syntax
        url.split_once(':')?
    };

    // Drop user info and port
    let host = host.rsplit('@').next()?;
    let host = host.split(':').next()?;

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let mut parts = path.rsplitn(2, '/');
    let name = parts.next()?;
    let owner = parts.next()?;

    if host.is_empty() || owner.is_empty() || name.is_empty() {
        return None;
    }

    Some(RemoteRepository {
        host: host.to_string(),
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_ssh_url() {
        let repo = parse_remote_url("git@github.com:acme/widgets.git").unwrap();
        assert_eq!(repo.host, "github.com");
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widgets");
    }

    #[test]
    fn test_parse_https_url() {
        let repo = parse_remote_url("https://github.com/octo-org/release-tools").unwrap();
        assert_eq!(repo.owner, "octo-org");
        assert_eq!(repo.name, "release-tools");

        let repo = parse_remote_url("https://token@bitbucket.org/team/project.git/").unwrap();
        assert_eq!(repo.host, "bitbucket.org");
        assert_eq!(repo.owner, "team");
        assert_eq!(repo.name, "project");
    }

    #[test]
    fn test_parse_ssh_scheme_url_with_port() {
        let repo = parse_remote_url("ssh://git@gitlab.example.com:2222/group/sub/tool.git").unwrap();
        assert_eq!(repo.host, "gitlab.example.com");
        assert_eq!(repo.owner, "group/sub");
        assert_eq!(repo.name, "tool");
    }

    #[test]
    fn test_parse_rejects_local_paths() {
        assert_eq!(parse_remote_url("/srv/git/project.git"), None);
        assert_eq!(parse_remote_url("https://github.com/"), None);
    }

    #[tokio::test]
    async fn test_current_branch_of_unborn_branch() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        repo.set_head("refs/heads/feature-login").unwrap();

        let project = Project::from_path(dir.path());
        let branch = Git2VcsService::new().current_branch(&project).await.unwrap();
        assert_eq!(branch, "feature-login");
    }

    #[tokio::test]
    async fn test_remote_url_lookup() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        repo.remote("origin", "git@github.com:acme/widgets.git").unwrap();

        let project = Project::from_path(dir.path());
        let vcs = Git2VcsService::new();
        assert_eq!(
            vcs.remote_url(&project, "origin").await.unwrap().as_deref(),
            Some("git@github.com:acme/widgets.git")
        );
        assert_eq!(vcs.remote_url(&project, "upstream").await.unwrap(), None);
    }

    fn commit_readme(repo: &Repository) -> git2::Oid {
        let signature = git2::Signature::now("Test User", "test@example.com").unwrap();
        let tree_id = {
            let mut index = repo.index().unwrap();
            index.write_tree().unwrap()
        };
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &signature, &signature, "Initial commit", &tree, &[])
            .unwrap()
    }

    #[tokio::test]
    async fn test_current_branch_after_commit() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        repo.set_head("refs/heads/fix/typo").unwrap();
        commit_readme(&repo);

        let project = Project::from_path(dir.path());
        let branch = Git2VcsService::new().current_branch(&project).await.unwrap();
        assert_eq!(branch, "fix/typo");
    }

    #[tokio::test]
    async fn test_detached_head_is_an_error() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let commit = commit_readme(&repo);
        repo.set_head_detached(commit).unwrap();

        let project = Project::from_path(dir.path());
        let err = Git2VcsService::new().current_branch(&project).await.unwrap_err();
        assert!(matches!(err, VcsError::DetachedHead { .. }));
    }

    #[tokio::test]
    async fn test_missing_repository() {
        let dir = TempDir::new().unwrap();
        let project = Project::from_path(dir.path().join("nowhere"));
        let err = Git2VcsService::new().current_branch(&project).await.unwrap_err();
        assert!(matches!(err, VcsError::RepositoryNotFound { .. }));
    }
}
