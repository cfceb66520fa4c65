/// Git repository fixtures and workflow helpers shared by the integration tests
use anyhow::Result;
use git2::{Repository, Signature};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use contrib_workflow::workflow::RecordingEventSink;
use contrib_workflow::{
    Context, Git2VcsService, LocalGitWorkflow, Project, VcsService, WorkflowExecutor, LOCAL_HOSTING_SERVICE,
};

/// Throwaway repository with one commit on the requested branch
pub struct GitRepoFixture {
    dir: TempDir,
    repo: Repository,
}

impl GitRepoFixture {
    pub fn new(branch: &str) -> Result<Self> {
        let dir = TempDir::new()?;
        let repo = Repository::init(dir.path())?;
        repo.set_head(&format!("refs/heads/{branch}"))?;
        let fixture = Self { dir, repo };
        fixture.commit_file("README.md", "# widgets\n")?;
        Ok(fixture)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn project(&self) -> Project {
        Project::new("widgets", self.path())
    }

    pub fn commit_file(&self, name: &str, content: &str) -> Result<()> {
        std::fs::write(self.path().join(name), content)?;
        let mut index = self.repo.index()?;
        index.add_path(Path::new(name))?;
        index.write()?;
        let tree = self.repo.find_tree(index.write_tree()?)?;
        let signature = Signature::now("Test User", "test@example.com")?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<_> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &signature, &signature, &format!("Add {name}"), &tree, &parents)?;
        Ok(())
    }

    pub fn checkout_new_branch(&self, name: &str) -> Result<()> {
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo.branch(name, &head, false)?;
        self.repo.set_head(&format!("refs/heads/{name}"))?;
        Ok(())
    }

    pub fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        self.repo.remote(name, url)?;
        Ok(())
    }
}

/// Executor running [`LocalGitWorkflow`] against real repositories
pub fn local_executor() -> (WorkflowExecutor, Arc<RecordingEventSink>) {
    let vcs: Arc<dyn VcsService> = Arc::new(Git2VcsService::new());
    let sink = Arc::new(RecordingEventSink::new());
    let executor = WorkflowExecutor::builder(vcs.clone(), sink.clone())
        .strategy(LOCAL_HOSTING_SERVICE, Arc::new(LocalGitWorkflow::new(vcs, "origin", "main")))
        .build();
    (executor, sink)
}

/// Wait until no step of the context's chain is in flight
pub async fn settle(executor: &WorkflowExecutor, context: &Context) {
    let project = context.project_name().to_string();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let busy = executor
                .registry()
                .chain_executor(&project)
                .is_some_and(|chain| chain.current_step().is_some());
            if !busy {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("workflow chain did not settle");
}
