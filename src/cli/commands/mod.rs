use anyhow::{anyhow, bail, Context as _, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use contrib_workflow::workflow::BroadcastEventSink;
use contrib_workflow::{
    Context, ContribConfig, Git2VcsService, LocalGitWorkflow, Project, VcsService, WorkflowEvent, WorkflowExecutor,
    LOCAL_HOSTING_SERVICE,
};

pub mod config;
pub mod inspect;
pub mod prepare;

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Executor wired with the git-backed strategies, plus a receiver for its events.
///
/// The receiver is subscribed before any chain starts so no failure is missed.
pub fn build_executor(config: &ContribConfig) -> (WorkflowExecutor, broadcast::Receiver<WorkflowEvent>) {
    let vcs: Arc<dyn VcsService> = Arc::new(Git2VcsService::new());
    let events = Arc::new(BroadcastEventSink::new(config.workflow.event_channel_capacity));
    let receiver = events.subscribe();

    let executor = WorkflowExecutor::builder(vcs.clone(), events)
        .strategy(LOCAL_HOSTING_SERVICE, Arc::new(LocalGitWorkflow::from_config(vcs, config)))
        .build();
    (executor, receiver)
}

pub fn resolve_project(path: &Path) -> Result<Project> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Cannot resolve project path {}", path.display()))?;
    Ok(Project::from_path(path))
}

/// Wait until the chain running for `context` has no step in flight.
///
/// Fails with the collected step failure messages when a step failed, or when
/// the context was invalidated along the way.
pub async fn wait_until_settled(
    executor: &WorkflowExecutor,
    context: &Context,
    events: &mut broadcast::Receiver<WorkflowEvent>,
    timeout: Duration,
) -> Result<()> {
    let project = context.project_name().to_string();
    let settled = || match executor.registry().chain_executor(&project) {
        Some(chain) => chain.current_step().is_none(),
        None => true,
    };

    tokio::time::timeout(timeout, async {
        while !settled() {
            tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
        }
    })
    .await
    .map_err(|_| anyhow!("Workflow for {project} did not settle within {}s", timeout.as_secs()))?;

    let mut failures = Vec::new();
    loop {
        match events.try_recv() {
            Ok(WorkflowEvent::StepFailed {
                context: failed,
                step,
                message,
            }) if failed.ptr_eq(context) => {
                debug!(step = %step, "Collected step failure");
                failures.push(message);
            }
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "Workflow event receiver lagged"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    if !failures.is_empty() {
        bail!("{}", failures.join("\n"));
    }
    let tracked = executor.context(&project).is_some_and(|current| current.ptr_eq(context));
    if !tracked {
        bail!("Workflow context for {project} was invalidated");
    }
    Ok(())
}

/// Initialize the workflow for the project at `path` and wait for the init chain.
pub async fn init_project(
    executor: &WorkflowExecutor,
    events: &mut broadcast::Receiver<WorkflowEvent>,
    config: &ContribConfig,
    hosting_service: Option<&str>,
    path: &Path,
) -> Result<Context> {
    let project = resolve_project(path)?;
    let hosting_service = hosting_service.unwrap_or(config.workflow.default_hosting_service.as_str());
    let context = executor.init(hosting_service, project).await?;
    wait_until_settled(
        executor,
        &context,
        events,
        Duration::from_secs(config.workflow.settle_timeout_seconds),
    )
    .await?;
    Ok(context)
}
