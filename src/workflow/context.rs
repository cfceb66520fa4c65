// Per-project workflow context - the mutable state every step reads and writes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::{EventSink, WorkflowEvent};
use super::status::WorkflowStatus;

/// The entity a workflow is tracked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Stable key under which the executor tracks the project
    pub name: String,
    /// Working tree location
    pub path: PathBuf,
}

impl Project {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Derive the project name from the last path component.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self::new(name, path)
    }
}

/// Context fields that raise a [`WorkflowEvent::ContextPropertyChanged`] when they change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextProperty {
    OriginRepositoryOwner,
    OriginRepositoryName,
    UpstreamRepositoryOwner,
    UpstreamRepositoryName,
    ForkedRepositoryName,
    WorkBranchName,
    ContributeToBranchName,
    HostUserLogin,
    PullRequestIssueNumber,
    PullRequestId,
    ForkReady,
}

/// User supplied settings for the contribution being prepared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub contribution_branch_name: Option<String>,
    pub contribution_title: Option<String>,
    pub contribution_comment: Option<String>,
}

impl Configuration {
    pub fn with_branch_name(mut self, branch: impl Into<String>) -> Self {
        self.contribution_branch_name = Some(branch.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.contribution_title = Some(title.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.contribution_comment = Some(comment.into());
        self
    }
}

/// A progress stage shown to the user. `done` is `None` until the stage settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub done: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
    pub is_error: bool,
}

/// Presentation state kept alongside the workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    stages: Vec<Stage>,
    current_stage: usize,
    status_message: Option<StatusMessage>,
    pub contribution_title: Option<String>,
    pub contribution_comment: Option<String>,
}

impl ViewState {
    /// Replace the stage list; every stage starts unsettled.
    pub fn set_stages<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stages = names
            .into_iter()
            .map(|name| Stage {
                name: name.into(),
                done: None,
            })
            .collect();
        self.current_stage = 0;
    }

    /// Settle the current stage and move the cursor to the next one.
    pub fn set_stage_done(&mut self, done: bool) {
        if let Some(stage) = self.stages.get_mut(self.current_stage) {
            stage.done = Some(done);
            self.current_stage += 1;
        }
    }

    /// Unsettle every stage and rewind the cursor.
    pub fn reset_stages(&mut self) {
        for stage in &mut self.stages {
            stage.done = None;
        }
        self.current_stage = 0;
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn current_stage(&self) -> usize {
        self.current_stage
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|stage| stage.name.clone()).collect()
    }

    pub fn stage_values(&self) -> Vec<Option<bool>> {
        self.stages.iter().map(|stage| stage.done).collect()
    }

    pub fn status_message(&self) -> Option<&StatusMessage> {
        self.status_message.as_ref()
    }

    pub fn set_status_message(&mut self, message: Option<String>, is_error: bool) {
        self.status_message = message.map(|message| StatusMessage { message, is_error });
    }
}

#[derive(Debug, Clone)]
struct ContextState {
    status: WorkflowStatus,
    previous_status: Option<WorkflowStatus>,
    origin_repository_owner: Option<String>,
    origin_repository_name: Option<String>,
    upstream_repository_owner: Option<String>,
    upstream_repository_name: Option<String>,
    forked_repository_name: Option<String>,
    work_branch_name: Option<String>,
    contribute_to_branch_name: Option<String>,
    host_user_login: Option<String>,
    pull_request_issue_number: Option<u64>,
    pull_request_id: Option<String>,
    fork_ready: bool,
    configuration: Configuration,
    view_state: ViewState,
}

struct ContextInner {
    project: Project,
    hosting_service: String,
    created_at: DateTime<Utc>,
    state: Mutex<ContextState>,
    branch_decisions: Mutex<HashMap<Uuid, bool>>,
    events: Arc<dyn EventSink>,
}

/// Shared handle to the workflow state of one project.
///
/// Clones refer to the same state. Locks are never held while events are
/// published or caller closures run, so both may read the context freely.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

/// Serializable copy of a context at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    pub project: Project,
    pub hosting_service: String,
    pub created_at: DateTime<Utc>,
    pub status: WorkflowStatus,
    pub previous_status: Option<WorkflowStatus>,
    pub origin_repository_owner: Option<String>,
    pub origin_repository_name: Option<String>,
    pub upstream_repository_owner: Option<String>,
    pub upstream_repository_name: Option<String>,
    pub forked_repository_name: Option<String>,
    pub work_branch_name: Option<String>,
    pub contribute_to_branch_name: Option<String>,
    pub host_user_login: Option<String>,
    pub pull_request_issue_number: Option<u64>,
    pub pull_request_id: Option<String>,
    pub fork_ready: bool,
    pub configuration: Configuration,
    pub view_state: ViewState,
}

trait PropertyValue: PartialEq + Clone {
    fn render(&self) -> Option<String>;
}

impl PropertyValue for Option<String> {
    fn render(&self) -> Option<String> {
        self.clone()
    }
}

impl PropertyValue for Option<u64> {
    fn render(&self) -> Option<String> {
        self.map(|value| value.to_string())
    }
}

impl PropertyValue for bool {
    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl Context {
    /// New context in the `Initializing` status.
    pub fn new(
        project: Project,
        hosting_service: impl Into<String>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                project,
                hosting_service: hosting_service.into(),
                created_at: Utc::now(),
                state: Mutex::new(ContextState {
                    status: WorkflowStatus::Initializing,
                    previous_status: None,
                    origin_repository_owner: None,
                    origin_repository_name: None,
                    upstream_repository_owner: None,
                    upstream_repository_name: None,
                    forked_repository_name: None,
                    work_branch_name: None,
                    contribute_to_branch_name: None,
                    host_user_login: None,
                    pull_request_issue_number: None,
                    pull_request_id: None,
                    fork_ready: false,
                    configuration: Configuration::default(),
                    view_state: ViewState::default(),
                }),
                branch_decisions: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ContextState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles point at the same context.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn project(&self) -> &Project {
        &self.inner.project
    }

    pub fn project_name(&self) -> &str {
        &self.inner.project.name
    }

    /// Key of the hosting service whose strategy drives this workflow
    pub fn hosting_service(&self) -> &str {
        &self.inner.hosting_service
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn status(&self) -> WorkflowStatus {
        self.state().status
    }

    pub fn previous_status(&self) -> Option<WorkflowStatus> {
        self.state().previous_status
    }

    /// Reassign the status, remembering the current one as the previous status.
    pub fn set_status(&self, status: WorkflowStatus) {
        let previous = {
            let mut state = self.state();
            let previous = state.status;
            state.previous_status = Some(previous);
            state.status = status;
            previous
        };

        if previous != status && !previous.can_transition_to(status) {
            warn!(
                project = %self.project_name(),
                from = %previous,
                to = %status,
                "Undocumented workflow status transition"
            );
        } else {
            debug!(project = %self.project_name(), from = %previous, to = %status, "Workflow status changed");
        }
    }

    pub fn is_update_mode(&self) -> bool {
        self.status().is_update_mode()
    }

    fn update<T, F>(&self, property: ContextProperty, value: T, field: F)
    where
        T: PropertyValue,
        F: FnOnce(&mut ContextState) -> &mut T,
    {
        let old = {
            let mut state = self.state();
            let slot = field(&mut *state);
            if *slot == value {
                return;
            }
            std::mem::replace(slot, value.clone())
        };

        self.inner.events.publish(WorkflowEvent::ContextPropertyChanged {
            context: self.clone(),
            property,
            old: old.render(),
            new: value.render(),
        });
    }

    pub fn origin_repository_owner(&self) -> Option<String> {
        self.state().origin_repository_owner.clone()
    }

    pub fn set_origin_repository_owner(&self, owner: Option<String>) {
        self.update(ContextProperty::OriginRepositoryOwner, owner, |s| {
            &mut s.origin_repository_owner
        });
    }

    pub fn origin_repository_name(&self) -> Option<String> {
        self.state().origin_repository_name.clone()
    }

    pub fn set_origin_repository_name(&self, name: Option<String>) {
        self.update(ContextProperty::OriginRepositoryName, name, |s| {
            &mut s.origin_repository_name
        });
    }

    pub fn upstream_repository_owner(&self) -> Option<String> {
        self.state().upstream_repository_owner.clone()
    }

    pub fn set_upstream_repository_owner(&self, owner: Option<String>) {
        self.update(ContextProperty::UpstreamRepositoryOwner, owner, |s| {
            &mut s.upstream_repository_owner
        });
    }

    pub fn upstream_repository_name(&self) -> Option<String> {
        self.state().upstream_repository_name.clone()
    }

    pub fn set_upstream_repository_name(&self, name: Option<String>) {
        self.update(ContextProperty::UpstreamRepositoryName, name, |s| {
            &mut s.upstream_repository_name
        });
    }

    pub fn forked_repository_name(&self) -> Option<String> {
        self.state().forked_repository_name.clone()
    }

    pub fn set_forked_repository_name(&self, name: Option<String>) {
        self.update(ContextProperty::ForkedRepositoryName, name, |s| {
            &mut s.forked_repository_name
        });
    }

    pub fn work_branch_name(&self) -> Option<String> {
        self.state().work_branch_name.clone()
    }

    pub fn set_work_branch_name(&self, branch: Option<String>) {
        self.update(ContextProperty::WorkBranchName, branch, |s| {
            &mut s.work_branch_name
        });
    }

    pub fn contribute_to_branch_name(&self) -> Option<String> {
        self.state().contribute_to_branch_name.clone()
    }

    pub fn set_contribute_to_branch_name(&self, branch: Option<String>) {
        self.update(ContextProperty::ContributeToBranchName, branch, |s| {
            &mut s.contribute_to_branch_name
        });
    }

    pub fn host_user_login(&self) -> Option<String> {
        self.state().host_user_login.clone()
    }

    pub fn set_host_user_login(&self, login: Option<String>) {
        self.update(ContextProperty::HostUserLogin, login, |s| {
            &mut s.host_user_login
        });
    }

    pub fn pull_request_issue_number(&self) -> Option<u64> {
        self.state().pull_request_issue_number
    }

    pub fn set_pull_request_issue_number(&self, number: Option<u64>) {
        self.update(ContextProperty::PullRequestIssueNumber, number, |s| {
            &mut s.pull_request_issue_number
        });
    }

    pub fn pull_request_id(&self) -> Option<String> {
        self.state().pull_request_id.clone()
    }

    pub fn set_pull_request_id(&self, id: Option<String>) {
        self.update(ContextProperty::PullRequestId, id, |s| &mut s.pull_request_id);
    }

    pub fn fork_ready(&self) -> bool {
        self.state().fork_ready
    }

    pub fn set_fork_ready(&self, ready: bool) {
        self.update(ContextProperty::ForkReady, ready, |s| &mut s.fork_ready);
    }

    pub fn configuration(&self) -> Configuration {
        self.state().configuration.clone()
    }

    pub fn set_configuration(&self, configuration: Configuration) {
        self.state().configuration = configuration;
    }

    /// Copy of the current view state
    pub fn view_state(&self) -> ViewState {
        self.state().view_state.clone()
    }

    /// Edit a copy of the view state and store it back.
    ///
    /// `update` runs unlocked. Concurrent updates do not merge: the last one to
    /// finish wins.
    pub fn update_view_state<R>(&self, update: impl FnOnce(&mut ViewState) -> R) -> R {
        let mut view = self.view_state();
        let result = update(&mut view);
        self.state().view_state = view;
        result
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        let state = self.state().clone();
        ContextSnapshot {
            project: self.inner.project.clone(),
            hosting_service: self.inner.hosting_service.clone(),
            created_at: self.inner.created_at,
            status: state.status,
            previous_status: state.previous_status,
            origin_repository_owner: state.origin_repository_owner,
            origin_repository_name: state.origin_repository_name,
            upstream_repository_owner: state.upstream_repository_owner,
            upstream_repository_name: state.upstream_repository_name,
            forked_repository_name: state.forked_repository_name,
            work_branch_name: state.work_branch_name,
            contribute_to_branch_name: state.contribute_to_branch_name,
            host_user_login: state.host_user_login,
            pull_request_issue_number: state.pull_request_issue_number,
            pull_request_id: state.pull_request_id,
            fork_ready: state.fork_ready,
            configuration: state.configuration,
            view_state: state.view_state,
        }
    }

    /// Branch decision for `condition` in the current chain run, evaluating it on first use.
    pub(crate) fn branch_decision(&self, condition: Uuid, evaluate: impl FnOnce() -> bool) -> bool {
        let cached = self
            .inner
            .branch_decisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&condition)
            .copied();
        if let Some(decision) = cached {
            return decision;
        }

        // The predicate may read the context, so the lock is released while it runs
        let decision = evaluate();
        *self
            .inner
            .branch_decisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(condition)
            .or_insert(decision)
    }

    /// Forget the branch decisions of the previous chain run.
    pub(crate) fn reset_branch_decisions(&self) {
        self.inner
            .branch_decisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("project", &self.inner.project.name)
            .field("hosting_service", &self.inner.hosting_service)
            .field("status", &self.status())
            .finish()
    }
}
