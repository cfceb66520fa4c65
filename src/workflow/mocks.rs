// Mock collaborators for testing - no side effects outside of memory

use async_trait::async_trait;
use mockall::mock;
use std::sync::{Arc, Mutex};

use crate::vcs::{VcsError, VcsService};
use crate::workflow::chain::ChainBuilder;
use crate::workflow::context::{Context, Project};
use crate::workflow::events::{EventSink, RecordingEventSink, WorkflowEvent};
use crate::workflow::executor::WorkflowExecutor;
use crate::workflow::step::Step;
use crate::workflow::strategy::WorkflowStrategy;

mock! {
    pub Vcs {}

    #[async_trait]
    impl VcsService for Vcs {
        async fn current_branch(&self, project: &Project) -> Result<String, VcsError>;
        async fn remote_url(&self, project: &Project, remote: &str) -> Result<Option<String>, VcsError>;
    }
}

/// VCS stub that answers with a configurable branch
#[derive(Debug)]
pub struct StubVcs {
    branch: Mutex<String>,
}

impl StubVcs {
    pub fn new(branch: &str) -> Self {
        Self {
            branch: Mutex::new(branch.to_string()),
        }
    }

    pub fn branch(&self) -> String {
        self.branch.lock().unwrap().clone()
    }

    pub fn set_branch(&self, branch: &str) {
        *self.branch.lock().unwrap() = branch.to_string();
    }
}

#[async_trait]
impl VcsService for StubVcs {
    async fn current_branch(&self, _project: &Project) -> Result<String, VcsError> {
        Ok(self.branch.lock().unwrap().clone())
    }

    async fn remote_url(&self, _project: &Project, _remote: &str) -> Result<Option<String>, VcsError> {
        Ok(None)
    }
}

/// Shared, ordered log of step executions
pub type StepLog = Arc<Mutex<Vec<String>>>;

pub fn step_log() -> StepLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Succeed,
    Fail(String),
}

/// Step that logs its name and settles immediately
pub struct RecordingStep {
    name: String,
    synthetic: bool,
    outcome: Outcome,
    log: StepLog,
}

impl RecordingStep {
    pub fn ok(name: &str, log: &StepLog) -> Self {
        Self {
            name: name.to_string(),
            synthetic: false,
            outcome: Outcome::Succeed,
            log: log.clone(),
        }
    }

    pub fn failing(name: &str, message: &str, log: &StepLog) -> Self {
        Self {
            outcome: Outcome::Fail(message.to_string()),
            ..Self::ok(name, log)
        }
    }

    pub fn synthetic(name: &str, log: &StepLog) -> Self {
        Self {
            synthetic: true,
            ..Self::ok(name, log)
        }
    }
}

impl Step for RecordingStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    fn execute(self: Arc<Self>, executor: &WorkflowExecutor, context: &Context) {
        self.log.lock().unwrap().push(self.name.clone());
        match &self.outcome {
            Outcome::Succeed => executor.done(self.as_ref(), context),
            Outcome::Fail(message) => executor.fail(self.as_ref(), context, message),
        }
    }
}

/// Step that stays in flight until the test settles it
pub struct PendingStep {
    name: String,
    dispatched: Mutex<Vec<(WorkflowExecutor, Context)>>,
}

impl PendingStep {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            dispatched: Mutex::new(Vec::new()),
        })
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatched.lock().unwrap().len()
    }

    fn last_dispatch(&self) -> (WorkflowExecutor, Context) {
        self.dispatched
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("step was never dispatched")
    }

    pub fn complete(&self) {
        let (executor, context) = self.last_dispatch();
        executor.done(self, &context);
    }

    pub fn fail(&self, message: &str) {
        let (executor, context) = self.last_dispatch();
        executor.fail(self, &context, message);
    }
}

impl Step for PendingStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(self: Arc<Self>, executor: &WorkflowExecutor, context: &Context) {
        self.dispatched
            .lock()
            .unwrap()
            .push((executor.clone(), context.clone()));
    }
}

type ChainFactory = Box<dyn Fn() -> ChainBuilder + Send + Sync>;

/// Strategy whose chains come from closures
pub struct ScriptedStrategy {
    init: ChainFactory,
    creation: ChainFactory,
    update: ChainFactory,
}

impl ScriptedStrategy {
    pub fn empty() -> Self {
        Self {
            init: Box::new(ChainBuilder::new),
            creation: Box::new(ChainBuilder::new),
            update: Box::new(ChainBuilder::new),
        }
    }

    pub fn with_init(mut self, factory: impl Fn() -> ChainBuilder + Send + Sync + 'static) -> Self {
        self.init = Box::new(factory);
        self
    }

    pub fn with_creation(mut self, factory: impl Fn() -> ChainBuilder + Send + Sync + 'static) -> Self {
        self.creation = Box::new(factory);
        self
    }

    pub fn with_update(mut self, factory: impl Fn() -> ChainBuilder + Send + Sync + 'static) -> Self {
        self.update = Box::new(factory);
        self
    }
}

impl WorkflowStrategy for ScriptedStrategy {
    fn init_chain(&self, _context: &Context) -> ChainBuilder {
        (self.init)()
    }

    fn creation_chain(&self, _context: &Context) -> ChainBuilder {
        (self.creation)()
    }

    fn update_chain(&self, _context: &Context) -> ChainBuilder {
        (self.update)()
    }
}

/// Executor wired to a recording sink and a stub VCS, with `strategy` under "github"
type Reaction = Arc<dyn Fn(&WorkflowEvent) + Send + Sync>;

/// Records events like [`RecordingEventSink`] and then hands each one to a
/// reaction, which may call back into the executor while it is publishing.
#[derive(Default)]
pub struct ReactingEventSink {
    recorded: RecordingEventSink,
    reaction: Mutex<Option<Reaction>>,
}

impl ReactingEventSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_event(&self, reaction: impl Fn(&WorkflowEvent) + Send + Sync + 'static) {
        *self.reaction.lock().unwrap() = Some(Arc::new(reaction));
    }

    pub fn recorded(&self) -> &RecordingEventSink {
        &self.recorded
    }
}

impl EventSink for ReactingEventSink {
    fn publish(&self, event: WorkflowEvent) {
        self.recorded.publish(event.clone());
        // Release the lock before reacting, the reaction may publish again
        let reaction = self.reaction.lock().unwrap().clone();
        if let Some(reaction) = reaction {
            reaction(&event);
        }
    }
}

pub fn executor_with(
    strategy: ScriptedStrategy,
    vcs: Arc<dyn VcsService>,
) -> (WorkflowExecutor, Arc<RecordingEventSink>) {
    let sink = Arc::new(RecordingEventSink::new());
    let executor = WorkflowExecutor::builder(vcs, sink.clone())
        .strategy("github", Arc::new(strategy))
        .build();
    (executor, sink)
}

pub fn project(name: &str) -> Project {
    Project::new(name, format!("/projects/{name}"))
}
