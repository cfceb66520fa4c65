// Workflow executor - owns per-project contexts and chain runs, and drives them
// through the done/fail callbacks that every step reports to

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, trace, warn, Instrument};

use super::chain::Chain;
use super::chain_executor::{Advance, ChainExecutor};
use super::context::{Context, Project};
use super::errors::WorkflowError;
use super::events::{EventSink, WorkflowEvent};
use super::status::{FailureRollback, WorkflowStatus};
use super::step::{Step, StepRef};
use super::strategy::{CurrentProjectResolver, StrategyRegistry, WorkflowStrategy};
use crate::telemetry::{create_workflow_span, generate_correlation_id};
use crate::vcs::VcsService;

#[derive(Default)]
struct RegistryState {
    contexts: HashMap<String, Context>,
    chains: HashMap<String, Arc<ChainExecutor>>,
}

/// Caller owned store of the contexts and chain runs tracked by an executor,
/// keyed by project name.
#[derive(Default)]
pub struct ContextRegistry {
    state: Mutex<RegistryState>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn context(&self, project: &str) -> Option<Context> {
        self.state().contexts.get(project).cloned()
    }

    pub fn contains(&self, project: &str) -> bool {
        self.state().contexts.contains_key(project)
    }

    pub fn chain_executor(&self, project: &str) -> Option<Arc<ChainExecutor>> {
        self.state().chains.get(project).cloned()
    }

    pub fn project_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state().contexts.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.state().contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_context(&self, context: Context) {
        self.state()
            .contexts
            .insert(context.project_name().to_string(), context);
    }

    /// Whether `context` is the one registered under its project name.
    fn is_registered(&self, context: &Context) -> bool {
        self.state()
            .contexts
            .get(context.project_name())
            .is_some_and(|registered| registered.ptr_eq(context))
    }

    fn install_chain(&self, project: &str, chain: Arc<ChainExecutor>) -> Option<Arc<ChainExecutor>> {
        self.state().chains.insert(project.to_string(), chain)
    }

    fn remove(&self, project: &str) -> Option<Context> {
        let mut state = self.state();
        state.chains.remove(project);
        state.contexts.remove(project)
    }

    /// Chain run of `context`, provided the context is still the registered one.
    fn active_chain(&self, context: &Context) -> Option<Arc<ChainExecutor>> {
        let state = self.state();
        match state.contexts.get(context.project_name()) {
            Some(registered) if registered.ptr_eq(context) => {
                state.chains.get(context.project_name()).cloned()
            }
            _ => None,
        }
    }

    /// Whether `chain` is still the run registered for `context`.
    fn is_active_chain(&self, context: &Context, chain: &Arc<ChainExecutor>) -> bool {
        self.active_chain(context)
            .is_some_and(|active| Arc::ptr_eq(&active, chain))
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("projects", &self.project_names())
            .finish()
    }
}

/// Synthetic step that commits a status transition at the end of a chain.
///
/// Moves the context from `from` to `to` only when it is still in `from`,
/// and completes either way.
pub struct ChangeContextStatusStep {
    name: String,
    from: WorkflowStatus,
    to: WorkflowStatus,
}

impl ChangeContextStatusStep {
    pub fn new(from: WorkflowStatus, to: WorkflowStatus) -> Self {
        Self {
            name: format!("change-status:{from}->{to}"),
            from,
            to,
        }
    }
}

impl Step for ChangeContextStatusStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_synthetic(&self) -> bool {
        true
    }

    fn execute(self: Arc<Self>, executor: &WorkflowExecutor, context: &Context) {
        if context.status() == self.from {
            context.set_status(self.to);
        } else {
            debug!(
                project = %context.project_name(),
                expected = %self.from,
                actual = %context.status(),
                "Status moved on during the chain, keeping it"
            );
        }
        executor.done(self.as_ref(), context);
    }
}

struct ExecutorInner {
    registry: Arc<ContextRegistry>,
    strategies: StrategyRegistry,
    vcs: Arc<dyn VcsService>,
    events: Arc<dyn EventSink>,
    current_project: Option<Arc<dyn CurrentProjectResolver>>,
}

/// Coordinates contribution workflows for any number of projects.
///
/// Cloning is cheap and every clone drives the same registry, which is how
/// asynchronous steps carry the executor into their completion callbacks.
#[derive(Clone)]
pub struct WorkflowExecutor {
    inner: Arc<ExecutorInner>,
}

/// Assembles a [`WorkflowExecutor`] from its collaborators.
pub struct WorkflowExecutorBuilder {
    registry: Arc<ContextRegistry>,
    strategies: StrategyRegistry,
    vcs: Arc<dyn VcsService>,
    events: Arc<dyn EventSink>,
    current_project: Option<Arc<dyn CurrentProjectResolver>>,
}

impl WorkflowExecutorBuilder {
    /// Share an existing registry instead of starting from an empty one.
    pub fn registry(mut self, registry: Arc<ContextRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn strategy(mut self, hosting_service: impl Into<String>, strategy: Arc<dyn WorkflowStrategy>) -> Self {
        self.strategies.insert(hosting_service.into(), strategy);
        self
    }

    pub fn strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies.extend(strategies);
        self
    }

    pub fn current_project(mut self, resolver: impl CurrentProjectResolver + 'static) -> Self {
        self.current_project = Some(Arc::new(resolver));
        self
    }

    pub fn build(self) -> WorkflowExecutor {
        WorkflowExecutor {
            inner: Arc::new(ExecutorInner {
                registry: self.registry,
                strategies: self.strategies,
                vcs: self.vcs,
                events: self.events,
                current_project: self.current_project,
            }),
        }
    }
}

impl WorkflowExecutor {
    pub fn builder(vcs: Arc<dyn VcsService>, events: Arc<dyn EventSink>) -> WorkflowExecutorBuilder {
        WorkflowExecutorBuilder {
            registry: Arc::new(ContextRegistry::new()),
            strategies: StrategyRegistry::new(),
            vcs,
            events,
            current_project: None,
        }
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.inner.registry
    }

    pub fn context(&self, project: &str) -> Option<Context> {
        self.inner.registry.context(project)
    }

    /// Context of the project the current-project resolver points at.
    pub fn current_context(&self) -> Option<Context> {
        let project = self.inner.current_project.as_ref()?.current_project()?;
        self.context(&project)
    }

    fn strategy(&self, hosting_service: &str) -> Result<Arc<dyn WorkflowStrategy>, WorkflowError> {
        self.inner
            .strategies
            .get(hosting_service)
            .cloned()
            .ok_or_else(|| {
                error!(hosting_service, "No workflow strategy registered");
                WorkflowError::UnknownHostingService {
                    service: hosting_service.to_string(),
                }
            })
    }

    fn publish(&self, event: WorkflowEvent) {
        self.inner.events.publish(event);
    }

    /// Start tracking `project`, or refresh the existing context.
    ///
    /// A new context runs the strategy's init chain and ends up ready to create
    /// a pull request. An existing context is kept as long as the project is
    /// still on the recorded work branch; otherwise it is invalidated and
    /// initialized again from scratch.
    pub async fn init(&self, hosting_service: &str, project: Project) -> Result<Context, WorkflowError> {
        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("init", &project.name, Some(&correlation_id));
        async move {
            let Some(existing) = self.context(&project.name) else {
                return self.start_init(hosting_service, project);
            };

            let branch = self.inner.vcs.current_branch(&project).await?;
            if existing.work_branch_name().as_deref() == Some(branch.as_str()) {
                debug!(branch = %branch, "Existing context is current");
                self.publish(WorkflowEvent::CurrentContextUnchanged {
                    context: existing.clone(),
                });
                return Ok(existing);
            }

            info!(
                recorded = ?existing.work_branch_name(),
                current = %branch,
                "Work branch changed, reinitializing context"
            );
            self.invalidate_context(&project.name);
            self.start_init(hosting_service, project)
        }
        .instrument(span)
        .await
    }

    fn start_init(&self, hosting_service: &str, project: Project) -> Result<Context, WorkflowError> {
        let strategy = self.strategy(hosting_service)?;
        let context = Context::new(project, hosting_service, self.inner.events.clone());
        self.inner.registry.insert_context(context.clone());

        let chain = strategy
            .init_chain(&context)
            .then(ChangeContextStatusStep::new(
                WorkflowStatus::Initializing,
                WorkflowStatus::ReadyToCreatePr,
            ))
            .build();
        self.start_chain(&context, chain);
        Ok(context)
    }

    /// Run the strategy's creation chain for `context`.
    pub fn create_pull_request(&self, context: &Context) -> Result<(), WorkflowError> {
        let correlation_id = generate_correlation_id();
        let _span = create_workflow_span("create_pull_request", context.project_name(), Some(&correlation_id)).entered();
        let strategy = self.prepare(context)?;
        context.set_status(WorkflowStatus::CreatingPr);
        let chain = strategy
            .creation_chain(context)
            .then(ChangeContextStatusStep::new(
                WorkflowStatus::CreatingPr,
                WorkflowStatus::ReadyToUpdatePr,
            ))
            .build();
        self.start_chain(context, chain);
        Ok(())
    }

    /// Run the strategy's update chain for `context`.
    pub fn update_pull_request(&self, context: &Context) -> Result<(), WorkflowError> {
        let correlation_id = generate_correlation_id();
        let _span = create_workflow_span("update_pull_request", context.project_name(), Some(&correlation_id)).entered();
        let strategy = self.prepare(context)?;
        context.set_status(WorkflowStatus::UpdatingPr);
        let chain = strategy
            .update_chain(context)
            .then(ChangeContextStatusStep::new(
                WorkflowStatus::UpdatingPr,
                WorkflowStatus::ReadyToUpdatePr,
            ))
            .build();
        self.start_chain(context, chain);
        Ok(())
    }

    /// Create or update, whichever the context's status calls for.
    pub fn contribute(&self, context: &Context) -> Result<(), WorkflowError> {
        if context.is_update_mode() {
            self.update_pull_request(context)
        } else {
            self.create_pull_request(context)
        }
    }

    fn prepare(&self, context: &Context) -> Result<Arc<dyn WorkflowStrategy>, WorkflowError> {
        let strategy = self.strategy(context.hosting_service())?;
        if !self.inner.registry.is_registered(context) {
            return Err(WorkflowError::UnknownProject {
                project: context.project_name().to_string(),
            });
        }
        Ok(strategy)
    }

    fn start_chain(&self, context: &Context, chain: Chain) {
        let chain_executor = Arc::new(ChainExecutor::new(chain));
        info!(
            project = %context.project_name(),
            run_id = %chain_executor.run_id(),
            status = %context.status(),
            steps = chain_executor.chain().len(),
            "Starting workflow chain"
        );

        let replaced = self
            .inner
            .registry
            .install_chain(context.project_name(), chain_executor);
        if let Some(replaced) = replaced.filter(|chain| !chain.is_finished()) {
            debug!(
                project = %context.project_name(),
                run_id = %replaced.run_id(),
                "Replaced unfinished chain, its pending step will be ignored"
            );
        }

        self.execute_next_step(context);
    }

    /// Chain run that is waiting on `step`, if any.
    fn awaiting_chain(&self, step: &dyn Step, context: &Context) -> Option<Arc<ChainExecutor>> {
        match self.inner.registry.active_chain(context) {
            Some(chain) if chain.is_awaiting(step) => Some(chain),
            Some(chain) => {
                debug!(
                    project = %context.project_name(),
                    run_id = %chain.run_id(),
                    step = step.name(),
                    "Ignoring callback from a step the chain is not waiting on"
                );
                None
            }
            None => {
                debug!(
                    project = %context.project_name(),
                    step = step.name(),
                    "Ignoring callback for a context that is no longer tracked"
                );
                None
            }
        }
    }

    /// Report that `step` finished successfully and advance its chain.
    ///
    /// Only the chain run that dispatched `step` advances. If a new run
    /// replaced it in the meantime, the replaced run stops here.
    pub fn done(&self, step: &dyn Step, context: &Context) {
        let Some(chain) = self.awaiting_chain(step, context) else {
            return;
        };
        let advance = chain.advance_from(step, context);
        if matches!(advance, Advance::Orphaned) {
            debug!(
                project = %context.project_name(),
                run_id = %chain.run_id(),
                step = step.name(),
                "Step was settled concurrently, ignoring completion"
            );
            return;
        }

        if !step.is_synthetic() {
            info!(project = %context.project_name(), step = step.name(), "Workflow step succeeded");
            self.publish(WorkflowEvent::StepSucceeded {
                context: context.clone(),
                step: step.name().to_string(),
            });
        }

        let Advance::Next(next) = advance else {
            return;
        };
        if self.inner.registry.is_active_chain(context, &chain) {
            chain.dispatch(next, self, context);
        } else {
            debug!(
                project = %context.project_name(),
                run_id = %chain.run_id(),
                step = next.name(),
                "Chain was replaced or invalidated, not dispatching its next step"
            );
        }
    }

    /// Report that `step` failed. The chain stops and the status rolls back.
    pub fn fail(&self, step: &dyn Step, context: &Context, message: &str) {
        let Some(chain) = self.awaiting_chain(step, context) else {
            return;
        };
        if !chain.settle(step) {
            return;
        }

        let status = context.status();
        match status.failure_rollback() {
            FailureRollback::Revert(target) => context.set_status(target),
            FailureRollback::Invalidate => {
                self.invalidate_context(context.project_name());
            }
            FailureRollback::Keep => {
                warn!(project = %context.project_name(), status = %status, "Step failed outside of a running chain status");
            }
        }

        if !step.is_synthetic() {
            warn!(
                project = %context.project_name(),
                step = step.name(),
                status = %status,
                message,
                "Workflow step failed"
            );
            self.publish(WorkflowEvent::StepFailed {
                context: context.clone(),
                step: step.name().to_string(),
                message: message.to_string(),
            });
        }
    }

    /// Let `from` pass its awaited slot to `to` and run `to` in its place.
    ///
    /// `to` then reports its own completion. Gating steps use this to run the
    /// step they guard.
    pub fn hand_off(&self, from: &dyn Step, to: StepRef, context: &Context) {
        let Some(chain) = self.awaiting_chain(from, context) else {
            return;
        };
        if chain.hand_off(from, to.clone()) {
            chain.dispatch(to, self, context);
        }
    }

    /// Stop tracking `project`. Publishes an event only if a context existed.
    pub fn invalidate_context(&self, project: &str) -> bool {
        match self.inner.registry.remove(project) {
            Some(context) => {
                info!(project, status = %context.status(), "Workflow context invalidated");
                self.publish(WorkflowEvent::ContextInvalidated { context });
                true
            }
            None => false,
        }
    }

    /// Dispatch the next step of the chain running for `context`.
    pub fn execute_next_step(&self, context: &Context) {
        match self.inner.registry.active_chain(context) {
            Some(chain) => chain.execute(self, context),
            None => trace!(project = %context.project_name(), "No chain running"),
        }
    }
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut services: Vec<_> = self.inner.strategies.keys().collect();
        services.sort();
        f.debug_struct("WorkflowExecutor")
            .field("registry", &self.inner.registry)
            .field("hosting_services", &services)
            .finish()
    }
}
