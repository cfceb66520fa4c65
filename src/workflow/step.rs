// Step contract - one unit of (possibly asynchronous) workflow work

use std::fmt;
use std::sync::Arc;

use super::context::Context;
use super::executor::WorkflowExecutor;

/// Shared handle to a step inside a chain.
pub type StepRef = Arc<dyn Step>;

/// A unit of work in a contribution workflow.
///
/// Every call to [`Step::execute`] must eventually end in exactly one call to
/// [`WorkflowExecutor::done`] or [`WorkflowExecutor::fail`] with the same step.
/// The call may happen before `execute` returns, or later from a spawned task
/// once some asynchronous operation completes.
///
/// A completion reported before `execute` returns dispatches the next step on
/// the same stack, so a chain of synchronous steps nests one `execute`/`done`
/// frame pair per step. Long chains of such steps should spawn instead:
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use contrib_workflow::workflow::{Context, Step, WorkflowExecutor};
/// struct PushBranch;
///
/// impl Step for PushBranch {
///     fn name(&self) -> &str {
///         "push-branch"
///     }
///
///     fn execute(self: Arc<Self>, executor: &WorkflowExecutor, context: &Context) {
///         let executor = executor.clone();
///         let context = context.clone();
///         tokio::spawn(async move {
///             // ... push ...
///             executor.done(self.as_ref(), &context);
///         });
///     }
/// }
/// ```
pub trait Step: Send + Sync {
    /// Name reported in step events and logs
    fn name(&self) -> &str;

    /// Synthetic steps do their bookkeeping silently: the executor publishes no
    /// step event when they complete or fail.
    fn is_synthetic(&self) -> bool {
        false
    }

    fn execute(self: Arc<Self>, executor: &WorkflowExecutor, context: &Context);
}

impl fmt::Debug for dyn Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name())
            .field("synthetic", &self.is_synthetic())
            .finish()
    }
}

/// Identity comparison between a step reference and a chain entry.
pub(crate) fn same_step(step: &dyn Step, other: &StepRef) -> bool {
    std::ptr::addr_eq(step as *const dyn Step, Arc::as_ptr(other))
}

type StepFn = dyn Fn(&Context) -> Result<(), String> + Send + Sync;

/// Adapts a synchronous closure into a step.
///
/// `Ok(())` completes the step, `Err(message)` fails it with `message`.
pub struct FnStep {
    name: String,
    synthetic: bool,
    action: Box<StepFn>,
}

impl FnStep {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&Context) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            synthetic: false,
            action: Box::new(action),
        }
    }

    /// Same as [`FnStep::new`] but produces a synthetic step.
    pub fn synthetic<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&Context) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            synthetic: true,
            ..Self::new(name, action)
        }
    }
}

impl Step for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    fn execute(self: Arc<Self>, executor: &WorkflowExecutor, context: &Context) {
        match (self.action)(context) {
            Ok(()) => executor.done(self.as_ref(), context),
            Err(message) => executor.fail(self.as_ref(), context, &message),
        }
    }
}
