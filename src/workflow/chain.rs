// Conditional chain builder - composes steps and sub-chains into one flat sequence

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::context::Context;
use super::executor::WorkflowExecutor;
use super::step::{Step, StepRef};

/// Branch predicate evaluated against the running context.
pub trait Condition: Send + Sync {
    fn evaluate(&self, context: &Context) -> bool;
}

impl<F> Condition for F
where
    F: Fn(&Context) -> bool + Send + Sync,
{
    fn evaluate(&self, context: &Context) -> bool {
        self(context)
    }
}

pub type ConditionRef = Arc<dyn Condition>;

/// Evaluates the wrapped predicate at most once per chain run and context.
///
/// Every step of a conditional sub-chain shares one instance, so all of them
/// observe the same branch decision even when the predicate has side effects.
pub struct CachingCondition {
    id: Uuid,
    condition: ConditionRef,
}

impl CachingCondition {
    pub fn new(condition: ConditionRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            condition,
        }
    }
}

impl Condition for CachingCondition {
    fn evaluate(&self, context: &Context) -> bool {
        context.branch_decision(self.id, || self.condition.evaluate(context))
    }
}

/// Inverts another condition.
pub struct NegatedCondition {
    condition: ConditionRef,
}

impl NegatedCondition {
    pub fn new(condition: ConditionRef) -> Self {
        Self { condition }
    }
}

impl Condition for NegatedCondition {
    fn evaluate(&self, context: &Context) -> bool {
        !self.condition.evaluate(context)
    }
}

/// Synthetic gate in front of one step.
///
/// When the condition holds the gate hands its slot over to the wrapped step,
/// otherwise it completes itself and the wrapped step is skipped.
pub struct ConditionalStep {
    name: String,
    condition: ConditionRef,
    step: StepRef,
}

impl ConditionalStep {
    pub fn new(condition: ConditionRef, step: StepRef) -> Self {
        Self {
            name: format!("if:{}", step.name()),
            condition,
            step,
        }
    }
}

impl Step for ConditionalStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_synthetic(&self) -> bool {
        true
    }

    fn execute(self: Arc<Self>, executor: &WorkflowExecutor, context: &Context) {
        if self.condition.evaluate(context) {
            executor.hand_off(self.as_ref(), self.step.clone(), context);
        } else {
            executor.done(self.as_ref(), context);
        }
    }
}

/// Frozen step sequence ready for execution.
#[derive(Clone)]
pub struct Chain {
    steps: Arc<[StepRef]>,
}

impl Chain {
    pub fn steps(&self) -> &[StepRef] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|step| step.name()))
            .finish()
    }
}

/// Fluent builder for chains.
///
/// ```rust,no_run
/// # use contrib_workflow::workflow::{ChainBuilder, Context, FnStep};
/// let chain = ChainBuilder::new()
///     .first(FnStep::new("detect-branch", |_| Ok(())))
///     .then_chain_if_else(
///         |ctx: &Context| ctx.fork_ready(),
///         ChainBuilder::new().first(FnStep::new("push-to-fork", |_| Ok(()))),
///         ChainBuilder::new().first(FnStep::new("create-fork", |_| Ok(()))),
///     )
///     .build();
/// ```
#[derive(Clone, Default)]
pub struct ChainBuilder {
    steps: Vec<StepRef>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the chain with its first step.
    pub fn first(self, step: impl Step + 'static) -> Self {
        self.then(step)
    }

    pub fn then(self, step: impl Step + 'static) -> Self {
        self.then_step(Arc::new(step))
    }

    /// Append an already shared step.
    pub fn then_step(mut self, step: StepRef) -> Self {
        self.steps.push(step);
        self
    }

    /// Append `step` behind a gate that checks `condition` when the gate runs.
    pub fn then_if<C>(self, condition: C, step: impl Step + 'static) -> Self
    where
        C: Condition + 'static,
    {
        self.then_gated(Arc::new(condition), Arc::new(step))
    }

    fn then_gated(self, condition: ConditionRef, step: StepRef) -> Self {
        self.then_step(Arc::new(ConditionalStep::new(condition, step)))
    }

    /// Append every step of `chain`, flattened.
    pub fn then_chain(mut self, chain: ChainBuilder) -> Self {
        self.steps.extend(chain.steps);
        self
    }

    /// Append `chain` so that all of its steps run only if `condition` holds.
    /// The condition is evaluated once per run.
    pub fn then_chain_if<C>(self, condition: C, chain: ChainBuilder) -> Self
    where
        C: Condition + 'static,
    {
        let cached: ConditionRef = Arc::new(CachingCondition::new(Arc::new(condition)));
        self.then_chain_gated(cached, chain)
    }

    /// Append `if_true` when `condition` holds and `if_false` otherwise.
    /// Exactly one of the two sub-chains runs for a single evaluation.
    pub fn then_chain_if_else<C>(self, condition: C, if_true: ChainBuilder, if_false: ChainBuilder) -> Self
    where
        C: Condition + 'static,
    {
        let cached: ConditionRef = Arc::new(CachingCondition::new(Arc::new(condition)));
        let negated: ConditionRef = Arc::new(NegatedCondition::new(cached.clone()));
        self.then_chain_gated(cached, if_true)
            .then_chain_gated(negated, if_false)
    }

    fn then_chain_gated(self, condition: ConditionRef, chain: ChainBuilder) -> Self {
        chain
            .steps
            .into_iter()
            .fold(self, |builder, step| builder.then_gated(condition.clone(), step))
    }

    /// Copy of the steps appended so far; later composition does not affect it.
    pub fn steps(&self) -> Vec<StepRef> {
        self.steps.clone()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn build(self) -> Chain {
        Chain {
            steps: self.steps.into(),
        }
    }
}

impl fmt::Debug for ChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|step| step.name()))
            .finish()
    }
}
