// Chain executor - single cursor that dispatches one step per call

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};
use uuid::Uuid;

use super::chain::Chain;
use super::context::Context;
use super::executor::WorkflowExecutor;
use super::step::{same_step, Step, StepRef};

/// Outcome of settling the awaited step.
pub(crate) enum Advance {
    /// The step was not the awaited one; nothing changed
    Orphaned,
    /// The step was the last one
    Exhausted,
    /// The cursor moved on and this step is now awaited
    Next(StepRef),
}

#[derive(Default)]
struct Cursor {
    position: usize,
    awaiting: Option<StepRef>,
}

/// Runs one chain, one step at a time.
///
/// Each [`ChainExecutor::execute`] dispatches the next step and records it as
/// the step being awaited. Once the chain is exhausted further calls do nothing.
pub struct ChainExecutor {
    run_id: Uuid,
    chain: Chain,
    cursor: Mutex<Cursor>,
}

impl ChainExecutor {
    pub fn new(chain: Chain) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            chain,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    fn cursor(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Identifier of this chain run, used to correlate logs
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Dispatch the next step, if any.
    pub fn execute(&self, executor: &WorkflowExecutor, context: &Context) {
        let next = {
            let mut cursor = self.cursor();
            self.claim_next(&mut cursor, context)
        };
        if let Some(step) = next {
            self.dispatch(step, executor, context);
        }
    }

    /// Settle `step` and claim the step after it in one move.
    ///
    /// Returns [`Advance::Orphaned`] when `step` is not the awaited step, so a
    /// duplicate or stale completion can never move the cursor.
    pub(crate) fn advance_from(&self, step: &dyn Step, context: &Context) -> Advance {
        let mut cursor = self.cursor();
        let awaited = cursor
            .awaiting
            .as_ref()
            .is_some_and(|awaiting| same_step(step, awaiting));
        if !awaited {
            return Advance::Orphaned;
        }
        match self.claim_next(&mut cursor, context) {
            Some(next) => Advance::Next(next),
            None => Advance::Exhausted,
        }
    }

    /// Run a step previously claimed from this chain.
    pub(crate) fn dispatch(&self, step: StepRef, executor: &WorkflowExecutor, context: &Context) {
        debug!(
            run_id = %self.run_id,
            project = %context.project_name(),
            step = step.name(),
            synthetic = step.is_synthetic(),
            "Dispatching workflow step"
        );
        step.execute(executor, context);
    }

    fn claim_next(&self, cursor: &mut Cursor, context: &Context) -> Option<StepRef> {
        let Some(step) = self.chain.steps().get(cursor.position).cloned() else {
            cursor.awaiting = None;
            trace!(run_id = %self.run_id, project = %context.project_name(), "Chain exhausted");
            return None;
        };
        if cursor.position == 0 {
            context.reset_branch_decisions();
        }
        cursor.position += 1;
        cursor.awaiting = Some(step.clone());
        Some(step)
    }

    /// Step dispatched last and not yet settled
    pub fn current_step(&self) -> Option<StepRef> {
        self.cursor().awaiting.clone()
    }

    /// Number of steps dispatched so far
    pub fn position(&self) -> usize {
        self.cursor().position
    }

    /// Every step was dispatched and the last one has settled.
    pub fn is_finished(&self) -> bool {
        let cursor = self.cursor();
        cursor.position >= self.chain.len() && cursor.awaiting.is_none()
    }

    pub(crate) fn is_awaiting(&self, step: &dyn Step) -> bool {
        self.cursor()
            .awaiting
            .as_ref()
            .is_some_and(|awaiting| same_step(step, awaiting))
    }

    /// Move the awaited slot from `from` to `to`. Fails if `from` is not awaited.
    pub(crate) fn hand_off(&self, from: &dyn Step, to: StepRef) -> bool {
        let mut cursor = self.cursor();
        match cursor.awaiting.as_ref() {
            Some(awaiting) if same_step(from, awaiting) => {
                cursor.awaiting = Some(to);
                true
            }
            _ => false,
        }
    }

    /// Stop awaiting `step`. Fails if `step` is not awaited.
    pub(crate) fn settle(&self, step: &dyn Step) -> bool {
        let mut cursor = self.cursor();
        match cursor.awaiting.as_ref() {
            Some(awaiting) if same_step(step, awaiting) => {
                cursor.awaiting = None;
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for ChainExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainExecutor")
            .field("run_id", &self.run_id)
            .field("chain", &self.chain)
            .field("position", &self.position())
            .finish()
    }
}
