// Contribution workflow engine
//
// Strategies describe a workflow as chains of steps; the executor runs one
// chain per project at a time, advancing it each time the running step
// reports back through `done` or `fail`.

pub mod chain;
pub mod chain_executor;
pub mod context;
pub mod errors;
pub mod events;
pub mod executor;
pub mod status;
pub mod step;
pub mod strategy;

#[cfg(test)]
pub mod mocks;


pub use chain::{CachingCondition, Chain, ChainBuilder, Condition, ConditionRef, ConditionalStep, NegatedCondition};
pub use chain_executor::ChainExecutor;
pub use context::{Configuration, Context, ContextProperty, ContextSnapshot, Project, Stage, StatusMessage, ViewState};
pub use errors::WorkflowError;
pub use events::{BroadcastEventSink, EventSink, RecordingEventSink, WorkflowEvent, DEFAULT_EVENT_CHANNEL_CAPACITY};
pub use executor::{ChangeContextStatusStep, ContextRegistry, WorkflowExecutor, WorkflowExecutorBuilder};
pub use status::{FailureRollback, WorkflowStatus};
pub use step::{FnStep, Step, StepRef};
pub use strategy::{CurrentProjectResolver, StrategyRegistry, WorkflowStrategy};
