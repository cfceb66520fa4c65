// Contribution workflow engine - conditional step chains driving pull request
// workflows per project
// This exposes the core components for embedding and testing

pub mod config;
pub mod strategies;
pub mod telemetry;
pub mod vcs;
pub mod workflow;

// Re-export key types for easy access
pub use crate::config::{config, ContribConfig};
pub use strategies::{LocalGitWorkflow, LOCAL_HOSTING_SERVICE};
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry};
pub use vcs::{Git2VcsService, VcsError, VcsService};
pub use workflow::{
    ChainBuilder, ChainExecutor, Context, ContextRegistry, EventSink, Project, Step, WorkflowError, WorkflowEvent,
    WorkflowExecutor, WorkflowStatus, WorkflowStrategy,
};
