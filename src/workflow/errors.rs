use thiserror::Error;

use crate::vcs::VcsError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("No workflow strategy registered for hosting service '{service}'")]
    UnknownHostingService { service: String },
    #[error("No workflow context for project '{project}'")]
    UnknownProject { project: String },
    #[error("Version control query failed: {0}")]
    Vcs(#[from] VcsError),
}
