// Workflow strategies shipped with the crate

pub mod local;

pub use local::{LocalGitWorkflow, LOCAL_HOSTING_SERVICE};
