// Workflow strategies - per hosting service providers of the three chains

use std::collections::HashMap;
use std::sync::Arc;

use super::chain::ChainBuilder;
use super::context::Context;

/// Supplies the chains that drive a contribution on one hosting service.
///
/// The executor appends its own status transition to every chain returned here.
pub trait WorkflowStrategy: Send + Sync {
    /// Steps that populate a freshly created context
    fn init_chain(&self, context: &Context) -> ChainBuilder;

    /// Steps that open a new pull request
    fn creation_chain(&self, context: &Context) -> ChainBuilder;

    /// Steps that push further work to an existing pull request
    fn update_chain(&self, context: &Context) -> ChainBuilder;
}

/// Hosting service key to strategy, owned by the caller.
pub type StrategyRegistry = HashMap<String, Arc<dyn WorkflowStrategy>>;

/// Names the project the user is currently looking at.
pub trait CurrentProjectResolver: Send + Sync {
    fn current_project(&self) -> Option<String>;
}

impl<F> CurrentProjectResolver for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn current_project(&self) -> Option<String> {
        self()
    }
}
