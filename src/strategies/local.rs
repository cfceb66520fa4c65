// Local strategy - prepares contributions from the working tree alone, without
// talking to a hosting service

use std::sync::Arc;
use tracing::debug;

use crate::config::ContribConfig;
use crate::vcs::{parse_remote_url, VcsService};
use crate::workflow::{ChainBuilder, Context, FnStep, Step, WorkflowExecutor, WorkflowStrategy};

/// Hosting service key under which [`LocalGitWorkflow`] is registered
pub const LOCAL_HOSTING_SERVICE: &str = "local";

const CREATION_STAGES: [&str; 3] = ["Validate branches", "Compose contribution", "Record contribution"];
const UPDATE_STAGES: [&str; 2] = ["Validate branches", "Record update"];

/// Reads the checked out branch into the context.
struct DetectWorkBranchStep {
    vcs: Arc<dyn VcsService>,
}

impl Step for DetectWorkBranchStep {
    fn name(&self) -> &str {
        "detect-work-branch"
    }

    fn execute(self: Arc<Self>, executor: &WorkflowExecutor, context: &Context) {
        let executor = executor.clone();
        let context = context.clone();
        tokio::spawn(async move {
            match self.vcs.current_branch(context.project()).await {
                Ok(branch) => {
                    context.set_work_branch_name(Some(branch));
                    executor.done(self.as_ref(), &context);
                }
                Err(e) => executor.fail(self.as_ref(), &context, &format!("Cannot determine work branch: {e}")),
            }
        });
    }
}

/// Records owner and name of the repository behind the configured remote.
///
/// A project without that remote is still a valid local contribution source.
struct DetectOriginRepositoryStep {
    vcs: Arc<dyn VcsService>,
    remote: String,
}

impl Step for DetectOriginRepositoryStep {
    fn name(&self) -> &str {
        "detect-origin-repository"
    }

    fn execute(self: Arc<Self>, executor: &WorkflowExecutor, context: &Context) {
        let executor = executor.clone();
        let context = context.clone();
        tokio::spawn(async move {
            match self.vcs.remote_url(context.project(), &self.remote).await {
                Ok(url) => {
                    match url.as_deref().and_then(parse_remote_url) {
                        Some(repository) => {
                            context.set_origin_repository_owner(Some(repository.owner.clone()));
                            context.set_origin_repository_name(Some(repository.name.clone()));
                            // No fork in a local workflow: origin is the upstream
                            context.set_upstream_repository_owner(Some(repository.owner));
                            context.set_upstream_repository_name(Some(repository.name));
                        }
                        None => debug!(remote = %self.remote, url = ?url, "No hosted origin repository"),
                    }
                    executor.done(self.as_ref(), &context);
                }
                Err(e) => executor.fail(self.as_ref(), &context, &format!("Cannot read remote '{}': {e}", self.remote)),
            }
        });
    }
}

fn check_branches(context: &Context) -> Result<(), String> {
    let work = context
        .work_branch_name()
        .ok_or_else(|| "Work branch is unknown, initialize the workflow first".to_string())?;
    let target = context
        .contribute_to_branch_name()
        .ok_or_else(|| "No branch to contribute to".to_string())?;
    if work == target {
        return Err(format!(
            "Work branch '{work}' is the branch you contribute to; switch to a topic branch first"
        ));
    }
    Ok(())
}

fn validate_branches(context: &Context) -> Result<(), String> {
    let outcome = check_branches(context);
    context.update_view_state(|view| {
        view.set_stage_done(outcome.is_ok());
        if let Err(message) = &outcome {
            view.set_status_message(Some(message.clone()), true);
        }
    });
    outcome
}

fn apply_configured_message(context: &Context) -> Result<(), String> {
    let configuration = context.configuration();
    context.update_view_state(|view| {
        if let Some(title) = configuration.contribution_title {
            view.contribution_title = Some(title);
        }
        if let Some(comment) = configuration.contribution_comment {
            view.contribution_comment = Some(comment);
        }
    });
    Ok(())
}

fn compose_default_message(context: &Context) -> Result<(), String> {
    let title = context
        .work_branch_name()
        .unwrap_or_default()
        .replace(['-', '_', '/'], " ");
    let comment = context.configuration().contribution_comment;
    context.update_view_state(|view| {
        view.contribution_title = Some(title);
        view.contribution_comment = comment;
    });
    Ok(())
}

fn has_configured_title(context: &Context) -> bool {
    context.configuration().contribution_title.is_some()
}

fn record_contribution(context: &Context) -> Result<(), String> {
    let work = context.work_branch_name().unwrap_or_default();
    let target = context.contribute_to_branch_name().unwrap_or_default();
    context.set_pull_request_id(Some(format!("local:{work}")));
    context.update_view_state(|view| {
        view.set_stage_done(true);
        view.set_status_message(Some(format!("Contribution prepared: {work} -> {target}")), false);
    });
    Ok(())
}

fn record_update(context: &Context) -> Result<(), String> {
    let work = context.work_branch_name().unwrap_or_default();
    let target = context.contribute_to_branch_name().unwrap_or_default();
    context.update_view_state(|view| {
        view.set_stage_done(true);
        view.set_status_message(Some(format!("Contribution updated: {work} -> {target}")), false);
    });
    Ok(())
}

/// Strategy for projects that are not bound to a hosting service.
///
/// Everything it does is read from the working tree or the context
/// configuration, so the chains never touch the network.
pub struct LocalGitWorkflow {
    vcs: Arc<dyn VcsService>,
    remote: String,
    default_contribute_to_branch: String,
}

impl LocalGitWorkflow {
    pub fn new(vcs: Arc<dyn VcsService>, remote: impl Into<String>, default_contribute_to_branch: impl Into<String>) -> Self {
        Self {
            vcs,
            remote: remote.into(),
            default_contribute_to_branch: default_contribute_to_branch.into(),
        }
    }

    pub fn from_config(vcs: Arc<dyn VcsService>, config: &ContribConfig) -> Self {
        Self::new(
            vcs,
            config.vcs.remote_name.clone(),
            config.workflow.default_contribute_to_branch.clone(),
        )
    }
}

impl WorkflowStrategy for LocalGitWorkflow {
    fn init_chain(&self, _context: &Context) -> ChainBuilder {
        let target = self.default_contribute_to_branch.clone();
        ChainBuilder::new()
            .first(DetectWorkBranchStep {
                vcs: self.vcs.clone(),
            })
            .then(DetectOriginRepositoryStep {
                vcs: self.vcs.clone(),
                remote: self.remote.clone(),
            })
            .then_if(
                |ctx: &Context| ctx.contribute_to_branch_name().is_none(),
                FnStep::synthetic("define-contribute-to-branch", move |ctx| {
                    let target = ctx
                        .configuration()
                        .contribution_branch_name
                        .unwrap_or_else(|| target.clone());
                    ctx.set_contribute_to_branch_name(Some(target));
                    Ok(())
                }),
            )
    }

    fn creation_chain(&self, _context: &Context) -> ChainBuilder {
        ChainBuilder::new()
            .first(FnStep::synthetic("prepare-stages", |ctx| {
                ctx.update_view_state(|view| {
                    view.set_stages(CREATION_STAGES);
                    view.set_status_message(None, false);
                });
                Ok(())
            }))
            .then(FnStep::new("validate-branches", validate_branches))
            .then_chain_if_else(
                has_configured_title,
                ChainBuilder::new().first(FnStep::new("apply-configured-message", apply_configured_message)),
                ChainBuilder::new().first(FnStep::new("compose-default-message", compose_default_message)),
            )
            .then(FnStep::synthetic("finish-compose-stage", |ctx| {
                ctx.update_view_state(|view| view.set_stage_done(true));
                Ok(())
            }))
            .then(FnStep::new("record-contribution", record_contribution))
    }

    fn update_chain(&self, _context: &Context) -> ChainBuilder {
        ChainBuilder::new()
            .first(FnStep::synthetic("prepare-stages", |ctx| {
                ctx.update_view_state(|view| {
                    view.set_stages(UPDATE_STAGES);
                    view.set_status_message(None, false);
                });
                Ok(())
            }))
            .then(FnStep::new("validate-branches", validate_branches))
            .then_chain_if(
                |ctx: &Context| ctx.configuration().contribution_comment.is_some(),
                ChainBuilder::new().first(FnStep::new("apply-configured-message", apply_configured_message)),
            )
            .then(FnStep::new("record-update", record_update))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Configuration, Project, RecordingEventSink};

    fn context_on(work: &str, target: &str) -> Context {
        let context = Context::new(
            Project::new("widgets", "/projects/widgets"),
            LOCAL_HOSTING_SERVICE,
            Arc::new(RecordingEventSink::new()),
        );
        context.set_work_branch_name(Some(work.to_string()));
        context.set_contribute_to_branch_name(Some(target.to_string()));
        context.update_view_state(|view| view.set_stages(CREATION_STAGES));
        context
    }

    #[test]
    fn test_validate_branches_rejects_target_branch() {
        let context = context_on("main", "main");

        let err = validate_branches(&context).unwrap_err();

        assert!(err.contains("'main'"));
        let view = context.view_state();
        assert_eq!(view.stage_values(), vec![Some(false), None, None]);
        assert!(view.status_message().unwrap().is_error);
    }

    #[test]
    fn test_validate_branches_settles_first_stage() {
        let context = context_on("feature/login", "main");

        validate_branches(&context).unwrap();

        assert_eq!(context.view_state().stage_values(), vec![Some(true), None, None]);
    }

    #[test]
    fn test_default_title_comes_from_branch() {
        let context = context_on("feature/login-form_v2", "main");
        context.set_configuration(Configuration::default().with_comment("Closes #12"));

        compose_default_message(&context).unwrap();

        let view = context.view_state();
        assert_eq!(view.contribution_title.as_deref(), Some("feature login form v2"));
        assert_eq!(view.contribution_comment.as_deref(), Some("Closes #12"));
    }

    #[test]
    fn test_configured_message_keeps_unset_fields() {
        let context = context_on("feature/login", "main");
        context.update_view_state(|view| view.contribution_title = Some("Draft".to_string()));
        context.set_configuration(Configuration::default().with_comment("Ready for review"));

        apply_configured_message(&context).unwrap();

        let view = context.view_state();
        assert_eq!(view.contribution_title.as_deref(), Some("Draft"));
        assert_eq!(view.contribution_comment.as_deref(), Some("Ready for review"));
    }
}
