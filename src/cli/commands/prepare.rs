use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::{build_executor, init_project, wait_until_settled};
use contrib_workflow::workflow::Configuration;
use contrib_workflow::ContribConfig;

pub struct PrepareCommand {
    pub path: PathBuf,
    pub hosting_service: Option<String>,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub into: Option<String>,
}

impl PrepareCommand {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            hosting_service: None,
            title: None,
            comment: None,
            into: None,
        }
    }

    pub fn with_hosting_service(mut self, hosting_service: Option<String>) -> Self {
        self.hosting_service = hosting_service;
        self
    }

    pub fn with_message(mut self, title: Option<String>, comment: Option<String>) -> Self {
        self.title = title;
        self.comment = comment;
        self
    }

    pub fn with_target_branch(mut self, into: Option<String>) -> Self {
        self.into = into;
        self
    }

    fn configuration(&self) -> Configuration {
        Configuration {
            contribution_branch_name: self.into.clone(),
            contribution_title: self.title.clone(),
            contribution_comment: self.comment.clone(),
        }
    }

    pub async fn execute(&self, config: &ContribConfig) -> Result<()> {
        let (executor, mut events) = build_executor(config);
        let context = init_project(
            &executor,
            &mut events,
            config,
            self.hosting_service.as_deref(),
            &self.path,
        )
        .await?;

        context.set_configuration(self.configuration());
        if let Some(into) = &self.into {
            context.set_contribute_to_branch_name(Some(into.clone()));
        }

        info!(project = %context.project_name(), status = %context.status(), "Preparing contribution");
        executor.contribute(&context)?;
        wait_until_settled(
            &executor,
            &context,
            &mut events,
            Duration::from_secs(config.workflow.settle_timeout_seconds),
        )
        .await?;

        let view = context.view_state();
        for stage in view.stages() {
            let mark = match stage.done {
                Some(true) => "✅",
                Some(false) => "❌",
                None => "⏳",
            };
            println!("{mark} {}", stage.name);
        }
        if let Some(title) = &view.contribution_title {
            println!("📝 {title}");
        }
        if let Some(message) = view.status_message() {
            println!("{}", message.message);
        }
        Ok(())
    }
}
