use anyhow::Result;
use std::path::PathBuf;

use super::{build_executor, init_project};
use contrib_workflow::ContribConfig;

pub struct InspectCommand {
    pub path: PathBuf,
    pub hosting_service: Option<String>,
}

impl InspectCommand {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            hosting_service: None,
        }
    }

    pub fn with_hosting_service(mut self, hosting_service: Option<String>) -> Self {
        self.hosting_service = hosting_service;
        self
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

        println!("{}", serde_json::to_string_pretty(&context.snapshot())?);
        Ok(())
    }
}
