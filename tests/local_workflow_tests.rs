/// Local strategy end to end: real repositories, real git2 lookups
use contrib_workflow::workflow::Configuration;
use contrib_workflow::{WorkflowEvent, WorkflowStatus, LOCAL_HOSTING_SERVICE};

mod fixtures;
use fixtures::*;

fn failure_messages(events: &[WorkflowEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            WorkflowEvent::StepFailed { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn succeeded_steps(events: &[WorkflowEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            WorkflowEvent::StepSucceeded { step, .. } => Some(step.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_init_detects_branch_and_origin() {
    let repo = GitRepoFixture::new("feature/login-form").unwrap();
    repo.add_remote("origin", "git@github.com:acme/widgets.git").unwrap();
    let (executor, sink) = local_executor();

    let context = executor.init(LOCAL_HOSTING_SERVICE, repo.project()).await.unwrap();
    settle(&executor, &context).await;

    assert_eq!(context.status(), WorkflowStatus::ReadyToCreatePr);
    assert_eq!(context.work_branch_name().as_deref(), Some("feature/login-form"));
    assert_eq!(context.contribute_to_branch_name().as_deref(), Some("main"));
    assert_eq!(context.origin_repository_owner().as_deref(), Some("acme"));
    assert_eq!(context.origin_repository_name().as_deref(), Some("widgets"));
    assert_eq!(context.upstream_repository_owner().as_deref(), Some("acme"));
    assert_eq!(
        succeeded_steps(&sink.events()),
        vec!["detect-work-branch", "detect-origin-repository"]
    );
}

#[tokio::test]
async fn test_init_without_remote_is_still_ready() {
    let repo = GitRepoFixture::new("topic").unwrap();
    let (executor, _sink) = local_executor();

    let context = executor.init(LOCAL_HOSTING_SERVICE, repo.project()).await.unwrap();
    settle(&executor, &context).await;

    assert_eq!(context.status(), WorkflowStatus::ReadyToCreatePr);
    assert_eq!(context.origin_repository_owner(), None);
}

#[tokio::test]
async fn test_init_outside_repository_invalidates_context() {
    let dir = tempfile::TempDir::new().unwrap();
    let (executor, sink) = local_executor();
    let project = contrib_workflow::Project::new("nowhere", dir.path().join("missing"));

    let context = executor.init(LOCAL_HOSTING_SERVICE, project).await.unwrap();
    settle(&executor, &context).await;

    assert!(executor.context("nowhere").is_none());
    let failures = failure_messages(&sink.events());
    assert_eq!(failures.len(), 1);
    assert!(failures[0].starts_with("Cannot determine work branch"));
}

#[tokio::test]
async fn test_creation_composes_default_message() {
    let repo = GitRepoFixture::new("feature/login-form").unwrap();
    let (executor, sink) = local_executor();
    let context = executor.init(LOCAL_HOSTING_SERVICE, repo.project()).await.unwrap();
    settle(&executor, &context).await;
    sink.clear();

    executor.contribute(&context).unwrap();
    settle(&executor, &context).await;

    assert_eq!(context.status(), WorkflowStatus::ReadyToUpdatePr);
    assert_eq!(context.pull_request_id().as_deref(), Some("local:feature/login-form"));
    let view = context.view_state();
    assert_eq!(view.contribution_title.as_deref(), Some("feature login form"));
    assert_eq!(view.stage_values(), vec![Some(true); 3]);
    assert_eq!(
        view.status_message().unwrap().message,
        "Contribution prepared: feature/login-form -> main"
    );
    assert_eq!(
        succeeded_steps(&sink.events()),
        vec!["validate-branches", "compose-default-message", "record-contribution"]
    );
}

#[tokio::test]
async fn test_creation_prefers_configured_title() {
    let repo = GitRepoFixture::new("feature/login-form").unwrap();
    let (executor, sink) = local_executor();
    let context = executor.init(LOCAL_HOSTING_SERVICE, repo.project()).await.unwrap();
    settle(&executor, &context).await;
    context.set_configuration(Configuration::default().with_title("Add login form"));
    sink.clear();

    executor.create_pull_request(&context).unwrap();
    settle(&executor, &context).await;

    assert_eq!(context.view_state().contribution_title.as_deref(), Some("Add login form"));
    assert_eq!(
        succeeded_steps(&sink.events()),
        vec!["validate-branches", "apply-configured-message", "record-contribution"]
    );
}

#[tokio::test]
async fn test_creation_from_target_branch_fails_and_reverts() {
    let repo = GitRepoFixture::new("main").unwrap();
    let (executor, sink) = local_executor();
    let context = executor.init(LOCAL_HOSTING_SERVICE, repo.project()).await.unwrap();
    settle(&executor, &context).await;
    sink.clear();

    executor.create_pull_request(&context).unwrap();
    settle(&executor, &context).await;

    assert_eq!(context.status(), WorkflowStatus::ReadyToCreatePr);
    assert_eq!(context.pull_request_id(), None);
    let failures = failure_messages(&sink.events());
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("Work branch 'main'"));
    assert!(context.view_state().status_message().unwrap().is_error);
}

#[tokio::test]
async fn test_update_after_creation() {
    let repo = GitRepoFixture::new("fix/typo").unwrap();
    let (executor, _sink) = local_executor();
    let context = executor.init(LOCAL_HOSTING_SERVICE, repo.project()).await.unwrap();
    settle(&executor, &context).await;
    executor.contribute(&context).unwrap();
    settle(&executor, &context).await;

    context.set_configuration(Configuration::default().with_comment("Addressed review"));
    repo.commit_file("NOTES.md", "review fixes\n").unwrap();
    executor.contribute(&context).unwrap();
    settle(&executor, &context).await;

    assert_eq!(context.status(), WorkflowStatus::ReadyToUpdatePr);
    assert_eq!(context.previous_status(), Some(WorkflowStatus::UpdatingPr));
    let view = context.view_state();
    assert_eq!(view.contribution_comment.as_deref(), Some("Addressed review"));
    assert_eq!(view.stage_values(), vec![Some(true); 2]);
    assert_eq!(view.status_message().unwrap().message, "Contribution updated: fix/typo -> main");
}

#[tokio::test]
async fn test_branch_switch_reinitializes_context() {
    let repo = GitRepoFixture::new("feature/one").unwrap();
    let (executor, sink) = local_executor();
    let first = executor.init(LOCAL_HOSTING_SERVICE, repo.project()).await.unwrap();
    settle(&executor, &first).await;

    let same = executor.init(LOCAL_HOSTING_SERVICE, repo.project()).await.unwrap();
    assert!(same.ptr_eq(&first));
    assert!(sink
        .events()
        .iter()
        .any(|event| matches!(event, WorkflowEvent::CurrentContextUnchanged { .. })));

    repo.checkout_new_branch("feature/two").unwrap();
    let second = executor.init(LOCAL_HOSTING_SERVICE, repo.project()).await.unwrap();
    settle(&executor, &second).await;

    assert!(!second.ptr_eq(&first));
    assert_eq!(second.work_branch_name().as_deref(), Some("feature/two"));
    assert_eq!(second.status(), WorkflowStatus::ReadyToCreatePr);
}
