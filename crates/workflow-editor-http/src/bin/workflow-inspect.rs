//! Fetch a workflow from the service, lay it out and print what the editor would show
//!
//! Usage: `workflow-inspect <base-url> <workflow-id> [editor-config.json]`
//!
//! A bearer token is read from `WORKFLOW_API_TOKEN` when set.

use std::path::PathBuf;
use std::sync::Arc;

use workflow_editor::{ConfigError, EditorConfig, EditorError, EditorSession, WorkflowId};
use workflow_editor_http::{HttpBackendConfig, HttpWorkflowBackend};

#[derive(Debug, thiserror::Error)]
enum InspectError {
    #[error("usage: workflow-inspect <base-url> <workflow-id> [editor-config.json]")]
    Usage,
    #[error("invalid workflow id '{0}'")]
    WorkflowId(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

struct Args {
    base_url: String,
    workflow_id: WorkflowId,
    config_path: Option<PathBuf>,
}

fn parse_args() -> Result<Args, InspectError> {
    let mut args = std::env::args().skip(1);
    let base_url = args.next().ok_or(InspectError::Usage)?;
    let raw_id = args.next().ok_or(InspectError::Usage)?;
    let workflow_id = raw_id
        .parse()
        .map_err(|_| InspectError::WorkflowId(raw_id.clone()))?;

    Ok(Args {
        base_url,
        workflow_id,
        config_path: args.next().map(PathBuf::from),
    })
}

async fn run() -> Result<(), InspectError> {
    let args = parse_args()?;

    let config = match &args.config_path {
        Some(path) => EditorConfig::load(path).await?,
        None => EditorConfig::default(),
    };

    let mut backend_config = HttpBackendConfig::new(args.base_url);
    if let Ok(token) = std::env::var("WORKFLOW_API_TOKEN") {
        backend_config = backend_config.with_auth_token(token);
    }
    let backend = HttpWorkflowBackend::new(backend_config).map_err(EditorError::from)?;

    let session = EditorSession::open(args.workflow_id, Arc::new(backend), &config).await?;
    let report = session.validate();
    for warning in report.warning_messages() {
        log::warn!("{}", warning);
    }
    for error in report.error_messages() {
        log::error!("{}", error);
    }

    let output = serde_json::json!({
        "workflowId": args.workflow_id,
        "projection": session.projection(),
        "validation": report,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
