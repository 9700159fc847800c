//! `WorkflowBackend` over the workflow service's HTTP API
//!
//! Routes, relative to the configured base URL:
//!
//! - `GET {base}/workflows/{id}/graph`
//! - `PUT {base}/workflows/{id}/graph` with the patch as JSON body
//! - `GET {base}/roles`

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use workflow_editor::{
    BackendError, GraphPatch, RoleName, SaveResponse, WorkflowBackend, WorkflowGraph, WorkflowId,
};

use crate::config::HttpBackendConfig;

/// HTTP workflow backend
pub struct HttpWorkflowBackend {
    /// HTTP client for API requests
    http_client: reqwest::Client,
    config: HttpBackendConfig,
}

impl HttpWorkflowBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BackendError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BackendError> {
        let request = match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("Workflow service answered {}: {}", status, body);
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&body)
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    fn graph_url(&self, workflow_id: WorkflowId) -> String {
        self.config.url(&format!("workflows/{}/graph", workflow_id))
    }
}

fn transport_error(error: reqwest::Error) -> BackendError {
    if error.is_timeout() {
        BackendError::Transport(format!("Request timed out: {}", error))
    } else {
        BackendError::Transport(error.to_string())
    }
}

#[async_trait]
impl WorkflowBackend for HttpWorkflowBackend {
    async fn fetch_workflow_graph(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<WorkflowGraph, BackendError> {
        log::debug!("Fetching graph of workflow {}", workflow_id);
        self.send(self.http_client.get(self.graph_url(workflow_id)))
            .await
    }

    async fn save_workflow_graph(
        &self,
        workflow_id: WorkflowId,
        patch: &GraphPatch,
    ) -> Result<SaveResponse, BackendError> {
        log::debug!(
            "Saving workflow {} ({} steps, {} transitions)",
            workflow_id,
            patch.steps.len(),
            patch.transitions.len()
        );
        self.send(self.http_client.put(self.graph_url(workflow_id)).json(patch))
            .await
    }

    async fn fetch_roles(&self) -> Result<Vec<RoleName>, BackendError> {
        self.send(self.http_client.get(self.config.url("roles")))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::get,
        Json, Router,
    };
    use workflow_editor::{
        EditorConfig, EditorSession, EntityId, GraphBuilder, InMemoryBackend, SaveOutcome,
        StepDraft,
    };

    #[derive(Clone)]
    struct ServerState {
        backend: Arc<InMemoryBackend>,
        token: Option<String>,
    }

    type HandlerError = (StatusCode, String);

    fn into_status(error: BackendError) -> HandlerError {
        match error {
            BackendError::Rejected { status, message } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                message,
            ),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }

    fn check_token(state: &ServerState, headers: &HeaderMap) -> Result<(), HandlerError> {
        let Some(token) = &state.token else {
            return Ok(());
        };
        let expected = format!("Bearer {}", token);
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some(value) if value == expected => Ok(()),
            _ => Err((StatusCode::UNAUTHORIZED, "missing token".to_string())),
        }
    }

    async fn fetch_graph(
        State(state): State<ServerState>,
        headers: HeaderMap,
        Path(id): Path<u64>,
    ) -> Result<Json<WorkflowGraph>, HandlerError> {
        check_token(&state, &headers)?;
        state
            .backend
            .fetch_workflow_graph(id)
            .await
            .map(Json)
            .map_err(into_status)
    }

    async fn save_graph(
        State(state): State<ServerState>,
        headers: HeaderMap,
        Path(id): Path<u64>,
        Json(patch): Json<GraphPatch>,
    ) -> Result<Json<SaveResponse>, HandlerError> {
        check_token(&state, &headers)?;
        state
            .backend
            .save_workflow_graph(id, &patch)
            .await
            .map(Json)
            .map_err(into_status)
    }

    async fn roles(
        State(state): State<ServerState>,
        headers: HeaderMap,
    ) -> Result<Json<Vec<RoleName>>, HandlerError> {
        check_token(&state, &headers)?;
        state.backend.fetch_roles().await.map(Json).map_err(into_status)
    }

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn start_server(backend: Arc<InMemoryBackend>, token: Option<&str>) -> SocketAddr {
        let app = Router::new()
            .route("/workflows/:id/graph", get(fetch_graph).put(save_graph))
            .route("/roles", get(roles))
            .with_state(ServerState {
                backend,
                token: token.map(str::to_string),
            });
        serve(app).await
    }

    fn client(addr: SocketAddr) -> HttpWorkflowBackend {
        HttpWorkflowBackend::new(HttpBackendConfig::new(format!("http://{}", addr))).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_graph_and_roles() {
        let graph = GraphBuilder::new()
            .start_step(1, "Draft")
            .end_step(2, "Publish")
            .transition(10, 1, 2)
            .build();
        let backend = Arc::new(
            InMemoryBackend::new()
                .with_graph(4, graph.clone())
                .with_roles(["author"]),
        );
        let addr = start_server(backend, None).await;
        let http = client(addr);

        assert_eq!(http.fetch_workflow_graph(4).await.unwrap(), graph);
        assert_eq!(http.fetch_roles().await.unwrap(), vec!["author".to_string()]);
    }

    #[tokio::test]
    async fn test_not_found_is_rejected() {
        let addr = start_server(Arc::new(InMemoryBackend::new()), None).await;
        let err = client(addr).fetch_workflow_graph(99).await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_session_saves_over_http() {
        let backend = Arc::new(InMemoryBackend::with_id_seeds(101, 501));
        let addr = start_server(backend.clone(), None).await;

        let mut session =
            EditorSession::new(1, Arc::new(client(addr)), &EditorConfig::default()).unwrap();
        let a = session.on_add_step(StepDraft::named("Draft").start()).unwrap();
        let b = session.on_add_step(StepDraft::named("Review").end()).unwrap();
        session.on_connect(a, b, Default::default()).unwrap();

        let outcome = session.save(true).await.unwrap();

        assert!(matches!(outcome, SaveOutcome::Saved(_)));
        let transition = &session.graph().transitions[0];
        assert_eq!(transition.id, EntityId::Permanent(501));
        assert_eq!(transition.from_step_id, EntityId::Permanent(101));
        assert_eq!(backend.stored_graph(1).as_ref(), Some(session.graph()));
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let backend = Arc::new(InMemoryBackend::new().with_roles(["author"]));
        let addr = start_server(backend, Some("secret")).await;

        let err = client(addr).fetch_roles().await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected { status: 401, .. }));

        let authed = HttpWorkflowBackend::new(
            HttpBackendConfig::new(format!("http://{}", addr)).with_auth_token("secret"),
        )
        .unwrap();
        assert_eq!(authed.fetch_roles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_invalid_response() {
        let app = Router::new().route("/roles", get(|| async { "not json" }));
        let addr = serve(app).await;

        let err = client(addr).fetch_roles().await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let app = Router::new().route(
            "/roles",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                "[]"
            }),
        );
        let addr = serve(app).await;

        let http = HttpWorkflowBackend::new(
            HttpBackendConfig::new(format!("http://{}", addr)).with_timeout_ms(50),
        )
        .unwrap();
        let err = http.fetch_roles().await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(addr).fetch_roles().await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }
}
