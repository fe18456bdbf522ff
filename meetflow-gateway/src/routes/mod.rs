//! Axum router construction.
//!
//! [`build`] assembles every gateway route plus the CORS, tracing and body
//! limit layers. Uploads are size-checked by the engine while streaming,
//! so axum's default body limit is disabled.

mod download;
mod health;
mod progress;
mod root;
mod tasks;
mod upload;

use crate::config::GatewayConfig;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the complete router.
pub fn build(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .route("/", get(root::index))
        .route("/uploadfile/", post(upload::upload_file))
        .route("/progress/stream/{task_id}", get(progress::stream_progress))
        .route("/progress/{task_id}", post(progress::report_progress))
        .route("/tasks/{task_id}", get(tasks::get_task))
        .route("/healthcheck", get(health::healthcheck))
        .route("/download/{task_id}/{category}", get(download::download))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_headers(Any).allow_methods(Any);
    let Some(origins) = &config.frontend_origins else {
        return cors.allow_origin(Any);
    };
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::build;
    use crate::config::GatewayConfig;
    use crate::state::AppState;
    use axum::body::Body;
    use axum::http::{header, Request, Response};
    use axum::Router;
    use meetflow::events::NoOpEventSink;
    use meetflow::pipeline::Orchestrator;
    use meetflow::testing::{script_healthy_pipeline, test_config, ScriptedTransport};
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::TempDir;

    pub const BOUNDARY: &str = "meetflow-test-boundary";

    pub struct TestApp {
        pub _tmp: TempDir,
        pub router: Router,
        pub state: AppState,
        pub transport: Arc<ScriptedTransport>,
    }

    pub fn app() -> TestApp {
        app_with(|c| c)
    }

    pub fn app_with(
        configure: impl FnOnce(meetflow::config::PipelineConfig) -> meetflow::config::PipelineConfig,
    ) -> TestApp {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = configure(test_config(tmp.path().join("data")));
        let transport = Arc::new(ScriptedTransport::new());
        script_healthy_pipeline(&transport, &pipeline);

        let config = GatewayConfig {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            frontend_origins: None,
            pipeline: pipeline.clone(),
        };
        let orchestrator = Orchestrator::builder(pipeline, transport.clone())
            .with_event_sink(Arc::new(NoOpEventSink))
            .build();
        let state = AppState::new(config, orchestrator);
        TestApp {
            _tmp: tmp,
            router: build(state.clone()),
            state,
            transport,
        }
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub fn multipart_upload(field: &str, file_name: &str, content: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/uploadfile/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    pub async fn body_json(response: Response<Body>) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }
}
