//! Status server using axum

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::{CommitmentPipeline, SessionStatus};

pub struct StatusServer {
    pipeline: Arc<CommitmentPipeline>,
}

impl StatusServer {
    pub fn new(pipeline: Arc<CommitmentPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/commitments", get(commitments))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.pipeline.clone())
    }

    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Status server listening on {}", addr);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn commitments(State(pipeline): State<Arc<CommitmentPipeline>>) -> Json<Vec<SessionStatus>> {
    Json(pipeline.sessions())
}
