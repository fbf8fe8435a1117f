use crate::AppState;
use crate::api::handlers;
use axum::{Router, routing::get};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Routes mounted under `/api`
pub fn create_router() -> Router<AppState> {
    Router::new().route("/research", get(handlers::research::research_stream))
}

/// The complete application: health, API routes, tracing and CORS
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", create_router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::embeddings::test_support::memory_store;
    use crate::pipeline::{Analysis, Analyst, CellFactory, ContentAnalyzer, ResearchPipeline};
    use crate::pipeline::{AnalyzerOutput, ConversationCell, ExtractedSource, SearchResult};
    use crate::tools::{RetrievalScope, Searcher};
    use crate::types::{AppError, Result};
    use crate::utils::toml_config::{ScribeConfig, ScribeConfigManager};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Unused;

    #[async_trait]
    impl Searcher for Unused {
        async fn search(&self, _: &str, _: usize) -> Result<Vec<SearchResult>> {
            Err(AppError::Search("offline".into()))
        }
    }

    #[async_trait]
    impl ContentAnalyzer for Unused {
        async fn analyze(&self, _: &str, _: &SearchResult) -> Result<AnalyzerOutput> {
            Err(AppError::LLM("offline".into()))
        }
    }

    #[async_trait]
    impl Analyst for Unused {
        async fn analyze(&self, _: &str, _: &[ExtractedSource]) -> Result<Analysis> {
            Err(AppError::LLM("offline".into()))
        }
    }

    #[async_trait]
    impl CellFactory for Unused {
        async fn build(&self, _: &RetrievalScope, _: String) -> Result<ConversationCell> {
            Err(AppError::LLM("offline".into()))
        }
    }

    fn app() -> Router {
        let config = ScribeConfig::default();
        let pipeline = ResearchPipeline::builder(Arc::new(config.clone()))
            .searcher(Arc::new(Unused))
            .analyzer(Arc::new(Unused))
            .analyst(Arc::new(Unused))
            .cell_factory(Arc::new(Unused))
            .store(Arc::new(memory_store()))
            .build()
            .unwrap();
        build_app(AppState {
            config_manager: Arc::new(ScribeConfigManager::from_config(config)),
            pipeline: Arc::new(pipeline),
        })
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = app()
            .oneshot(Request::get("/api/agents").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
