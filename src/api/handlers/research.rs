use crate::{
    AppState,
    types::{AppError, ResearchRequest, Result},
};
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;

fn json_event(name: &str, payload: &impl Serialize) -> Event {
    match Event::default().event(name).json_data(payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(event = name, error = %e, "failed to encode SSE payload");
            Event::default().event(name).data("{}")
        }
    }
}

/// Start a research run and stream its progress
pub async fn research_stream(
    State(state): State<AppState>,
    Query(params): Query<ResearchRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let query = params
        .query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Missing 'query' parameter".to_string()))?;

    // Each run sees the config as it is right now; later reloads don't touch it
    let pipeline = state.pipeline.with_config(state.config_manager.config());
    let (run_id, mut events, task) = pipeline.start(query).into_parts();
    tracing::info!(run_id = %run_id, "research run streaming");

    let stream = async_stream::stream! {
        yield Ok(json_event("run", &json!({ "run_id": run_id })));

        while let Some(event) = events.next().await {
            yield Ok(json_event(&event.tag(), &event));
        }

        let outcome = match task.await {
            Ok(outcome) => json!({
                "run_id": outcome.run_id,
                "state": outcome.state,
                "error": outcome.error,
            }),
            Err(e) => json!({
                "run_id": run_id,
                "state": "FAILED",
                "error": format!("run driver failed: {}", e),
            }),
        };
        yield Ok(json_event("outcome", &outcome));
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
