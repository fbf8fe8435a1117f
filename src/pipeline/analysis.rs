//! Analysis stage: one global analysis plus the report outline.

use super::models::{Analysis, ExtractedSource, OutlineSection};
use crate::types::{AppError, Result};
use async_trait::async_trait;

/// Turns the extracted sources into a global analysis and an outline.
#[async_trait]
pub trait Analyst: Send + Sync {
    /// Analyze the extracted sources and propose an ordered outline
    async fn analyze(&self, request: &str, sources: &[ExtractedSource]) -> Result<Analysis>;
}

/// Call the analyst and check the outline is usable.
///
/// Section indices are reassigned from outline order so slot `i` always
/// belongs to the `i`-th section. An outline with no titled sections ends
/// the run.
pub async fn analyze(
    analyst: &dyn Analyst,
    request: &str,
    sources: &[ExtractedSource],
) -> Result<Analysis> {
    let analysis = analyst
        .analyze(request, sources)
        .await
        .map_err(|e| AppError::stage_fatal("analyzing", e.to_string()))?;

    let outline: Vec<OutlineSection> = analysis
        .outline
        .into_iter()
        .filter(|section| !section.title.trim().is_empty())
        .enumerate()
        .map(|(i, section)| {
            OutlineSection::new(i, section.title.trim(), section.description.trim())
        })
        .collect();

    if outline.is_empty() {
        return Err(AppError::stage_fatal(
            "analyzing",
            "the analysis produced an empty outline",
        ));
    }

    Ok(Analysis {
        global_analysis: analysis.global_analysis,
        outline,
    })
}
