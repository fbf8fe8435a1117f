//! Section-writing stage
//!
//! Fans out one task per outline section, each driving its own
//! [`ConversationCell`], and joins all of them. Every section owns exactly one
//! preallocated [`SectionState`] slot, addressed by the section's position
//! in the outline. A task takes its slot's state by value and hands it back
//! when it finishes, and the driver writes it back at that position.
//!
//! Failures stay inside their section: participant errors, an exhausted turn
//! budget, a missed deadline and panics all mark only that slot failed.

use super::cell::{CellEvent, CellOutcome, ConversationCell, Role};
use super::models::{Analysis, OutlineSection, SectionIndex, SectionState, SectionStatus};
use super::progress::{ProgressSender, SectionEmitter, Step};
use crate::tools::RetrievalScope;
use crate::types::{AppError, Result};
use crate::utils::toml_config::WritingConfig;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Builds the conversation cell for one section.
#[async_trait]
pub trait CellFactory: Send + Sync {
    async fn build(&self, scope: &RetrievalScope, prompt: String) -> Result<ConversationCell>;
}

/// Seed prompt for one section's conversation
pub fn section_prompt(
    request: &str,
    index: SectionIndex,
    section: &OutlineSection,
    global_analysis: &str,
) -> String {
    format!(
        "Complete the following writing task.\n\n\
         User request: {}\n\n\
         Current section ({}): {}\n{}\n\n\
         Global analysis of the sources:\n{}\n\n\
         Begin writing:",
        request, index, section.title, section.description, global_analysis
    )
}

/// Marker emitted whenever a different participant starts speaking
pub fn speaker_delimiter(role: Role) -> String {
    let bar = "=".repeat(40);
    format!("{}{}{}\n", bar, role.name(), bar)
}

/// One-line tally of approved sections
pub fn summary(sections: &[SectionState]) -> String {
    let done = sections
        .iter()
        .filter(|s| s.status == SectionStatus::Done)
        .count();
    format!("wrote {} of {} sections", done, sections.len())
}

/// Writes every outline section concurrently, one conversation cell each.
pub struct WritingStage {
    factory: Arc<dyn CellFactory>,
    scope: RetrievalScope,
    config: WritingConfig,
}

impl WritingStage {
    pub fn new(factory: Arc<dyn CellFactory>, scope: RetrievalScope, config: WritingConfig) -> Self {
        Self {
            factory,
            scope,
            config,
        }
    }

    /// Write every section. Always returns one terminal slot per outline entry.
    pub async fn run(
        &self,
        request: &str,
        analysis: &Analysis,
        progress: &ProgressSender,
    ) -> Vec<SectionState> {
        let mut slots = vec![SectionState::pending(); analysis.outline.len()];

        // Every section is announced before any of them can make progress
        let tasks: Vec<SectionTask> = analysis
            .outline
            .iter()
            .enumerate()
            .map(|(position, section)| {
                let index = SectionIndex::new(position);
                if section.index != index {
                    tracing::debug!(section = %index, numbered = %section.index, "outline section renumbered");
                }
                let emitter = progress.section(Step::SectionWriting, index);
                emitter.initializing();
                SectionTask {
                    factory: Arc::clone(&self.factory),
                    scope: self.scope.clone(),
                    config: self.config.clone(),
                    prompt: section_prompt(request, index, section, &analysis.global_analysis),
                    emitter,
                }
            })
            .collect();

        let mut set = JoinSet::new();
        for task in tasks {
            let index = task.emitter.index();
            let slot = std::mem::take(&mut slots[index.position()]);
            set.spawn(async move { (index, task.run(slot).await) });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, state)) => slots[index.position()] = state,
                Err(e) => tracing::warn!(error = %e, "section task did not complete"),
            }
        }

        for (position, slot) in slots.iter_mut().enumerate() {
            if !slot.status.is_terminal() {
                let message = "Section writing failed: task did not report a result";
                slot.fail(message);
                progress
                    .section(Step::SectionWriting, SectionIndex::new(position))
                    .error(message);
            }
        }

        slots
    }
}

struct SectionTask {
    factory: Arc<dyn CellFactory>,
    scope: RetrievalScope,
    config: WritingConfig,
    prompt: String,
    emitter: SectionEmitter,
}

impl SectionTask {
    async fn run(self, mut state: SectionState) -> SectionState {
        let index = self.emitter.index();
        let attempts = self.config.section_retries + 1;

        for attempt in 1..=attempts {
            state.status = SectionStatus::Pending;
            state.error = None;

            let outcome = AssertUnwindSafe(self.attempt(&mut state))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(AppError::Task("section task panicked".to_string())));

            match outcome {
                Ok(()) => {
                    state.status = SectionStatus::Done;
                    tracing::info!(section = %index, attempt, "section approved");
                    self.emitter
                        .completed(format!("section {} approved", index));
                    return state;
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(section = %index, attempt, error = %e, "section attempt failed, retrying");
                }
                Err(e) => {
                    let message = format!("Section writing failed: {}", e);
                    tracing::warn!(section = %index, error = %e, "section failed");
                    state.fail(message.clone());
                    self.emitter.error(message);
                    return state;
                }
            }
        }

        state
    }

    /// One conversation. The streamed writer buffer outlives the timed future.
    async fn attempt(&self, state: &mut SectionState) -> Result<()> {
        let mut buffer = String::new();
        let result = match self.config.section_deadline() {
            Some(deadline) => tokio::time::timeout(deadline, self.converse(state, &mut buffer))
                .await
                .unwrap_or_else(|_| {
                    Err(AppError::Task(format!(
                        "deadline of {}s exceeded",
                        deadline.as_secs()
                    )))
                }),
            None => self.converse(state, &mut buffer).await,
        };

        if result.is_err() {
            keep_partial(state, &buffer);
        }
        result
    }

    async fn converse(&self, state: &mut SectionState, buffer: &mut String) -> Result<()> {
        let cell = self.factory.build(&self.scope, self.prompt.clone()).await?;
        let mut events = Box::pin(cell.run_stream());

        while let Some(event) = events.next().await {
            match event {
                Ok(CellEvent::SpeakerChanged(role)) => {
                    state.status = match role {
                        Role::Reviewer => SectionStatus::Reviewing,
                        _ => SectionStatus::Drafting,
                    };
                    self.emitter.generating(speaker_delimiter(role));
                }
                Ok(CellEvent::Fragment { role, text }) => {
                    if role == Role::Writer {
                        buffer.push_str(&text);
                    }
                    self.emitter.generating(text);
                }
                Ok(CellEvent::ToolSummary { summary, .. }) => {
                    self.emitter.generating(summary);
                }
                Ok(CellEvent::Message(turn)) => {
                    if turn.role == Role::Writer {
                        state.content = turn.content;
                        buffer.clear();
                    }
                }
                Ok(CellEvent::Finished { outcome, turns }) => {
                    return match outcome {
                        CellOutcome::Approved => Ok(()),
                        CellOutcome::BudgetExhausted => Err(AppError::Task(format!(
                            "no approval within {} turns",
                            turns
                        ))),
                    };
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Internal(
            "conversation ended without an outcome".to_string(),
        ))
    }
}

/// A draft cut off mid-message is still better than nothing
fn keep_partial(state: &mut SectionState, buffer: &str) {
    if state.content.is_empty() && !buffer.is_empty() {
        state.content = buffer.to_string();
    }
}
