//! Research report pipeline
//!
//! Turns one research request into a multi-section markdown report while
//! streaming progress to a single consumer.
//!
//! # Module Structure
//!
//! - [`orchestrator`] - [`ResearchPipeline`] and the per-run state machine
//! - [`extraction`] - Concurrent source reading and persistence
//! - [`normalize`] / [`literal`] - Turning analyzer output into typed items
//! - [`analysis`] - Global analysis and outline
//! - [`writing`] - Parallel section writing with failure isolation
//! - [`cell`] - The writer / retriever / reviewer conversation
//! - [`assembly`] - Final markdown rendering
//! - [`progress`] - The tagged progress channel
//! - [`models`] - Shared data model
//!
//! # Stages
//!
//! | State             | Step tag            | Summary                         |
//! |-------------------|---------------------|---------------------------------|
//! | `SEARCHING`       | `searching`         | found N sources                 |
//! | `READING`         | `reading`           | extracted K of N sources        |
//! | `ANALYZING`       | `analyzing`         | outlined N sections             |
//! | `SECTION_WRITING` | `section_writing_i` | wrote D of N sections           |
//! | `ASSEMBLING`      | `assembling`        | assembled report with D of N    |

/// Global analysis and outline stage.
pub mod analysis;
/// Report assembly.
pub mod assembly;
/// Conversation cells and turn policy.
pub mod cell;
/// Reading stage.
pub mod extraction;
/// Permissive literal parser.
pub mod literal;
/// Shared data model.
pub mod models;
/// Analyzer output normalization.
pub mod normalize;
/// Run driver and pipeline builder.
pub mod orchestrator;
/// Progress channel and events.
pub mod progress;
/// Section-writing stage.
pub mod writing;

pub use analysis::Analyst;
pub use cell::{
    CellEvent, CellOutcome, ConversationCell, Participant, RejectionKind, Role, Signal, Transcript,
    TurnChunk, TurnPolicy, TurnStream,
};
pub use extraction::{ContentAnalyzer, ExtractionStage};
pub use models::{
    Analysis, ExtractedItem, ExtractedSource, OutlineSection, RunState, SearchResult,
    SectionIndex, SectionState, SectionStatus,
};
pub use normalize::{normalize, AnalyzerOutput};
pub use orchestrator::{ResearchPipeline, RunHandle, RunOutcome};
pub use progress::{EventState, ProgressEvent, ProgressReceiver, ProgressSender, Step};
pub use writing::{CellFactory, WritingStage};
