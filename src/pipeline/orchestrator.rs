//! Pipeline orchestrator
//!
//! Drives one [`Run`] through
//! `SEARCHING -> READING -> ANALYZING -> SECTION_WRITING -> ASSEMBLING -> DONE`,
//! or to `FAILED` as soon as a stage cannot continue. Every stage announces
//! itself with an `initializing` event and ends with either `completed` and a
//! summary or `error`.
//!
//! # Example
//!
//! ```rust,ignore
//! let pipeline = ResearchPipeline::builder(config)
//!     .searcher(Arc::new(DaedraSearcher::new()))
//!     .analyzer(analyzer)
//!     .analyst(analyst)
//!     .cell_factory(cells)
//!     .store(store)
//!     .build()?;
//!
//! let mut handle = pipeline.start("survey of retrieval-augmented generation");
//! while let Some(event) = handle.events.recv().await {
//!     println!("{} {:?}", event.tag(), event.state);
//! }
//! let outcome = handle.join().await?;
//! ```

use super::analysis::{self, Analyst};
use super::assembly;
use super::extraction::{ContentAnalyzer, ExtractionStage};
use super::models::{Run, RunState, SectionState};
use super::progress::{channel, ProgressReceiver, ProgressSender, Step};
use super::writing::{self, CellFactory, WritingStage};
use crate::knowledge::{KnowledgeStore, StoreId};
use crate::tools::{RetrievalScope, Searcher};
use crate::types::{AppError, Result};
use crate::utils::toml_config::ScribeConfig;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Final state of a run, returned once it is terminal.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub state: RunState,
    pub report: Option<String>,
    pub sections: Vec<SectionState>,
    pub error: Option<String>,
}

/// Handle to a started run: its progress stream and its driver task.
pub struct RunHandle {
    pub run_id: String,
    pub events: ProgressReceiver,
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Wait for the run to reach a terminal state
    pub async fn join(self) -> Result<RunOutcome> {
        self.task
            .await
            .map_err(|e| AppError::Task(format!("run driver failed: {}", e)))
    }

    /// Run id, event receiver and driver task
    pub fn into_parts(self) -> (String, ProgressReceiver, JoinHandle<RunOutcome>) {
        (self.run_id, self.events, self.task)
    }
}

/// Runs research requests end to end. Cheap to clone.
#[derive(Clone)]
pub struct ResearchPipeline {
    config: Arc<ScribeConfig>,
    searcher: Arc<dyn Searcher>,
    analyzer: Arc<dyn ContentAnalyzer>,
    analyst: Arc<dyn Analyst>,
    cell_factory: Arc<dyn CellFactory>,
    store: Arc<dyn KnowledgeStore>,
    corpus: Option<StoreId>,
}

impl ResearchPipeline {
    pub fn builder(config: Arc<ScribeConfig>) -> ResearchPipelineBuilder {
        ResearchPipelineBuilder::new(config)
    }

    pub fn config(&self) -> &Arc<ScribeConfig> {
        &self.config
    }

    /// Same collaborators, different config snapshot
    pub fn with_config(&self, config: Arc<ScribeConfig>) -> Self {
        Self {
            config,
            ..self.clone()
        }
    }

    /// Start a run in the background and return immediately.
    ///
    /// The progress receiver exists before the driver task is spawned, so no
    /// event is ever emitted without a consumer attached.
    pub fn start(&self, request: impl Into<String>) -> RunHandle {
        let run_id = Uuid::new_v4().to_string();
        let (progress, events) = channel(run_id.clone());

        let driver = RunDriver {
            pipeline: self.clone(),
            run: Run::new(request, progress),
            ephemeral: None,
        };
        let task = tokio::spawn(driver.drive());

        RunHandle {
            run_id,
            events,
            task,
        }
    }
}

/// Collects the collaborators of a [`ResearchPipeline`].
pub struct ResearchPipelineBuilder {
    config: Arc<ScribeConfig>,
    searcher: Option<Arc<dyn Searcher>>,
    analyzer: Option<Arc<dyn ContentAnalyzer>>,
    analyst: Option<Arc<dyn Analyst>>,
    cell_factory: Option<Arc<dyn CellFactory>>,
    store: Option<Arc<dyn KnowledgeStore>>,
    corpus: Option<StoreId>,
}

impl ResearchPipelineBuilder {
    pub fn new(config: Arc<ScribeConfig>) -> Self {
        Self {
            config,
            searcher: None,
            analyzer: None,
            analyst: None,
            cell_factory: None,
            store: None,
            corpus: None,
        }
    }

    pub fn searcher(mut self, searcher: Arc<dyn Searcher>) -> Self {
        self.searcher = Some(searcher);
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn ContentAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn analyst(mut self, analyst: Arc<dyn Analyst>) -> Self {
        self.analyst = Some(analyst);
        self
    }

    pub fn cell_factory(mut self, factory: Arc<dyn CellFactory>) -> Self {
        self.cell_factory = Some(factory);
        self
    }

    pub fn store(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Long-lived index queried alongside each run's extracted sources
    pub fn corpus(mut self, corpus: Option<StoreId>) -> Self {
        self.corpus = corpus;
        self
    }

    /// Fails if any required collaborator is missing
    pub fn build(self) -> Result<ResearchPipeline> {
        fn missing(name: &str) -> AppError {
            AppError::Configuration(format!("research pipeline is missing its {}", name))
        }

        Ok(ResearchPipeline {
            config: self.config,
            searcher: self.searcher.ok_or_else(|| missing("searcher"))?,
            analyzer: self.analyzer.ok_or_else(|| missing("content analyzer"))?,
            analyst: self.analyst.ok_or_else(|| missing("analyst"))?,
            cell_factory: self.cell_factory.ok_or_else(|| missing("cell factory"))?,
            store: self.store.ok_or_else(|| missing("knowledge store"))?,
            corpus: self.corpus,
        })
    }
}

/// Report a stage failure on the channel and pass the error on
fn check<T>(progress: &ProgressSender, step: Step, result: Result<T>) -> Result<T> {
    result.map_err(|e| {
        progress.error(step, e.to_string());
        match e {
            AppError::StageFatal { .. } => e,
            other => AppError::stage_fatal(step.as_str(), other.to_string()),
        }
    })
}

struct RunDriver {
    pipeline: ResearchPipeline,
    run: Run,
    ephemeral: Option<StoreId>,
}

impl RunDriver {
    async fn drive(mut self) -> RunOutcome {
        let progress = self.run.progress.clone();
        tracing::info!(run_id = %self.run.id, request = %self.run.request, "run started");

        let error = match self.execute(&progress).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(run_id = %self.run.id, stage = %self.run.state, error = %e, "run failed");
                if let Err(transition) = self.run.advance(RunState::Failed) {
                    tracing::warn!(run_id = %self.run.id, error = %transition, "could not mark run failed");
                }
                Some(e.to_string())
            }
        };

        self.release_store().await;
        tracing::info!(run_id = %self.run.id, state = %self.run.state, "run finished");

        RunOutcome {
            run_id: self.run.id,
            state: self.run.state,
            report: self.run.report,
            sections: self.run.sections,
            error,
        }
    }

    fn enter(&mut self, state: RunState, step: Step, progress: &ProgressSender) -> Result<()> {
        self.run.advance(state)?;
        tracing::info!(run_id = %self.run.id, stage = %state, "entering stage");
        progress.initializing(step);
        Ok(())
    }

    async fn execute(&mut self, progress: &ProgressSender) -> Result<()> {
        self.search(progress).await?;
        self.read(progress).await?;
        self.analyze(progress).await?;
        self.write_sections(progress).await?;
        self.assemble(progress)?;
        self.run.advance(RunState::Done)
    }

    async fn search(&mut self, progress: &ProgressSender) -> Result<()> {
        self.enter(RunState::Searching, Step::Searching, progress)?;

        let searcher = Arc::clone(&self.pipeline.searcher);
        let max_results = self.pipeline.config.search.max_results;
        let results = check(
            progress,
            Step::Searching,
            searcher.search(&self.run.request, max_results).await,
        )?;

        progress.completed(Step::Searching, format!("found {} sources", results.len()));
        self.run.search_results = results;
        Ok(())
    }

    async fn read(&mut self, progress: &ProgressSender) -> Result<()> {
        self.enter(RunState::Reading, Step::Reading, progress)?;

        if self.run.search_results.is_empty() {
            return check(
                progress,
                Step::Reading,
                Err(AppError::stage_fatal("reading", "no search results to read")),
            );
        }

        let stage = ExtractionStage::new(
            Arc::clone(&self.pipeline.analyzer),
            Arc::clone(&self.pipeline.store),
            self.pipeline.config.embedding.clone(),
        );
        let outcome = stage
            .run(&self.run.request, &self.run.search_results, progress)
            .await;

        progress.completed(Step::Reading, outcome.summary());
        self.ephemeral = outcome.store;
        self.run.extracted = outcome.extracted;
        Ok(())
    }

    async fn analyze(&mut self, progress: &ProgressSender) -> Result<()> {
        self.enter(RunState::Analyzing, Step::Analyzing, progress)?;

        let analyst = Arc::clone(&self.pipeline.analyst);
        let analysis = check(
            progress,
            Step::Analyzing,
            analysis::analyze(analyst.as_ref(), &self.run.request, &self.run.extracted).await,
        )?;

        progress.completed(
            Step::Analyzing,
            format!("outlined {} sections", analysis.outline.len()),
        );
        self.run.analysis = Some(analysis);
        Ok(())
    }

    async fn write_sections(&mut self, progress: &ProgressSender) -> Result<()> {
        self.enter(RunState::SectionWriting, Step::SectionWriting, progress)?;

        let analysis = check(
            progress,
            Step::SectionWriting,
            self.run
                .analysis
                .as_ref()
                .ok_or_else(|| AppError::Internal("section writing without an analysis".into())),
        )?;

        let config = &self.pipeline.config;
        let scope = RetrievalScope {
            store: Arc::clone(&self.pipeline.store),
            ephemeral: self.ephemeral.clone(),
            corpus: self.pipeline.corpus.clone(),
            knowledge: config.knowledge.clone(),
        };
        let stage = WritingStage::new(
            Arc::clone(&self.pipeline.cell_factory),
            scope,
            config.writing.clone(),
        );
        let sections = stage.run(&self.run.request, analysis, progress).await;

        progress.completed(Step::SectionWriting, writing::summary(&sections));
        self.run.sections = sections;
        Ok(())
    }

    fn assemble(&mut self, progress: &ProgressSender) -> Result<()> {
        self.enter(RunState::Assembling, Step::Assembling, progress)?;

        let analysis = check(
            progress,
            Step::Assembling,
            self.run
                .analysis
                .as_ref()
                .ok_or_else(|| AppError::Internal("assembly without an analysis".into())),
        )?;
        let report = assembly::assemble(
            &self.run.request,
            analysis,
            &self.run.sections,
            &self.run.extracted,
        );

        progress.generating(Step::Assembling, report.markdown.clone());
        progress.completed(Step::Assembling, report.summary());
        self.run.report = Some(report.markdown);
        Ok(())
    }

    /// The ephemeral store lives exactly as long as its run
    async fn release_store(&mut self) {
        if let Some(store_id) = self.ephemeral.take() {
            if let Err(e) = self.pipeline.store.delete_store(&store_id).await {
                tracing::warn!(run_id = %self.run.id, store = %store_id, error = %e, "failed to delete ephemeral store");
            }
        }
    }
}
