//! End-to-end runs of the research pipeline with scripted collaborators.

mod common;

use common::mocks::{
    RecordingStore, ScriptedCellFactory, StubAnalyst, StubAnalyzer, StubSearcher, happy_pipeline,
    pipeline_with,
};
use scribe::pipeline::{EventState, ProgressEvent, RunState, SectionStatus, Step};
use std::collections::HashSet;
use std::sync::Arc;

async fn run_to_end(
    pipeline: &scribe::ResearchPipeline,
    request: &str,
) -> (Vec<ProgressEvent>, scribe::RunOutcome) {
    let handle = pipeline.start(request);
    let (_, events, task) = handle.into_parts();
    let events = events.collect_all().await;
    let outcome = task.await.expect("run driver finished");
    (events, outcome)
}

fn positions(events: &[ProgressEvent], step: Step, state: EventState) -> Vec<usize> {
    events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.step == step && e.index.is_none() && e.state == state)
        .map(|(i, _)| i)
        .collect()
}

#[tokio::test]
async fn test_happy_path_reaches_done() {
    let pipeline = happy_pipeline(3, 2);

    let (events, outcome) = run_to_end(&pipeline, "sparse attention survey").await;

    assert_eq!(outcome.state, RunState::Done);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.sections.len(), 2);
    assert!(outcome.sections.iter().all(|s| s.status == SectionStatus::Done));

    let report = outcome.report.expect("report assembled");
    assert!(report.starts_with("# sparse attention survey"));
    assert!(report.contains("Draft for (1): Part 1"));
    assert!(report.contains("Draft for (2): Part 2"));

    let expected = [
        (Step::Searching, "found 3 sources"),
        (Step::Reading, "extracted 3 of 3 sources"),
        (Step::Analyzing, "outlined 2 sections"),
        (Step::SectionWriting, "wrote 2 of 2 sections"),
        (Step::Assembling, "assembled report with 2 of 2 sections"),
    ];
    let mut last = 0;
    for (step, summary) in expected {
        let init = positions(&events, step, EventState::Initializing);
        let done = positions(&events, step, EventState::Completed);
        assert_eq!(init.len(), 1, "{} announced once", step);
        assert_eq!(done.len(), 1, "{} completed once", step);
        assert!(init[0] >= last && done[0] > init[0], "{} out of order", step);
        assert_eq!(events[done[0]].data.as_deref(), Some(summary));
        last = done[0];
    }
}

#[tokio::test]
async fn test_zero_search_results_fails_before_analysis() {
    let pipeline = happy_pipeline(0, 2);

    let (events, outcome) = run_to_end(&pipeline, "nothing to find").await;

    assert_eq!(outcome.state, RunState::Failed);
    assert!(outcome.report.is_none());

    let searched = positions(&events, Step::Searching, EventState::Completed);
    assert_eq!(events[searched[0]].data.as_deref(), Some("found 0 sources"));

    let errors: Vec<&ProgressEvent> = events
        .iter()
        .filter(|e| e.state == EventState::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].step, Step::Reading);
    assert!(errors[0].data.as_deref().unwrap().contains("no search results"));

    assert!(events.iter().all(|e| e.step != Step::Analyzing));
    assert!(!events.iter().any(|e| e.step == Step::Reading
        && e.state == EventState::Completed));
}

#[tokio::test]
async fn test_search_failure_is_reported() {
    let pipeline = pipeline_with(
        Arc::new(StubSearcher::failing()),
        Arc::new(StubAnalyzer::new()),
        Arc::new(StubAnalyst::with_sections(1)),
        Arc::new(ScriptedCellFactory::new()),
        Arc::new(RecordingStore::new()),
    );

    let (events, outcome) = run_to_end(&pipeline, "offline").await;

    assert_eq!(outcome.state, RunState::Failed);
    let last = events.last().unwrap();
    assert_eq!(last.step, Step::Searching);
    assert_eq!(last.state, EventState::Error);
    assert!(outcome.error.unwrap().contains("search provider unavailable"));
}

#[tokio::test]
async fn test_failing_section_is_isolated() {
    let cells = Arc::new(ScriptedCellFactory::failing(&[3]));
    let pipeline = pipeline_with(
        Arc::new(StubSearcher::with_results(2)),
        Arc::new(StubAnalyzer::new()),
        Arc::new(StubAnalyst::with_sections(5)),
        cells.clone(),
        Arc::new(RecordingStore::new()),
    );

    let (events, outcome) = run_to_end(&pipeline, "isolation").await;

    assert_eq!(outcome.state, RunState::Done);
    assert_eq!(outcome.sections.len(), 5);
    for (i, section) in outcome.sections.iter().enumerate() {
        if i == 2 {
            assert_eq!(section.status, SectionStatus::Failed);
            let error = section.error.as_deref().unwrap();
            assert!(error.starts_with("Section writing failed: "), "{}", error);
        } else {
            assert_eq!(section.status, SectionStatus::Done, "section {}", i + 1);
        }
    }

    let section_errors: Vec<&ProgressEvent> = events
        .iter()
        .filter(|e| e.step == Step::SectionWriting && e.state == EventState::Error)
        .collect();
    assert_eq!(section_errors.len(), 1);
    assert_eq!(section_errors[0].tag(), "section_writing_3");

    let done = positions(&events, Step::SectionWriting, EventState::Completed);
    assert_eq!(events[done[0]].data.as_deref(), Some("wrote 4 of 5 sections"));

    let report = outcome.report.unwrap();
    assert!(report.contains("Section unavailable"));
    assert_eq!(cells.prompts.lock().len(), 5);
}

#[tokio::test]
async fn test_section_events_use_one_based_numbers() {
    let pipeline = happy_pipeline(1, 4);

    let (events, outcome) = run_to_end(&pipeline, "numbering").await;
    assert_eq!(outcome.state, RunState::Done);

    let mut seen = HashSet::new();
    for event in events.iter().filter(|e| e.index.is_some()) {
        let k = event.index.unwrap();
        assert_ne!(k, 0, "no section event carries index 0");
        let section = event.section().unwrap();
        assert_eq!(section.position(), k - 1);
        assert_eq!(event.tag(), format!("section_writing_{}", k));
        seen.insert(k);
    }
    assert_eq!(seen, HashSet::from([1, 2, 3, 4]));
}

#[tokio::test]
async fn test_all_section_initializations_precede_any_progress() {
    let pipeline = happy_pipeline(1, 3);

    let (events, _) = run_to_end(&pipeline, "ordering").await;

    let section_events: Vec<&ProgressEvent> =
        events.iter().filter(|e| e.index.is_some()).collect();
    let first_other = section_events
        .iter()
        .position(|e| e.state != EventState::Initializing)
        .unwrap();
    assert_eq!(first_other, 3);
    assert!(section_events[3..]
        .iter()
        .all(|e| e.state != EventState::Initializing));
}

#[tokio::test]
async fn test_every_section_ends_terminal_exactly_once() {
    let pipeline = pipeline_with(
        Arc::new(StubSearcher::with_results(1)),
        Arc::new(StubAnalyzer::new()),
        Arc::new(StubAnalyst::with_sections(4)),
        Arc::new(ScriptedCellFactory::failing(&[1, 4])),
        Arc::new(RecordingStore::new()),
    );

    let (events, outcome) = run_to_end(&pipeline, "terminal").await;

    for k in 1..=4 {
        let terminal = events
            .iter()
            .filter(|e| e.index == Some(k))
            .filter(|e| matches!(e.state, EventState::Completed | EventState::Error))
            .count();
        assert_eq!(terminal, 1, "section {}", k);
    }
    assert!(outcome.sections.iter().all(|s| s.status.is_terminal()));
}

#[tokio::test]
async fn test_ephemeral_store_is_deleted_when_run_ends() {
    let store = Arc::new(RecordingStore::new());
    let pipeline = pipeline_with(
        Arc::new(StubSearcher::with_results(3)),
        Arc::new(StubAnalyzer::new()),
        Arc::new(StubAnalyst::with_sections(1)),
        Arc::new(ScriptedCellFactory::new()),
        store.clone(),
    );

    let (_, outcome) = run_to_end(&pipeline, "cleanup").await;
    assert_eq!(outcome.state, RunState::Done);

    let created = store.created.lock().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(*store.deleted.lock(), created);
}

#[tokio::test]
async fn test_unreadable_source_is_skipped() {
    let pipeline = pipeline_with(
        Arc::new(StubSearcher::with_results(3)),
        Arc::new(StubAnalyzer::failing_on("Paper 1")),
        Arc::new(StubAnalyst::with_sections(1)),
        Arc::new(ScriptedCellFactory::new()),
        Arc::new(RecordingStore::new()),
    );

    let (events, outcome) = run_to_end(&pipeline, "partial reading").await;

    assert_eq!(outcome.state, RunState::Done);
    let read = positions(&events, Step::Reading, EventState::Completed);
    assert_eq!(events[read[0]].data.as_deref(), Some("extracted 2 of 3 sources"));
    let report = outcome.report.unwrap();
    assert!(report.contains("Paper 0"));
    assert!(!report.contains("[Paper 1]"));
}

#[tokio::test]
async fn test_runs_are_independent() {
    let pipeline = happy_pipeline(2, 2);

    let first = pipeline.start("first request");
    let second = pipeline.start("second request");
    assert_ne!(first.run_id, second.run_id);

    let (_, first_events, first_task) = first.into_parts();
    let (_, second_events, second_task) = second.into_parts();
    let (a, b) = tokio::join!(first_events.collect_all(), second_events.collect_all());

    assert_eq!(first_task.await.unwrap().state, RunState::Done);
    assert_eq!(second_task.await.unwrap().state, RunState::Done);
    assert_eq!(a.len(), b.len());
}
