//! Progress Channel
//!
//! One ordered, tagged, multi-producer/single-consumer event stream per run.
//! Producers hold cheap [`ProgressSender`] clones; the single consumer holds
//! the [`ProgressReceiver`], which is also a [`futures::Stream`].
//!
//! Ordering is guaranteed per producer only. Every event carries its step and,
//! for section events, the 1-based section number, so the consumer can split
//! the interleaved stream back into per-section streams.
//!
//! A closed receiver never fails a producer: emits are dropped with a debug
//! log. The stream ends once every sender is gone, which happens when the run
//! reaches a terminal state.

use super::models::SectionIndex;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Pipeline step an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Searching,
    Reading,
    Analyzing,
    SectionWriting,
    Assembling,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Searching => "searching",
            Step::Reading => "reading",
            Step::Analyzing => "analyzing",
            Step::SectionWriting => "section_writing",
            Step::Assembling => "assembling",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a step or section is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventState {
    Initializing,
    Generating,
    Completed,
    Error,
}

/// A single progress message. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: Step,
    /// 1-based section number for section events
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub index: Option<usize>,
    pub state: EventState,
    pub data: Option<String>,
}

impl ProgressEvent {
    pub fn new(step: Step, state: EventState, data: Option<String>) -> Self {
        Self {
            step,
            index: None,
            state,
            data,
        }
    }

    pub fn for_section(
        step: Step,
        section: SectionIndex,
        state: EventState,
        data: Option<String>,
    ) -> Self {
        Self {
            step,
            index: Some(section.external()),
            state,
            data,
        }
    }

    /// Flat tag such as `reading` or `section_writing_3`
    pub fn tag(&self) -> String {
        match self.index {
            Some(index) => format!("{}_{}", self.step, index),
            None => self.step.to_string(),
        }
    }

    /// Outline position of a section event
    pub fn section(&self) -> Option<SectionIndex> {
        self.index.and_then(SectionIndex::from_external)
    }
}

/// Create the channel for one run
pub fn channel(run_id: impl Into<String>) -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSender {
            tx,
            run_id: Arc::from(run_id.into()),
        },
        ProgressReceiver { rx },
    )
}

/// Producer handle. Clone one per task.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    run_id: Arc<str>,
}

impl ProgressSender {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append an event. Never fails; a gone consumer only loses the event.
    pub fn emit(&self, event: ProgressEvent) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            tracing::debug!(
                run_id = %self.run_id,
                tag = %event.tag(),
                "progress consumer gone, dropping event"
            );
        }
    }

    pub fn initializing(&self, step: Step) {
        self.emit(ProgressEvent::new(step, EventState::Initializing, None));
    }

    pub fn generating(&self, step: Step, data: impl Into<String>) {
        self.emit(ProgressEvent::new(
            step,
            EventState::Generating,
            Some(data.into()),
        ));
    }

    pub fn completed(&self, step: Step, summary: impl Into<String>) {
        self.emit(ProgressEvent::new(
            step,
            EventState::Completed,
            Some(summary.into()),
        ));
    }

    pub fn error(&self, step: Step, message: impl Into<String>) {
        self.emit(ProgressEvent::new(
            step,
            EventState::Error,
            Some(message.into()),
        ));
    }

    /// Emitter bound to one section; every event it sends carries the
    /// section's 1-based number.
    pub fn section(&self, step: Step, index: SectionIndex) -> SectionEmitter {
        SectionEmitter {
            sender: self.clone(),
            step,
            index,
        }
    }

    /// True once the receiver is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Producer handle scoped to one section task.
#[derive(Debug, Clone)]
pub struct SectionEmitter {
    sender: ProgressSender,
    step: Step,
    index: SectionIndex,
}

impl SectionEmitter {
    pub fn index(&self) -> SectionIndex {
        self.index
    }

    fn send(&self, state: EventState, data: Option<String>) {
        self.sender
            .emit(ProgressEvent::for_section(self.step, self.index, state, data));
    }

    pub fn initializing(&self) {
        self.send(EventState::Initializing, None);
    }

    pub fn generating(&self, data: impl Into<String>) {
        self.send(EventState::Generating, Some(data.into()));
    }

    pub fn completed(&self, summary: impl Into<String>) {
        self.send(EventState::Completed, Some(summary.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(EventState::Error, Some(message.into()));
    }
}

/// Single consumer end of a run's progress channel.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Next event, or `None` once the run has finished and all senders dropped
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Drain every remaining event until the channel closes
    pub async fn collect_all(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

impl Stream for ProgressReceiver {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_event_tags() {
        let stage = ProgressEvent::new(Step::Reading, EventState::Initializing, None);
        assert_eq!(stage.tag(), "reading");

        let section = ProgressEvent::for_section(
            Step::SectionWriting,
            SectionIndex::new(2),
            EventState::Generating,
            Some("text".into()),
        );
        assert_eq!(section.tag(), "section_writing_3");
        assert_eq!(section.section(), Some(SectionIndex::new(2)));
    }

    #[test]
    fn test_event_json_shape() {
        let event = ProgressEvent::for_section(
            Step::SectionWriting,
            SectionIndex::new(0),
            EventState::Error,
            Some("boom".into()),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "step": "section_writing",
                "index": 1,
                "state": "error",
                "data": "boom"
            })
        );

        let stage = serde_json::to_value(ProgressEvent::new(
            Step::Searching,
            EventState::Initializing,
            None,
        ))
        .unwrap();
        assert!(stage.get("index").is_none());
        assert!(stage["data"].is_null());
    }

    #[tokio::test]
    async fn test_emit_after_consumer_dropped_does_not_panic() {
        let (tx, rx) = channel("run-1");
        drop(rx);

        assert!(tx.is_closed());
        tx.initializing(Step::Searching);
        tx.section(Step::SectionWriting, SectionIndex::new(0))
            .generating("ignored");
    }

    #[tokio::test]
    async fn test_stream_ends_when_senders_dropped() {
        let (tx, rx) = channel("run-1");
        let section = tx.section(Step::SectionWriting, SectionIndex::new(1));
        tx.initializing(Step::SectionWriting);
        section.generating("hello");
        drop(tx);
        drop(section);

        let events: Vec<ProgressEvent> = rx.collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].index, Some(2));
    }

    #[tokio::test]
    async fn test_per_producer_order_preserved_across_tasks() {
        let (tx, rx) = channel("run-1");

        let mut handles = Vec::new();
        for i in 0..4 {
            let emitter = tx.section(Step::SectionWriting, SectionIndex::new(i));
            handles.push(tokio::spawn(async move {
                for n in 0..50 {
                    emitter.generating(n.to_string());
                    tokio::task::yield_now().await;
                }
            }));
        }
        drop(tx);
        for handle in handles {
            handle.await.unwrap();
        }

        let events = rx.collect_all().await;
        assert_eq!(events.len(), 200);
        for i in 1..=4 {
            let seq: Vec<String> = events
                .iter()
                .filter(|e| e.index == Some(i))
                .filter_map(|e| e.data.clone())
                .collect();
            let expected: Vec<String> = (0..50).map(|n| n.to_string()).collect();
            assert_eq!(seq, expected);
        }
    }
}
