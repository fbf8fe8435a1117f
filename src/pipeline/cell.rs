//! Conversation Cell
//!
//! A bounded exchange between three participants: a writer, a retriever and
//! a reviewer. Who speaks next is decided by [`TurnPolicy`], a fixed table
//! over the previous speaker and the [`Signal`] it classified its own message
//! as. The policy never reads message text.
//!
//! The cell is consumed as a stream of [`CellEvent`]s so the caller can
//! forward fragments while they are produced. Hidden `<think>` spans are
//! removed before anything leaves the cell.

use crate::types::{AppError, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The three participants of a conversation cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Writer,
    Retriever,
    Reviewer,
}

impl Role {
    /// Every role
    pub const ALL: [Role; 3] = [Role::Writer, Role::Retriever, Role::Reviewer];

    /// Name shown in speaker delimiters
    pub fn name(self) -> &'static str {
        match self {
            Role::Writer => "writing_agent",
            Role::Retriever => "retrieval_agent",
            Role::Reviewer => "review_agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why the reviewer turned a draft down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Missing or wrong evidence; more retrieval is needed
    Factual,
    /// Organization or style; the writer revises on its own
    Structural,
}

/// What a participant's message amounts to, as judged by that participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    NeedsKnowledge,
    Draft,
    Evidence,
    Approved,
    Rejected(RejectionKind),
}

/// Decision of [`TurnPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Speak(Role),
    Finish,
}

/// Turn selection table.
///
/// | last turn                  | next      |
/// |----------------------------|-----------|
/// | none                       | writer    |
/// | writer: needs knowledge    | retriever |
/// | writer: anything else      | reviewer  |
/// | retriever: anything        | writer    |
/// | reviewer: approved         | finish    |
/// | reviewer: factual reject   | retriever |
/// | reviewer: anything else    | writer    |
pub struct TurnPolicy;

impl TurnPolicy {
    /// Who speaks after `last`
    pub fn next(last: Option<(Role, Signal)>) -> Next {
        match last {
            None => Next::Speak(Role::Writer),
            Some((Role::Writer, Signal::NeedsKnowledge)) => Next::Speak(Role::Retriever),
            Some((Role::Writer, _)) => Next::Speak(Role::Reviewer),
            Some((Role::Retriever, _)) => Next::Speak(Role::Writer),
            Some((Role::Reviewer, Signal::Approved)) => Next::Finish,
            Some((Role::Reviewer, Signal::Rejected(RejectionKind::Factual)))
            | Some((Role::Reviewer, Signal::NeedsKnowledge)) => Next::Speak(Role::Retriever),
            Some((Role::Reviewer, _)) => Next::Speak(Role::Writer),
        }
    }
}

// ============= Think Filter =============

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Streaming removal of `<think>...</think>` spans.
///
/// Markers may arrive split across fragments, so a trailing partial marker is
/// held back until the next fragment decides it.
#[derive(Debug, Default)]
pub struct ThinkFilter {
    inside: bool,
    pending: String,
}

impl ThinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment, returning the part that is visible
    pub fn push(&mut self, fragment: &str) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.push_str(fragment);

        let mut visible = String::new();
        let mut rest = buf.as_str();
        loop {
            let marker = if self.inside { THINK_CLOSE } else { THINK_OPEN };
            match rest.find(marker) {
                Some(pos) => {
                    if !self.inside {
                        visible.push_str(&rest[..pos]);
                    }
                    rest = &rest[pos + marker.len()..];
                    self.inside = !self.inside;
                }
                None => {
                    let held = partial_marker_len(rest, marker);
                    let (body, tail) = rest.split_at(rest.len() - held);
                    if !self.inside {
                        visible.push_str(body);
                    }
                    self.pending = tail.to_string();
                    break;
                }
            }
        }
        visible
    }

    /// Flush at end of message. An unfinished opening marker is plain text;
    /// an unclosed think span is dropped.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        let inside = std::mem::replace(&mut self.inside, false);
        if inside { String::new() } else { pending }
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `marker`
fn partial_marker_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&n| {
            n <= text.len()
                && text.is_char_boundary(text.len() - n)
                && marker.starts_with(&text[text.len() - n..])
        })
        .unwrap_or(0)
}

// ============= Participants =============

/// A finished message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    /// Visible text, think spans removed
    pub content: String,
    pub signal: Signal,
}

/// The seed prompt plus every completed turn so far.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub prompt: String,
    pub turns: Vec<Turn>,
}

impl Transcript {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            turns: Vec::new(),
        }
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// One piece of a participant's turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnChunk {
    Text(String),
    /// Human-readable note about a tool invocation, forwarded verbatim
    ToolSummary(String),
}

/// Chunks of one turn, in order
pub type TurnStream = Box<dyn Stream<Item = Result<TurnChunk>> + Send + Unpin>;

/// One seat in a conversation cell.
#[async_trait]
pub trait Participant: Send + Sync {
    fn role(&self) -> Role;

    /// Produce this participant's next message
    async fn take_turn(&self, transcript: &Transcript) -> Result<TurnStream>;

    /// Classify a finished message's visible text
    fn classify(&self, visible: &str) -> Signal;
}

// ============= Cell =============

/// How a conversation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellOutcome {
    Approved,
    BudgetExhausted,
}

/// Observable steps of a running conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum CellEvent {
    SpeakerChanged(Role),
    Fragment { role: Role, text: String },
    ToolSummary { role: Role, summary: String },
    Message(Turn),
    Finished { outcome: CellOutcome, turns: usize },
}

/// A bounded writer / retriever / reviewer conversation for one section.
pub struct ConversationCell {
    writer: Arc<dyn Participant>,
    retriever: Arc<dyn Participant>,
    reviewer: Arc<dyn Participant>,
    max_turns: usize,
    prompt: String,
}

impl ConversationCell {
    pub fn new(
        writer: Arc<dyn Participant>,
        retriever: Arc<dyn Participant>,
        reviewer: Arc<dyn Participant>,
        max_turns: usize,
        prompt: impl Into<String>,
    ) -> Result<Self> {
        for (expected, participant) in [
            (Role::Writer, &writer),
            (Role::Retriever, &retriever),
            (Role::Reviewer, &reviewer),
        ] {
            if participant.role() != expected {
                return Err(AppError::Internal(format!(
                    "participant for {} reports role {}",
                    expected,
                    participant.role()
                )));
            }
        }

        Ok(Self {
            writer,
            retriever,
            reviewer,
            max_turns,
            prompt: prompt.into(),
        })
    }

    fn participant(&self, role: Role) -> &Arc<dyn Participant> {
        match role {
            Role::Writer => &self.writer,
            Role::Retriever => &self.retriever,
            Role::Reviewer => &self.reviewer,
        }
    }

    /// Run the exchange to completion, yielding events as they happen.
    ///
    /// The stream ends after [`CellEvent::Finished`] or after the first error.
    pub fn run_stream(self) -> impl Stream<Item = Result<CellEvent>> + Send {
        async_stream::try_stream! {
            let mut transcript = Transcript::new(self.prompt.clone());
            let mut last: Option<(Role, Signal)> = None;
            let mut turns = 0usize;

            loop {
                let role = match TurnPolicy::next(last) {
                    Next::Finish => {
                        yield CellEvent::Finished { outcome: CellOutcome::Approved, turns };
                        break;
                    }
                    Next::Speak(role) => role,
                };
                if turns >= self.max_turns {
                    tracing::debug!(turns, "conversation cell out of turns");
                    yield CellEvent::Finished { outcome: CellOutcome::BudgetExhausted, turns };
                    break;
                }
                turns += 1;
                yield CellEvent::SpeakerChanged(role);

                let participant = Arc::clone(self.participant(role));
                let mut chunks = participant.take_turn(&transcript).await?;
                let mut filter = ThinkFilter::new();
                let mut visible = String::new();

                while let Some(chunk) = chunks.next().await {
                    match chunk? {
                        TurnChunk::Text(text) => {
                            let shown = filter.push(&text);
                            if !shown.is_empty() {
                                visible.push_str(&shown);
                                yield CellEvent::Fragment { role, text: shown };
                            }
                        }
                        TurnChunk::ToolSummary(summary) => {
                            yield CellEvent::ToolSummary { role, summary };
                        }
                    }
                }
                let tail = filter.finish();
                if !tail.is_empty() {
                    visible.push_str(&tail);
                    yield CellEvent::Fragment { role, text: tail };
                }

                let signal = participant.classify(&visible);
                tracing::debug!(role = %role, ?signal, turn = turns, "turn finished");
                let turn = Turn { role, content: visible, signal };
                transcript.turns.push(turn.clone());
                yield CellEvent::Message(turn);
                last = Some((role, signal));
            }
        }
    }
}
