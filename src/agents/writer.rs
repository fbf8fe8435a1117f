use crate::agents::history;
use crate::llm::LLMClient;
use crate::pipeline::cell::{Participant, Role, Signal, Transcript, TurnChunk, TurnStream};
use crate::types::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Line prefix the writer uses to ask for more knowledge
pub const NEED_RETRIEVAL_MARKER: &str = "[[NEED_RETRIEVAL]]";

/// Drafts and revises the section text.
pub struct WriterAgent {
    llm: Arc<dyn LLMClient>,
}

impl WriterAgent {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    fn system_prompt(&self) -> String {
        format!(
            r#"You are a writing assistant responsible for one section of a research report.

Write the section the user asks for, in markdown, using the global analysis and any retrieved evidence in the conversation.

If you need external information or data you do not have, do not make it up. Instead reply with a single line starting with {} followed by what you need to know.

When revising after review feedback, output the complete revised section, not a diff."#,
            NEED_RETRIEVAL_MARKER
        )
    }
}

#[async_trait]
impl Participant for WriterAgent {
    fn role(&self) -> Role {
        Role::Writer
    }

    async fn take_turn(&self, transcript: &Transcript) -> Result<TurnStream> {
        let messages = history(&self.system_prompt(), transcript, Role::Writer);
        let stream = self.llm.stream_with_history(&messages).await?;
        Ok(Box::new(stream.map(|fragment| fragment.map(TurnChunk::Text))))
    }

    fn classify(&self, visible: &str) -> Signal {
        if visible.contains(NEED_RETRIEVAL_MARKER) {
            Signal::NeedsKnowledge
        } else {
            Signal::Draft
        }
    }
}
