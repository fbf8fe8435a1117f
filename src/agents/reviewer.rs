use crate::agents::history;
use crate::llm::LLMClient;
use crate::pipeline::cell::{
    Participant, RejectionKind, Role, Signal, Transcript, TurnChunk, TurnStream,
};
use crate::types::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Rejection prefix that sends the cell back to retrieval
pub const FACTUAL_PREFIX: &str = "FACTUAL:";
/// Rejection prefix for a revision without new evidence
pub const STRUCTURAL_PREFIX: &str = "STRUCTURAL:";

/// Critiques the latest draft and decides whether to approve it.
pub struct ReviewerAgent {
    llm: Arc<dyn LLMClient>,
    approval_token: String,
}

impl ReviewerAgent {
    pub fn new(llm: Arc<dyn LLMClient>, approval_token: impl Into<String>) -> Self {
        Self {
            llm,
            approval_token: approval_token.into(),
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            r#"You are a professional reviewer checking the quality of one report section.

Check that the latest draft:
1) meets the request
2) is well structured
3) uses clear, correct language
4) contains no obvious errors or unsupported claims

If the draft passes, reply with {token} and nothing else.

Otherwise start your reply with {factual} when claims lack evidence or need more sources, or with {structural} for organization and style problems, then give concrete feedback."#,
            token = self.approval_token,
            factual = FACTUAL_PREFIX,
            structural = STRUCTURAL_PREFIX,
        )
    }
}

#[async_trait]
impl Participant for ReviewerAgent {
    fn role(&self) -> Role {
        Role::Reviewer
    }

    async fn take_turn(&self, transcript: &Transcript) -> Result<TurnStream> {
        let messages = history(&self.system_prompt(), transcript, Role::Reviewer);
        let stream = self.llm.stream_with_history(&messages).await?;
        Ok(Box::new(stream.map(|fragment| fragment.map(TurnChunk::Text))))
    }

    /// Rejection markers win over the approval token
    fn classify(&self, visible: &str) -> Signal {
        let upper = visible.to_uppercase();
        if upper.contains(FACTUAL_PREFIX) {
            Signal::Rejected(RejectionKind::Factual)
        } else if upper.contains(STRUCTURAL_PREFIX) {
            Signal::Rejected(RejectionKind::Structural)
        } else if !self.approval_token.is_empty() && visible.contains(&self.approval_token) {
            Signal::Approved
        } else {
            Signal::Rejected(RejectionKind::Structural)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::CannedLlm;

    fn reviewer() -> ReviewerAgent {
        ReviewerAgent::new(Arc::new(CannedLlm::new(&[])), "APPROVE")
    }

    #[test]
    fn test_reviewer_classify() {
        let r = reviewer();
        assert_eq!(r.classify("APPROVE"), Signal::Approved);
        assert_eq!(
            r.classify("Factual: the accuracy figure has no source"),
            Signal::Rejected(RejectionKind::Factual)
        );
        assert_eq!(
            r.classify("STRUCTURAL: merge paragraphs two and three"),
            Signal::Rejected(RejectionKind::Structural)
        );
        assert_eq!(
            r.classify("STRUCTURAL: fix this before I can APPROVE"),
            Signal::Rejected(RejectionKind::Structural)
        );
        assert_eq!(
            r.classify("Looks mostly fine."),
            Signal::Rejected(RejectionKind::Structural)
        );
    }
}
