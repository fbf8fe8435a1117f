//! Language-model backed participants and stage collaborators
//!
//! - [`reader`] - [`LlmContentAnalyzer`], one call per search result
//! - [`analyst`] - [`LlmAnalyst`], global analysis and report outline
//! - [`writer`], [`retriever`], [`reviewer`] - the three conversation roles
//! - [`cells`] - [`LlmCellFactory`], wires the roles into a cell per section

/// Global analysis and outline.
pub mod analyst;
/// Per-section cell wiring.
pub mod cells;
/// Per-source structured extraction.
pub mod reader;
/// Retrieval role.
pub mod retriever;
/// Review role.
pub mod reviewer;
/// Writing role.
pub mod writer;

pub use analyst::LlmAnalyst;
pub use cells::LlmCellFactory;
pub use reader::LlmContentAnalyzer;
pub use retriever::RetrieverAgent;
pub use reviewer::ReviewerAgent;
pub use writer::WriterAgent;

use crate::pipeline::cell::{Role, Transcript};
use crate::types::MessageRole;

/// Build a chat history for `me` from a cell transcript.
///
/// Own turns become assistant messages; everyone else's become user messages
/// prefixed with the speaker's name.
pub(crate) fn history(system: &str, transcript: &Transcript, me: Role) -> Vec<(String, String)> {
    let mut messages = vec![
        (MessageRole::System.as_str().to_string(), system.to_string()),
        (MessageRole::User.as_str().to_string(), transcript.prompt.clone()),
    ];

    for turn in &transcript.turns {
        if turn.role == me {
            messages.push((
                MessageRole::Assistant.as_str().to_string(),
                turn.content.clone(),
            ));
        } else {
            messages.push((
                MessageRole::User.as_str().to_string(),
                format!("[{}]\n{}", turn.role.name(), turn.content),
            ));
        }
    }

    messages
}
