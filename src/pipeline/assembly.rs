//! Assembly stage: joins the written sections into one markdown report.

use super::models::{Analysis, ExtractedSource, SectionIndex, SectionState, SectionStatus};
use std::fmt::Write;

/// The assembled markdown and how many sections made it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub markdown: String,
    pub sections_done: usize,
    pub sections_total: usize,
}

impl Report {
    /// Completion summary for the assembling step
    pub fn summary(&self) -> String {
        format!(
            "assembled report with {} of {} sections",
            self.sections_done, self.sections_total
        )
    }
}

/// Render the report. Sections appear in outline order; a failed section
/// keeps its heading with a short note in place of its body. The closing
/// Sources list names only the sources whose extraction fed the analysis.
pub fn assemble(
    request: &str,
    analysis: &Analysis,
    sections: &[SectionState],
    sources: &[ExtractedSource],
) -> Report {
    let mut md = String::new();
    let _ = writeln!(md, "# {}\n", request.trim());

    if !analysis.global_analysis.trim().is_empty() {
        let _ = writeln!(md, "## Overview\n\n{}\n", analysis.global_analysis.trim());
    }

    let mut sections_done = 0;
    for (position, (section, state)) in analysis.outline.iter().zip(sections).enumerate() {
        let _ = writeln!(md, "## {}. {}\n", SectionIndex::new(position), section.title);
        match state.status {
            SectionStatus::Done => {
                sections_done += 1;
                let _ = writeln!(md, "{}\n", state.content.trim());
            }
            _ => {
                let reason = state.error.as_deref().unwrap_or("not written");
                let _ = writeln!(md, "> Section unavailable: {}\n", reason);
            }
        }
    }

    if !sources.is_empty() {
        md.push_str("## Sources\n\n");
        for (i, entry) in sources.iter().enumerate() {
            let source = &entry.source;
            let _ = match &source.url {
                Some(url) => writeln!(md, "{}. [{}]({})", i + 1, source.title, url),
                None => writeln!(md, "{}. {}", i + 1, source.title),
            };
        }
    }

    Report {
        markdown: md.trim_end().to_string() + "\n",
        sections_done,
        sections_total: analysis.outline.len(),
    }
}
