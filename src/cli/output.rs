//! Colored output helpers for CLI
//!
//! Provides consistent, colored terminal output for the scribe CLI, including
//! rendering of progress events.

use crate::pipeline::progress::{EventState, ProgressEvent};
use owo_colors::OwoColorize;

#[derive(Debug, Clone, Copy)]
enum Tone {
    Success,
    Warning,
    Failure,
}

impl Tone {
    fn label(self) -> &'static str {
        match self {
            Tone::Success => "OK",
            Tone::Warning => "WARN",
            Tone::Failure => "ERROR",
        }
    }
}

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print the banner
    pub fn banner(&self) {
        if self.colored {
            println!(
                "\n   {} {}\n",
                "scribe".bright_cyan().bold(),
                format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
            );
        } else {
            println!("\n   scribe v{}\n", env!("CARGO_PKG_VERSION"));
        }
    }

    /// Print a status line: a colored mark, or a bracketed label when plain
    fn status(&self, tone: Tone, message: &str) {
        if !self.colored {
            let line = format!("  [{}] {}", tone.label(), message);
            match tone {
                Tone::Failure => eprintln!("{}", line),
                _ => println!("{}", line),
            }
            return;
        }
        match tone {
            Tone::Success => println!("  {} {}", "✓".green().bold(), message.green()),
            Tone::Warning => println!("  {} {}", "⚠".yellow().bold(), message.yellow()),
            Tone::Failure => eprintln!("  {} {}", "✗".red().bold(), message.red()),
        }
    }

    pub fn success(&self, message: &str) {
        self.status(Tone::Success, message);
    }

    pub fn warning(&self, message: &str) {
        self.status(Tone::Warning, message);
    }

    /// Printed to stderr
    pub fn error(&self, message: &str) {
        self.status(Tone::Failure, message);
    }

    /// Print a header for a section
    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    /// Print a list item
    pub fn list_item(&self, item: &str) {
        if self.colored {
            println!("    {} {}", "•".blue(), item);
        } else {
            println!("    - {}", item);
        }
    }

    /// Print a hint/tip message
    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {} {}", "💡".dimmed(), message.dimmed().italic());
        } else {
            println!("\n  [TIP] {}", message);
        }
    }

    /// Render one progress event as a single line.
    ///
    /// `generating` payloads are streamed text; they are only shown when
    /// `verbose` is set, since concurrent sections interleave.
    pub fn event_line(&self, event: &ProgressEvent, verbose: bool) -> Option<String> {
        let tag = event.tag();
        let data = event.data.as_deref().unwrap_or("");

        let line = match event.state {
            EventState::Generating if !verbose => return None,
            EventState::Generating => {
                let text = data.trim_end();
                if text.is_empty() {
                    return None;
                }
                if self.colored {
                    format!("    {} {}", format!("[{}]", tag).dimmed(), text)
                } else {
                    format!("    [{}] {}", tag, text)
                }
            }
            EventState::Initializing => {
                if self.colored {
                    format!("  {} {}", "→".blue(), tag.bright_white())
                } else {
                    format!("  [START] {}", tag)
                }
            }
            EventState::Completed => {
                if self.colored {
                    format!("  {} {} {}", "✓".green().bold(), tag.green(), data.dimmed())
                } else {
                    format!("  [DONE] {} {}", tag, data)
                }
            }
            EventState::Error => {
                if self.colored {
                    format!("  {} {} {}", "✗".red().bold(), tag.red(), data.red())
                } else {
                    format!("  [ERROR] {} {}", tag, data)
                }
            }
        };
        Some(line)
    }

    /// Print one progress event
    pub fn event(&self, event: &ProgressEvent, verbose: bool) {
        if let Some(line) = self.event_line(event, verbose) {
            println!("{}", line);
        }
    }

    /// Print newline
    pub fn newline(&self) {
        println!();
    }
}
