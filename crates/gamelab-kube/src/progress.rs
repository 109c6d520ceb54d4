//! Operator-facing progress output
//!
//! Every stage prints a line before it acts and a confirmation or failure
//! line afterwards. Output goes to stderr, or into a buffer for tests.

use std::sync::{Arc, Mutex};

use console::{Term, style};

#[derive(Debug, Clone)]
enum Sink {
    Stderr(Term),
    Captured(Arc<Mutex<Vec<String>>>),
}

/// Progress reporter shared by the deployment and mod sync pipelines
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    sink: Sink,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            sink: Sink::Stderr(Term::stderr()),
        }
    }

    /// Reporter that records plain (unstyled) lines instead of printing
    pub fn captured() -> Self {
        Self {
            sink: Sink::Captured(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Lines recorded by a captured reporter
    pub fn lines(&self) -> Vec<String> {
        match &self.sink {
            Sink::Captured(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
            Sink::Stderr(_) => Vec::new(),
        }
    }

    /// A stage is starting
    pub fn step(&self, msg: &str) {
        self.emit(format!("{} {}", style("→").blue(), msg), msg);
    }

    pub fn success(&self, msg: &str) {
        self.emit(format!("{} {}", style("✓").green(), msg), msg);
    }

    pub fn warn(&self, msg: &str) {
        self.emit(format!("{} {}", style("⚠").yellow(), msg), msg);
    }

    /// Secondary information, such as a customization note
    pub fn detail(&self, msg: &str) {
        self.emit(format!("  {}", style(msg).dim()), msg);
    }

    pub fn failure(&self, msg: &str) {
        self.emit(format!("{} {}", style("✗").red(), msg), msg);
    }

    fn emit(&self, styled: String, plain: &str) {
        match &self.sink {
            Sink::Stderr(term) => {
                let _ = term.write_line(&styled);
            }
            Sink::Captured(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(plain.to_string());
                }
            }
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
