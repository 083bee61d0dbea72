//! Diagnostic reporting
//!
//! Structured diagnostics with terminal rendering: severity colour, the
//! offending source line, and a caret under the offending column.

use crate::ast::Span;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Info => "Info",
        }
    }
}

/// A single reported diagnostic
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub file: PathBuf,
    /// 0-indexed line, if known
    pub line: Option<usize>,
    /// 0-indexed column, if known
    pub column: Option<usize>,
    pub message: String,
}

/// Collects diagnostics and renders them to stderr as they arrive
pub struct Reporter {
    file: PathBuf,
    lines: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl Reporter {
    pub fn new(file: &Path, source: &str) -> Self {
        Reporter {
            file: file.to_path_buf(),
            lines: source.lines().map(str::to_string).collect(),
            diagnostics: Vec::new(),
        }
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.report(Severity::Error, Some(span), message.into());
    }

    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.report(Severity::Warning, Some(span), message.into());
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.report(Severity::Info, None, message.into());
    }

    pub fn report(&mut self, severity: Severity, span: Option<Span>, message: String) {
        self.render(severity, span, &message);
        self.diagnostics.push(Diagnostic {
            severity,
            file: self.file.clone(),
            line: span.map(|s| s.line),
            column: span.map(|s| s.column),
            message,
        });
    }

    /// Everything reported so far, in order
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn render(&self, severity: Severity, span: Option<Span>, message: &str) {
        let label = match severity {
            Severity::Error => severity.label().red().bold(),
            Severity::Warning => severity.label().yellow().bold(),
            Severity::Info => severity.label().normal(),
        };
        eprintln!("{}", label);
        match span {
            Some(span) => {
                eprintln!("    File \"{}\" on line {}", self.file.display(), span.line + 1);
                if let Some(text) = self.lines.get(span.line) {
                    eprintln!("        {}", text);
                    eprintln!("        {}^", " ".repeat(span.column));
                }
            }
            None => eprintln!("    File \"{}\"", self.file.display()),
        }
        eprintln!("{}", message);
    }
}
