//! User-visible diagnostics
//!
//! Transforms never abort the host; instead they report what they did (or
//! why they did nothing) through [`Diagnostic`] values collected per run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// Informational note
    Info,
    /// Transform skipped or partially applied
    Warning,
    /// Transform could not run at all
    Error,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A single message produced by a transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity
    pub level: DiagnosticLevel,
    /// Name of the transform that produced it
    pub source: String,
    /// Human-readable text
    pub message: String,
}

impl Diagnostic {
    pub fn new(level: DiagnosticLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            source: source.into(),
            message: message.into(),
        }
    }

    /// Render as a G-code comment line suitable for the file header
    pub fn to_comment(&self) -> String {
        format!(";  [{}] {}", self.source, self.message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.level, self.source, self.message)
    }
}

/// Ordered collection of diagnostics for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and mirror it to the log
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            DiagnosticLevel::Info => tracing::info!("{}", diagnostic),
            DiagnosticLevel::Warning => tracing::warn!("{}", diagnostic),
            DiagnosticLevel::Error => tracing::error!("{}", diagnostic),
        }
        self.entries.push(diagnostic);
    }

    pub fn info(&mut self, source: &str, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticLevel::Info, source, message));
    }

    pub fn warn(&mut self, source: &str, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticLevel::Warning, source, message));
    }

    pub fn error(&mut self, source: &str, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticLevel::Error, source, message));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Diagnostics emitted by one transform
    pub fn from_source<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.entries.iter().filter(move |d| d.source == source)
    }

    /// Highest severity recorded, if any
    pub fn max_level(&self) -> Option<DiagnosticLevel> {
        self.entries.iter().map(|d| d.level).max()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_rendering() {
        let d = Diagnostic::new(DiagnosticLevel::Warning, "pause_at_layer", "Layer 40 not found");
        assert_eq!(d.to_comment(), ";  [pause_at_layer] Layer 40 not found");
    }

    #[test]
    fn test_max_level_and_filtering() {
        let mut diags = Diagnostics::new();
        assert_eq!(diags.max_level(), None);
        diags.info("final_z", "added");
        diags.warn("speed_limits", "skipped");
        diags.info("final_z", "clamped");
        assert_eq!(diags.max_level(), Some(DiagnosticLevel::Warning));
        assert_eq!(diags.from_source("final_z").count(), 2);
        assert_eq!(diags.len(), 3);
    }
}
