//! Transform trait and the per-run context
//!
//! A transform takes the document by value and hands it back, either
//! rewritten or untouched inside [`Skipped`]. Nothing is ever lost: a
//! transform that cannot run still returns the input it was given.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use curapost_core::{Diagnostics, PrinterConfig, TransformError};
use curapost_parser::Document;

/// Marker families a transform may depend on or destroy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// `;LAYER:<n>` lines
    LayerMarkers,
    /// `;TYPE:<feature>` lines
    TypeMarkers,
    /// `;TIME_ELAPSED:<s>` lines
    TimeElapsedMarkers,
    /// `;LAYER_COUNT:<n>` line
    LayerCount,
    /// `;MINX:` .. `;MAXZ:` header lines
    HeaderBounds,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LayerMarkers => write!(f, "LAYER markers"),
            Self::TypeMarkers => write!(f, "TYPE markers"),
            Self::TimeElapsedMarkers => write!(f, "TIME_ELAPSED markers"),
            Self::LayerCount => write!(f, "LAYER_COUNT"),
            Self::HeaderBounds => write!(f, "header bounds"),
        }
    }
}

/// Bed corner a purge line finished near
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    LeftFront,
    RightFront,
    LeftRear,
    RightRear,
}

/// Values passed forward between transforms of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Carry {
    /// Written by the purge line transform, read by the move-to-start transform
    pub purge_end_corner: Option<Corner>,
}

/// Everything a transform may read or report besides the document
#[derive(Debug, Clone, Default)]
pub struct TransformContext {
    pub printer: PrinterConfig,
    pub diagnostics: Diagnostics,
    pub carry: Carry,
}

impl TransformContext {
    pub fn new(printer: PrinterConfig) -> Self {
        Self {
            printer,
            diagnostics: Diagnostics::new(),
            carry: Carry::default(),
        }
    }
}

/// A transform that did not run, carrying its input back unchanged
#[derive(Debug)]
pub struct Skipped {
    pub document: Document,
    pub reason: TransformError,
}

impl Skipped {
    pub fn new(document: Document, reason: TransformError) -> Self {
        Self { document, reason }
    }
}

/// Outcome of one transform
pub type TransformResult = Result<Document, Box<Skipped>>;

/// Skip with the document untouched
pub fn skip(document: Document, reason: TransformError) -> TransformResult {
    Err(Box::new(Skipped::new(document, reason)))
}

/// A named document rewrite
///
/// Implementations are single-pass scan-and-rewrite operations. They
/// report per-occurrence problems through `ctx.diagnostics` and keep
/// going; a transform-wide problem ends in [`skip`].
pub trait Transform: Send + Sync {
    /// Identifier used in configuration files and diagnostics
    fn name(&self) -> &str;

    /// One-line description
    fn description(&self) -> &str;

    /// Markers that must still be present when this transform runs
    fn requires(&self) -> Vec<Capability> {
        Vec::new()
    }

    /// Markers this transform removes or rewrites beyond recognition
    fn invalidates(&self) -> Vec<Capability> {
        Vec::new()
    }

    /// Rewrite the document
    fn apply(&self, doc: Document, ctx: &mut TransformContext) -> TransformResult;
}

/// Arc-wrapped transform for sharing between pipelines
pub type TransformHandle = Arc<dyn Transform>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_returns_document() {
        let doc = Document::from_blocks([";H\n", "G28\n"]);
        let result = skip(doc.clone(), TransformError::precondition("nope"));
        let skipped = result.unwrap_err();
        assert_eq!(skipped.document, doc);
        assert_eq!(skipped.reason.to_string(), "nope");
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(Capability::TimeElapsedMarkers.to_string(), "TIME_ELAPSED markers");
    }
}
