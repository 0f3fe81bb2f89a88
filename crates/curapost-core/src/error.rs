//! Error handling for CuraPost
//!
//! Provides error types for each layer of the post-processor:
//! - G-Code errors (line parsing)
//! - Rewrite errors (block mutation)
//! - Transform errors (preconditions, missing markers, bad settings)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// G-Code error type
///
/// Raised only by the strict parsing entry points (`FromStr`). The lenient
/// accessors used by transforms return `None` instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GcodeError {
    /// Line does not start with a command word
    #[error("Not a command line: {line:?}")]
    NotACommand {
        /// The offending line text.
        line: String,
    },

    /// Command word has a malformed number
    #[error("Invalid command word '{word}'")]
    InvalidCommandWord {
        /// The command word as written.
        word: String,
    },

    /// Parameter value could not be parsed
    #[error("Invalid value for parameter '{param}': {value:?}")]
    InvalidParameter {
        /// The parameter letter.
        param: char,
        /// The raw value text.
        value: String,
    },
}

/// Errors raised by the block rewriter
///
/// These never surface to the host; transforms turn them into diagnostics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RewriteError {
    /// Block index is outside the document
    #[error("Block {block} out of range (document has {len} blocks)")]
    BlockOutOfRange {
        /// The requested block index.
        block: usize,
        /// Number of blocks in the document.
        len: usize,
    },

    /// Line range is outside the block
    #[error("Lines {start}..{end} out of range in block {block} ({len} lines)")]
    LinesOutOfRange {
        /// Block index.
        block: usize,
        /// Start of the requested range.
        start: usize,
        /// End of the requested range (exclusive).
        end: usize,
        /// Number of lines in the block.
        len: usize,
    },

    /// Edit would overwrite or move a protected marker line
    #[error("Line {line} of block {block} is a protected marker: {text:?}")]
    ProtectedLine {
        /// Block index.
        block: usize,
        /// Line index within the block.
        line: usize,
        /// The marker text.
        text: String,
    },
}

/// Transform error type
///
/// Mirrors the fail-soft taxonomy: every variant ends up as a diagnostic
/// and the document is returned unchanged (or partially rewritten when only
/// one occurrence failed).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// A printer or mode precondition is not satisfied
    #[error("{reason}")]
    PreconditionNotMet {
        /// Why the transform cannot run.
        reason: String,
    },

    /// A marker the transform depends on is absent
    #[error("Marker '{marker}' not found")]
    MarkerNotFound {
        /// The marker text that was searched for.
        marker: String,
    },

    /// A required setting was not supplied
    #[error("Missing setting '{setting}'")]
    MissingSetting {
        /// Setting name.
        setting: String,
    },

    /// A setting value is out of range or malformed
    #[error("Invalid setting '{setting}': {reason}")]
    InvalidSetting {
        /// Setting name.
        setting: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An earlier transform removed something this one needs
    #[error("'{transform}' requires {capability} which '{invalidated_by}' removed")]
    OrderingViolation {
        /// The transform that cannot run.
        transform: String,
        /// The missing capability.
        capability: String,
        /// The transform that removed it.
        invalidated_by: String,
    },

    /// Rewriting failed part way
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}

impl TransformError {
    /// Shorthand for a precondition failure
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::PreconditionNotMet {
            reason: reason.into(),
        }
    }

    /// Shorthand for a missing marker
    pub fn marker(marker: impl Into<String>) -> Self {
        Self::MarkerNotFound {
            marker: marker.into(),
        }
    }

    /// Shorthand for an invalid setting
    pub fn invalid(setting: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            setting: setting.into(),
            reason: reason.into(),
        }
    }
}

/// Main error type for CuraPost
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Rewrite error
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    /// Transform error
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a G-Code error
    pub fn is_gcode_error(&self) -> bool {
        matches!(self, Error::Gcode(_))
    }

    /// Check if this is a transform error
    pub fn is_transform_error(&self) -> bool {
        matches!(self, Error::Transform(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_error_converts_into_transform_error() {
        let err: TransformError = RewriteError::BlockOutOfRange { block: 9, len: 4 }.into();
        assert_eq!(
            err.to_string(),
            "Block 9 out of range (document has 4 blocks)"
        );
    }

    #[test]
    fn test_error_classification() {
        let err: Error = TransformError::marker(";LAYER:12").into();
        assert!(err.is_transform_error());
        assert!(!err.is_gcode_error());
        assert_eq!(err.to_string(), "Marker ';LAYER:12' not found");
    }

    #[test]
    fn test_ordering_violation_message() {
        let err = TransformError::OrderingViolation {
            transform: "very_cool_fanpath".into(),
            capability: "TIME_ELAPSED markers".into(),
            invalidated_by: "remove_comments".into(),
        };
        assert!(err.to_string().contains("remove_comments"));
    }
}
