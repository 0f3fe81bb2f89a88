//! # CuraPost Core
//!
//! Core types shared by every CuraPost crate: the layered error types,
//! user-visible diagnostics, the injected printer configuration and the
//! number/unit helpers used when emitting G-code.

pub mod diagnostics;
pub mod error;
pub mod printer;
pub mod units;

pub use diagnostics::{Diagnostic, DiagnosticLevel, Diagnostics};
pub use error::{Error, GcodeError, Result, RewriteError, TransformError};
pub use printer::{
    AdhesionType, BedShape, ExtruderConfig, FeatureSpeeds, PrintSequence, PrinterConfig,
};
pub use units::format_number;
