//! G-Code text model
//!
//! This module provides:
//! - Line splitting and marker classification
//! - The `CommandLine` model (lenient and strict parsing, rendering)
//! - The `Document`/`Block` model for host block sequences
//! - Layer and marker lookups (`BlockIndex`)
//! - Machine state reconstruction by backward scan
//! - The block rewriter, the single mutation path for documents

pub mod command;
pub mod document;
pub mod index;
pub mod line;
pub mod rewriter;
pub mod state;

pub use command::*;
pub use document::*;
pub use index::*;
pub use line::*;
pub use rewriter::*;
pub use state::*;
