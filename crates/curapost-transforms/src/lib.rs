//! # CuraPost Transforms
//!
//! Named rewrites over a sliced G-code [`Document`](curapost_parser::Document)
//! and the [`Pipeline`] that chains them.
//!
//! Every transform is a settings struct implementing [`Transform`]. A
//! pipeline runs them in order, threading the document through each one
//! and collecting [`Diagnostics`](curapost_core::Diagnostics) in the
//! shared [`TransformContext`]. Transforms are selected by name through
//! the [`TransformRegistry`] or from serialized [`TransformConfig`]s.

pub mod config;
pub mod helpers;
pub mod pipeline;
pub mod transform;
pub mod transforms;

pub use config::TransformConfig;
pub use pipeline::{Pipeline, TransformRegistry};
pub use transform::{
    skip, Capability, Carry, Corner, Skipped, Transform, TransformContext, TransformHandle,
    TransformResult,
};
pub use transforms::*;
