//! # CuraPost Parser
//!
//! The G-code text model used by every transform: tokenizer, command line
//! model, host block document, block index, machine state tracker and the
//! block rewriter.

pub mod gcode;

pub use gcode::{
    align_comments, classify, extrusion_mode_at, feature_region, feature_region_from,
    feature_regions, find_last_marker_line_index, find_layer_block, find_marker_line_index,
    header_bounds, header_print_time, lines_before, machine_state_at, prefix,
    resolve_return_location, Axis, Block, BlockEditor, BlockIndex, Bounds, CommandLine, Document,
    EditScope, Feature, LayerNumbering, LineEdit, LineKind, MachineState, Marker, Param, Position,
    RenumberStep, ReturnLocation, StateTracker,
};
