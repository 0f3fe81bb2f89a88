//! Marker index over a document
//!
//! Maps layer numbers to block indices (raft layers included) and finds
//! marker lines and feature regions inside a block. The index is a
//! snapshot: rebuild it after any edit that adds or removes blocks.

use serde::{Deserialize, Serialize};

use super::document::{Block, Document};
use super::line::{prefix, Axis, Marker};

/// Model bounding box recorded in the header
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub min_z: Option<f64>,
    pub max_z: Option<f64>,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn depth(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// XY center of the footprint
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

/// Layer-number to block-index mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    first_layer_block: Option<usize>,
    raft_start: Option<usize>,
    raft_count: usize,
    last_layer_block: Option<usize>,
}

impl BlockIndex {
    /// Single linear scan counting raft blocks until `;LAYER:0`
    pub fn build(doc: &Document) -> Self {
        let range = doc.layer_range();
        let last_layer_block = range.clone().last();
        let mut raft_start = None;
        let mut raft_count = 0;
        let mut first_layer_block = None;

        for index in range {
            match doc.blocks()[index].layer_number() {
                Some(n) if n < 0 => {
                    raft_start.get_or_insert(index);
                    raft_count += 1;
                }
                Some(0) => {
                    first_layer_block = Some(index);
                    break;
                }
                _ => {}
            }
        }

        tracing::trace!(?first_layer_block, raft_count, "built block index");
        Self {
            first_layer_block,
            raft_start,
            raft_count,
            last_layer_block,
        }
    }

    /// Block holding `;LAYER:0`
    pub fn first_layer_block(&self) -> Option<usize> {
        self.first_layer_block
    }

    /// Number of raft layers before layer 0
    pub fn raft_count(&self) -> usize {
        self.raft_count
    }

    /// Block index for a G-code layer number; negative numbers address raft layers
    pub fn layer_to_block_index(&self, layer: i32) -> Option<usize> {
        let first = self.first_layer_block? as i64;
        let target = first + layer as i64;
        let lowest = self.raft_start.unwrap_or(first as usize) as i64;
        let highest = self.last_layer_block? as i64;
        if target < lowest || target > highest {
            return None;
        }
        Some(target as usize)
    }

    /// G-code layer number for a 1-based preview layer (raft layers count)
    pub fn preview_to_layer(&self, preview: u32) -> i32 {
        preview as i32 - 1 - self.raft_count as i32
    }

    /// Block index for a 1-based preview layer
    pub fn preview_layer_to_block_index(&self, preview: u32) -> Option<usize> {
        if preview == 0 {
            return None;
        }
        self.layer_to_block_index(self.preview_to_layer(preview))
    }

    /// Last layer block
    pub fn last_layer_block(&self) -> Option<usize> {
        self.last_layer_block
    }
}

/// First line starting with `marker_prefix`
pub fn find_marker_line_index(block: &Block, marker_prefix: &str) -> Option<usize> {
    block.lines().iter().position(|l| l.starts_with(marker_prefix))
}

/// Last line starting with `marker_prefix`
pub fn find_last_marker_line_index(block: &Block, marker_prefix: &str) -> Option<usize> {
    block.lines().iter().rposition(|l| l.starts_with(marker_prefix))
}

/// Region from a feature marker line to the next `;` line (exclusive)
///
/// The search starts at line `from`. Returns `(start, end)` where `start`
/// is the marker line and `end` is the next comment line or the block end.
pub fn feature_region_from(
    block: &Block,
    feature_marker: &str,
    from: usize,
) -> Option<(usize, usize)> {
    let lines = block.lines();
    let start = (from..lines.len()).find(|&i| lines[i].starts_with(feature_marker))?;
    let end = (start + 1..lines.len())
        .find(|&i| lines[i].starts_with(';'))
        .unwrap_or(lines.len());
    Some((start, end))
}

/// First feature region in the block
pub fn feature_region(block: &Block, feature_marker: &str) -> Option<(usize, usize)> {
    feature_region_from(block, feature_marker, 0)
}

/// Every feature region in the block, in order
pub fn feature_regions(block: &Block, feature_marker: &str) -> Vec<(usize, usize)> {
    let mut regions = Vec::new();
    let mut from = 0;
    while let Some(region) = feature_region_from(block, feature_marker, from) {
        from = region.1.max(region.0 + 1);
        regions.push(region);
    }
    regions
}

/// Model bounding box from the header block
///
/// `None` unless all four XY bounds are present.
pub fn header_bounds(doc: &Document) -> Option<Bounds> {
    let header = doc.header()?;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (None, None, None, None);
    let mut bounds = Bounds::default();
    for line in header.lines() {
        if let Some(Marker::Bound { axis, max, value }) = Marker::parse(line) {
            match (axis, max) {
                (Axis::X, false) => min_x = Some(value),
                (Axis::X, true) => max_x = Some(value),
                (Axis::Y, false) => min_y = Some(value),
                (Axis::Y, true) => max_y = Some(value),
                (Axis::Z, false) => bounds.min_z = Some(value),
                (Axis::Z, true) => bounds.max_z = Some(value),
            }
        }
    }
    bounds.min_x = min_x?;
    bounds.max_x = max_x?;
    bounds.min_y = min_y?;
    bounds.max_y = max_y?;
    Some(bounds)
}

/// Print time in seconds from the header `;TIME:` line
pub fn header_print_time(doc: &Document) -> Option<f64> {
    doc.header()?.lines().iter().find_map(|l| match Marker::parse(l) {
        Some(Marker::Time(t)) => Some(t),
        _ => None,
    })
}

/// Block index of the first block containing `;LAYER:<layer>`
pub fn find_layer_block(doc: &Document, layer: i32) -> Option<usize> {
    let marker = format!("{}{}", prefix::LAYER, layer);
    doc.layer_range()
        .find(|&i| doc.blocks()[i].lines().iter().any(|l| l.trim_end() == marker))
}
