//! Edge-following travel from the purge corner to the first layer start
//!
//! The nozzle runs along the bed edges instead of crossing the print
//! area, touching down after every leg so the purge string stays on the
//! edge.

use serde::{Deserialize, Serialize};

use curapost_core::units::round_to;
use curapost_core::{format_number, BedShape, TransformError};
use curapost_parser::{align_comments, CommandLine, Document};

use crate::transform::{skip, Corner, Transform, TransformContext, TransformResult};

const COMMENT_COLUMN: usize = 30;

/// One edge-following leg in corner coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
enum Leg {
    X(f64),
    Y(f64),
}

/// Legs from `from` to a start point in `quadrant`
///
/// `start` and the bed size are measured from the left-front corner.
fn legs(from: Corner, quadrant: Corner, start: (f64, f64), width: f64) -> Vec<Leg> {
    let (sx, sy) = start;
    match (from, quadrant) {
        (Corner::RightRear, Corner::RightFront) => vec![Leg::X(sx), Leg::Y(5.0)],
        (Corner::RightRear, Corner::LeftRear) => vec![Leg::X(5.0)],
        (Corner::RightRear, Corner::RightRear) => vec![Leg::X(width - 5.0), Leg::Y(sy)],
        (_, Corner::LeftFront) => vec![Leg::X(5.0), Leg::Y(5.0)],
        (_, Corner::RightFront) => vec![Leg::X(5.0), Leg::Y(5.0), Leg::X(sx)],
        (_, Corner::LeftRear) => vec![Leg::X(5.0), Leg::Y(5.0), Leg::Y(sy)],
        (_, Corner::RightRear) => vec![
            Leg::X(5.0),
            Leg::Y(5.0),
            Leg::X(width - 5.0),
            Leg::Y(sy),
        ],
    }
}

/// Travel to the layer start around the bed periphery
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveToStart {}

impl MoveToStart {
    pub fn new() -> Self {
        Self {}
    }
}

/// First `G0` with both X and Y in the first layer block
fn layer_start(doc: &Document, block: usize) -> Option<(f64, f64)> {
    doc.blocks()[block]
        .lines()
        .iter()
        .filter_map(|l| CommandLine::parse(l))
        .filter(|cmd| cmd.is('G', 0))
        .find_map(|cmd| Some((cmd.get('X')?, cmd.get('Y')?)))
}

impl Transform for MoveToStart {
    fn name(&self) -> &str {
        "move_to_start"
    }

    fn description(&self) -> &str {
        "Travels along the bed edges to the first layer start"
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        if ctx.printer.bed_shape == BedShape::Elliptic {
            return skip(
                doc,
                TransformError::precondition("edge travel needs a rectangular bed"),
            );
        }
        let first = doc.layer_range().start;
        if doc.layer_range().is_empty() {
            return skip(doc, TransformError::marker(";LAYER:"));
        }

        let (ox, oy) = ctx.printer.bed_min();
        let (x, y) = layer_start(&doc, first).unwrap_or_else(|| {
            ctx.diagnostics.warn(
                self.name(),
                format!("no G0 X/Y move in the first layer, travelling to X{} Y{}", ox, oy),
            );
            (ox, oy)
        });
        let printer = &ctx.printer;
        let (w, d) = (printer.machine_width, printer.machine_depth);
        let start = (x - ox, y - oy);
        let quadrant = match (start.0 <= w / 2.0, start.1 <= d / 2.0) {
            (true, true) => Corner::LeftFront,
            (false, true) => Corner::RightFront,
            (true, false) => Corner::LeftRear,
            (false, false) => Corner::RightRear,
        };
        let from = ctx.carry.purge_end_corner.unwrap_or(Corner::LeftFront);
        let travel = format_number(printer.extruder(0).travel_feed());
        let coord = |v: f64| format_number(round_to(v, 2));

        let mut lines = vec![
            ";MESH:NONMESH---------[Travel to Layer Start]".to_string(),
            "G0 F600 Z2 ; Move up".to_string(),
        ];
        for leg in legs(from, quadrant, start, w) {
            let axis = match leg {
                Leg::X(v) => format!("X{}", coord(v + ox)),
                Leg::Y(v) => format!("Y{}", coord(v + oy)),
            };
            lines.push(format!("G0 F{} {} Z1 ; Ortho move", travel, axis));
            lines.push("G0 F600 Z0 ; Nail down the string".to_string());
            lines.push("G0 Z1 ; Move up".to_string());
        }
        lines.push(";---------------------[End of layer start travels]".to_string());
        let lines = align_comments(&lines, COMMENT_COLUMN);

        match doc.edit_block(first) {
            Ok(mut block) => {
                block.insert_lines(2, lines);
            }
            Err(e) => return skip(doc, e.into()),
        }
        tracing::debug!(?from, ?quadrant, "added layer start travel");
        Ok(doc)
    }
}
