//! Park off the print during minimum-layer-time pauses

use serde::{Deserialize, Serialize};

use curapost_core::units::round_to;
use curapost_core::{format_number, TransformError};
use curapost_parser::{header_bounds, Bounds, CommandLine, Document};

use crate::transform::{skip, Capability, Transform, TransformContext, TransformResult};

/// Comment the slicer writes before a minimum layer time delay
const SMALL_LAYER: &str = ";Small layer";

/// Moves the head off the nearest print edge while a small layer cools
///
/// The slicer emits the delay as a retract, a Z lift and a dwell after a
/// `;Small layer` comment. The park move goes after the lift and the
/// return move after the dwell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiftHeadPark {}

impl LiftHeadPark {
    pub fn new() -> Self {
        Self {}
    }
}

/// Park move along the axis with the shorter distance to the footprint edge
fn park_move(bounds: &Bounds, (x, y): (f64, f64), travel: &str) -> String {
    let (center_x, center_y) = bounds.center();
    let (park_x, dx) = if x <= center_x {
        (bounds.min_x, x - bounds.min_x)
    } else {
        (bounds.max_x, bounds.max_x - x)
    };
    let (park_y, dy) = if y <= center_y {
        (bounds.min_y, y - bounds.min_y)
    } else {
        (bounds.max_y, bounds.max_y - y)
    };
    if dx >= dy {
        format!("G0 F{} Y{}", travel, format_number(round_to(park_y, 2)))
    } else {
        format!("G0 F{} X{}", travel, format_number(round_to(park_x, 2)))
    }
}

/// Last XY before line `at`
fn last_xy(lines: &[String], at: usize) -> Option<(f64, f64)> {
    lines[..at]
        .iter()
        .rev()
        .filter_map(|l| CommandLine::parse(l))
        .find_map(|cmd| Some((cmd.get('X')?, cmd.get('Y')?)))
}

impl Transform for LiftHeadPark {
    fn name(&self) -> &str {
        "lift_head_park"
    }

    fn description(&self) -> &str {
        "Parks the head beside the print during minimum layer time delays"
    }

    fn requires(&self) -> Vec<Capability> {
        vec![Capability::HeaderBounds]
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        if !ctx.printer.cool_lift_head {
            return skip(doc, TransformError::precondition("'Lift Head' is not enabled"));
        }
        let Some(bounds) = header_bounds(&doc) else {
            return skip(doc, TransformError::marker(";MINX:"));
        };
        let travel = format_number(ctx.printer.extruder(0).travel_feed());

        let mut parked = 0;
        for index in doc.layer_range() {
            let lines = doc.blocks()[index].lines();
            let Some(at) = lines.iter().position(|l| l.starts_with(SMALL_LAYER)) else {
                continue;
            };
            let Some(xy) = last_xy(lines, at) else {
                ctx.diagnostics.warn(
                    self.name(),
                    format!("No XY position before the delay in block {}", index),
                );
                continue;
            };
            let retracts = lines
                .get(at + 1)
                .and_then(|l| CommandLine::parse(l))
                .is_some_and(|cmd| cmd.has('E'));
            let lift = at + 1 + usize::from(retracts);
            let insertions = vec![
                (lift + 1, vec![park_move(&bounds, xy, &travel)]),
                (
                    lift + 2,
                    vec![format!(
                        "G0 F{} X{} Y{}",
                        travel,
                        format_number(xy.0),
                        format_number(xy.1)
                    )],
                ),
            ];
            match doc.edit_block(index) {
                Ok(mut block) => {
                    block.insert_batch(insertions);
                    parked += 1;
                }
                Err(e) => return skip(doc, e.into()),
            }
        }
        tracing::debug!(parked, "added lift head parking");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curapost_core::PrinterConfig;

    fn doc() -> Document {
        Document::from_blocks([
            ";FLAVOR:Marlin\n;MINX:100\n;MINY:100\n;MAXX:120\n;MAXY:140\n",
            "G28\n;LAYER_COUNT:1\n",
            ";LAYER:0\nG1 X102 Y130 E1\n;Small layer, adding delay of 4s\nG1 F2700 E-4\nG0 Z3\nG4 P4000\nG1 X103 Y131 E2\n;TIME_ELAPSED:9\n",
            "M84\n",
        ])
    }

    #[test]
    fn test_parks_toward_nearest_edge() {
        let mut ctx = TransformContext::new(PrinterConfig {
            cool_lift_head: true,
            ..PrinterConfig::default()
        });
        let out = LiftHeadPark::new().apply(doc(), &mut ctx).unwrap();
        assert_eq!(
            out.blocks()[2].to_text(),
            ";LAYER:0\nG1 X102 Y130 E1\n;Small layer, adding delay of 4s\nG1 F2700 E-4\nG0 Z3\nG0 F9000 X100\nG4 P4000\nG0 F9000 X102 Y130\nG1 X103 Y131 E2\n;TIME_ELAPSED:9\n"
        );
    }

    #[test]
    fn test_park_axis_choice() {
        let bounds = Bounds {
            min_x: 0.0,
            max_x: 100.0,
            min_y: 0.0,
            max_y: 100.0,
            ..Bounds::default()
        };
        assert_eq!(park_move(&bounds, (50.0, 90.0), "9000"), "G0 F9000 Y100");
        assert_eq!(park_move(&bounds, (5.0, 40.0), "9000"), "G0 F9000 X0");
    }

    #[test]
    fn test_requires_lift_head() {
        let mut ctx = TransformContext::default();
        assert!(LiftHeadPark::new().apply(doc(), &mut ctx).is_err());
    }
}
