//! Extra cooling pass over the footprint of the print
//!
//! At the end of each selected layer the nozzle lifts 1 mm, turns the fan
//! up and sweeps a zig-zag (optionally a grid) over the model's bounding
//! box, then puts fan, position, Z and retraction back as they were.

use serde::{Deserialize, Serialize};

use curapost_core::units::{mm_per_sec_to_feed, round_to};
use curapost_core::{format_number, PrinterConfig, TransformError};
use curapost_parser::{
    header_bounds, machine_state_at, resolve_return_location, BlockIndex, Bounds, Document,
};

use crate::helpers::parse_layer_list;
use crate::transform::{skip, Capability, Transform, TransformContext, TransformResult};

/// Zig-zag cooling pass after selected layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VeryCoolFanPath {
    /// 1-based preview layers, e.g. `"3,7,10-14"`
    pub layers: String,
    /// Fan speed during the pass, in percent
    pub fan_percent: f64,
    /// Sweep speed in mm/s
    pub travel_speed: f64,
    /// Distance between sweep lines in mm
    pub index_distance: f64,
    /// Add a second sweep along Y
    pub y_index: bool,
}

impl Default for VeryCoolFanPath {
    fn default() -> Self {
        Self {
            layers: "1".to_string(),
            fan_percent: 100.0,
            travel_speed: 50.0,
            index_distance: 25.0,
            y_index: false,
        }
    }
}

/// Sweep area: model bounds clipped to the bed
fn sweep_area(bounds: &Bounds, printer: &PrinterConfig) -> Bounds {
    let (bed_min_x, bed_min_y) = printer.bed_min();
    let (bed_max_x, bed_max_y) = printer.bed_max();
    Bounds {
        min_x: bounds.min_x.max(bed_min_x),
        max_x: bounds.max_x.min(bed_max_x),
        min_y: bounds.min_y.max(bed_min_y),
        max_y: bounds.max_y.min(bed_max_y),
        ..*bounds
    }
}

/// Back-and-forth strokes across `[lo, hi]`
///
/// Each entry is the index coordinate and whether the nozzle sits on the
/// far side. The last stroke is pulled in to `hi`.
fn strokes(lo: f64, hi: f64, step: f64) -> Vec<(f64, bool)> {
    let mut out = Vec::new();
    let mut at = lo;
    let mut far = false;
    loop {
        far = !far;
        out.push((at, far));
        if at >= hi {
            break;
        }
        at = (at + step).min(hi);
        out.push((at, far));
    }
    out
}

/// Sweep points after the start corner `(min_x, min_y)`, all inside `area`
pub(crate) fn zigzag(area: &Bounds, step: f64, y_index: bool) -> Vec<(f64, f64)> {
    let mut points: Vec<(f64, f64)> = strokes(area.min_x, area.max_x, step)
        .into_iter()
        .map(|(x, far)| (x, if far { area.max_y } else { area.min_y }))
        .collect();
    if y_index {
        points.extend(
            strokes(area.min_y, area.max_y, step)
                .into_iter()
                .map(|(y, far)| (if far { area.max_x } else { area.min_x }, y)),
        );
    }
    points
}

fn num(value: f64) -> String {
    format_number(round_to(value, 2))
}

impl VeryCoolFanPath {
    fn fan_value(&self, printer: &PrinterConfig) -> f64 {
        let fraction = (self.fan_percent / 100.0).clamp(0.0, 1.0);
        if printer.fan_scale_0_to_1 {
            round_to(fraction, 1)
        } else {
            (255.0 * fraction).round()
        }
    }

    /// The cooling sequence for one layer block
    fn sequence(
        &self,
        doc: &Document,
        block: usize,
        area: &Bounds,
        ctx: &mut TransformContext,
    ) -> Option<Vec<String>> {
        let printer = &ctx.printer;
        let at = doc.blocks()[block].body_end();
        let loc = resolve_return_location(doc, block, at);
        let state = machine_state_at(doc, block, at);
        let Some((ret_x, ret_y)) = loc.xy() else {
            ctx.diagnostics.warn(
                self.name(),
                format!("No XY position before the end of block {}, layer skipped", block),
            );
            return None;
        };
        let layer = doc.blocks()[block].layer_number().unwrap_or(0);
        let ret_z = loc.z.unwrap_or_else(|| printer.nominal_layer_z(layer));
        let extruder = printer.extruder(state.active_tool as usize);
        let relative = state.relative_extrusion || printer.relative_extrusion;
        let inject_retract = !loc.retracted() && extruder.retraction_enable;
        let e = loc.e.unwrap_or(0.0);
        let zhop = format_number(extruder.z_hop_feed());
        let travel = format_number(extruder.travel_feed());

        let mut lines = vec![
            ";TYPE:CUSTOM Very Cool FanPath".to_string(),
            format!("G0 F{} Z{}", zhop, num(ret_z + 1.0)),
        ];
        if inject_retract {
            lines.push(if printer.firmware_retract {
                "G10".to_string()
            } else if relative {
                format!(
                    "G1 F{} E-{}",
                    format_number(extruder.retract_feed()),
                    format_number(extruder.retraction_amount)
                )
            } else {
                format!(
                    "G1 F{} E{}",
                    format_number(extruder.retract_feed()),
                    format_number(e - extruder.retraction_amount)
                )
            });
        }
        lines.push(format!("M106 S{}", format_number(self.fan_value(printer))));
        lines.push(format!(
            "G0 F{} X{} Y{}",
            format_number(mm_per_sec_to_feed(self.travel_speed).round()),
            num(area.min_x),
            num(area.min_y)
        ));
        for (x, y) in zigzag(area, self.index_distance, self.y_index) {
            lines.push(format!("G0 X{} Y{}", num(x), num(y)));
        }
        lines.push(if state.fan_speed > 0.0 {
            format!("M106 S{}", format_number(state.fan_speed))
        } else {
            "M107".to_string()
        });
        lines.push(format!("G0 F{} X{} Y{}", travel, num(ret_x), num(ret_y)));
        lines.push(format!("G0 F{} Z{}", zhop, num(ret_z)));
        if inject_retract {
            lines.push(if printer.firmware_retract {
                "G11".to_string()
            } else if relative {
                format!(
                    "G1 F{} E{}",
                    format_number(extruder.prime_feed()),
                    format_number(extruder.retraction_amount)
                )
            } else {
                format!("G1 F{} E{}", format_number(extruder.prime_feed()), format_number(e))
            });
        }
        if let Some(feed) = state.feed_rate {
            lines.push(format!("G0 F{} ; End of Very Cool FanPath", format_number(feed)));
        } else {
            lines.push(";End of Very Cool FanPath".to_string());
        }
        Some(lines)
    }
}

impl Transform for VeryCoolFanPath {
    fn name(&self) -> &str {
        "very_cool_fanpath"
    }

    fn description(&self) -> &str {
        "Adds a fan-on zig-zag travel over the print after selected layers"
    }

    fn requires(&self) -> Vec<Capability> {
        vec![
            Capability::LayerMarkers,
            Capability::TimeElapsedMarkers,
            Capability::HeaderBounds,
        ]
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        if self.index_distance <= 0.0 {
            return skip(
                doc,
                TransformError::invalid("index_distance", "must be greater than 0"),
            );
        }
        let layers = match parse_layer_list("layers", &self.layers) {
            Ok(layers) => layers,
            Err(e) => return skip(doc, e),
        };
        let Some(bounds) = header_bounds(&doc) else {
            return skip(doc, TransformError::marker(";MINX:"));
        };
        let area = sweep_area(&bounds, &ctx.printer);
        let index = BlockIndex::build(&doc);

        let mut added = 0;
        for layer in layers {
            let Some(block) = index.preview_layer_to_block_index(layer) else {
                ctx.diagnostics
                    .warn(self.name(), format!("Layer {} not found", layer));
                continue;
            };
            let Some(lines) = self.sequence(&doc, block, &area, ctx) else {
                continue;
            };
            match doc.edit_block(block) {
                Ok(mut editor) => {
                    editor.insert_before_trailer(lines);
                    added += 1;
                }
                Err(e) => ctx.diagnostics.warn(self.name(), e.to_string()),
            }
        }
        tracing::debug!(added, "added cooling passes");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area() -> Bounds {
        Bounds {
            min_x: 10.0,
            max_x: 60.0,
            min_y: 20.0,
            max_y: 40.0,
            ..Bounds::default()
        }
    }

    #[test]
    fn test_zigzag_ends_on_max_x() {
        let points = zigzag(&area(), 20.0, false);
        assert_eq!(
            points,
            vec![
                (10.0, 40.0),
                (30.0, 40.0),
                (30.0, 20.0),
                (50.0, 20.0),
                (50.0, 40.0),
                (60.0, 40.0),
                (60.0, 20.0),
            ]
        );
    }

    #[test]
    fn test_zigzag_stays_inside_area() {
        let area = area();
        for step in [3.0, 7.5, 20.0, 25.0, 80.0] {
            for (x, y) in zigzag(&area, step, true) {
                assert!((area.min_x..=area.max_x).contains(&x), "x {} step {}", x, step);
                assert!((area.min_y..=area.max_y).contains(&y), "y {} step {}", y, step);
            }
        }
        let grid = zigzag(&area, 25.0, true);
        assert_eq!(&grid[grid.len() - 3..], &[(60.0, 20.0), (60.0, 40.0), (10.0, 40.0)]);
    }

    #[test]
    fn test_fan_scale() {
        let t = VeryCoolFanPath {
            fan_percent: 50.0,
            ..VeryCoolFanPath::default()
        };
        assert_eq!(t.fan_value(&PrinterConfig::default()), 128.0);
        let reprap = PrinterConfig {
            fan_scale_0_to_1: true,
            ..PrinterConfig::default()
        };
        assert_eq!(t.fan_value(&reprap), 0.5);
    }

    #[test]
    fn test_rejects_zero_index_distance() {
        let t = VeryCoolFanPath {
            index_distance: 0.0,
            ..VeryCoolFanPath::default()
        };
        let doc = Document::from_blocks([";H\n"]);
        let mut ctx = TransformContext::default();
        assert!(matches!(
            t.apply(doc, &mut ctx).unwrap_err().reason,
            TransformError::InvalidSetting { .. }
        ));
    }
}
