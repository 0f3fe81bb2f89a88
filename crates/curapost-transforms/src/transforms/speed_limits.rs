//! Feed rate ceiling per feature and per tool

use serde::{Deserialize, Serialize};

use curapost_core::units::{feed_to_mm_per_sec, mm_per_sec_to_feed};
use curapost_core::{format_number, ExtruderConfig, PrinterConfig};
use curapost_parser::{CommandLine, Document, EditScope, Feature, LineEdit, StateTracker};

use crate::transform::{skip, Capability, Transform, TransformContext, TransformResult};

/// Which moves are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedCheck {
    /// `G1`/`G2`/`G3`
    Print,
    /// `G0`
    Travel,
    #[default]
    Both,
}

/// Lowers feed rates above the configured speed of the current feature
///
/// The feature comes from the last `;TYPE:` (or `;BRIDGE`) and the speed
/// table from the active tool. Layer 0 uses the initial layer speeds
/// unless slowdown layers are disabled. Rates are only ever lowered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedLimits {
    pub speeds_to_check: SpeedCheck,
}

impl SpeedLimits {
    pub fn new(speeds_to_check: SpeedCheck) -> Self {
        Self { speeds_to_check }
    }
}

/// Print speed in mm/s for a feature
fn feature_speed(extruder: &ExtruderConfig, feature: Option<&Feature>, bridge: bool) -> f64 {
    let speeds = &extruder.speeds;
    if bridge {
        return speeds.bridge_skin;
    }
    match feature {
        Some(Feature::Skirt) => speeds.skirt_brim,
        Some(Feature::WallInner) => speeds.wall_inner,
        Some(Feature::WallOuter) => speeds.wall_outer,
        Some(Feature::Fill) => speeds.infill,
        Some(Feature::Skin) => speeds.top_bottom,
        Some(Feature::Support) => speeds.support,
        Some(Feature::SupportInterface) => speeds.support_interface,
        Some(Feature::PrimeTower) => speeds.prime_tower,
        _ => speeds.print,
    }
}

/// Ceiling in mm/min for one command, `None` when the command is not checked
fn limit_for(
    check: SpeedCheck,
    cmd: &CommandLine,
    tracker: &StateTracker,
    printer: &PrinterConfig,
    initial_layer: bool,
) -> Option<f64> {
    let extruder = printer.extruder(tracker.state().active_tool as usize);
    let speed = if cmd.is('G', 0) {
        if check == SpeedCheck::Print {
            return None;
        }
        if initial_layer {
            extruder.speed_travel_layer_0
        } else {
            extruder.speed_travel
        }
    } else if cmd.is('G', 1) || cmd.is('G', 2) || cmd.is('G', 3) {
        if check == SpeedCheck::Travel {
            return None;
        }
        if initial_layer {
            extruder.speed_print_layer_0
        } else {
            feature_speed(&extruder, tracker.state().feature.as_ref(), tracker.in_bridge())
        }
    } else {
        return None;
    };
    Some(mm_per_sec_to_feed(speed).floor())
}

impl Transform for SpeedLimits {
    fn name(&self) -> &str {
        "speed_limits"
    }

    fn description(&self) -> &str {
        "Lowers feed rates that exceed the configured speed for the feature"
    }

    fn requires(&self) -> Vec<Capability> {
        vec![Capability::LayerMarkers, Capability::TypeMarkers]
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        let printer = &ctx.printer;
        let mut tracker = StateTracker::with_relative_extrusion(printer.relative_extrusion);
        let range = doc.layer_range();
        for block in &doc.blocks()[..range.start.min(doc.len())] {
            block.lines().iter().for_each(|l| tracker.observe(l));
        }

        let slowdown = printer.speed_slowdown_layers > 0;
        let mut lowered = 0;
        for index in range {
            let initial_layer = slowdown && doc.blocks()[index].layer_number() == Some(0);
            let mut block = match doc.edit_block(index) {
                Ok(block) => block,
                Err(e) => return skip(doc, e.into()),
            };
            lowered += block.map_lines(EditScope::IncludeMarkers, |_, text| {
                tracker.observe(text);
                let Some(mut cmd) = CommandLine::parse(text) else {
                    return LineEdit::Keep;
                };
                let (Some(feed), Some(limit)) = (
                    cmd.get('F'),
                    limit_for(self.speeds_to_check, &cmd, &tracker, printer, initial_layer),
                ) else {
                    return LineEdit::Keep;
                };
                if feed <= limit {
                    return LineEdit::Keep;
                }
                cmd.set('F', limit);
                cmd.append_comment(&format!(
                    "Speed was {}/{}",
                    format_number(feed.round()),
                    format_number(feed_to_mm_per_sec(feed).round())
                ));
                LineEdit::Replace(cmd.render())
            });
        }
        tracing::debug!(lowered, "applied speed limits");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curapost_core::FeatureSpeeds;

    fn printer() -> PrinterConfig {
        let mut printer = PrinterConfig::default();
        printer.extruders[0].speeds = FeatureSpeeds::uniform(50.0);
        printer.extruders[0].speeds.wall_outer = 20.0;
        printer.extruders[0].speed_travel = 150.0;
        printer
    }

    fn doc(layer: &str) -> Document {
        Document::from_blocks([
            ";FLAVOR:Marlin\n".to_string(),
            "G28\n;LAYER_COUNT:1\n".to_string(),
            format!(
                ";LAYER:{}\nG0 F12000 X1 Y1\nG1 F4500 X5 Y5 E1\n;TYPE:WALL-OUTER\nG1 F1800 X6 Y6 E2\nG1 X7 Y7 E3\n",
                layer
            ),
            "M84\n".to_string(),
        ])
    }

    #[test]
    fn test_lowers_by_feature() {
        let mut ctx = TransformContext::new(printer());
        let out = SpeedLimits::default().apply(doc("1"), &mut ctx).unwrap();
        let lines = out.blocks()[2].lines();
        assert_eq!(lines[1], "G0 F9000 X1 Y1 ; Speed was 12000/200");
        assert_eq!(lines[2], "G1 F3000 X5 Y5 E1 ; Speed was 4500/75");
        assert_eq!(lines[4], "G1 F1200 X6 Y6 E2 ; Speed was 1800/30");
        assert_eq!(lines[5], "G1 X7 Y7 E3");
    }

    #[test]
    fn test_initial_layer_speeds() {
        let mut ctx = TransformContext::new(printer());
        let out = SpeedLimits::new(SpeedCheck::Print).apply(doc("0"), &mut ctx).unwrap();
        let lines = out.blocks()[2].lines();
        assert_eq!(lines[1], "G0 F12000 X1 Y1");
        assert_eq!(lines[2], "G1 F1200 X5 Y5 E1 ; Speed was 4500/75");
    }

    #[test]
    fn test_slowdown_disabled_uses_feature_speeds() {
        let mut printer = printer();
        printer.speed_slowdown_layers = 0;
        let mut ctx = TransformContext::new(printer);
        let out = SpeedLimits::default().apply(doc("0"), &mut ctx).unwrap();
        assert_eq!(out.blocks()[2].lines()[2], "G1 F3000 X5 Y5 E1 ; Speed was 4500/75");
    }

    #[test]
    fn test_per_tool_speeds() {
        let mut printer = printer();
        let mut second = printer.extruders[0].clone();
        second.speeds = FeatureSpeeds::uniform(10.0);
        printer.extruders.push(second);
        let doc = Document::from_blocks([
            ";H\n",
            "T1\n;LAYER_COUNT:1\n",
            ";LAYER:3\nG1 F1500 X1 Y1 E1\nT0\nG1 F1500 X2 Y2 E2\n",
            "M84\n",
        ]);
        let mut ctx = TransformContext::new(printer);
        let out = SpeedLimits::default().apply(doc, &mut ctx).unwrap();
        let lines = out.blocks()[2].lines();
        assert_eq!(lines[1], "G1 F600 X1 Y1 E1 ; Speed was 1500/25");
        assert_eq!(lines[3], "G1 F1500 X2 Y2 E2");
    }
}
