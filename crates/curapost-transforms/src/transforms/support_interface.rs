//! Material swap for support interfaces on single-extruder printers
//!
//! Every `;TYPE:SUPPORT-INTERFACE` region in the selected layers is
//! wrapped in two manual filament changes: one to the interface material
//! right after the marker, one back to the model material where the
//! region ends.

use serde::{Deserialize, Serialize};

use curapost_core::{format_number, PrinterConfig, TransformError};
use curapost_parser::{
    align_comments, feature_regions, resolve_return_location, BlockIndex, Document, Feature,
    ReturnLocation,
};

use crate::helpers::{
    extrusion_mode_line, parse_layer_list, purge_feed, reload_moves, unload_moves,
    user_gcode_lines, PauseMethod,
};
use crate::transform::{skip, Capability, Transform, TransformContext, TransformResult};

const COMMENT_COLUMN: usize = 27;

/// Manual material change around support-interface regions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportInterfaceMaterialChange {
    /// 1-based preview layers carrying interface regions
    pub layers: String,
    pub pause_method: PauseMethod,
    pub custom_pause_command: String,
    /// Move to the park position for the change
    pub park: bool,
    pub park_x: f64,
    pub park_y: f64,
    pub unload_amount: f64,
    pub load_amount: f64,
    /// Purge after loading the interface material
    pub interface_purge: f64,
    /// Purge after loading the model material again
    pub model_purge: f64,
    /// Defaults to the extruder's print temperature
    pub interface_temperature: Option<f64>,
    /// Defaults to the extruder's print temperature
    pub model_temperature: Option<f64>,
    /// Unload temperature for the model material; unloads hot when unset
    pub model_cold_pull_temperature: Option<f64>,
    /// Unload temperature for the interface material; unloads hot when unset
    pub interface_cold_pull_temperature: Option<f64>,
    /// Flow percentage while printing the interface
    pub interface_flow_percent: f64,
    /// Feed percentage while printing the interface
    pub interface_feed_percent: f64,
    pub interface_message: String,
    pub model_message: String,
    pub beep: bool,
    /// Also send the message to the print server with `M118`
    pub m118: bool,
    pub gcode_after: String,
}

impl Default for SupportInterfaceMaterialChange {
    fn default() -> Self {
        Self {
            layers: "1".to_string(),
            pause_method: PauseMethod::Marlin,
            custom_pause_command: String::new(),
            park: true,
            park_x: 0.0,
            park_y: 0.0,
            unload_amount: 0.0,
            load_amount: 0.0,
            interface_purge: 0.0,
            model_purge: 0.0,
            interface_temperature: None,
            model_temperature: None,
            model_cold_pull_temperature: None,
            interface_cold_pull_temperature: None,
            interface_flow_percent: 100.0,
            interface_feed_percent: 100.0,
            interface_message: "Change to interface material".to_string(),
            model_message: "Change to model material".to_string(),
            beep: true,
            m118: true,
            gcode_after: String::new(),
        }
    }
}

/// Direction of one change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    ToInterface,
    ToModel,
}

impl SupportInterfaceMaterialChange {
    fn sequence(
        &self,
        change: Change,
        location: &ReturnLocation,
        z: f64,
        printer: &PrinterConfig,
    ) -> Vec<String> {
        let extruder = printer.extruder(0);
        let n = format_number;
        let retract = n(extruder.retract_feed());
        let amount = n(extruder.retraction_amount);
        let travel = n(extruder.travel_feed());
        let unload_feed = (printer.max_feedrate_e * 60.0).min(3000.0).round();
        let lift = if z < 25.0 { 25.0 } else { 3.0 };
        let (x, y) = location.xy().unwrap_or((0.0, 0.0));
        let retracted = location.retracted();
        let (title, temperature, cold_pull, message, purge) = match change {
            Change::ToInterface => (
                "Change to Interface Material",
                self.interface_temperature
                    .unwrap_or(extruder.print_temperature),
                self.model_cold_pull_temperature,
                self.interface_message.trim(),
                self.interface_purge,
            ),
            Change::ToModel => (
                "Revert to Model Material",
                self.model_temperature.unwrap_or(extruder.print_temperature),
                self.interface_cold_pull_temperature,
                self.model_message.trim(),
                self.model_purge,
            ),
        };
        let retract_line = if printer.firmware_retract {
            "G10; Retract".to_string()
        } else {
            format!("G1 F{} E-{}; Retract", retract, amount)
        };

        let mut lines = vec![
            format!(
                ";TYPE:CUSTOM---------------; Supt-Interface Material Change - {}",
                title
            ),
            "M84 S3600; Keep steppers enabled for 1 hour".to_string(),
            "G91; Relative movement".to_string(),
            "M83; Relative extrusion".to_string(),
        ];
        if !retracted {
            lines.push(retract_line.clone());
        }
        lines.push(format!("G0 F2400 Z{}; Lift", n(lift)));
        lines.push("G90; Absolute movement".to_string());
        if self.park {
            lines.push(format!(
                "G0 F{} X{} Y{}; Move to park position",
                travel,
                n(self.park_x.min(printer.machine_width)),
                n(self.park_y.min(printer.machine_depth))
            ));
        }
        if let Some(cold) = cold_pull {
            lines.push(format!("M109 R{}; Cold pull temperature", n(cold)));
        }
        if self.beep {
            lines.push("M300 S400 P1000; Beep".to_string());
        }
        lines.extend(unload_moves(self.unload_amount, unload_feed));
        if !message.is_empty() {
            lines.push(format!("M117 {}; Message to LCD", message));
            if self.m118 {
                lines.push(format!("M118 {}; Message to print server", message));
            }
        }
        lines.push(format!("M104 S{}; Next material temperature", n(temperature)));
        lines.push(format!(
            "{}; Pause for material change",
            self.pause_method
                .command(message, &self.custom_pause_command, 5.0)
        ));
        lines.extend(user_gcode_lines(&self.gcode_after));
        lines.push(format!("M109 R{}; Wait for temperature", n(temperature)));
        lines.extend(reload_moves(
            self.load_amount,
            unload_feed,
            extruder.nozzle_size,
        ));

        let purged = purge > 0.0;
        if purged {
            let feed = n(purge_feed(extruder.nozzle_size));
            match change {
                Change::ToInterface => {
                    let third = n((purge / 3.0 * 100.0).round() / 100.0);
                    for _ in 0..3 {
                        lines.push(format!("G1 F{} E{}; Purge", feed, third));
                    }
                }
                Change::ToModel => {
                    lines.push(format!("G1 F{} E{}; Purge", feed, n(purge)));
                }
            }
            lines.push(retract_line);
            lines.push("M400; Complete all moves".to_string());
            if self.beep {
                lines.push("M300 P250; Beep".to_string());
            }
            lines.push("G4 S2; Wait for 2 seconds".to_string());
        }

        lines.push(format!("G0 F{} X{} Y{}; Return to print", travel, n(x), n(y)));
        lines.push("G91; Relative movement".to_string());
        lines.push(format!("G0 F2400 Z-{}; Drop to print height", n(lift)));
        if !retracted || purged {
            lines.push(if printer.firmware_retract {
                "G11; Unretract".to_string()
            } else {
                format!(
                    "G1 F{} E{}; Unretract",
                    n(extruder.prime_feed()),
                    amount
                )
            });
        }
        let e = if printer.relative_extrusion {
            0.0
        } else {
            location.e.unwrap_or(0.0)
        };
        lines.push(format!("G92 E{}; Reset extruder", n(e)));
        match change {
            Change::ToInterface => {
                lines.push(format!(
                    "M221 S{}; Interface flow",
                    n(self.interface_flow_percent)
                ));
                lines.push(format!(
                    "M220 S{}; Interface feed rate",
                    n(self.interface_feed_percent)
                ));
            }
            Change::ToModel => {
                lines.push("M221 S100; Reset flow".to_string());
                lines.push("M220 S100; Reset feed rate".to_string());
            }
        }
        lines.push("G90; Absolute movement".to_string());
        lines.push(extrusion_mode_line(printer.relative_extrusion));
        lines.push(format!(";{}; End of Material Change", "-".repeat(26)));
        align_comments(&lines, COMMENT_COLUMN)
    }

    fn check_preconditions(&self, printer: &PrinterConfig) -> Result<(), TransformError> {
        if !printer.support_enable {
            return Err(TransformError::precondition("support is disabled"));
        }
        if !printer.support_interface_enable {
            return Err(TransformError::precondition(
                "support interface is disabled",
            ));
        }
        if printer.enabled_extruder_count() > 1 {
            return Err(TransformError::precondition(
                "more than one extruder is enabled",
            ));
        }
        if self.pause_method == PauseMethod::Custom && self.custom_pause_command.trim().is_empty() {
            return Err(TransformError::MissingSetting {
                setting: "custom_pause_command".to_string(),
            });
        }
        Ok(())
    }
}

impl Transform for SupportInterfaceMaterialChange {
    fn name(&self) -> &str {
        "support_interface_material_change"
    }

    fn description(&self) -> &str {
        "Swaps to a separate material for support interfaces and back"
    }

    fn requires(&self) -> Vec<Capability> {
        vec![Capability::LayerMarkers, Capability::TypeMarkers]
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        if let Err(e) = self.check_preconditions(&ctx.printer) {
            return skip(doc, e);
        }
        let layers = match parse_layer_list("layers", &self.layers) {
            Ok(layers) => layers,
            Err(e) => return skip(doc, e),
        };
        let index = BlockIndex::build(&doc);
        let marker = Feature::SupportInterface.marker();
        let mut changes = 0;

        for layer in layers {
            let Some(block) = index.preview_layer_to_block_index(layer) else {
                ctx.diagnostics
                    .warn(self.name(), format!("Layer {} not found", layer));
                continue;
            };
            let regions = feature_regions(&doc.blocks()[block], &marker);
            if regions.is_empty() {
                ctx.diagnostics.info(
                    self.name(),
                    format!("Layer {} has no support interface", layer),
                );
                continue;
            }
            let gcode_layer = index.preview_to_layer(layer);
            let mut insertions = Vec::with_capacity(regions.len() * 2);
            for (start, end) in regions {
                let enter = resolve_return_location(&doc, block, start + 1);
                let leave = resolve_return_location(&doc, block, end);
                let nominal = ctx.printer.nominal_layer_z(gcode_layer);
                insertions.push((
                    start + 1,
                    self.sequence(
                        Change::ToInterface,
                        &enter,
                        enter.z.unwrap_or(nominal),
                        &ctx.printer,
                    ),
                ));
                insertions.push((
                    end,
                    self.sequence(
                        Change::ToModel,
                        &leave,
                        leave.z.unwrap_or(nominal),
                        &ctx.printer,
                    ),
                ));
            }
            match doc.edit_block(block) {
                Ok(mut editor) => {
                    changes += editor.insert_batch(insertions).len();
                }
                Err(e) => ctx.diagnostics.warn(self.name(), e.to_string()),
            }
        }
        tracing::info!(changes, "inserted material changes");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printer() -> PrinterConfig {
        PrinterConfig {
            support_enable: true,
            support_interface_enable: true,
            ..PrinterConfig::default()
        }
    }

    fn doc() -> Document {
        Document::from_blocks([
            ";FLAVOR:Marlin\n",
            "M82\n;LAYER_COUNT:2\n",
            ";LAYER:0\nG1 F1500 X5 Y5 Z0.2 E1\n;TIME_ELAPSED:1\n",
            ";LAYER:1\nG0 X9 Y9 Z0.4\n;TYPE:SUPPORT-INTERFACE\nG0 X10 Y10\nG1 X20 Y10 E3\n;TYPE:FILL\nG1 X30 Y30 E4\n;TIME_ELAPSED:2\n",
            "M84\n",
        ])
    }

    #[test]
    fn test_skips_without_support() {
        let mut ctx = TransformContext::default();
        let t = SupportInterfaceMaterialChange::default();
        assert!(matches!(
            t.apply(doc(), &mut ctx).unwrap_err().reason,
            TransformError::PreconditionNotMet { .. }
        ));
    }

    #[test]
    fn test_skips_with_two_extruders() {
        let mut printer = printer();
        printer.extruders.push(printer.extruders[0].clone());
        let mut ctx = TransformContext::new(printer);
        let t = SupportInterfaceMaterialChange::default();
        assert!(t.apply(doc(), &mut ctx).is_err());
    }

    #[test]
    fn test_wraps_interface_region() {
        let t = SupportInterfaceMaterialChange {
            layers: "2".to_string(),
            interface_purge: 9.0,
            interface_message: String::new(),
            model_message: String::new(),
            interface_temperature: Some(230.0),
            ..SupportInterfaceMaterialChange::default()
        };
        let mut ctx = TransformContext::new(printer());
        let out = t.apply(doc(), &mut ctx).unwrap();
        let lines = out.blocks()[3].lines();

        assert_eq!(lines[2], ";TYPE:SUPPORT-INTERFACE");
        assert!(lines[3].ends_with("Change to Interface Material"));
        let fill = lines.iter().position(|l| l == ";TYPE:FILL").unwrap();
        assert!(lines[fill - 1].ends_with("End of Material Change"));
        let revert = lines
            .iter()
            .position(|l| l.ends_with("Revert to Model Material"))
            .unwrap();
        assert!(revert < fill);
        let interface_moves = lines.iter().position(|l| l == "G0 X10 Y10").unwrap();
        assert!(interface_moves < revert);

        let has = |code: &str, comment: &str| {
            lines.iter().any(|l| l == &format!("{:<27}; {}", code, comment))
        };
        assert!(has("G1 F200 E3", "Purge"));
        assert!(has("M104 S230", "Next material temperature"));
        assert!(has("G0 F2400 Z25", "Lift"));
        assert!(has("G0 F9000 X9 Y9", "Return to print"));
        assert!(has("G0 F9000 X20 Y10", "Return to print"));
        assert!(has("G92 E3", "Reset extruder"));
    }

    #[test]
    fn test_layer_without_interface_is_reported() {
        let t = SupportInterfaceMaterialChange::default();
        let mut ctx = TransformContext::new(printer());
        let out = t.apply(doc(), &mut ctx).unwrap();
        assert_eq!(out, doc());
        assert_eq!(ctx.diagnostics.len(), 1);
    }
}
