//! Pause at layer
//!
//! Inserts a park, optional filament swap, and resume sequence at the end
//! of the layer before each selected layer. The resume position comes from
//! the backward state scan, so the head returns to where it stopped and
//! an existing retraction is not repeated.

use serde::{Deserialize, Serialize};

use curapost_core::units::round_to;
use curapost_core::{format_number, PrintSequence, PrinterConfig, TransformError};
use curapost_parser::{
    align_comments, extrusion_mode_at, machine_state_at, resolve_return_location, BlockIndex,
    Document, LayerNumbering, ReturnLocation,
};

use crate::helpers::{
    extrusion_mode_line, parse_layer_list, purge_feed, reload_moves, unload_moves,
    user_gcode_lines, PauseMethod,
};
use crate::transform::{skip, Capability, Transform, TransformContext, TransformResult};

/// Comment column of the emitted sequence
const COMMENT_COLUMN: usize = 27;

/// Why the print is paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// Unload, reload and purge are emitted
    #[default]
    FilamentChange,
    /// Inserts, magnets, nuts; an extra prime may follow the pause
    Other,
}

/// Pause the print before selected layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PauseAtLayer {
    /// 1-based preview layers to pause before, e.g. `"12,30"`
    pub layers: String,
    /// Comma-separated messages, one per layer; the last one repeats
    pub messages: String,
    pub pause_method: PauseMethod,
    pub custom_pause_command: String,
    /// Dwell length for [`PauseMethod::G4`]
    pub dwell_minutes: f64,
    pub reason: PauseReason,
    pub park: bool,
    pub park_x: f64,
    pub park_y: f64,
    /// Lift above the print before parking
    pub move_z: f64,
    /// Minimum nozzle height while purging
    pub min_purge_clearance: f64,
    pub unload_amount: f64,
    pub reload_amount: f64,
    pub purge_amount: f64,
    /// Unload/reload speed in mm/s; defaults to the printer's E limit (at most 100)
    pub unload_reload_speed: Option<f64>,
    /// Short purge before unloading to soften the filament tip
    pub quick_purge: bool,
    pub control_temperatures: bool,
    pub standby_temperature: Option<f64>,
    /// Defaults to the extruder's print temperature
    pub resume_temperature: Option<f64>,
    /// `M109` instead of `M104` on resume
    pub wait_for_resume_temperature: bool,
    /// Stepper hold time; 0 leaves the firmware default
    pub hold_steppers_minutes: f64,
    pub beep: bool,
    pub beep_length: u32,
    pub gcode_before: String,
    pub gcode_after: String,
    /// Prime after the pause, only for [`PauseReason::Other`]
    pub extra_prime: f64,
    /// Number One-at-a-Time layers continuously while looking up layers
    pub renumber_one_at_a_time: bool,
}

impl Default for PauseAtLayer {
    fn default() -> Self {
        Self {
            layers: "1".to_string(),
            messages: String::new(),
            pause_method: PauseMethod::Marlin,
            custom_pause_command: String::new(),
            dwell_minutes: 5.0,
            reason: PauseReason::FilamentChange,
            park: true,
            park_x: 0.0,
            park_y: 0.0,
            move_z: 15.0,
            min_purge_clearance: 15.0,
            unload_amount: 0.0,
            reload_amount: 0.0,
            purge_amount: 0.0,
            unload_reload_speed: None,
            quick_purge: false,
            control_temperatures: true,
            standby_temperature: None,
            resume_temperature: None,
            wait_for_resume_temperature: true,
            hold_steppers_minutes: 0.0,
            beep: false,
            beep_length: 500,
            gcode_before: String::new(),
            gcode_after: String::new(),
            extra_prime: 0.0,
            renumber_one_at_a_time: false,
        }
    }
}

/// What one pause needs to know about the point it is inserted at
struct PausePoint<'a> {
    preview_layer: u32,
    previous_layer: i32,
    message: &'a str,
    location: ReturnLocation,
    z: f64,
    /// Tool active when the print stops
    tool: u32,
    /// E mode in force at the pause
    relative_extrusion: bool,
}

impl PauseAtLayer {
    fn message_for(&self, position: usize) -> &str {
        let messages: Vec<&str> = self.messages.split(',').map(str::trim).collect();
        messages
            .get(position)
            .or(messages.last())
            .copied()
            .unwrap_or("")
    }

    fn sequence(&self, point: &PausePoint<'_>, printer: &PrinterConfig) -> Vec<String> {
        let extruder = printer.extruder(point.tool as usize);
        let n = format_number;
        let zhop = n(extruder.z_hop_feed());
        let travel = n(extruder.travel_feed());
        let retract = n(extruder.retract_feed());
        let prime = n(extruder.prime_feed());
        let amount = n(extruder.retraction_amount);
        let purge_speed = n((extruder.nozzle_size * 500.0).round());
        let unload_feed =
            (self.unload_reload_speed.unwrap_or(printer.max_feedrate_e.min(100.0)) * 60.0).round();
        let retracted = point.location.retracted();
        let (x, y) = point.location.xy().unwrap_or((0.0, 0.0));
        let z = point.z;
        let filament = self.reason == PauseReason::FilamentChange;
        let method = self.pause_method;
        let griffin = method == PauseMethod::Griffin;
        let repetier = method == PauseMethod::Repetier;
        let move_z = if z + self.move_z > printer.machine_height {
            0.0
        } else {
            self.move_z
        };
        let park_x = self.park_x.min(printer.machine_width);
        let park_y = self.park_y.min(printer.machine_depth);
        let msg = point.message;

        let mut lines = vec![format!(
            ";TYPE:CUSTOM---------------; Pause before preview layer {} (end of Gcode LAYER:{})",
            point.preview_layer, point.previous_layer
        )];

        if !griffin {
            lines.push("M83; Relative extrusion".to_string());
            if !retracted {
                lines.push(if printer.firmware_retract && !repetier {
                    "G10; Retract".to_string()
                } else {
                    format!("G1 F{} E-{}; Retract", retract, amount)
                });
            }
            if self.park {
                lines.push(format!(
                    "G1 F{} Z{}; Move up to clear the print",
                    zhop,
                    n(round_to(z + move_z, 2))
                ));
                lines.push(format!(
                    "G0 F{} X{} Y{}; Move to park location",
                    travel,
                    n(park_x),
                    n(park_y)
                ));
                if !repetier && z < self.min_purge_clearance - move_z {
                    let purging = filament && self.purge_amount != 0.0;
                    lines.push(format!(
                        "G1 F{} Z{}; Minimum clearance{} - move up some more",
                        zhop,
                        n(self.min_purge_clearance),
                        if purging { " to purge" } else { "" }
                    ));
                }
            }
            if repetier {
                lines.push("M84 E0; Disable Steppers".to_string());
            } else {
                if filament && self.unload_amount > 0.0 {
                    lines.push("M400; Complete all moves".to_string());
                    if self.quick_purge {
                        let quick = if extruder.retraction_amount < 2.0 {
                            extruder.retraction_amount + 7.0
                        } else {
                            extruder.retraction_amount * 2.5
                        };
                        lines.push(format!(
                            "G1 F{} E{}; Quick purge before unload",
                            purge_speed,
                            n(quick)
                        ));
                    }
                    lines.extend(unload_moves(self.unload_amount, unload_feed));
                }
                if self.control_temperatures {
                    if let Some(standby) = self.standby_temperature {
                        lines.push(format!("M104 S{}; Standby temperature", n(standby)));
                    }
                }
            }
        }

        if !msg.is_empty() {
            lines.push(format!("M117 {}; Message to LCD", msg));
        }
        if !griffin && self.hold_steppers_minutes > 0.0 {
            lines.push(format!(
                "M84 S{}; Keep steppers engaged for {} minutes",
                n((self.hold_steppers_minutes * 60.0).round()),
                n(self.hold_steppers_minutes)
            ));
        }
        if self.beep {
            lines.push(format!("M300 S440 P{}; Beep", self.beep_length));
        }
        lines.extend(user_gcode_lines(&self.gcode_before));
        if !msg.is_empty() {
            lines.push(format!("M118 {}; Message to print server", msg));
        }
        lines.push(format!(
            "{}; Do the actual pause",
            method.command(msg, &self.custom_pause_command, self.dwell_minutes)
        ));
        lines.extend(user_gcode_lines(&self.gcode_after));

        let e_reset = if point.relative_extrusion {
            0.0
        } else {
            point.location.e.unwrap_or(0.0)
        };

        if repetier {
            if self.purge_amount != 0.0 {
                lines.push(format!(
                    "G1 F{} E{}; Extra extrude after the unpause",
                    purge_speed,
                    n(self.purge_amount)
                ));
                lines.push("@info wait for cleaning nozzle from previous filament".to_string());
                lines.push(
                    "@pause remove the waste filament from parking area and press continue printing"
                        .to_string(),
                );
                lines.push(format!("G1 F{} E-{}; Retract", retract, amount));
            }
            if self.park {
                lines.push(format!("G0 F{} X{} Y{}; Return to print location", travel, n(x), n(y)));
                lines.push(format!("G1 F{} Z{}; Drop down to print height", zhop, n(z)));
            }
            if !retracted || self.purge_amount != 0.0 {
                lines.push(format!("G1 F{} E{}; Unretract", prime, amount));
            }
            lines.push(extrusion_mode_line(point.relative_extrusion));
            lines.push(format!("G92 E{}; Reset extruder", n(e_reset)));
        } else if !griffin {
            if self.control_temperatures {
                let temperature = self
                    .resume_temperature
                    .unwrap_or(extruder.print_temperature);
                lines.push(if self.wait_for_resume_temperature {
                    format!("M109 S{}; Wait for resume temperature", n(temperature))
                } else {
                    format!("M104 S{}; Resume temperature", n(temperature))
                });
            }
            if filament {
                lines.extend(reload_moves(
                    self.reload_amount,
                    unload_feed,
                    extruder.nozzle_size,
                ));
                if self.purge_amount > 0.0 {
                    lines.push(format!(
                        "G1 F{} E{}; Purge",
                        n(purge_feed(extruder.nozzle_size)),
                        n(self.purge_amount)
                    ));
                    lines.push(if printer.firmware_retract {
                        "G10; Retract".to_string()
                    } else {
                        format!("G1 F{} E-{}; Retract", retract, amount)
                    });
                    lines.push("M400; Complete all moves".to_string());
                    lines.push("M300 P250; Beep".to_string());
                    lines.push("G4 S2; Wait for 2 seconds".to_string());
                }
            }
            if self.park {
                lines.push(format!("G0 F{} X{} Y{}; Move to resume location", travel, n(x), n(y)));
                lines.push(format!("G1 F{} Z{}; Move back down to resume height", zhop, n(z)));
            }
            let purged = filament && self.purge_amount > 0.0;
            if !retracted || purged {
                lines.push(if printer.firmware_retract {
                    "G11; Unretract".to_string()
                } else {
                    format!("G1 F{} E{}; Unretract", prime, amount)
                });
            }
            if self.reason == PauseReason::Other && self.extra_prime > 0.0 {
                lines.push(format!("G1 F{} E{}; Extra Prime", prime, n(self.extra_prime)));
            }
            lines.push(extrusion_mode_line(point.relative_extrusion));
            lines.push(format!("G92 E{}; Reset extruder location", n(e_reset)));
        }

        lines.push(format!(";{}; End of the Pause code", "-".repeat(26)));
        align_comments(&lines, COMMENT_COLUMN)
    }

    fn insert_pauses(
        &self,
        doc: &mut Document,
        layers: &[u32],
        ctx: &mut TransformContext,
    ) -> usize {
        let index = BlockIndex::build(doc);
        let mut inserted = 0;
        for (position, &layer) in layers.iter().enumerate() {
            let Some(target) = index.preview_layer_to_block_index(layer) else {
                ctx.diagnostics
                    .warn(self.name(), format!("Layer {} not found", layer));
                continue;
            };
            let host = target - 1;
            let location = resolve_return_location(doc, target, 0);
            if self.park && location.xy().is_none() {
                ctx.diagnostics.warn(
                    self.name(),
                    format!("No XY position before layer {}, pause skipped", layer),
                );
                continue;
            }
            let previous_layer = index.preview_to_layer(layer) - 1;
            let z = location
                .z
                .unwrap_or_else(|| ctx.printer.nominal_layer_z(previous_layer));
            let point = PausePoint {
                preview_layer: layer,
                previous_layer,
                message: self.message_for(position),
                location,
                z,
                tool: machine_state_at(doc, target, 0).active_tool,
                relative_extrusion: extrusion_mode_at(doc, target, 0)
                    .unwrap_or(ctx.printer.relative_extrusion),
            };
            let lines = self.sequence(&point, &ctx.printer);
            match doc.edit_block(host) {
                Ok(mut block) => {
                    block.insert_before_trailer(lines);
                    inserted += 1;
                }
                Err(e) => ctx.diagnostics.warn(self.name(), e.to_string()),
            }
        }
        inserted
    }
}

impl Transform for PauseAtLayer {
    fn name(&self) -> &str {
        "pause_at_layer"
    }

    fn description(&self) -> &str {
        "Pauses the print before selected layers, with optional filament change"
    }

    fn requires(&self) -> Vec<Capability> {
        vec![Capability::LayerMarkers]
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        let layers = match parse_layer_list("layers", &self.layers) {
            Ok(layers) => layers,
            Err(e) => return skip(doc, e),
        };
        if self.pause_method == PauseMethod::Custom && self.custom_pause_command.trim().is_empty() {
            return skip(
                doc,
                TransformError::MissingSetting {
                    setting: "custom_pause_command".to_string(),
                },
            );
        }

        let renumber = self.renumber_one_at_a_time
            && ctx.printer.print_sequence == PrintSequence::OneAtATime;
        if renumber {
            doc.renumber_layers(LayerNumbering::Continuous);
        }
        let inserted = self.insert_pauses(&mut doc, &layers, ctx);
        if renumber {
            doc.renumber_layers(LayerNumbering::PerModel);
        }
        tracing::info!(inserted, "inserted pauses");
        Ok(doc)
    }
}
