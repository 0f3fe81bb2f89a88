//! Firmware setting changes appended to the start sequence

use serde::{Deserialize, Serialize};

use curapost_core::TransformError;
use curapost_parser::{CommandLine, Document};

use crate::transform::{skip, Transform, TransformContext, TransformResult};

/// Per-axis values; `None` leaves the firmware value alone
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisValues {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub e: Option<f64>,
}

impl AxisValues {
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none() && self.e.is_none()
    }

    /// `word` with the set axes of `axes`, `None` when none of them is set
    fn command(&self, word: &str, axes: &[char], comment: &str) -> Option<String> {
        let mut cmd = CommandLine::new(word);
        for &axis in axes {
            let value = match axis {
                'X' => self.x,
                'Y' => self.y,
                'Z' => self.z,
                _ => self.e,
            };
            if let Some(value) = value {
                cmd = cmd.with(axis, value);
            }
        }
        if cmd.params().is_empty() {
            return None;
        }
        Some(format!("{} ;{}", cmd.render(), comment))
    }
}

/// Writes `M203`/`M201`/`M206`/`M92` into the start sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterSettingsPatch {
    /// Max feed rates in mm/s
    pub max_feedrate: AxisValues,
    /// Max accelerations in mm/s², X and Y only
    pub max_accel: AxisValues,
    pub home_offset: AxisValues,
    pub steps_per_mm: AxisValues,
    /// Persist with `M500`
    pub save_to_eeprom: bool,
}

impl PrinterSettingsPatch {
    fn commands(&self) -> Vec<String> {
        [
            self.max_feedrate
                .command("M203", &['X', 'Y', 'Z', 'E'], "Change Max Feed Rate"),
            self.max_accel.command("M201", &['X', 'Y'], "Change Max Accel"),
            self.home_offset
                .command("M206", &['X', 'Y', 'Z'], "Change Home Offset"),
            self.steps_per_mm
                .command("M92", &['X', 'Y', 'Z', 'E'], "Change Steps/MM"),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl Transform for PrinterSettingsPatch {
    fn name(&self) -> &str {
        "printer_settings_patch"
    }

    fn description(&self) -> &str {
        "Adds firmware setting changes to the start sequence"
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        let commands = self.commands();
        if commands.is_empty() {
            return skip(doc, TransformError::precondition("no setting was changed"));
        }
        let mut lines = vec![";  Change Printer Settings".to_string()];
        lines.extend(commands);
        if self.save_to_eeprom {
            lines.push("M500 ;Save changes to printer".to_string());
            lines.push("G4 P500 ;Pause for save".to_string());
        }
        lines.push(";  End of Changes".to_string());

        match doc.edit_block(1) {
            Ok(mut start) => {
                start.insert_before_trailer(&lines);
            }
            Err(e) => return skip(doc, e.into()),
        }
        ctx.diagnostics.info(
            self.name(),
            format!("{} firmware setting commands added", lines.len() - 2),
        );
        Ok(doc)
    }
}
