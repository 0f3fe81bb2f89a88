//! Skip auto bed levelling for small or short prints

use serde::{Deserialize, Serialize};

use curapost_core::units::round_to;
use curapost_core::{AdhesionType, PrinterConfig, TransformError};
use curapost_parser::{header_bounds, header_print_time, Document, EditScope, LineEdit};

use crate::transform::{skip, Capability, Transform, TransformContext, TransformResult};

/// Comments out `G29`/`M420` in the start sequence below the configured minimums
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisableAbl {
    /// Footprint in mm² below which levelling is skipped
    pub min_footprint: Option<f64>,
    /// Print time in minutes below which levelling is skipped
    pub min_minutes: Option<f64>,
    /// Adhesion width to subtract from each footprint side; derived from
    /// the adhesion settings when unset
    pub adhesion_margin: Option<f64>,
}

/// Width the skirt, brim or raft adds to each side of the footprint
fn adhesion_margin(printer: &PrinterConfig) -> f64 {
    let extruder = printer.extruder(0);
    let line_width = extruder.skirt_brim_line_width;
    match printer.adhesion_type {
        AdhesionType::Brim => printer.brim_width * 2.0 - line_width * 2.0,
        AdhesionType::Skirt if printer.skirt_line_count > 0 => {
            printer.skirt_gap * 2.0 + line_width * (printer.skirt_line_count as f64 - 0.5) * 2.0
        }
        AdhesionType::Skirt => 0.0,
        AdhesionType::Raft => printer.raft_margin * 2.0 - extruder.raft_base_line_width,
        AdhesionType::None => -line_width,
    }
}

fn disable(text: &str) -> LineEdit {
    if text.starts_with("G29") || text.starts_with("M420") {
        LineEdit::Replace(format!(";{} Disabled by ABL check", text))
    } else {
        LineEdit::Keep
    }
}

impl Transform for DisableAbl {
    fn name(&self) -> &str {
        "disable_abl"
    }

    fn description(&self) -> &str {
        "Disables auto bed levelling for prints below a size or time"
    }

    fn requires(&self) -> Vec<Capability> {
        vec![Capability::HeaderBounds]
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        if self.min_footprint.is_none() && self.min_minutes.is_none() {
            ctx.diagnostics
                .info(self.name(), "No minimums were set so ABL is enabled");
            return Ok(doc);
        }

        let mut reasons = Vec::new();
        if let Some(min_area) = self.min_footprint {
            let Some(bounds) = header_bounds(&doc) else {
                return skip(doc, TransformError::marker(";MINX:"));
            };
            let margin = self
                .adhesion_margin
                .unwrap_or_else(|| adhesion_margin(&ctx.printer));
            let area = round_to(
                (bounds.width() - margin) * (bounds.depth() - margin),
                2,
            );
            if area < min_area {
                reasons.push(format!("footprint {} mm²", area));
            }
        }
        if let Some(min_minutes) = self.min_minutes {
            let Some(seconds) = header_print_time(&doc) else {
                return skip(doc, TransformError::marker(";TIME:"));
            };
            if seconds < min_minutes * 60.0 {
                reasons.push(format!("print time {} min", round_to(seconds / 60.0, 1)));
            }
        }

        if reasons.is_empty() {
            ctx.diagnostics.info(
                self.name(),
                "The print is large or long so ABL is enabled",
            );
            return Ok(doc);
        }
        let disabled = match doc.edit_block(1) {
            Ok(mut start) => start.map_lines(EditScope::Body, |_, text| disable(text)),
            Err(e) => return skip(doc, e.into()),
        };
        ctx.diagnostics.info(
            self.name(),
            format!("ABL is disabled for this print ({})", reasons.join(", ")),
        );
        tracing::info!(disabled, "disabled bed levelling");
        Ok(doc)
    }
}
