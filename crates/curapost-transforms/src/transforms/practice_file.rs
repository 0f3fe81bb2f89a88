//! Dry-run file: a layer range with no extrusion and no heating

use serde::{Deserialize, Serialize};

use curapost_core::units::round_to;
use curapost_core::{format_number, TransformError};
use curapost_parser::{
    resolve_return_location, BlockIndex, CommandLine, Document, EditScope, LineEdit,
};

use crate::transform::{skip, Transform, TransformContext, TransformResult};

const HEATER_COMMANDS: [u32; 4] = [104, 109, 140, 190];

/// Keeps a layer range and makes it safe to run cold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeFile {
    /// First kept preview layer (1-based)
    pub start_layer: u32,
    /// Last kept preview layer, `-1` for the last layer
    pub end_layer: i64,
    pub autohome_command: String,
}

impl Default for PracticeFile {
    fn default() -> Self {
        Self {
            start_layer: 1,
            end_layer: -1,
            autohome_command: "G28".to_string(),
        }
    }
}

/// Drop `E` from moves and comment out heater commands
fn make_cold(text: &str) -> LineEdit {
    let Some(mut cmd) = CommandLine::parse(text) else {
        return LineEdit::Keep;
    };
    if HEATER_COMMANDS.iter().any(|&n| cmd.is('M', n)) {
        return LineEdit::Replace(format!(";{}", text));
    }
    if cmd.is_move() && cmd.remove('E') {
        return LineEdit::Replace(cmd.render());
    }
    LineEdit::Keep
}

impl PracticeFile {
    fn range(&self, index: &BlockIndex) -> Result<(usize, usize), TransformError> {
        let first = index
            .preview_layer_to_block_index(self.start_layer)
            .ok_or_else(|| {
                TransformError::invalid("start_layer", format!("layer {} not found", self.start_layer))
            })?;
        let last = match self.end_layer {
            -1 => index.last_layer_block(),
            n if n > 0 => {
                let layer = u32::try_from(n).map_err(|_| {
                    TransformError::invalid("end_layer", format!("{} is out of range", n))
                })?;
                index.preview_layer_to_block_index(layer)
            }
            _ => None,
        }
        .ok_or_else(|| {
            TransformError::invalid("end_layer", format!("layer {} not found", self.end_layer))
        })?;
        Ok((first, last.max(first)))
    }
}

impl Transform for PracticeFile {
    fn name(&self) -> &str {
        "practice_file"
    }

    fn description(&self) -> &str {
        "Keeps a layer range with extrusion and heating removed for dry runs"
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        let index = BlockIndex::build(&doc);
        let (first, last) = match self.range(&index) {
            Ok(range) => range,
            Err(e) => return skip(doc, e),
        };
        let resume_z = resolve_return_location(&doc, first, 0)
            .z
            .filter(|z| *z > 0.0)
            .unwrap_or_else(|| {
                let layer = doc.blocks()[first].layer_number().unwrap_or(0);
                ctx.printer.nominal_layer_z(layer)
            });

        let deleted = doc.delete_blocks(|i, _| i < first || i > last);
        let kept = doc.layer_range();

        for block in 1..doc.len() {
            match doc.edit_block(block) {
                Ok(mut editor) => {
                    editor.map_lines(EditScope::Body, |_, text| make_cold(text));
                }
                Err(e) => return skip(doc, e.into()),
            }
        }
        let home = [
            self.autohome_command.trim().to_uppercase(),
            format!("G1 Z{}", format_number(round_to(resume_z, 3))),
        ];
        let park = ["G1 X0 Y0", "M118 END OF GCODE"];
        match doc.edit_block(kept.start) {
            Ok(mut block) => {
                block.insert_lines(0, home);
            }
            Err(e) => return skip(doc, e.into()),
        }
        match doc.edit_block(kept.end - 1) {
            Ok(mut block) => {
                block.insert_before_trailer(park);
            }
            Err(e) => return skip(doc, e.into()),
        }
        tracing::info!(deleted, resume_z, "built practice file");
        Ok(doc)
    }
}
