//! Filament unload at the end of the print

use serde::{Deserialize, Serialize};

use curapost_core::TransformError;
use curapost_parser::{align_comments, CommandLine, Document};

use crate::helpers::unload_moves;
use crate::transform::{skip, Transform, TransformContext, TransformResult};

const COMMENT_COLUMN: usize = 30;
const UNLOAD_FEED: f64 = 3000.0;

/// Unloads the active extruder just before the hot end is switched off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnloadFilament {
    /// Unload distance in mm
    pub distance: f64,
}

impl Default for UnloadFilament {
    fn default() -> Self {
        Self { distance: 440.0 }
    }
}

impl Transform for UnloadFilament {
    fn name(&self) -> &str {
        "unload_filament"
    }

    fn description(&self) -> &str {
        "Unloads the filament before the end sequence turns the hot end off"
    }

    fn apply(&self, mut doc: Document, _ctx: &mut TransformContext) -> TransformResult {
        if self.distance <= 0.0 {
            return skip(doc, TransformError::invalid("distance", "must be greater than 0"));
        }
        let Some(end) = doc.end_index() else {
            return skip(doc, TransformError::marker("M104 S0"));
        };
        let Some(at) = doc.blocks()[end]
            .lines()
            .iter()
            .position(|l| {
                CommandLine::parse(l).is_some_and(|c| c.is('M', 104) && c.get('S') == Some(0.0))
            })
        else {
            return skip(doc, TransformError::marker("M104 S0"));
        };

        let mut lines = vec![
            "M83 ; Unload Relative extrusion".to_string(),
            "M400 ; Complete all moves".to_string(),
        ];
        lines.extend(unload_moves(self.distance, UNLOAD_FEED));
        lines.push("M82 ; Absolute Extrusion".to_string());
        lines.push("G92 E0 ; Reset Extruder".to_string());
        let lines = align_comments(&lines, COMMENT_COLUMN);

        match doc.edit_block(end) {
            Ok(mut block) => {
                block.insert_lines(at, lines);
            }
            Err(e) => return skip(doc, e.into()),
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unload_before_heater_off() {
        let doc = Document::from_blocks([
            ";H\n",
            "G28\n;LAYER_COUNT:1\n",
            ";LAYER:0\nG1 X1 Y1 E1\n;TIME_ELAPSED:3\n",
            "G91\nM104 S0\nM140 S0\n",
        ]);
        let mut ctx = TransformContext::default();
        let t = UnloadFilament { distance: 320.0 };
        let out = t.apply(doc, &mut ctx).unwrap();
        let lines = out.end().unwrap().lines();
        let code: Vec<&str> = lines
            .iter()
            .map(|l| l.split(';').next().unwrap_or_default().trim_end())
            .collect();
        assert_eq!(
            code,
            vec![
                "G91", "M83", "M400", "G1 F3000 E-150", "G1 F3000 E-150", "G1 F3000 E-20", "M82",
                "G92 E0", "M104 S0", "M140 S0",
            ]
        );
        assert_eq!(lines[1], format!("{:<30}; Unload Relative extrusion", "M83"));
    }

    #[test]
    fn test_heater_off_in_comment_is_ignored() {
        let doc = Document::from_blocks([
            ";H\n",
            "G28\n;LAYER_COUNT:1\n",
            ";LAYER:0\nG1 X1 Y1 E1\n",
            "G91 ; M104 S0 follows\nG0 Z5\nM104 S0\nM84\n",
        ]);
        let mut ctx = TransformContext::default();
        let out = UnloadFilament::default().apply(doc, &mut ctx).unwrap();
        let lines = out.end().unwrap().lines();
        assert_eq!(lines[0], "G91 ; M104 S0 follows");
        assert_eq!(lines[1], "G0 Z5");
        assert!(lines[2].starts_with("M83"));
        assert_eq!(lines[lines.len() - 2], "M104 S0");
    }

    #[test]
    fn test_missing_heater_off_is_skipped() {
        let doc = Document::from_blocks([";H\n", "G28\n", ";LAYER:0\n", "M84\n"]);
        let mut ctx = TransformContext::default();
        assert!(matches!(
            UnloadFilament::default().apply(doc, &mut ctx).unwrap_err().reason,
            TransformError::MarkerNotFound { .. }
        ));
    }
}
