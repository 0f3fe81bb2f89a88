//! Remove the wipe move at the end of outer wall and infill runs

use serde::{Deserialize, Serialize};

use curapost_core::TransformError;
use curapost_parser::{
    feature_regions, BlockIndex, CommandLine, Document, EditScope, Feature, LineEdit,
};

use crate::transform::{skip, Capability, Transform, TransformContext, TransformResult};

/// Features whose closing wipe is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WipeTarget {
    #[default]
    OuterWall,
    Infill,
    Both,
}

impl WipeTarget {
    fn covers(&self, feature: &Feature) -> bool {
        match self {
            Self::OuterWall => *feature == Feature::WallOuter,
            Self::Infill => *feature == Feature::Fill,
            Self::Both => true,
        }
    }
}

/// Comments out the travel that follows the last extrusion of a feature
///
/// Only the first extruder's wipe distances decide whether there is
/// anything to remove.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KillWipes {
    pub wipe_to_kill: WipeTarget,
    /// First preview layer (1-based)
    pub start_layer: u32,
    /// Last preview layer, `-1` for the last layer
    pub end_layer: i64,
}

impl Default for KillWipes {
    fn default() -> Self {
        Self {
            wipe_to_kill: WipeTarget::OuterWall,
            start_layer: 25,
            end_layer: -1,
        }
    }
}

/// Index of the wipe move closing `region`, if there is one
fn wipe_line(lines: &[String], (start, end): (usize, usize)) -> Option<usize> {
    let last = (start + 1..end)
        .rev()
        .find(|&i| CommandLine::parse(&lines[i]).is_some_and(|c| c.is_extrusion()))?;
    let next = last + 1;
    let is_wipe = CommandLine::parse(lines.get(next)?).is_some_and(|c| {
        c.is_move() && !c.has('E') && !c.has('Z') && (c.has('X') || c.has('Y'))
    });
    (next < end && is_wipe).then_some(next)
}

/// Comment the wipe out, keeping its feed rate for the moves after it
fn comment_out(text: &str) -> LineEdit {
    let feed = CommandLine::parse(text)
        .and_then(|c| c.param('F').map(|p| p.raw().to_string()));
    match feed {
        Some(feed) => LineEdit::Expand(vec![format!(";{}", text), format!("G0 F{}", feed)]),
        None => LineEdit::Replace(format!(";{}", text)),
    }
}

impl KillWipes {
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
                index
                    .preview_layer_to_block_index(layer)
                    .or_else(|| index.last_layer_block())
            }
            _ => None,
        }
        .ok_or_else(|| {
            TransformError::invalid("end_layer", format!("{} is not a layer number", self.end_layer))
        })?;
        Ok((first, last.max(first)))
    }
}

impl Transform for KillWipes {
    fn name(&self) -> &str {
        "kill_wipes"
    }

    fn description(&self) -> &str {
        "Removes the wipe move after outer walls and/or infill over a layer range"
    }

    fn requires(&self) -> Vec<Capability> {
        vec![Capability::LayerMarkers, Capability::TypeMarkers]
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        let extruder = ctx.printer.extruder(0);
        let mut features = Vec::new();
        let mut disabled = Vec::new();
        for (feature, distance, label) in [
            (Feature::WallOuter, extruder.wall_0_wipe_dist, "outer wall"),
            (Feature::Fill, extruder.infill_wipe_dist, "infill"),
        ] {
            if !self.wipe_to_kill.covers(&feature) {
                continue;
            }
            if distance > 0.0 {
                features.push(feature.marker());
            } else {
                disabled.push(label);
            }
        }
        if features.is_empty() {
            return skip(
                doc,
                TransformError::precondition(format!(
                    "{} wipe distance is 0",
                    disabled.join(" and ")
                )),
            );
        }
        for label in disabled {
            ctx.diagnostics.warn(
                self.name(),
                format!("{} wipe distance is 0, {} left unchanged", label, label),
            );
        }

        let index = BlockIndex::build(&doc);
        let (first, last) = match self.range(&index) {
            Ok(range) => range,
            Err(e) => return skip(doc, e),
        };

        let mut removed = 0;
        for block in first..=last {
            let wipes: Vec<usize> = {
                let current = &doc.blocks()[block];
                features
                    .iter()
                    .flat_map(|marker| feature_regions(current, marker))
                    .filter_map(|region| wipe_line(current.lines(), region))
                    .collect()
            };
            if wipes.is_empty() {
                continue;
            }
            match doc.edit_block(block) {
                Ok(mut editor) => {
                    removed += editor.map_lines(EditScope::Body, |i, text| {
                        if wipes.contains(&i) {
                            comment_out(text)
                        } else {
                            LineEdit::Keep
                        }
                    });
                }
                Err(e) => return skip(doc, e.into()),
            }
        }
        tracing::debug!(removed, "removed wipe moves");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(n: u32) -> String {
        format!(
            ";LAYER:{n}\n;TYPE:WALL-OUTER\nG1 F1500 X10 Y10 E{n}.1\nG1 X20 Y10 E{n}.2\nG0 F9000 X20.2 Y10.1\n\
             ;TYPE:FILL\nG1 X30 Y30 E{n}.3\nG0 X31 Y30\n;TIME_ELAPSED:{n}\n"
        )
    }

    fn doc() -> Document {
        Document::from_blocks([
            ";FLAVOR:Marlin\n".to_string(),
            "G28\n;LAYER_COUNT:3\n".to_string(),
            layer(0),
            layer(1),
            layer(2),
            "M84\n".to_string(),
        ])
    }

    #[test]
    fn test_outer_wall_wipe_removed_from_start_layer() {
        let t = KillWipes {
            start_layer: 2,
            ..KillWipes::default()
        };
        let mut ctx = TransformContext::default();
        let out = t.apply(doc(), &mut ctx).unwrap();
        assert_eq!(out.blocks()[2], doc().blocks()[2]);
        for block in [3, 4] {
            let lines = out.blocks()[block].lines();
            assert_eq!(lines[4], ";G0 F9000 X20.2 Y10.1");
            assert_eq!(lines[5], "G0 F9000");
            assert_eq!(lines[8], "G0 X31 Y30");
        }
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn test_end_layer_limits_range() {
        let t = KillWipes {
            wipe_to_kill: WipeTarget::Both,
            start_layer: 1,
            end_layer: 2,
        };
        let mut ctx = TransformContext::default();
        ctx.printer.extruders[0].infill_wipe_dist = 0.1;
        let out = t.apply(doc(), &mut ctx).unwrap();
        assert_eq!(out.blocks()[2].lines()[8], ";G0 X31 Y30");
        assert_eq!(out.blocks()[3].lines()[8], ";G0 X31 Y30");
        assert_eq!(out.blocks()[4], doc().blocks()[4]);
    }

    #[test]
    fn test_disabled_infill_wipe_is_reported() {
        let t = KillWipes {
            wipe_to_kill: WipeTarget::Both,
            start_layer: 1,
            ..KillWipes::default()
        };
        let mut ctx = TransformContext::default();
        let out = t.apply(doc(), &mut ctx).unwrap();
        assert_eq!(out.blocks()[2].lines()[4], ";G0 F9000 X20.2 Y10.1");
        assert_eq!(out.blocks()[2].lines()[8], "G0 X31 Y30");
        assert_eq!(ctx.diagnostics.len(), 1);

        let infill_only = KillWipes {
            wipe_to_kill: WipeTarget::Infill,
            start_layer: 1,
            ..KillWipes::default()
        };
        let skipped = infill_only.apply(doc(), &mut ctx).unwrap_err();
        assert_eq!(skipped.document, doc());
        assert!(matches!(skipped.reason, TransformError::PreconditionNotMet { .. }));
    }

    #[test]
    fn test_region_without_wipe_is_untouched() {
        let doc = Document::from_blocks([
            ";FLAVOR:Marlin\n",
            "G28\n;LAYER_COUNT:1\n",
            ";LAYER:0\n;TYPE:WALL-OUTER\nG1 X10 Y10 E1\nG1 F2700 E-1\n;TYPE:FILL\n",
            "M84\n",
        ]);
        let t = KillWipes {
            start_layer: 1,
            ..KillWipes::default()
        };
        let mut ctx = TransformContext::default();
        let out = t.apply(doc.clone(), &mut ctx).unwrap();
        assert_eq!(out, doc);
    }
}
