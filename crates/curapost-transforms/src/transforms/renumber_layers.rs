//! One-at-a-Time layer renumbering

use serde::{Deserialize, Serialize};

use curapost_core::{PrintSequence, TransformError};
use curapost_parser::{Document, LayerNumbering};

use crate::transform::{skip, Capability, Transform, TransformContext, TransformResult};

/// Direction of the renumbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenumberMode {
    /// One continuous sequence across all models
    #[default]
    Renumber,
    /// Restart at 0 for every model again
    Revert,
}

/// Converts per-model layer numbering into one sequence, or back
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenumberLayers {
    pub mode: RenumberMode,
}

impl RenumberLayers {
    pub fn new(mode: RenumberMode) -> Self {
        Self { mode }
    }
}

impl Transform for RenumberLayers {
    fn name(&self) -> &str {
        "renumber_layers"
    }

    fn description(&self) -> &str {
        "Renumbers One-at-a-Time layers as one continuous sequence or reverts them"
    }

    fn requires(&self) -> Vec<Capability> {
        vec![Capability::LayerMarkers, Capability::LayerCount]
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        if ctx.printer.print_sequence == PrintSequence::AllAtOnce {
            return skip(
                doc,
                TransformError::precondition("the print sequence is All-at-Once"),
            );
        }
        let numbering = match self.mode {
            RenumberMode::Renumber => LayerNumbering::Continuous,
            RenumberMode::Revert => LayerNumbering::PerModel,
        };
        let numbered = doc.renumber_layers(numbering);
        tracing::info!(numbered, mode = ?self.mode, "renumbered layers");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curapost_core::PrinterConfig;

    fn one_at_a_time() -> TransformContext {
        TransformContext::new(PrinterConfig {
            print_sequence: PrintSequence::OneAtATime,
            ..PrinterConfig::default()
        })
    }

    fn two_models() -> Document {
        Document::from_blocks([
            ";FLAVOR:Marlin\n",
            "G28\n;LAYER_COUNT:2\n",
            ";LAYER:0\nG1 X1 Y1 E1\n;TIME_ELAPSED:1\n",
            ";LAYER:1\nG1 X1 Y1 E2\n;TIME_ELAPSED:2\n;LAYER_COUNT:3\n",
            "G0 Z20\n",
            ";LAYER:0\nG1 X5 Y5 E3\n;TIME_ELAPSED:3\n",
            ";LAYER:1\nG1 X5 Y5 E4\n;TIME_ELAPSED:4\n",
            ";LAYER:2\nG1 X5 Y5 E5\n;TIME_ELAPSED:5\n",
            "M84\n",
        ])
    }

    #[test]
    fn test_skips_all_at_once() {
        let mut ctx = TransformContext::default();
        let err = RenumberLayers::default().apply(two_models(), &mut ctx).unwrap_err();
        assert_eq!(err.document, two_models());
    }

    #[test]
    fn test_renumber_is_sequential() {
        let mut ctx = one_at_a_time();
        let out = RenumberLayers::default().apply(two_models(), &mut ctx).unwrap();
        let numbers: Vec<i32> = out
            .layer_range()
            .filter_map(|i| out.blocks()[i].layer_number())
            .collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
        assert!(out.blocks()[1].to_text().ends_with(";LAYER_COUNT:5\n"));
        assert!(out.invariant_violations().is_empty());
    }

    #[test]
    fn test_round_trip() {
        let mut ctx = one_at_a_time();
        let renumber = RenumberLayers::new(RenumberMode::Renumber);
        let revert = RenumberLayers::new(RenumberMode::Revert);
        let once = renumber.apply(two_models(), &mut ctx).unwrap();
        let back = revert.apply(once.clone(), &mut ctx).unwrap();
        let again = renumber.apply(back, &mut ctx).unwrap();
        assert_eq!(again, once);
    }
}
