//! Z clearance move at the start of the end sequence

use serde::{Deserialize, Serialize};

use curapost_core::units::round_to;
use curapost_core::{format_number, PrintSequence, TransformError};
use curapost_parser::{header_bounds, Document};

use crate::transform::{skip, Capability, Transform, TransformContext, TransformResult};

/// Z feed rate ceiling in mm/min
const MAX_Z_FEED: f64 = 2700.0;

/// Lifts the nozzle above the tallest model before the end sequence runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalZ {}

impl FinalZ {
    pub fn new() -> Self {
        Self {}
    }
}

impl Transform for FinalZ {
    fn name(&self) -> &str {
        "final_z"
    }

    fn description(&self) -> &str {
        "Moves Z clear of the tallest model before the end sequence"
    }

    fn requires(&self) -> Vec<Capability> {
        vec![Capability::HeaderBounds]
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        let printer = &ctx.printer;
        let Some(max_z) = header_bounds(&doc).and_then(|b| b.max_z) else {
            return skip(doc, TransformError::marker(";MAXZ:"));
        };
        let Some(end) = doc.end_index() else {
            return skip(doc, TransformError::precondition("the file has no end block"));
        };
        let lift = match printer.print_sequence {
            PrintSequence::AllAtOnce => 5.0,
            PrintSequence::OneAtATime => 0.0,
        };
        let z = round_to(max_z + lift, 2).min(printer.machine_height);
        let line = format!(
            "G0 F{} Z{} ; {} final Z move",
            format_number(printer.z_feed(MAX_Z_FEED)),
            format_number(z),
            printer.print_sequence
        );
        match doc.edit_block(end) {
            Ok(mut block) => {
                block.insert_lines(0, [line]);
            }
            Err(e) => return skip(doc, e.into()),
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curapost_core::PrinterConfig;

    fn doc(max_z: f64) -> Document {
        Document::from_blocks([
            format!(";FLAVOR:Marlin\n;MINX:10\n;MINY:10\n;MAXX:50\n;MAXY:50\n;MAXZ:{}\n", max_z),
            "G28\n;LAYER_COUNT:1\n".to_string(),
            ";LAYER:0\nG1 X1 Y1 E1\n".to_string(),
            "M104 S0\n".to_string(),
        ])
    }

    #[test]
    fn test_all_at_once_adds_clearance() {
        let mut ctx = TransformContext::default();
        let out = FinalZ::new().apply(doc(40.0), &mut ctx).unwrap();
        assert_eq!(
            out.end().unwrap().to_text(),
            "G0 F600 Z45 ; all_at_once final Z move\nM104 S0\n"
        );
    }

    #[test]
    fn test_clamped_to_machine_height() {
        let mut ctx = TransformContext::new(PrinterConfig {
            print_sequence: PrintSequence::OneAtATime,
            max_feedrate_z: 100.0,
            machine_height: 120.0,
            ..PrinterConfig::default()
        });
        let out = FinalZ::new().apply(doc(180.0), &mut ctx).unwrap();
        assert_eq!(out.end().unwrap().lines()[0], "G0 F2700 Z120 ; one_at_a_time final Z move");
    }

    #[test]
    fn test_missing_bounds_is_skipped() {
        let plain = Document::from_blocks([";FLAVOR:Marlin\n", "G28\n", ";LAYER:0\n", "M84\n"]);
        let mut ctx = TransformContext::default();
        assert!(FinalZ::new().apply(plain, &mut ctx).is_err());
    }
}
