//! Purge lines along one bed edge before the print starts

use serde::{Deserialize, Serialize};

use curapost_core::units::{filament_area, round_to};
use curapost_core::{format_number, BedShape, PrinterConfig, TransformError};
use curapost_parser::{align_comments, CommandLine, Document};

use crate::transform::{skip, Corner, Transform, TransformContext, TransformResult};

const COMMENT_COLUMN: usize = 30;

/// Bed edge carrying the purge lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeLocation {
    #[default]
    Left,
    Right,
    Bottom,
    Top,
}

impl PurgeLocation {
    fn label(&self) -> &'static str {
        match self {
            Self::Left => "MinX",
            Self::Right => "MaxX",
            Self::Bottom => "MinY",
            Self::Top => "MaxY",
        }
    }

    /// Corner the nozzle ends up in after the wipe
    pub fn end_corner(&self) -> Corner {
        match self {
            Self::Left | Self::Bottom => Corner::LeftFront,
            Self::Right | Self::Top => Corner::RightRear,
        }
    }
}

/// Two parallel purge lines and a wipe, inserted into the start sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddPurgeLines {
    pub location: PurgeLocation,
    /// Run the lines along the whole edge instead of half of it
    pub full_length: bool,
}

impl Default for AddPurgeLines {
    fn default() -> Self {
        Self {
            location: PurgeLocation::Left,
            full_length: true,
        }
    }
}

/// Coordinates measured from the left-front corner, rendered in machine space
struct Plate {
    origin: (f64, f64),
    width: f64,
    depth: f64,
}

impl Plate {
    fn new(printer: &PrinterConfig) -> Self {
        Self {
            origin: printer.bed_min(),
            width: printer.machine_width,
            depth: printer.machine_depth,
        }
    }

    fn x(&self, x: f64) -> String {
        format!("X{}", format_number(round_to(x + self.origin.0, 2)))
    }

    fn y(&self, y: f64) -> String {
        format!("Y{}", format_number(round_to(y + self.origin.1, 2)))
    }

    fn xy(&self, x: f64, y: f64) -> String {
        format!("{} {}", self.x(x), self.y(y))
    }
}

impl AddPurgeLines {
    fn purge_length(&self, edge: f64) -> f64 {
        if self.full_length {
            edge.trunc() - 20.0
        } else {
            (edge / 2.0).trunc()
        }
    }

    fn sequence(&self, printer: &PrinterConfig) -> Vec<String> {
        let extruder = printer.extruder(0);
        let plate = Plate::new(printer);
        let (w, d) = (plate.width, plate.depth);
        let travel = format_number(extruder.travel_feed());
        let print = format_number((extruder.speeds.print * 60.0 * 0.75).round());
        let edge = match self.location {
            PurgeLocation::Left | PurgeLocation::Right => d,
            PurgeLocation::Bottom | PurgeLocation::Top => w,
        };
        let length = self.purge_length(edge);
        let volume = round_to(
            extruder.skirt_brim_line_width * 0.3 * length * 1.25
                / filament_area(extruder.material_diameter),
            5,
        );
        let first = format_number(volume);
        let second = format_number(round_to(volume * 2.0, 5));
        // distance along the edge where the first line stops
        let stop = if self.full_length {
            edge.trunc() - 10.0
        } else {
            (edge / 2.0).trunc()
        };

        let mut lines = vec![
            format!(";TYPE:CUSTOM----------[Purge Lines at {}]", self.location.label()),
            "G0 F600 Z2 ; Move up".to_string(),
            "G92 E0 ; Reset extruder".to_string(),
        ];
        let (approach, first_end, over, second_end, slide, wipe) = match self.location {
            PurgeLocation::Left => (
                vec![format!("G0 F{} {} ; Move to start", travel, plate.xy(0.0, 10.0))],
                plate.xy(0.0, stop),
                plate.xy(3.0, stop),
                plate.xy(3.0, 10.0),
                plate.xy(3.0, 20.0),
                plate.xy(3.0, 35.0),
            ),
            PurgeLocation::Right => {
                let stop = d - stop;
                (
                    vec![
                        format!("G0 F{} {} ; Move", travel, plate.x(w)),
                        format!("G0 {} ; Move", plate.y(d - 10.0)),
                    ],
                    plate.xy(w, stop),
                    plate.xy(w - 3.0, stop),
                    plate.xy(w - 3.0, d - 10.0),
                    plate.xy(w - 3.0, d - 20.0),
                    plate.xy(w - 3.0, d - 35.0),
                )
            }
            PurgeLocation::Bottom => (
                vec![format!("G0 F{} {} ; Move to start", travel, plate.xy(10.0, 0.0))],
                plate.xy(stop, 0.0),
                plate.xy(stop, 3.0),
                plate.xy(10.0, 3.0),
                plate.xy(20.0, 3.0),
                plate.xy(35.0, 3.0),
            ),
            PurgeLocation::Top => {
                let stop = w - stop;
                (
                    vec![
                        format!("G0 F{} {} ; Ortho Move to back", travel, plate.y(d)),
                        format!("G0 {} ; Ortho move to start", plate.x(w - 10.0)),
                    ],
                    plate.xy(stop, d),
                    plate.xy(stop, d - 3.0),
                    plate.xy(w - 10.0, d - 3.0),
                    plate.xy(w - 20.0, d - 3.0),
                    plate.xy(w - 35.0, d - 3.0),
                )
            }
        };
        lines.extend(approach);
        lines.push("G0 F600 Z0.3 ; Move down".to_string());
        lines.push(format!("G1 F{} {} E{} ; First line", print, first_end, first));
        lines.push(format!("G0 {} ; Move over", over));
        lines.push(format!("G1 F{} {} E{} ; Second line", print, second_end, second));
        if extruder.retraction_enable {
            lines.push(format!(
                "G1 F{} E{} ; Retract",
                format_number(extruder.retract_feed()),
                format_number(round_to(volume * 2.0 - extruder.retraction_amount, 5))
            ));
        }
        lines.push("G0 F600 Z8 ; Move Up".to_string());
        lines.push("G4 S1 ; Wait for 1 second".to_string());
        lines.push(format!("G0 F{} {} Z0.3 ; Slide over and down", print, slide));
        lines.push(format!("G0 {} ; Wipe", wipe));
        lines.push("G0 F600 Z1 ; Move Z".to_string());
        lines.push(";---------------------[End of Purge]".to_string());
        align_comments(&lines, COMMENT_COLUMN)
    }
}

/// Last line of the start block resetting E: `G92 E0` (absolute) or `M83` (relative)
fn insertion_point(doc: &Document) -> Option<usize> {
    let start = doc.start()?;
    start
        .lines()
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .find(|(_, l)| CommandLine::parse(l).is_some_and(|c| resets_extruder(&c)))
        .map(|(i, _)| i)
}

fn resets_extruder(command: &CommandLine) -> bool {
    (command.is('G', 92) && command.get('E') == Some(0.0)) || command.is('M', 83)
}

impl Transform for AddPurgeLines {
    fn name(&self) -> &str {
        "add_purge_lines"
    }

    fn description(&self) -> &str {
        "Adds purge lines along a bed edge at the end of the start sequence"
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        if ctx.printer.bed_shape == BedShape::Elliptic {
            return skip(
                doc,
                TransformError::precondition("purge lines need a rectangular bed"),
            );
        }
        let Some(at) = insertion_point(&doc) else {
            return skip(doc, TransformError::marker("G92 E0"));
        };
        let lines = self.sequence(&ctx.printer);
        match doc.edit_block(1) {
            Ok(mut start) => {
                start.insert_lines(at, lines);
            }
            Err(e) => return skip(doc, e.into()),
        }
        ctx.carry.purge_end_corner = Some(self.location.end_corner());
        tracing::debug!(location = ?self.location, "added purge lines");
        Ok(doc)
    }
}
