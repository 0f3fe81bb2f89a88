//! Sentence numbers in front of every line

use serde::{Deserialize, Serialize};

use curapost_parser::{Document, EditScope, LineEdit};

use crate::transform::{skip, Capability, Transform, TransformContext, TransformResult};

/// Prefixes lines with `N<number>`, counting across the whole document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineNumbering {
    pub prefix: String,
    pub start: u64,
    /// Leave `;` comment lines unnumbered
    pub skip_comments: bool,
}

impl Default for LineNumbering {
    fn default() -> Self {
        Self {
            prefix: "N".to_string(),
            start: 1,
            skip_comments: true,
        }
    }
}

impl Transform for LineNumbering {
    fn name(&self) -> &str {
        "line_numbering"
    }

    fn description(&self) -> &str {
        "Adds sentence numbers to the start of each line"
    }

    fn invalidates(&self) -> Vec<Capability> {
        if self.skip_comments {
            return Vec::new();
        }
        vec![
            Capability::LayerMarkers,
            Capability::TypeMarkers,
            Capability::TimeElapsedMarkers,
            Capability::LayerCount,
            Capability::HeaderBounds,
        ]
    }

    fn apply(&self, mut doc: Document, _ctx: &mut TransformContext) -> TransformResult {
        let mut number = self.start;
        for index in 0..doc.len() {
            let mut block = match doc.edit_block(index) {
                Ok(block) => block,
                Err(e) => return skip(doc, e.into()),
            };
            block.map_lines(EditScope::IncludeMarkers, |_, text| {
                if text.is_empty() || (self.skip_comments && text.starts_with(';')) {
                    return LineEdit::Keep;
                }
                let numbered = format!("{}{} {}", self.prefix, number, text);
                number += 1;
                LineEdit::Replace(numbered)
            });
        }
        tracing::debug!(lines = number - self.start, "numbered lines");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::from_blocks([";FLAVOR:Marlin\n", "G28\n\n;LAYER_COUNT:1\n", ";LAYER:0\nG1 X1\n", "M84\n"])
    }

    #[test]
    fn test_numbers_run_across_blocks() {
        let mut ctx = TransformContext::default();
        let out = LineNumbering::default().apply(doc(), &mut ctx).unwrap();
        assert_eq!(
            out.to_gcode(),
            ";FLAVOR:Marlin\nN1 G28\n\n;LAYER_COUNT:1\n;LAYER:0\nN2 G1 X1\nN3 M84\n"
        );
    }

    #[test]
    fn test_numbering_comments_loses_markers() {
        let t = LineNumbering {
            prefix: "L".to_string(),
            start: 10,
            skip_comments: false,
        };
        let mut ctx = TransformContext::default();
        let out = t.apply(doc(), &mut ctx).unwrap();
        assert_eq!(out.blocks()[2].to_text(), "L13 ;LAYER:0\nL14 G1 X1\n");
        assert_eq!(t.invalidates().len(), 5);
    }
}
