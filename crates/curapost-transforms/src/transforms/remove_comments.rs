//! Comment removal

use serde::{Deserialize, Serialize};

use curapost_parser::{prefix, Document, EditScope, LineEdit};

use crate::transform::{skip, Capability, Transform, TransformContext, TransformResult};

/// Strips `;` comments from selectable regions
///
/// Full-line comments are dropped, inline comments are cut off together
/// with the spaces before them. Layer blocks are always processed; the
/// header, start and end blocks only when enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoveComments {
    pub include_opening: bool,
    pub include_startup: bool,
    /// Keep `;LAYER:` lines so later transforms can still find layers
    pub leave_layer_lines: bool,
    pub include_ending: bool,
}

impl Default for RemoveComments {
    fn default() -> Self {
        Self {
            include_opening: false,
            include_startup: false,
            leave_layer_lines: true,
            include_ending: false,
        }
    }
}

impl RemoveComments {
    pub fn new() -> Self {
        Self::default()
    }

    fn strip(&self, text: &str, keep_layer_lines: bool) -> LineEdit {
        if keep_layer_lines && text.starts_with(prefix::LAYER) && !text.starts_with(prefix::LAYER_COUNT) {
            return LineEdit::Keep;
        }
        if text.starts_with(';') {
            return LineEdit::Remove;
        }
        match text.find(';') {
            Some(pos) => LineEdit::Replace(text[..pos].trim_end().to_string()),
            None => LineEdit::Keep,
        }
    }
}

impl Transform for RemoveComments {
    fn name(&self) -> &str {
        "remove_comments"
    }

    fn description(&self) -> &str {
        "Removes comments from the selected sections of the file"
    }

    fn invalidates(&self) -> Vec<Capability> {
        let mut lost = vec![Capability::TypeMarkers, Capability::TimeElapsedMarkers];
        if !self.leave_layer_lines {
            lost.push(Capability::LayerMarkers);
        }
        if self.include_opening {
            lost.push(Capability::HeaderBounds);
        }
        if self.include_startup {
            lost.push(Capability::LayerCount);
        }
        lost
    }

    fn apply(&self, mut doc: Document, _ctx: &mut TransformContext) -> TransformResult {
        let mut targets: Vec<(usize, bool)> = Vec::new();
        if self.include_opening {
            targets.push((0, false));
        }
        if self.include_startup && doc.len() > 1 {
            targets.push((1, false));
        }
        targets.extend(doc.layer_range().map(|i| (i, self.leave_layer_lines)));
        if self.include_ending {
            if let Some(end) = doc.end_index() {
                targets.push((end, false));
            }
        }

        let mut changed = 0;
        for (index, keep_layer_lines) in targets {
            match doc.edit_block(index) {
                Ok(mut block) => {
                    changed += block.map_lines(EditScope::IncludeMarkers, |_, text| {
                        self.strip(text, keep_layer_lines)
                    });
                }
                Err(e) => return skip(doc, e.into()),
            }
        }
        tracing::debug!(changed, "removed comments");
        Ok(doc)
    }
}
