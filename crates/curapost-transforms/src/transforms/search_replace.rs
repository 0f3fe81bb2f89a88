//! Text search and replace over a block range

use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

use curapost_core::TransformError;
use curapost_parser::{BlockIndex, Document, EditScope, LineEdit};

use crate::transform::{skip, Transform, TransformContext, TransformResult};

/// Replaces text line by line
///
/// The header block is never searched. Leading `;LAYER:` lines and
/// trailing `;TIME_ELAPSED:`/`;LAYER_COUNT:` lines are left alone so the
/// block structure survives any replacement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchAndReplace {
    pub search: String,
    pub replace: String,
    /// Treat `search` as a regular expression; `replace` may then use `$1`
    pub is_regex: bool,
    /// Stop after the first replacement in the file
    pub first_only: bool,
    /// Leave the start sequence alone
    pub ignore_start: bool,
    /// Leave the end sequence alone
    pub ignore_end: bool,
    /// First preview layer to search; limits the search to layers
    pub start_layer: Option<u32>,
    /// Last preview layer to search, `-1` for the last layer
    pub end_layer: Option<i64>,
}

impl SearchAndReplace {
    fn pattern(&self) -> Result<Regex, TransformError> {
        if self.search.is_empty() {
            return Err(TransformError::MissingSetting {
                setting: "search".to_string(),
            });
        }
        let source = if self.is_regex {
            self.search.clone()
        } else {
            regex::escape(&self.search)
        };
        Regex::new(&source).map_err(|e| TransformError::invalid("search", e.to_string()))
    }

    /// Block indices to search
    fn blocks(&self, doc: &Document) -> Result<std::ops::Range<usize>, TransformError> {
        if self.start_layer.is_none() && self.end_layer.is_none() {
            let start = if self.ignore_start { 2 } else { 1 };
            let end = match doc.end_index() {
                Some(end) if self.ignore_end => end,
                _ => doc.len(),
            };
            return Ok(start.min(end)..end);
        }

        let index = BlockIndex::build(doc);
        let layers = doc.layer_range();
        let first = match self.start_layer {
            Some(layer) => index.preview_layer_to_block_index(layer).ok_or_else(|| {
                TransformError::invalid("start_layer", format!("layer {} not found", layer))
            })?,
            None => layers.start,
        };
        let last = match self.end_layer {
            Some(-1) | None => layers.end.saturating_sub(1),
            Some(layer) if layer > 0 => {
                let layer = u32::try_from(layer).map_err(|_| {
                    TransformError::invalid("end_layer", format!("{} is out of range", layer))
                })?;
                index
                    .preview_layer_to_block_index(layer)
                    .unwrap_or(layers.end.saturating_sub(1))
            }
            Some(layer) => {
                return Err(TransformError::invalid(
                    "end_layer",
                    format!("{} is not a layer number", layer),
                ))
            }
        };
        Ok(first..last.max(first) + 1)
    }
}

impl Transform for SearchAndReplace {
    fn name(&self) -> &str {
        "search_and_replace"
    }

    fn description(&self) -> &str {
        "Replaces text or regular expression matches in the G-code"
    }

    fn apply(&self, mut doc: Document, _ctx: &mut TransformContext) -> TransformResult {
        let pattern = match self.pattern() {
            Ok(pattern) => pattern,
            Err(e) => return skip(doc, e),
        };
        let range = match self.blocks(&doc) {
            Ok(range) => range,
            Err(e) => return skip(doc, e),
        };

        let mut replaced = 0;
        for index in range {
            if self.first_only && replaced > 0 {
                break;
            }
            let mut block = match doc.edit_block(index) {
                Ok(block) => block,
                Err(e) => return skip(doc, e.into()),
            };
            block.map_lines(EditScope::Body, |_, text| {
                if (self.first_only && replaced > 0) || !pattern.is_match(text) {
                    return LineEdit::Keep;
                }
                replaced += 1;
                let new = match (self.is_regex, self.first_only) {
                    (true, true) => pattern.replace(text, self.replace.as_str()),
                    (true, false) => pattern.replace_all(text, self.replace.as_str()),
                    (false, true) => pattern.replace(text, NoExpand(&self.replace)),
                    (false, false) => pattern.replace_all(text, NoExpand(&self.replace)),
                }
                .into_owned();
                if new.contains('\n') {
                    LineEdit::Expand(vec![new])
                } else {
                    LineEdit::Replace(new)
                }
            });
        }
        tracing::debug!(replaced, "search and replace");
        Ok(doc)
    }
}
