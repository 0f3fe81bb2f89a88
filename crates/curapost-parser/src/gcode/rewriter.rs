//! Block rewriter
//!
//! Every line-level mutation of a [`Document`] goes through a
//! [`BlockEditor`]. Positions are clamped so a leading `;LAYER:` marker
//! stays first and trailing `;TIME_ELAPSED:`/`;LAYER_COUNT:` lines stay
//! last; explicit edits of those lines are rejected. Multi-edit passes
//! build a new line list and swap it in instead of mutating while
//! iterating.

use std::ops::Range;

use curapost_core::RewriteError;

use super::document::{Block, Document};
use super::line::{self, prefix, Marker};

/// Which lines [`BlockEditor::map_lines`] may touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditScope {
    /// Marker lines at the block edges are passed through untouched
    Body,
    /// Every line, markers included
    IncludeMarkers,
}

/// Result of a per-line edit callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEdit {
    Keep,
    Replace(String),
    /// Replace one line by several
    Expand(Vec<String>),
    Remove,
}

/// Decision per block during [`Document::renumber_markers`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenumberStep {
    Skip,
    Number,
    /// Number this block, then restart the counter for the next one
    NumberThenRestart,
}

/// Layer numbering scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerNumbering {
    /// One sequence across all models (All-at-Once style)
    Continuous,
    /// Restart at 0 for each model (One-at-a-Time style)
    PerModel,
}

/// Split inserted text on embedded newlines; a single trailing newline is dropped
fn split_inserted<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .flat_map(|l| {
            let text = l.as_ref();
            let text = text.strip_suffix('\n').unwrap_or(text);
            line::split(text)
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Mutable view of one block
#[derive(Debug)]
pub struct BlockEditor<'a> {
    block: &'a mut Block,
    index: usize,
}

impl<'a> BlockEditor<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn block(&self) -> &Block {
        self.block
    }

    pub fn lines(&self) -> &[String] {
        self.block.lines()
    }

    fn clamp(&self, at: usize) -> usize {
        at.clamp(self.block.body_start(), self.block.body_end())
    }

    /// Insert lines at `at`, clamped into the editable body
    ///
    /// Returns the range the new lines occupy after insertion.
    pub fn insert_lines<I, S>(&mut self, at: usize, lines: I) -> Range<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let at = self.clamp(at);
        let new_lines = split_inserted(lines);
        let count = new_lines.len();
        self.block.lines.splice(at..at, new_lines);
        if !self.block.lines.is_empty() {
            self.block.terminated = true;
        }
        at..at + count
    }

    /// Insert after the body, just before any trailing marker lines
    pub fn insert_before_trailer<I, S>(&mut self, lines: I) -> Range<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let at = self.block.body_end();
        self.insert_lines(at, lines)
    }

    /// Insert directly after the first line starting with `marker_prefix`
    ///
    /// `None` when the marker is absent.
    pub fn insert_after_marker<I, S>(&mut self, marker_prefix: &str, lines: I) -> Option<Range<usize>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pos = self
            .block
            .lines()
            .iter()
            .position(|l| l.starts_with(marker_prefix))?;
        Some(self.insert_lines(pos + 1, lines))
    }

    /// Apply several insertions addressed in the block's current coordinates
    ///
    /// Insertions at the same position keep their given order. The returned
    /// ranges are in final coordinates, in the order the insertions were given.
    pub fn insert_batch(&mut self, insertions: Vec<(usize, Vec<String>)>) -> Vec<Range<usize>> {
        let mut ordered: Vec<(usize, usize, Vec<String>)> = insertions
            .into_iter()
            .enumerate()
            .map(|(i, (at, lines))| (self.clamp(at), i, split_inserted(lines)))
            .collect();
        ordered.sort_by_key(|(at, i, _)| (*at, *i));

        let old = std::mem::take(&mut self.block.lines);
        let added: usize = ordered.iter().map(|(_, _, l)| l.len()).sum();
        let mut out = Vec::with_capacity(old.len() + added);
        let mut ranges = vec![0..0; ordered.len()];
        let mut old_lines = old.into_iter();
        let mut consumed = 0;

        for (at, i, lines) in ordered {
            out.extend(old_lines.by_ref().take(at - consumed));
            consumed = at;
            let start = out.len();
            out.extend(lines);
            ranges[i] = start..out.len();
        }
        out.extend(old_lines);

        if !out.is_empty() {
            self.block.terminated = true;
        }
        self.block.lines = out;
        ranges
    }

    fn check_range(&self, start: usize, end: usize) -> Result<(), RewriteError> {
        let len = self.block.len();
        if start > end || end > len {
            return Err(RewriteError::LinesOutOfRange {
                block: self.index,
                start,
                end,
                len,
            });
        }
        Ok(())
    }

    fn protected(&self, line: usize) -> RewriteError {
        RewriteError::ProtectedLine {
            block: self.index,
            line,
            text: self.block.line(line).unwrap_or_default().to_string(),
        }
    }

    /// Replace lines `start..end` with `lines`
    ///
    /// Fails if the region touches a protected marker line or would place
    /// text before a leading marker or after trailing markers.
    pub fn replace_region<I, S>(
        &mut self,
        start: usize,
        end: usize,
        lines: I,
    ) -> Result<Range<usize>, RewriteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.check_range(start, end)?;
        if let Some(bad) = (start..end).find(|&i| self.block.is_protected(i)) {
            return Err(self.protected(bad));
        }
        if start < self.block.body_start() || start > self.block.body_end() {
            return Err(self.protected(start));
        }
        let new_lines = split_inserted(lines);
        let count = new_lines.len();
        self.block.lines.splice(start..end, new_lines);
        Ok(start..start + count)
    }

    /// Overwrite one body line
    pub fn set_line(&mut self, index: usize, text: impl Into<String>) -> Result<(), RewriteError> {
        self.check_range(index, index + 1)?;
        if self.block.is_protected(index) {
            return Err(self.protected(index));
        }
        self.block.lines[index] = text.into();
        Ok(())
    }

    pub fn remove_lines(&mut self, start: usize, end: usize) -> Result<(), RewriteError> {
        self.replace_region(start, end, std::iter::empty::<&str>())
            .map(|_| ())
    }

    /// Rewrite lines through `edit`, building a new list
    ///
    /// The callback gets the original line index and text. Returns the
    /// number of lines that were replaced, expanded or removed.
    pub fn map_lines<F>(&mut self, scope: EditScope, mut edit: F) -> usize
    where
        F: FnMut(usize, &str) -> LineEdit,
    {
        let body = self.block.body_start()..self.block.body_end();
        let old = std::mem::take(&mut self.block.lines);
        let mut out = Vec::with_capacity(old.len());
        let mut changed = 0;

        for (i, text) in old.into_iter().enumerate() {
            if scope == EditScope::Body && !body.contains(&i) {
                out.push(text);
                continue;
            }
            match edit(i, &text) {
                LineEdit::Keep => out.push(text),
                LineEdit::Replace(new) => {
                    changed += usize::from(new != text);
                    out.push(new);
                }
                LineEdit::Expand(lines) => {
                    changed += 1;
                    out.extend(split_inserted(lines));
                }
                LineEdit::Remove => changed += 1,
            }
        }
        self.block.lines = out;
        changed
    }
}

impl Document {
    /// Start editing block `index`
    pub fn edit_block(&mut self, index: usize) -> Result<BlockEditor<'_>, RewriteError> {
        let len = self.blocks.len();
        let block = self
            .blocks
            .get_mut(index)
            .ok_or(RewriteError::BlockOutOfRange { block: index, len })?;
        Ok(BlockEditor { block, index })
    }

    /// Fold layer-range blocks without a `;LAYER:` marker into the block before them
    ///
    /// One-at-a-Time slicing emits such fragments between models. Returns
    /// the number of fragments merged.
    pub fn merge_layer_fragments(&mut self) -> usize {
        let range = self.layer_range();
        if range.is_empty() {
            return 0;
        }
        let end_block = self.blocks.split_off(range.end);
        let layers = self.blocks.split_off(range.start);
        let mut merged: Vec<Block> = Vec::with_capacity(layers.len());
        let mut count = 0;

        for block in layers {
            let is_fragment = block.layer_number().is_none();
            match merged.last_mut() {
                Some(previous) if is_fragment => {
                    previous.lines.extend(block.lines);
                    previous.terminated = true;
                    count += 1;
                }
                _ => merged.push(block),
            }
        }

        self.blocks.extend(merged);
        self.blocks.extend(end_block);
        if count > 0 {
            tracing::debug!(fragments = count, "merged layer fragments");
        }
        count
    }

    /// Move `;TIME_ELAPSED:`/`;LAYER_COUNT:` lines to the end of each layer block
    pub fn move_trailers_to_end(&mut self) {
        for index in self.layer_range() {
            let block = &mut self.blocks[index];
            let (trailers, body): (Vec<String>, Vec<String>) = std::mem::take(&mut block.lines)
                .into_iter()
                .partition(|l| line::is_trailer_marker(l));
            block.lines = body;
            block.lines.extend(trailers);
        }
    }

    /// Renumber the first `marker_prefix<n>` line of each layer block
    ///
    /// `step` decides per block whether it is numbered and whether the
    /// counter restarts at `start` afterwards. Every `;LAYER_COUNT:` line is
    /// rewritten to the size of the numbering run that follows its block,
    /// or of the run it sits in when no run starts right after it. Returns
    /// the number of blocks numbered.
    pub fn renumber_markers<F>(&mut self, marker_prefix: &str, start: i32, mut step: F) -> usize
    where
        F: FnMut(&Block) -> RenumberStep,
    {
        let mut next = start;
        let mut numbered = 0;
        // (first block, block count) per numbering run
        let mut runs: Vec<(usize, usize)> = Vec::new();
        let mut run_open = false;

        for index in self.layer_range() {
            let decision = step(&self.blocks[index]);
            if decision == RenumberStep::Skip {
                continue;
            }
            let block = &mut self.blocks[index];
            let Some(pos) = block.lines.iter().position(|l| {
                l.strip_prefix(marker_prefix)
                    .is_some_and(|rest| rest.trim().parse::<i32>().is_ok())
            }) else {
                continue;
            };
            block.lines[pos] = format!("{}{}", marker_prefix, next);
            next += 1;
            numbered += 1;

            match runs.last_mut() {
                Some((_, count)) if run_open => *count += 1,
                _ => {
                    runs.push((index, 1));
                    run_open = true;
                }
            }
            if decision == RenumberStep::NumberThenRestart {
                next = start;
                run_open = false;
            }
        }

        let count_for = |block: usize| -> Option<usize> {
            runs.iter()
                .find(|(first, _)| *first == block + 1)
                .or_else(|| {
                    runs.iter()
                        .rev()
                        .find(|(first, count)| *first <= block && block < first + count)
                })
                .or_else(|| runs.first())
                .map(|(_, count)| *count)
        };
        for index in 0..self.blocks.len() {
            let Some(count) = count_for(index) else {
                break;
            };
            for text in self.blocks[index].lines.iter_mut() {
                if text.starts_with(prefix::LAYER_COUNT) {
                    *text = Marker::LayerCount(count as u32).to_line();
                }
            }
        }

        tracing::debug!(marker = marker_prefix, numbered, runs = runs.len(), "renumbered markers");
        numbered
    }

    /// Merge fragments, move trailers, then renumber non-raft layers
    ///
    /// In continuous mode `;LAYER_COUNT:` ends up as the number of layer
    /// blocks, raft layers included.
    pub fn renumber_layers(&mut self, numbering: LayerNumbering) -> usize {
        self.merge_layer_fragments();
        self.move_trailers_to_end();
        let numbered = self.renumber_markers(prefix::LAYER, 0, |block| {
            if block.is_raft() {
                RenumberStep::Skip
            } else if numbering == LayerNumbering::PerModel
                && block.contains_marker(prefix::LAYER_COUNT)
            {
                RenumberStep::NumberThenRestart
            } else {
                RenumberStep::Number
            }
        });
        if numbering == LayerNumbering::Continuous {
            let total = self.layer_block_count();
            self.set_layer_count(total as u32);
        }
        numbered
    }

    /// Remove layer blocks matching `predicate`, then fix `;LAYER_COUNT:`
    ///
    /// Header, start and end blocks are never removed. Returns the number
    /// of blocks deleted.
    pub fn delete_blocks<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(usize, &Block) -> bool,
    {
        let range = self.layer_range();
        if range.is_empty() {
            return 0;
        }
        let before = self.blocks.len();
        let mut index = 0;
        self.blocks.retain(|block| {
            let keep = !range.contains(&index) || !predicate(index, block);
            index += 1;
            keep
        });
        let deleted = before - self.blocks.len();
        if deleted > 0 {
            let remaining = self.layer_block_count();
            self.set_layer_count(remaining as u32);
            tracing::debug!(deleted, remaining, "deleted layer blocks");
        }
        deleted
    }

    /// Rewrite every `;LAYER_COUNT:` line in the document
    pub fn set_layer_count(&mut self, count: u32) {
        let line = Marker::LayerCount(count).to_line();
        for block in &mut self.blocks {
            for text in block.lines.iter_mut() {
                if text.starts_with(prefix::LAYER_COUNT) {
                    text.clone_from(&line);
                }
            }
        }
    }
}
