//! Document and Block model
//!
//! A [`Document`] is the ordered block sequence the host hands over:
//! `[0]` file header, `[1]` start sequence, one block per layer (raft
//! layers included), and the end sequence last. Blocks own their lines;
//! mutation goes through the rewriter so the ordering invariants are
//! enforced in one place.

use super::line::{self, prefix, Marker};

/// One contiguous text section of the G-code file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    pub(crate) lines: Vec<String>,
    pub(crate) terminated: bool,
}

impl Block {
    /// Build a block from its text; a final `\n` is remembered, not stored as a line
    pub fn from_text(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        let (body, terminated) = match text.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (text, false),
        };
        Self {
            lines: line::split(body).into_iter().map(str::to_string).collect(),
            terminated,
        }
    }

    /// Build a terminated block from lines
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            terminated: true,
        }
    }

    /// Reassemble the block text exactly
    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        if self.terminated {
            text.push('\n');
        }
        text
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Number from the first `;LAYER:` marker in the block
    pub fn layer_number(&self) -> Option<i32> {
        self.lines.iter().find_map(|l| match Marker::parse(l) {
            Some(Marker::Layer(n)) => Some(n),
            _ => None,
        })
    }

    /// True when the block's first line is a `;LAYER:` marker
    pub fn starts_with_layer_marker(&self) -> bool {
        self.lines.first().is_some_and(|l| line::is_layer_marker(l))
    }

    /// True for raft blocks (`;LAYER:-n`)
    pub fn is_raft(&self) -> bool {
        self.layer_number().is_some_and(|n| n < 0)
    }

    /// True when any line starts with `marker_prefix`
    pub fn contains_marker(&self, marker_prefix: &str) -> bool {
        self.lines.iter().any(|l| l.starts_with(marker_prefix))
    }

    /// Index of the first line that can be edited without displacing a leading layer marker
    pub fn body_start(&self) -> usize {
        usize::from(self.starts_with_layer_marker())
    }

    /// Index of the first trailing `;TIME_ELAPSED:`/`;LAYER_COUNT:` line, or `len()`
    pub fn body_end(&self) -> usize {
        let start = self.body_start();
        let mut end = self.lines.len();
        while end > start && line::is_trailer_marker(&self.lines[end - 1]) {
            end -= 1;
        }
        end
    }

    /// True when line `index` is the leading layer marker or a trailing count/time line
    pub fn is_protected(&self, index: usize) -> bool {
        index < self.body_start() || (index >= self.body_end() && index < self.lines.len())
    }
}

/// The block sequence for one file-write event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub(crate) blocks: Vec<Block>,
}

impl Document {
    /// Wrap the host's block texts
    pub fn from_blocks<I, S>(blocks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blocks: blocks
                .into_iter()
                .map(|b| Block::from_text(b.as_ref()))
                .collect(),
        }
    }

    /// Hand the blocks back to the host
    pub fn into_blocks(self) -> Vec<String> {
        self.blocks.iter().map(Block::to_text).collect()
    }

    /// Split a flat G-code file into host-style blocks
    ///
    /// Header: the leading comment paragraph (through `;Generated with` when
    /// present). Start: up to the first layer, normally ending with
    /// `;LAYER_COUNT:`.
    /// Each `;LAYER:` line opens a block. End: everything after the last
    /// `;TIME_ELAPSED:` of the last layer.
    pub fn parse(gcode: &str) -> Self {
        let (body, terminated) = match gcode.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (gcode, false),
        };
        if body.is_empty() && !terminated {
            return Self::default();
        }
        let lines: Vec<&str> = line::split(body);

        let header_end = header_end(&lines);
        let layer_starts: Vec<usize> = (header_end..lines.len())
            .filter(|&i| line::is_layer_marker(lines[i]))
            .collect();
        let start_end = match layer_starts.first() {
            Some(&first_layer) => first_layer,
            None => (header_end..lines.len())
                .find(|&i| lines[i].starts_with(prefix::LAYER_COUNT))
                .map(|i| i + 1)
                .unwrap_or(lines.len()),
        };
        let end_start = match layer_starts.last() {
            Some(&last) => (last..lines.len())
                .rev()
                .find(|&i| lines[i].starts_with(prefix::TIME_ELAPSED))
                .map(|i| i + 1)
                .unwrap_or(lines.len()),
            None => lines.len(),
        };

        let mut bounds = vec![0, header_end, start_end];
        bounds.extend(layer_starts.iter().copied().filter(|&s| s > start_end));
        bounds.push(end_start.max(start_end));
        bounds.push(lines.len());

        let mut blocks = Vec::with_capacity(bounds.len());
        for pair in bounds.windows(2) {
            let (from, to) = (pair[0], pair[1].max(pair[0]));
            if from == to {
                blocks.push(Block::default());
            } else {
                blocks.push(Block::from_lines(lines[from..to].iter().copied()));
            }
        }
        if !terminated {
            if let Some(last) = blocks.iter_mut().rev().find(|b| !b.is_empty()) {
                last.terminated = false;
            }
        }
        tracing::debug!(blocks = blocks.len(), "split gcode into blocks");
        Self { blocks }
    }

    /// Concatenate every block
    pub fn to_gcode(&self) -> String {
        self.blocks.iter().map(Block::to_text).collect()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// `Document[0]`
    pub fn header(&self) -> Option<&Block> {
        self.blocks.first()
    }

    /// `Document[1]`
    pub fn start(&self) -> Option<&Block> {
        self.blocks.get(1)
    }

    /// `Document[last]`
    pub fn end(&self) -> Option<&Block> {
        if self.blocks.len() >= 3 {
            self.blocks.last()
        } else {
            None
        }
    }

    /// Index of the end block
    pub fn end_index(&self) -> Option<usize> {
        (self.blocks.len() >= 3).then(|| self.blocks.len() - 1)
    }

    /// Indices of the layer blocks (everything between start and end)
    pub fn layer_range(&self) -> std::ops::Range<usize> {
        if self.blocks.len() >= 3 {
            2..self.blocks.len() - 1
        } else {
            0..0
        }
    }

    /// Number of layer blocks
    pub fn layer_block_count(&self) -> usize {
        self.layer_range().len()
    }

    /// Describe every broken ordering invariant; empty when the document is sound
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if let Some(start) = self.start() {
            if start.contains_marker(prefix::LAYER_COUNT) {
                let last = start.lines().iter().rev().find(|l| !l.trim().is_empty());
                if !last.is_some_and(|l| l.starts_with(prefix::LAYER_COUNT)) {
                    problems.push("start block does not end with ;LAYER_COUNT:".to_string());
                }
            }
        }
        for index in self.layer_range() {
            let block = &self.blocks[index];
            if !block.starts_with_layer_marker() {
                problems.push(format!("block {} does not start with ;LAYER:", index));
            }
        }
        for (index, block) in self.blocks.iter().enumerate() {
            if index + 1 < self.blocks.len() && !block.is_empty() && !block.is_terminated() {
                problems.push(format!("block {} is missing its trailing newline", index));
            }
        }
        problems
    }
}

fn header_end(lines: &[&str]) -> usize {
    let comments = lines.iter().take_while(|l| l.starts_with(';')).count();
    lines[..comments]
        .iter()
        .position(|l| l.starts_with(";Generated with"))
        .map(|i| i + 1)
        .unwrap_or(comments)
}
