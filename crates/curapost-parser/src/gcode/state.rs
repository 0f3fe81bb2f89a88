//! Machine state reconstruction
//!
//! State is never stored in the document; it is derived on demand by
//! scanning. [`resolve_return_location`] and [`machine_state_at`] scan
//! backward from a cursor, crossing into earlier blocks as needed.
//! [`StateTracker`] is the forward counterpart for single-pass rewrites.
//!
//! Each field of a backward scan stops at its own first match; fields are
//! not required to come from the same line.

use serde::{Deserialize, Serialize};

use super::command::CommandLine;
use super::document::Document;
use super::line::{Feature, Marker};

/// Last known toolhead coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub e: Option<f64>,
}

/// Where the toolhead must go back to after an injected sequence
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReturnLocation {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub e: Option<f64>,
    /// `None` when no retract/prime/extrusion was found anywhere before the cursor
    pub is_retracted: Option<bool>,
    pub feature: Option<Feature>,
}

impl ReturnLocation {
    /// Retraction state with "no retraction assumed" as the fallback
    pub fn retracted(&self) -> bool {
        self.is_retracted.unwrap_or(false)
    }

    /// Both X and Y, when known
    pub fn xy(&self) -> Option<(f64, f64)> {
        Some((self.x?, self.y?))
    }

    pub fn position(&self) -> Position {
        Position {
            x: self.x,
            y: self.y,
            z: self.z,
            e: self.e,
        }
    }

    fn is_complete(&self) -> bool {
        self.x.is_some()
            && self.z.is_some()
            && self.e.is_some()
            && self.is_retracted.is_some()
            && self.feature.is_some()
    }
}

/// Snapshot of the implicit machine state at a cursor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MachineState {
    pub active_tool: u32,
    pub position: Position,
    pub is_retracted: bool,
    pub fan_speed: f64,
    pub feed_rate: Option<f64>,
    pub feature: Option<Feature>,
    pub relative_extrusion: bool,
}

/// Lines strictly before `(block, line)`, nearest first, crossing block boundaries
pub fn lines_before(doc: &Document, block: usize, line: usize) -> impl Iterator<Item = &str> {
    let upper = if doc.is_empty() {
        None
    } else {
        Some(block.min(doc.len() - 1))
    };
    upper
        .into_iter()
        .flat_map(|u| (0..=u).rev())
        .flat_map(move |b| {
            let lines = doc.blocks()[b].lines();
            let end = if Some(b) == upper && b == block {
                line.min(lines.len())
            } else {
                lines.len()
            };
            lines[..end].iter().rev().map(String::as_str)
        })
}

/// Resolve the return location for an insertion at `(block, line)`
///
/// Scans backward from the line before the cursor; the block is exhausted
/// first, then earlier blocks are scanned down to `Document[0]`. Fields
/// with no match anywhere stay `None`.
pub fn resolve_return_location(doc: &Document, block: usize, line: usize) -> ReturnLocation {
    let mut loc = ReturnLocation::default();

    for (offset, text) in lines_before(doc, block, line).enumerate() {
        if loc.is_complete() {
            break;
        }
        if loc.feature.is_none() {
            if let Some(Marker::Type(feature)) = Marker::parse(text) {
                loc.feature = Some(feature);
                continue;
            }
        }
        let Some(cmd) = CommandLine::parse(text) else {
            continue;
        };

        if loc.is_retracted.is_none() {
            loc.is_retracted =
                retraction_decision(&cmd, lines_before(doc, block, line).skip(offset + 1));
        }
        if cmd.is_move() {
            if loc.x.is_none() {
                if let (Some(x), Some(y)) = (cmd.get('X'), cmd.get('Y')) {
                    loc.x = Some(x);
                    loc.y = Some(y);
                }
            }
            if loc.z.is_none() {
                loc.z = cmd.get('Z');
            }
        }
        if loc.e.is_none() && (cmd.is_move() || cmd.is('G', 92)) {
            loc.e = cmd.get('E');
        }
    }

    tracing::trace!(block, line, ?loc, "resolved return location");
    loc
}

/// Decide retraction from one command, looking further back when needed
///
/// `G10` retracts and `G11` unretracts. A move carrying `E` decides by
/// direction: in relative mode a negative `E` is a retraction; in absolute
/// mode an `E` below the previous `E` value is. Other commands do not decide.
fn retraction_decision<'a>(
    cmd: &CommandLine,
    earlier: impl Iterator<Item = &'a str>,
) -> Option<bool> {
    if cmd.is('G', 10) {
        return Some(true);
    }
    if cmd.is('G', 11) {
        return Some(false);
    }
    if !cmd.is_move() {
        return None;
    }
    let e = cmd.get('E')?;

    let mut previous_e = None;
    let mut relative = None;
    for text in earlier {
        let Some(prior) = CommandLine::parse(text) else {
            continue;
        };
        if prior.is('M', 83) {
            relative = Some(true);
            break;
        }
        if prior.is('M', 82) {
            relative = Some(false);
            break;
        }
        if previous_e.is_none() && (prior.is_move() || prior.is('G', 92)) {
            previous_e = prior.get('E');
        }
    }

    if relative.unwrap_or(false) {
        return Some(e < 0.0);
    }
    Some(match previous_e {
        Some(prev) => e < prev,
        None => e < 0.0,
    })
}

/// Last `M82`/`M83` before `(block, line)`; `Some(true)` means relative E
pub fn extrusion_mode_at(doc: &Document, block: usize, line: usize) -> Option<bool> {
    lines_before(doc, block, line)
        .filter_map(CommandLine::parse)
        .find_map(|cmd| {
            if cmd.is('M', 83) {
                Some(true)
            } else if cmd.is('M', 82) {
                Some(false)
            } else {
                None
            }
        })
}

/// Full machine state at `(block, line)` by backward scan
pub fn machine_state_at(doc: &Document, block: usize, line: usize) -> MachineState {
    let loc = resolve_return_location(doc, block, line);
    let mut tool = None;
    let mut fan = None;
    let mut feed = None;
    let mut relative = None;

    for text in lines_before(doc, block, line) {
        if tool.is_some() && fan.is_some() && feed.is_some() && relative.is_some() {
            break;
        }
        let Some(cmd) = CommandLine::parse(text) else {
            continue;
        };
        match cmd.letter() {
            'T' if tool.is_none() => tool = cmd.number().map(|n| n as u32),
            'M' if fan.is_none() && cmd.is('M', 106) => {
                fan = Some(cmd.get('S').unwrap_or(255.0));
            }
            'M' if fan.is_none() && cmd.is('M', 107) => fan = Some(0.0),
            'M' if relative.is_none() && cmd.is('M', 83) => relative = Some(true),
            'M' if relative.is_none() && cmd.is('M', 82) => relative = Some(false),
            'G' if feed.is_none() && cmd.is_move() => feed = cmd.get('F'),
            _ => {}
        }
    }

    MachineState {
        active_tool: tool.unwrap_or(0),
        position: loc.position(),
        is_retracted: loc.retracted(),
        fan_speed: fan.unwrap_or(0.0),
        feed_rate: feed,
        feature: loc.feature,
        relative_extrusion: relative.unwrap_or(false),
    }
}

/// Forward, line-at-a-time state tracking
#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    state: MachineState,
    layer: Option<i32>,
    bridge: bool,
    relative_positioning: bool,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known extrusion mode
    pub fn with_relative_extrusion(relative: bool) -> Self {
        let mut tracker = Self::default();
        tracker.state.relative_extrusion = relative;
        tracker
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    /// Last `;LAYER:` seen
    pub fn layer(&self) -> Option<i32> {
        self.layer
    }

    /// A `;BRIDGE` marker was seen since the last `;TYPE:`
    pub fn in_bridge(&self) -> bool {
        self.bridge
    }

    /// Advance over one line
    pub fn observe(&mut self, line: &str) {
        match Marker::parse(line) {
            Some(Marker::Layer(n)) => {
                self.layer = Some(n);
                return;
            }
            Some(Marker::Type(feature)) => {
                self.state.feature = Some(feature);
                self.bridge = false;
                return;
            }
            Some(Marker::Bridge) => {
                self.bridge = true;
                return;
            }
            Some(_) => return,
            None => {}
        }
        let Some(cmd) = CommandLine::parse(line) else {
            return;
        };

        match cmd.letter() {
            'T' => {
                if let Some(n) = cmd.number() {
                    self.state.active_tool = n as u32;
                }
            }
            'M' => {
                if cmd.is('M', 106) {
                    self.state.fan_speed = cmd.get('S').unwrap_or(255.0);
                } else if cmd.is('M', 107) {
                    self.state.fan_speed = 0.0;
                } else if cmd.is('M', 82) {
                    self.state.relative_extrusion = false;
                } else if cmd.is('M', 83) {
                    self.state.relative_extrusion = true;
                }
            }
            'G' => self.observe_g(&cmd),
            _ => {}
        }
    }

    fn observe_g(&mut self, cmd: &CommandLine) {
        if cmd.is('G', 10) {
            self.state.is_retracted = true;
        } else if cmd.is('G', 11) {
            self.state.is_retracted = false;
        } else if cmd.is('G', 90) {
            self.relative_positioning = false;
        } else if cmd.is('G', 91) {
            self.relative_positioning = true;
        } else if cmd.is('G', 92) {
            if let Some(e) = cmd.get('E') {
                self.state.position.e = Some(e);
            }
        } else if cmd.is_move() {
            if let Some(f) = cmd.get('F') {
                self.state.feed_rate = Some(f);
            }
            let relative = self.relative_positioning;
            let pos = &mut self.state.position;
            for (letter, axis) in [('X', &mut pos.x), ('Y', &mut pos.y), ('Z', &mut pos.z)] {
                if let Some(v) = cmd.get(letter) {
                    *axis = Some(if relative { axis.unwrap_or(0.0) + v } else { v });
                }
            }
            if let Some(e) = cmd.get('E') {
                if self.state.relative_extrusion || self.relative_positioning {
                    self.state.is_retracted = e < 0.0;
                    self.state.position.e = Some(self.state.position.e.unwrap_or(0.0) + e);
                } else {
                    let previous = self.state.position.e.unwrap_or(0.0);
                    self.state.is_retracted = e < previous;
                    self.state.position.e = Some(e);
                }
            }
        }
    }
}
