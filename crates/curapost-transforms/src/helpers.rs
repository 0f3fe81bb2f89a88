//! Building blocks shared by the filament-handling transforms
//!
//! Layer list parsing, firmware pause commands, and the chunked
//! unload/reload moves.

use serde::{Deserialize, Serialize};

use curapost_core::{format_number, TransformError};
use curapost_parser::CommandLine;

/// Longest single E move; firmware rejects "too long extrusion" beyond this
pub const MAX_E_CHUNK: f64 = 150.0;

/// Parse `"5"`, `"3,7,9"`, `"10-14"` or `"2,5-7"` into sorted, de-duplicated 1-based layers
pub fn parse_layer_list(setting: &str, text: &str) -> Result<Vec<u32>, TransformError> {
    let mut layers = Vec::new();
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parse = |s: &str| -> Result<u32, TransformError> {
            match s.trim().parse::<u32>() {
                Ok(0) => Err(TransformError::invalid(setting, "layer numbers start at 1")),
                Ok(n) => Ok(n),
                Err(_) => Err(TransformError::invalid(
                    setting,
                    format!("'{}' is not a layer number", s.trim()),
                )),
            }
        };
        match part.split_once('-') {
            Some((from, to)) => {
                let (from, to) = (parse(from)?, parse(to)?);
                if from > to {
                    return Err(TransformError::invalid(
                        setting,
                        format!("range {} is reversed", part),
                    ));
                }
                layers.extend(from..=to);
            }
            None => layers.push(parse(part)?),
        }
    }
    if layers.is_empty() {
        return Err(TransformError::MissingSetting {
            setting: setting.to_string(),
        });
    }
    layers.sort_unstable();
    layers.dedup();
    Ok(layers)
}

/// Firmware-specific way to pause a print
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseMethod {
    #[default]
    Marlin,
    Marlin2,
    Griffin,
    Bq,
    Reprap,
    Repetier,
    AltOcto,
    Raise3d,
    Klipper,
    Custom,
    /// Timed dwell instead of waiting for the user
    G4,
}

impl PauseMethod {
    /// The pause command line
    pub fn command(&self, message: &str, custom: &str, dwell_minutes: f64) -> String {
        match self {
            Self::Marlin if message.is_empty() => "M0 Click to resume".to_string(),
            Self::Marlin => format!("M0 {} Click to resume", message),
            Self::Marlin2 | Self::Griffin => "M0".to_string(),
            Self::Bq => "M25".to_string(),
            Self::Reprap => "M226".to_string(),
            Self::Repetier => "@pause now change filament and press continue printing".to_string(),
            Self::AltOcto => "M125".to_string(),
            Self::Raise3d => "M2000".to_string(),
            Self::Klipper => "PAUSE".to_string(),
            Self::Custom => custom.trim().to_string(),
            Self::G4 => format!("G4 S{}", format_number((dwell_minutes * 60.0).round())),
        }
    }
}

/// Split comma-separated user G-code into lines with upper-cased command letters
pub fn user_gcode_lines(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn e_move(feed: f64, e: f64, comment: &str) -> String {
    CommandLine::new("G1")
        .with('F', feed)
        .with('E', e)
        .with_comment(comment)
        .render()
}

/// Relative-mode unload split into [`MAX_E_CHUNK`] pieces
pub fn unload_moves(amount: f64, feed: f64) -> Vec<String> {
    if amount <= 0.0 {
        return Vec::new();
    }
    if amount <= MAX_E_CHUNK {
        return vec![e_move(feed, -amount, "Unload")];
    }
    let mut lines = Vec::new();
    let mut remaining = amount;
    while remaining > MAX_E_CHUNK {
        lines.push(e_move(feed, -MAX_E_CHUNK, "Unload some"));
        remaining -= MAX_E_CHUNK;
    }
    if remaining > 0.0 {
        lines.push(e_move(feed, -remaining, "Unload the remainder"));
    }
    lines
}

/// Slow feed for the last part of a reload
pub fn slow_reload_feed(nozzle_size: f64) -> f64 {
    (nozzle_size * 16.666 * 60.0).round()
}

/// Feed rate for purging after a reload
pub fn purge_feed(nozzle_size: f64) -> f64 {
    (nozzle_size * 8.333 * 60.0).round()
}

/// Relative-mode reload: 90 % fast in chunks, the last 10 % slow
pub fn reload_moves(amount: f64, fast_feed: f64, nozzle_size: f64) -> Vec<String> {
    if amount <= 0.0 {
        return Vec::new();
    }
    let slow = (amount * 0.1).round();
    let mut remaining = amount - amount * 0.1;
    let mut lines = Vec::new();
    while remaining > MAX_E_CHUNK {
        lines.push(e_move(fast_feed, MAX_E_CHUNK, "Fast Reload"));
        remaining -= MAX_E_CHUNK;
    }
    if remaining.round() > 0.0 {
        lines.push(e_move(fast_feed, remaining.round(), "Fast Reload"));
    }
    if slow > 0.0 {
        lines.push(e_move(
            slow_reload_feed(nozzle_size),
            slow,
            "Reload the last 10% slowly",
        ));
    }
    lines
}

/// `M82`/`M83` line restoring the configured extrusion mode
pub fn extrusion_mode_line(relative: bool) -> String {
    if relative {
        "M83; Switch back to relative E values".to_string()
    } else {
        "M82; Switch back to absolute E values".to_string()
    }
}
