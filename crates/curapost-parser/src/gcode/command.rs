//! Structured view of a single G-code line
//!
//! Parameters keep their raw text so that a line re-renders byte-identical
//! unless a parameter is explicitly changed. All scanning is restricted to
//! the code part of the line; text after `;` is never searched.

use curapost_core::{format_number, GcodeError};
use std::fmt;
use std::str::FromStr;

use super::line::strip_comment;

/// Parse a numeric parameter value
///
/// Accepts signs and decimals (`-1.5`, `.4`, `+3`); rejects anything else,
/// including exponents and `inf`/`nan`.
pub fn parse_number(text: &str) -> Option<f64> {
    if text.is_empty() || !text.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    if !text
        .bytes()
        .all(|b| b.is_ascii_digit() || b == b'.' || b == b'-' || b == b'+')
    {
        return None;
    }
    text.parse().ok()
}

/// Read parameter `param` from the code part of `line`
///
/// The command word counts too, so `get("G1 X5", 'G')` is `Some(1.0)`.
/// Missing or malformed values give `None`; this never panics.
pub fn get(line: &str, param: char) -> Option<f64> {
    strip_comment(line).split_whitespace().find_map(|token| {
        let mut chars = token.chars();
        let letter = chars.next()?;
        if letter.eq_ignore_ascii_case(&param) {
            parse_number(chars.as_str())
        } else {
            None
        }
    })
}

/// A single `<letter><value>` parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    letter: char,
    raw: String,
}

impl Param {
    pub fn new(letter: char, raw: impl Into<String>) -> Self {
        Self {
            letter,
            raw: raw.into(),
        }
    }

    pub fn letter(&self) -> char {
        self.letter
    }

    /// Value text exactly as written
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Numeric value, `None` when missing or non-numeric
    pub fn value(&self) -> Option<f64> {
        parse_number(&self.raw)
    }

    fn matches(&self, letter: char) -> bool {
        self.letter.eq_ignore_ascii_case(&letter)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter, self.raw)
    }
}

/// Parsed G-code command line: `{word, params, comment}`
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    word: String,
    params: Vec<Param>,
    comment: Option<String>,
    comment_gap: String,
}

impl CommandLine {
    /// Start building a command from its word, e.g. `"G1"`
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            params: Vec::new(),
            comment: None,
            comment_gap: String::new(),
        }
    }

    /// Lenient parse; `None` for comments, blanks and non-command text
    pub fn parse(line: &str) -> Option<Self> {
        let (code, comment) = match line.find(';') {
            Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
            None => (line, None),
        };
        let code_trimmed = code.trim_end();
        let gap = &code[code_trimmed.len()..];

        let mut tokens = code_trimmed.split_whitespace();
        let word = tokens.next()?;
        if !is_command_word(word) {
            return None;
        }

        let params = tokens
            .filter_map(|token| {
                let mut chars = token.chars();
                let letter = chars.next()?;
                Some(Param::new(letter, chars.as_str()))
            })
            .collect();

        Some(Self {
            word: word.to_string(),
            params,
            comment: comment.map(str::to_string),
            comment_gap: gap.to_string(),
        })
    }

    /// Command word as written, e.g. `G1`
    pub fn word(&self) -> &str {
        &self.word
    }

    /// Command letter, uppercased
    pub fn letter(&self) -> char {
        self.word
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or(' ')
    }

    /// Command number, e.g. `1` for `G1` and `G01`
    pub fn number(&self) -> Option<f64> {
        let mut chars = self.word.chars();
        chars.next()?;
        parse_number(chars.as_str())
    }

    /// True when this is `<letter><number>`
    pub fn is(&self, letter: char, number: u32) -> bool {
        self.letter() == letter.to_ascii_uppercase() && self.number() == Some(number as f64)
    }

    /// `G0`..`G3`
    pub fn is_move(&self) -> bool {
        (0..=3).any(|n| self.is('G', n))
    }

    /// `G0`, or a move that carries no `E`
    pub fn is_travel(&self) -> bool {
        self.is('G', 0) || (self.is_move() && !self.has('E'))
    }

    /// A `G1`-`G3` move with `E` and at least one of `X`/`Y`
    pub fn is_extrusion(&self) -> bool {
        (1..=3).any(|n| self.is('G', n)) && self.has('E') && (self.has('X') || self.has('Y'))
    }

    /// A move whose only axis is `E` (retract or prime)
    pub fn is_e_only(&self) -> bool {
        self.is_move() && self.has('E') && !self.has('X') && !self.has('Y') && !self.has('Z')
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param(&self, letter: char) -> Option<&Param> {
        self.params.iter().find(|p| p.matches(letter))
    }

    /// Numeric value of a parameter
    pub fn get(&self, letter: char) -> Option<f64> {
        self.param(letter).and_then(Param::value)
    }

    pub fn has(&self, letter: char) -> bool {
        self.param(letter).is_some()
    }

    /// Set a numeric parameter, replacing it in place or appending it
    pub fn set(&mut self, letter: char, value: f64) -> &mut Self {
        self.set_raw(letter, format_number(value))
    }

    /// Set a parameter's raw text
    pub fn set_raw(&mut self, letter: char, raw: impl Into<String>) -> &mut Self {
        let raw = raw.into();
        match self.params.iter_mut().find(|p| p.matches(letter)) {
            Some(param) => param.raw = raw,
            None => self.params.push(Param::new(letter, raw)),
        }
        self
    }

    /// Remove a parameter; returns whether it was present
    pub fn remove(&mut self, letter: char) -> bool {
        let before = self.params.len();
        self.params.retain(|p| !p.matches(letter));
        before != self.params.len()
    }

    /// Builder form of [`set`](Self::set)
    pub fn with(mut self, letter: char, value: f64) -> Self {
        self.set(letter, value);
        self
    }

    /// Builder form of [`set_raw`](Self::set_raw)
    pub fn with_raw(mut self, letter: char, raw: impl Into<String>) -> Self {
        self.set_raw(letter, raw);
        self
    }

    /// Builder form of [`set_comment`](Self::set_comment)
    pub fn with_comment(mut self, text: impl Into<String>) -> Self {
        self.set_comment(text);
        self
    }

    /// Comment text without the leading `;`, trimmed
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref().map(str::trim)
    }

    /// Replace the comment
    pub fn set_comment(&mut self, text: impl Into<String>) {
        self.comment = Some(format!(" {}", text.into().trim()));
        if self.comment_gap.is_empty() {
            self.comment_gap = " ".to_string();
        }
    }

    /// Drop the comment entirely
    pub fn clear_comment(&mut self) {
        self.comment = None;
        self.comment_gap.clear();
    }

    /// Add text after any existing comment
    pub fn append_comment(&mut self, text: &str) {
        let combined = match self.comment() {
            Some(existing) if !existing.is_empty() => format!("{} {}", existing, text.trim()),
            _ => text.trim().to_string(),
        };
        self.set_comment(combined);
    }

    /// The code part: word and parameters, single-space separated
    pub fn code(&self) -> String {
        let mut out = self.word.clone();
        for param in &self.params {
            out.push(' ');
            out.push_str(&param.to_string());
        }
        out
    }

    /// Render the line, keeping the original spacing before the comment
    pub fn render(&self) -> String {
        let code = self.code();
        match &self.comment {
            Some(comment) => format!("{}{};{}", code, self.comment_gap, comment),
            None => code,
        }
    }

    /// Render with the comment starting at column `min_column` or later
    pub fn render_aligned(&self, min_column: usize) -> String {
        let code = self.code();
        match &self.comment {
            Some(comment) => {
                let width = min_column.max(code.len() + 1);
                format!("{:<width$};{}", code, comment, width = width)
            }
            None => code,
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl FromStr for CommandLine {
    type Err = GcodeError;

    /// Strict parse: every parameter except message text must be numeric
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = Self::parse(s).ok_or_else(|| GcodeError::NotACommand {
            line: s.to_string(),
        })?;
        if command.number().is_none() {
            return Err(GcodeError::InvalidCommandWord {
                word: command.word.clone(),
            });
        }
        let is_message = command.is('M', 117) || command.is('M', 118);
        if !is_message {
            if let Some(bad) = command
                .params
                .iter()
                .find(|p| !p.raw.is_empty() && p.value().is_none())
            {
                return Err(GcodeError::InvalidParameter {
                    param: bad.letter,
                    value: bad.raw.clone(),
                });
            }
        }
        Ok(command)
    }
}

fn is_command_word(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(letter) if letter.is_ascii_alphabetic() => {
            let rest = chars.as_str();
            !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        }
        _ => false,
    }
}

/// Line up inline comments in a run of emitted lines
///
/// Comments on command lines move to `max(min_column, longest code + 1)`.
/// Full-line comments and lines without comments are left alone.
pub fn align_comments<S: AsRef<str>>(lines: &[S], min_column: usize) -> Vec<String> {
    let code_of = |line: &str| -> Option<usize> {
        if line.starts_with(';') {
            return None;
        }
        line.find(';').map(|pos| line[..pos].trim_end().len())
    };

    let width = lines
        .iter()
        .filter_map(|l| code_of(l.as_ref()))
        .map(|len| len + 1)
        .fold(min_column, usize::max);

    lines
        .iter()
        .map(|line| {
            let line = line.as_ref();
            match (code_of(line), line.find(';')) {
                (Some(_), Some(pos)) => {
                    let code = line[..pos].trim_end();
                    format!("{:<width$}{}", code, &line[pos..], width = width)
                }
                _ => line.to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_move() {
        let cmd = CommandLine::parse("G1 F1200 X10 Y10 E5").unwrap();
        assert_eq!(cmd.word(), "G1");
        assert!(cmd.is('G', 1));
        assert_eq!(cmd.get('F'), Some(1200.0));
        assert_eq!(cmd.get('X'), Some(10.0));
        assert_eq!(cmd.get('E'), Some(5.0));
        assert_eq!(cmd.get('Z'), None);
        assert!(cmd.is_extrusion());
        assert_eq!(cmd.comment(), None);
    }

    #[test]
    fn test_parse_tolerates_spacing_and_comments() {
        let cmd = CommandLine::parse("G0   X-1.5  Y.25   ; travel ; twice").unwrap();
        assert_eq!(cmd.get('X'), Some(-1.5));
        assert_eq!(cmd.get('Y'), Some(0.25));
        assert_eq!(cmd.comment(), Some("travel ; twice"));
    }

    #[test]
    fn test_missing_value_is_none() {
        let cmd = CommandLine::parse("M106 S").unwrap();
        assert!(cmd.has('S'));
        assert_eq!(cmd.get('S'), None);
    }

    #[test]
    fn test_non_commands() {
        assert!(CommandLine::parse(";LAYER:3").is_none());
        assert!(CommandLine::parse("").is_none());
        assert!(CommandLine::parse("PAUSE").is_none());
        assert!(CommandLine::parse("@pause").is_none());
    }

    #[test]
    fn test_get_ignores_comment_text() {
        assert_eq!(get("G1 X5 ; E was 3", 'E'), None);
        assert_eq!(get("G1 X5 E2 ; E was 3", 'E'), Some(2.0));
        assert_eq!(get("G1 X5", 'G'), Some(1.0));
        assert_eq!(get("M117 Every layer", 'E'), None);
        assert_eq!(get("G1 Xabc", 'X'), None);
    }

    #[test]
    fn test_render_round_trip() {
        for line in [
            "G1 F1200 X10 Y10 E5",
            "G0 X1.500 Y02",
            "M104 S0 ; turn off",
            "G92 E0      ; reset",
            "M117 Printing...",
        ] {
            assert_eq!(CommandLine::parse(line).unwrap().render(), line);
        }
    }

    #[test]
    fn test_set_keeps_other_params_verbatim() {
        let mut cmd = CommandLine::parse("G1 F4500 X5.000 Y5 E1").unwrap();
        cmd.set('F', 3000.0);
        assert_eq!(cmd.render(), "G1 F3000 X5.000 Y5 E1");
        cmd.set('Z', 0.3);
        assert_eq!(cmd.render(), "G1 F3000 X5.000 Y5 E1 Z0.3");
        assert!(cmd.remove('E'));
        assert!(!cmd.remove('E'));
        assert_eq!(cmd.render(), "G1 F3000 X5.000 Y5 Z0.3");
    }

    #[test]
    fn test_append_comment() {
        let mut cmd = CommandLine::parse("G1 F3000 X5 Y5 E1").unwrap();
        cmd.append_comment("Speed was 4500/75");
        assert_eq!(cmd.render(), "G1 F3000 X5 Y5 E1 ; Speed was 4500/75");

        let mut cmd = CommandLine::parse("G1 X5 ;wipe").unwrap();
        cmd.append_comment("slowed");
        assert_eq!(cmd.render(), "G1 X5 ; wipe slowed");
    }

    #[test]
    fn test_builder_and_alignment() {
        let cmd = CommandLine::new("G0")
            .with('F', 600.0)
            .with('Z', 2.0)
            .with_comment("Move up");
        assert_eq!(cmd.render(), "G0 F600 Z2 ; Move up");
        assert_eq!(cmd.render_aligned(15), "G0 F600 Z2     ; Move up");
        assert_eq!(cmd.render_aligned(3), "G0 F600 Z2 ; Move up");
    }

    #[test]
    fn test_align_comments() {
        let lines = vec![
            ";TYPE:CUSTOM",
            "G0 F600 Z2 ; Move up",
            "G92 E0 ; Reset extruder",
            "G4 S1",
        ];
        let aligned = align_comments(&lines, 12);
        assert_eq!(aligned[0], ";TYPE:CUSTOM");
        assert_eq!(aligned[1], "G0 F600 Z2  ; Move up");
        assert_eq!(aligned[2], "G92 E0      ; Reset extruder");
        assert_eq!(aligned[3], "G4 S1");
    }

    #[test]
    fn test_strict_parse() {
        assert!("G1 X1 Y2".parse::<CommandLine>().is_ok());
        assert_eq!(
            "G1 Xfoo".parse::<CommandLine>(),
            Err(GcodeError::InvalidParameter {
                param: 'X',
                value: "foo".into()
            })
        );
        assert!(matches!(
            ";comment".parse::<CommandLine>(),
            Err(GcodeError::NotACommand { .. })
        ));
        assert!("M117 Hello there".parse::<CommandLine>().is_ok());
    }
}
