//! Line splitting and classification
//!
//! Classification never allocates a parse tree: it only looks at the first
//! characters of a line and, for comments, at the marker prefix set the
//! slicer emits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker prefixes as emitted by the slicer
pub mod prefix {
    pub const LAYER: &str = ";LAYER:";
    pub const LAYER_COUNT: &str = ";LAYER_COUNT:";
    pub const TYPE: &str = ";TYPE:";
    pub const TIME_ELAPSED: &str = ";TIME_ELAPSED:";
    pub const TIME: &str = ";TIME:";
    pub const MESH: &str = ";MESH:";
    pub const BRIDGE: &str = ";BRIDGE";
    pub const RAFT_LAYER: &str = ";LAYER:-";
}

/// Split block text on `\n`, keeping empty entries
pub fn split(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Print-purpose classification of a region of moves
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    Skirt,
    WallInner,
    WallOuter,
    Fill,
    Skin,
    Support,
    SupportInterface,
    PrimeTower,
    Custom,
    Other(String),
}

impl Feature {
    /// The name as written after `;TYPE:`
    pub fn as_str(&self) -> &str {
        match self {
            Self::Skirt => "SKIRT",
            Self::WallInner => "WALL-INNER",
            Self::WallOuter => "WALL-OUTER",
            Self::Fill => "FILL",
            Self::Skin => "SKIN",
            Self::Support => "SUPPORT",
            Self::SupportInterface => "SUPPORT-INTERFACE",
            Self::PrimeTower => "PRIME-TOWER",
            Self::Custom => "CUSTOM",
            Self::Other(name) => name,
        }
    }

    /// Full marker line, e.g. `;TYPE:FILL`
    pub fn marker(&self) -> String {
        format!("{}{}", prefix::TYPE, self.as_str())
    }
}

impl FromStr for Feature {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "SKIRT" => Self::Skirt,
            "WALL-INNER" => Self::WallInner,
            "WALL-OUTER" => Self::WallOuter,
            "FILL" => Self::Fill,
            "SKIN" => Self::Skin,
            "SUPPORT" => Self::Support,
            "SUPPORT-INTERFACE" => Self::SupportInterface,
            "PRIME-TOWER" => Self::PrimeTower,
            "CUSTOM" => Self::Custom,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis named by a bounding-box header marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// A recognized semantic comment line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Marker {
    /// `;LAYER:<n>`, negative for raft layers
    Layer(i32),
    /// `;LAYER_COUNT:<n>`
    LayerCount(u32),
    /// `;TYPE:<feature>`
    Type(Feature),
    /// `;TIME_ELAPSED:<seconds>`
    TimeElapsed(f64),
    /// `;TIME:<seconds>` in the header
    Time(f64),
    /// `;MESH:<name>` or `;MESH:NONMESH`
    Mesh(String),
    /// `;BRIDGE`
    Bridge,
    /// `;MINX:` .. `;MAXZ:` or `;PRINT.SIZE.MIN.X:` variants
    Bound { axis: Axis, max: bool, value: f64 },
}

impl Marker {
    /// Parse a marker line; unknown or malformed comments give `None`
    pub fn parse(line: &str) -> Option<Marker> {
        let line = line.trim_end_matches('\r');
        if !line.starts_with(';') {
            return None;
        }
        if let Some(rest) = line.strip_prefix(prefix::LAYER_COUNT) {
            return rest.trim().parse().ok().map(Marker::LayerCount);
        }
        if let Some(rest) = line.strip_prefix(prefix::LAYER) {
            return rest.trim().parse().ok().map(Marker::Layer);
        }
        if let Some(rest) = line.strip_prefix(prefix::TYPE) {
            return rest.parse().ok().map(Marker::Type);
        }
        if let Some(rest) = line.strip_prefix(prefix::TIME_ELAPSED) {
            return rest.trim().parse().ok().map(Marker::TimeElapsed);
        }
        if let Some(rest) = line.strip_prefix(prefix::TIME) {
            return rest.trim().parse().ok().map(Marker::Time);
        }
        if let Some(rest) = line.strip_prefix(prefix::MESH) {
            return Some(Marker::Mesh(rest.trim().to_string()));
        }
        if line.starts_with(prefix::BRIDGE) {
            return Some(Marker::Bridge);
        }
        Self::parse_bound(line)
    }

    fn parse_bound(line: &str) -> Option<Marker> {
        let (key, value) = line[1..].split_once(':')?;
        let (max, axis) = match key {
            "MINX" | "PRINT.SIZE.MIN.X" => (false, Axis::X),
            "MINY" | "PRINT.SIZE.MIN.Y" => (false, Axis::Y),
            "MINZ" | "PRINT.SIZE.MIN.Z" => (false, Axis::Z),
            "MAXX" | "PRINT.SIZE.MAX.X" => (true, Axis::X),
            "MAXY" | "PRINT.SIZE.MAX.Y" => (true, Axis::Y),
            "MAXZ" | "PRINT.SIZE.MAX.Z" => (true, Axis::Z),
            _ => return None,
        };
        let value = value.trim().parse().ok()?;
        Some(Marker::Bound { axis, max, value })
    }

    /// Canonical line text for the marker
    pub fn to_line(&self) -> String {
        match self {
            Self::Layer(n) => format!("{}{}", prefix::LAYER, n),
            Self::LayerCount(n) => format!("{}{}", prefix::LAYER_COUNT, n),
            Self::Type(feature) => feature.marker(),
            Self::TimeElapsed(t) => format!("{}{}", prefix::TIME_ELAPSED, t),
            Self::Time(t) => format!("{}{}", prefix::TIME, t),
            Self::Mesh(name) => format!("{}{}", prefix::MESH, name),
            Self::Bridge => prefix::BRIDGE.to_string(),
            Self::Bound { axis, max, value } => {
                let side = if *max { "MAX" } else { "MIN" };
                let axis = match axis {
                    Axis::X => "X",
                    Axis::Y => "Y",
                    Axis::Z => "Z",
                };
                format!(";{}{}:{}", side, axis, value)
            }
        }
    }

    /// `LAYER_COUNT` and `TIME_ELAPSED` lines must stay at the end of their block
    pub fn is_trailer(&self) -> bool {
        matches!(self, Self::LayerCount(_) | Self::TimeElapsed(_))
    }
}

/// Line classification
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Blank,
    Comment,
    Marker(Marker),
    Command,
    Other,
}

/// Classify a single line
pub fn classify(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if trimmed.starts_with(';') {
        return match Marker::parse(trimmed) {
            Some(marker) => LineKind::Marker(marker),
            None => LineKind::Comment,
        };
    }
    if is_command_word_start(trimmed) {
        LineKind::Command
    } else {
        LineKind::Other
    }
}

/// A letter directly followed by a digit
fn is_command_word_start(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(digit)) if letter.is_ascii_alphabetic() && digit.is_ascii_digit()
    )
}

/// True for `;LAYER:<n>` lines
pub fn is_layer_marker(line: &str) -> bool {
    matches!(Marker::parse(line), Some(Marker::Layer(_)))
}

/// True for `;LAYER_COUNT:` and `;TIME_ELAPSED:` lines
pub fn is_trailer_marker(line: &str) -> bool {
    Marker::parse(line).is_some_and(|m| m.is_trailer())
}

/// Strip a `;` comment, returning the code part with trailing spaces removed
pub fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(pos) => line[..pos].trim_end(),
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_empty_entries() {
        assert_eq!(split("G1 X1\n\nG1 X2\n"), vec!["G1 X1", "", "G1 X2", ""]);
        assert_eq!(split(""), vec![""]);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), LineKind::Blank);
        assert_eq!(classify("   "), LineKind::Blank);
        assert_eq!(classify(";Generated with Cura"), LineKind::Comment);
        assert_eq!(classify(";LAYER:-2"), LineKind::Marker(Marker::Layer(-2)));
        assert_eq!(classify("G1 X10"), LineKind::Command);
        assert_eq!(classify("T1"), LineKind::Command);
        assert_eq!(classify("PAUSE"), LineKind::Other);
        assert_eq!(classify("@pause now"), LineKind::Other);
    }

    #[test]
    fn test_layer_count_is_not_a_layer_marker() {
        assert_eq!(
            Marker::parse(";LAYER_COUNT:120"),
            Some(Marker::LayerCount(120))
        );
        assert!(!is_layer_marker(";LAYER_COUNT:120"));
        assert!(is_layer_marker(";LAYER:0"));
    }

    #[test]
    fn test_malformed_layer_marker_is_a_comment() {
        assert_eq!(classify(";LAYER:abc"), LineKind::Comment);
    }

    #[test]
    fn test_feature_markers() {
        assert_eq!(
            Marker::parse(";TYPE:SUPPORT-INTERFACE"),
            Some(Marker::Type(Feature::SupportInterface))
        );
        assert_eq!(
            Marker::parse(";TYPE:WALL-OUTER").map(|m| m.to_line()),
            Some(";TYPE:WALL-OUTER".to_string())
        );
        assert_eq!(
            Marker::parse(";TYPE:MOVE"),
            Some(Marker::Type(Feature::Other("MOVE".into())))
        );
    }

    #[test]
    fn test_bound_markers() {
        assert_eq!(
            Marker::parse(";MINX:12.5"),
            Some(Marker::Bound { axis: Axis::X, max: false, value: 12.5 })
        );
        assert_eq!(
            Marker::parse(";PRINT.SIZE.MAX.Y:88"),
            Some(Marker::Bound { axis: Axis::Y, max: true, value: 88.0 })
        );
        assert_eq!(Marker::parse(";FLAVOR:Marlin"), None);
    }

    #[test]
    fn test_trailers() {
        assert!(is_trailer_marker(";TIME_ELAPSED:123.4"));
        assert!(is_trailer_marker(";LAYER_COUNT:3"));
        assert!(!is_trailer_marker(";TIME:600"));
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("G1 X1 ; move"), "G1 X1");
        assert_eq!(strip_comment(";only"), "");
        assert_eq!(strip_comment("M82"), "M82");
    }
}
