//! Unit conversion and number formatting
//!
//! The slicer reports speeds in mm/s while G-code feed rates are mm/min.
//! Emitted numbers go through [`format_number`] so output is deterministic.

/// Convert a slicer speed (mm/s) to a G-code feed rate (mm/min)
pub fn mm_per_sec_to_feed(speed: f64) -> f64 {
    speed * 60.0
}

/// Convert a G-code feed rate (mm/min) to mm/s
pub fn feed_to_mm_per_sec(feed: f64) -> f64 {
    feed / 60.0
}

/// Format a number for emission in G-code
///
/// Integral values print without a decimal point, others with at most five
/// decimals and trailing zeros trimmed. `-0` prints as `0`.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let rounded = (value * 100_000.0).round() / 100_000.0;
    if rounded == 0.0 {
        return "0".to_string();
    }
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        return format!("{}", rounded as i64);
    }
    let text = format!("{:.5}", rounded);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    text.to_string()
}

/// Round to a fixed number of decimals
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Cross-section area of filament in mm²
pub fn filament_area(diameter: f64) -> f64 {
    (diameter / 2.0).powi(2) * std::f64::consts::PI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number_integral() {
        assert_eq!(format_number(3000.0), "3000");
        assert_eq!(format_number(-150.0), "-150");
        assert_eq!(format_number(-0.0), "0");
    }

    #[test]
    fn test_format_number_fractional() {
        assert_eq!(format_number(0.3), "0.3");
        assert_eq!(format_number(12.345678), "12.34568");
        assert_eq!(format_number(-1.50), "-1.5");
        assert_eq!(format_number(1.000001), "1");
    }

    #[test]
    fn test_feed_conversions() {
        assert_eq!(mm_per_sec_to_feed(50.0), 3000.0);
        assert_eq!(feed_to_mm_per_sec(4500.0), 75.0);
        assert_eq!(mm_per_sec_to_feed(2.5), 150.0);
    }

    #[test]
    fn test_filament_area() {
        let area = filament_area(1.75);
        assert!((area - 2.405).abs() < 0.001);
    }
}
