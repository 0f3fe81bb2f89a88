//! Printer configuration value object
//!
//! A read-only snapshot of the host's machine and extruder settings. It is
//! passed explicitly into every transform; nothing in the workspace reaches
//! for global host state. Speeds are stored the way the slicer reports
//! them (mm/s) and converted to feed rates at emission time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::units::mm_per_sec_to_feed;

/// Build plate shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BedShape {
    Rectangular,
    Elliptic,
}

impl Default for BedShape {
    fn default() -> Self {
        Self::Rectangular
    }
}

/// Print sequencing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintSequence {
    /// Every model advances one layer at a time
    AllAtOnce,
    /// Each model is finished before the next starts; numbering restarts per model
    OneAtATime,
}

impl Default for PrintSequence {
    fn default() -> Self {
        Self::AllAtOnce
    }
}

impl fmt::Display for PrintSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllAtOnce => write!(f, "all_at_once"),
            Self::OneAtATime => write!(f, "one_at_a_time"),
        }
    }
}

/// Build plate adhesion type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdhesionType {
    None,
    Skirt,
    Brim,
    Raft,
}

impl Default for AdhesionType {
    fn default() -> Self {
        Self::Skirt
    }
}

/// Per-feature print speeds in mm/s
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSpeeds {
    pub print: f64,
    pub skirt_brim: f64,
    pub wall_inner: f64,
    pub wall_outer: f64,
    pub infill: f64,
    pub top_bottom: f64,
    pub support: f64,
    pub support_interface: f64,
    pub prime_tower: f64,
    pub bridge_skin: f64,
}

impl Default for FeatureSpeeds {
    fn default() -> Self {
        Self {
            print: 50.0,
            skirt_brim: 25.0,
            wall_inner: 50.0,
            wall_outer: 25.0,
            infill: 50.0,
            top_bottom: 25.0,
            support: 50.0,
            support_interface: 33.0,
            prime_tower: 50.0,
            bridge_skin: 12.5,
        }
    }
}

impl FeatureSpeeds {
    /// The same speed for every feature
    pub fn uniform(speed: f64) -> Self {
        Self {
            print: speed,
            skirt_brim: speed,
            wall_inner: speed,
            wall_outer: speed,
            infill: speed,
            top_bottom: speed,
            support: speed,
            support_interface: speed,
            prime_tower: speed,
            bridge_skin: speed,
        }
    }
}

/// Settings for one extruder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtruderConfig {
    pub enabled: bool,
    pub nozzle_size: f64,
    pub material_diameter: f64,
    pub print_temperature: f64,
    /// Initial layer temperature; `None` means the same as `print_temperature`
    pub print_temperature_layer_0: Option<f64>,
    pub speeds: FeatureSpeeds,
    /// Travel speed in mm/s
    pub speed_travel: f64,
    /// Initial layer print speed in mm/s
    pub speed_print_layer_0: f64,
    /// Initial layer travel speed in mm/s
    pub speed_travel_layer_0: f64,
    pub retraction_enable: bool,
    /// Retraction distance in mm
    pub retraction_amount: f64,
    /// Retract speed in mm/s
    pub retraction_retract_speed: f64,
    /// Prime speed in mm/s
    pub retraction_prime_speed: f64,
    /// Z-hop speed in mm/s
    pub speed_z_hop: f64,
    pub skirt_brim_line_width: f64,
    pub raft_base_line_width: f64,
    /// Outer wall wipe distance in mm, 0 when the slicer adds no wipe
    pub wall_0_wipe_dist: f64,
    /// Infill wipe distance in mm
    pub infill_wipe_dist: f64,
}

impl Default for ExtruderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            nozzle_size: 0.4,
            material_diameter: 1.75,
            print_temperature: 200.0,
            print_temperature_layer_0: None,
            speeds: FeatureSpeeds::default(),
            speed_travel: 150.0,
            speed_print_layer_0: 20.0,
            speed_travel_layer_0: 75.0,
            retraction_enable: true,
            retraction_amount: 5.0,
            retraction_retract_speed: 45.0,
            retraction_prime_speed: 45.0,
            speed_z_hop: 10.0,
            skirt_brim_line_width: 0.4,
            raft_base_line_width: 0.8,
            wall_0_wipe_dist: 0.2,
            infill_wipe_dist: 0.0,
        }
    }
}

impl ExtruderConfig {
    /// Temperature of the first layer
    pub fn initial_temperature(&self) -> f64 {
        self.print_temperature_layer_0.unwrap_or(self.print_temperature)
    }

    /// Retract feed rate in mm/min
    pub fn retract_feed(&self) -> f64 {
        mm_per_sec_to_feed(self.retraction_retract_speed).round()
    }

    /// Prime feed rate in mm/min
    pub fn prime_feed(&self) -> f64 {
        mm_per_sec_to_feed(self.retraction_prime_speed).round()
    }

    /// Travel feed rate in mm/min
    pub fn travel_feed(&self) -> f64 {
        mm_per_sec_to_feed(self.speed_travel).round()
    }

    /// Z-hop feed rate in mm/min
    pub fn z_hop_feed(&self) -> f64 {
        mm_per_sec_to_feed(self.speed_z_hop).round()
    }
}

/// Machine-wide settings plus the extruder list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    pub machine_width: f64,
    pub machine_depth: f64,
    pub machine_height: f64,
    pub bed_shape: BedShape,
    pub center_is_zero: bool,
    pub print_sequence: PrintSequence,
    pub relative_extrusion: bool,
    pub firmware_retract: bool,
    /// Fan commands use 0..1 instead of 0..255
    pub fan_scale_0_to_1: bool,
    pub layer_height: f64,
    pub layer_height_0: f64,
    pub speed_slowdown_layers: u32,
    /// Maximum Z feed rate in mm/s
    pub max_feedrate_z: f64,
    /// Maximum E feed rate in mm/s
    pub max_feedrate_e: f64,
    pub support_enable: bool,
    pub support_interface_enable: bool,
    pub adhesion_type: AdhesionType,
    pub skirt_gap: f64,
    pub skirt_line_count: u32,
    pub brim_width: f64,
    pub raft_margin: f64,
    /// "Lift head" minimum layer time behaviour is enabled
    pub cool_lift_head: bool,
    pub extruders: Vec<ExtruderConfig>,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            machine_width: 220.0,
            machine_depth: 220.0,
            machine_height: 250.0,
            bed_shape: BedShape::Rectangular,
            center_is_zero: false,
            print_sequence: PrintSequence::AllAtOnce,
            relative_extrusion: false,
            firmware_retract: false,
            fan_scale_0_to_1: false,
            layer_height: 0.2,
            layer_height_0: 0.2,
            speed_slowdown_layers: 2,
            max_feedrate_z: 10.0,
            max_feedrate_e: 25.0,
            support_enable: false,
            support_interface_enable: false,
            adhesion_type: AdhesionType::Skirt,
            skirt_gap: 3.0,
            skirt_line_count: 1,
            brim_width: 8.0,
            raft_margin: 15.0,
            cool_lift_head: false,
            extruders: vec![ExtruderConfig::default()],
        }
    }
}

impl PrinterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for extruder `index`, falling back to the first extruder
    /// and then to defaults when the list is short
    pub fn extruder(&self, index: usize) -> ExtruderConfig {
        self.extruders
            .get(index)
            .or_else(|| self.extruders.first())
            .cloned()
            .unwrap_or_default()
    }

    /// Number of enabled extruders
    pub fn enabled_extruder_count(&self) -> usize {
        self.extruders.iter().filter(|e| e.enabled).count()
    }

    /// Full-scale fan value for `M106 S`
    pub fn fan_max(&self) -> f64 {
        if self.fan_scale_0_to_1 {
            1.0
        } else {
            255.0
        }
    }

    /// Z feed rate in mm/min, capped at `cap`
    pub fn z_feed(&self, cap: f64) -> f64 {
        mm_per_sec_to_feed(self.max_feedrate_z).min(cap).round()
    }

    /// Lowest X and Y coordinate of the bed
    pub fn bed_min(&self) -> (f64, f64) {
        if self.center_is_zero {
            (-self.machine_width / 2.0, -self.machine_depth / 2.0)
        } else {
            (0.0, 0.0)
        }
    }

    /// Highest X and Y coordinate of the bed
    pub fn bed_max(&self) -> (f64, f64) {
        let (min_x, min_y) = self.bed_min();
        (min_x + self.machine_width, min_y + self.machine_depth)
    }

    /// Nominal Z of a G-code layer number (0-based)
    pub fn nominal_layer_z(&self, layer: i32) -> f64 {
        self.layer_height_0 + layer.max(0) as f64 * self.layer_height
    }
}
