//! Load/save round trips through real files

use curapost_core::{AdhesionType, PrintSequence};
use curapost_settings::{PipelineConfig, SettingsError};
use curapost_transforms::{PauseAtLayer, SpeedCheck, SpeedLimits, TransformConfig};
use tempfile::TempDir;

fn sample() -> PipelineConfig {
    let mut config = PipelineConfig::new();
    config.annotate_header = true;
    config.printer.machine_width = 235.0;
    config.printer.print_sequence = PrintSequence::OneAtATime;
    config.printer.adhesion_type = AdhesionType::Brim;
    config.transforms = vec![
        TransformConfig::SpeedLimits(SpeedLimits::new(SpeedCheck::Travel)),
        TransformConfig::PauseAtLayer(PauseAtLayer {
            layers: "5,9-10".to_string(),
            ..PauseAtLayer::default()
        }),
    ];
    config
}

#[test]
fn test_toml_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipeline.toml");
    let config = sample();
    config.save_to_file(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("kind = \"speed_limits\""));
    assert_eq!(PipelineConfig::load_from_file(&path).unwrap(), config);
}

#[test]
fn test_json_round_trip_into_new_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("pipeline.json");
    let config = PipelineConfig::with_all_transforms();
    config.save_to_file(&path).unwrap();
    let loaded = PipelineConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded.transforms.len(), 18);
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.toml");
    std::fs::write(
        &path,
        r#"
[printer]
machine_height = 300

[[transforms]]
kind = "final_z"

[[transforms]]
kind = "remove_comments"
include_ending = true
"#,
    )
    .unwrap();

    let config = PipelineConfig::load_from_file(&path).unwrap();
    assert_eq!(config.printer.machine_height, 300.0);
    assert_eq!(config.printer.machine_width, 220.0);
    assert!(!config.annotate_header);
    let names: Vec<&str> = config.transforms.iter().map(|t| t.kind()).collect();
    assert_eq!(names, ["final_z", "remove_comments"]);
    match &config.transforms[1] {
        TransformConfig::RemoveComments(t) => {
            assert!(t.include_ending);
            assert!(t.leave_layer_lines);
        }
        other => panic!("unexpected transform {:?}", other),
    }
}

#[test]
fn test_load_errors() {
    let dir = TempDir::new().unwrap();

    let missing = dir.path().join("missing.toml");
    assert!(matches!(
        PipelineConfig::load_from_file(&missing),
        Err(SettingsError::IoError(_))
    ));

    let unknown = dir.path().join("bad.toml");
    std::fs::write(&unknown, "[[transforms]]\nkind = \"bogus\"\n").unwrap();
    assert!(matches!(
        PipelineConfig::load_from_file(&unknown),
        Err(SettingsError::TomlError(_))
    ));

    let invalid = dir.path().join("invalid.json");
    std::fs::write(&invalid, r#"{"printer": {"layer_height": 0}}"#).unwrap();
    assert!(matches!(
        PipelineConfig::load_from_file(&invalid),
        Err(SettingsError::InvalidSetting { .. })
    ));

    let yaml = dir.path().join("pipeline.yaml");
    assert!(matches!(
        sample().save_to_file(&yaml),
        Err(SettingsError::UnsupportedFormat(_))
    ));
}
