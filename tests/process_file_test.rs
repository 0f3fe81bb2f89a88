//! End-to-end file processing with a pipeline file on disk

use curapost::{process_file, PipelineConfig, TransformConfig};
use curapost_transforms::{PrinterSettingsPatch, RemoveComments};
use tempfile::TempDir;

const SLICED: &str = "\
;FLAVOR:Marlin
;TIME:95
;MINX:10
;MINY:10
;MAXX:20
;MAXY:20
;MAXZ:0.4
;Generated with Cura_SteamEngine 5.7.1
M140 S60
M104 S200
G28 ; home
G92 E0
;LAYER_COUNT:2
;LAYER:0
;TYPE:SKIRT
G0 F3000 X10 Y10 Z0.2
G1 F1200 X12 Y12 E1 ; first
;TIME_ELAPSED:40
;LAYER:1
;TYPE:WALL-OUTER
G1 X14 Y14 E2
;TIME_ELAPSED:95
M104 S0
M84
";

#[test]
fn test_process_file_with_toml_pipeline() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("part.gcode");
    let output = dir.path().join("part_out.gcode");
    let pipeline = dir.path().join("pipeline.toml");
    std::fs::write(&input, SLICED).unwrap();
    std::fs::write(
        &pipeline,
        "annotate_header = true\n\n[[transforms]]\nkind = \"final_z\"\n\n[[transforms]]\nkind = \"remove_comments\"\n",
    )
    .unwrap();

    let config = PipelineConfig::load_from_file(&pipeline).unwrap();
    let diagnostics = process_file(&input, &output, &config).unwrap();
    assert!(diagnostics.is_empty());

    let out = std::fs::read_to_string(&output).unwrap();
    assert!(out.starts_with(";FLAVOR:Marlin\n"));
    assert!(out.contains(";LAYER:0\nG0 F3000 X10 Y10 Z0.2\nG1 F1200 X12 Y12 E1\n;LAYER:1\n"));
    assert!(out.ends_with("G0 F600 Z5.4 ; all_at_once final Z move\nM104 S0\nM84\n"));
    assert_eq!(std::fs::read_to_string(&input).unwrap(), SLICED);
}

#[test]
fn test_skipped_transform_is_annotated() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("part.gcode");
    let output = dir.path().join("out.gcode");
    std::fs::write(&input, SLICED).unwrap();

    let config = PipelineConfig {
        annotate_header: true,
        transforms: vec![
            TransformConfig::RemoveComments(RemoveComments {
                leave_layer_lines: false,
                ..RemoveComments::default()
            }),
            TransformConfig::SpeedLimits(Default::default()),
            TransformConfig::PrinterSettingsPatch(PrinterSettingsPatch::default()),
        ],
        ..PipelineConfig::default()
    };
    let diagnostics = process_file(&input, &output, &config).unwrap();
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics.from_source("speed_limits").count(), 1);
    assert_eq!(diagnostics.from_source("printer_settings_patch").count(), 1);

    let out = std::fs::read_to_string(&output).unwrap();
    assert!(!out.contains(";LAYER:0"));
    assert!(out.contains(";LAYER_COUNT:2\n"));
    assert!(out.contains(";  [speed_limits] Did not run"));
}

#[test]
fn test_missing_input_is_an_error() {
    let dir = TempDir::new().unwrap();
    let result = process_file(
        &dir.path().join("nope.gcode"),
        &dir.path().join("out.gcode"),
        &PipelineConfig::new(),
    );
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("Failed to read"));
}
