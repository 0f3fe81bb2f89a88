//! Integration tests for pipelines built from transform configurations

use curapost_core::{DiagnosticLevel, PrinterConfig};
use curapost_parser::{Document, StateTracker};
use curapost_transforms::{
    Pipeline, RemoveComments, Transform, TransformConfig, TransformContext, TransformRegistry,
    VeryCoolFanPath,
};

fn sliced() -> Vec<&'static str> {
    vec![
        ";FLAVOR:Marlin\n;TIME:600\n;MINX:10\n;MINY:10\n;MAXX:50\n;MAXY:50\n;MAXZ:0.4\n;Generated with Cura_SteamEngine 5.7.1\n",
        "M140 S60\nM104 S200\nG28 ; home\nM82 ;absolute extrusion mode\nG92 E0\n;LAYER_COUNT:2\n",
        ";LAYER:0\nM106 S128\nG0 F3000 X12 Y12 Z0.2\n;TYPE:FILL\nG1 F1500 X40 Y12 E2.5\n;TIME_ELAPSED:10\n",
        ";LAYER:1\nG0 X20 Y20 Z0.4\n;TYPE:WALL-OUTER\nG1 X30 Y30 E3 ; wall\n;TIME_ELAPSED:20\n",
        "M140 S0\nM104 S0 ; hotend off\nM84\n",
    ]
}

fn tracker_after(doc: &Document, last_block: usize) -> StateTracker {
    let mut tracker = StateTracker::new();
    for block in &doc.blocks()[..=last_block] {
        block.lines().iter().for_each(|l| tracker.observe(l));
    }
    tracker
}

#[test]
fn test_remove_comments_scenario() {
    let mut ctx = TransformContext::default();
    let doc = Document::from_blocks(sliced());
    let out = RemoveComments::new().apply(doc, &mut ctx).unwrap();

    assert_eq!(out.blocks()[0], Document::from_blocks(sliced()).blocks()[0]);
    assert_eq!(
        out.blocks()[2].to_text(),
        ";LAYER:0\nM106 S128\nG0 F3000 X12 Y12 Z0.2\nG1 F1500 X40 Y12 E2.5\n"
    );
    assert_eq!(out.blocks()[3].to_text(), ";LAYER:1\nG0 X20 Y20 Z0.4\nG1 X30 Y30 E3\n");
    assert_eq!(out.end().unwrap().lines()[1], "M104 S0 ; hotend off");
}

#[test]
fn test_cooling_pass_restores_machine_state() {
    let doc = Document::from_blocks(sliced());
    let before = tracker_after(&doc, 2);

    let mut ctx = TransformContext::new(PrinterConfig::default());
    let out = VeryCoolFanPath::default().apply(doc, &mut ctx).unwrap();
    let after = tracker_after(&out, 2);

    assert!(out.blocks()[2].lines().len() > 6);
    assert_eq!(after.state().position, before.state().position);
    assert_eq!(after.state().fan_speed, before.state().fan_speed);
    assert_eq!(after.state().is_retracted, before.state().is_retracted);
    assert_eq!(after.state().feed_rate, before.state().feed_rate);
    assert_eq!(out.blocks()[2].lines().last().unwrap(), ";TIME_ELAPSED:10");
}

#[test]
fn test_ordering_conflict_from_config() {
    let configs: Vec<TransformConfig> = serde_json::from_str(
        r#"[
            {"kind": "remove_comments", "leave_layer_lines": false},
            {"kind": "speed_limits"}
        ]"#,
    )
    .unwrap();
    let pipeline = TransformRegistry::with_defaults().pipeline_from_configs(&configs);
    assert_eq!(pipeline.check_order().len(), 2);

    let (blocks, diagnostics) = pipeline.process_blocks(&sliced(), PrinterConfig::default());
    assert_eq!(blocks.len(), 5);
    assert!(!blocks[2].contains(";LAYER:0"));
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].source, "speed_limits");
}

#[test]
fn test_ordered_pipeline_runs_everything() {
    let registry = TransformRegistry::with_defaults();
    let pipeline: Pipeline = registry
        .create_pipeline(&["speed_limits", "final_z", "remove_comments"])
        .unwrap();
    assert!(pipeline.check_order().is_empty());

    let (blocks, diagnostics) = pipeline.process_blocks(&sliced(), PrinterConfig::default());
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    assert!(blocks[4].starts_with("G0 F600 Z5.4"));
}
