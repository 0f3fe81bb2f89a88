//! Integration tests for document splitting and invariant-preserving rewrites

use curapost_parser::{CommandLine, Document, EditScope, LayerNumbering, LineEdit};
use proptest::prelude::*;

const ONE_AT_A_TIME: &str = ";FLAVOR:Marlin\n;Generated with Cura_SteamEngine 5.7.1\n\
M140 S60\nG28\n;LAYER_COUNT:2\n\
;LAYER:0\n;TYPE:WALL-OUTER\nG1 X1 Y1 E1\n;TIME_ELAPSED:10\n\
;LAYER:1\nG1 X2 Y2 E2\n;TIME_ELAPSED:20\n;LAYER_COUNT:3\n\
;LAYER:0\nG1 X50 Y50 E3\n;TIME_ELAPSED:30\n\
;LAYER:1\nG1 X51 Y51 E4\n;TIME_ELAPSED:40\n\
;LAYER:2\nG1 X52 Y52 E5\n;TIME_ELAPSED:50\n\
M104 S0\nM84\n";

fn layer_numbers(doc: &Document) -> Vec<Option<i32>> {
    doc.layer_range()
        .map(|i| doc.blocks()[i].layer_number())
        .collect()
}

#[test]
fn test_renumber_round_trip() {
    let mut renumbered = Document::parse(ONE_AT_A_TIME);
    renumbered.renumber_layers(LayerNumbering::Continuous);
    assert_eq!(
        layer_numbers(&renumbered),
        vec![Some(0), Some(1), Some(2), Some(3), Some(4)]
    );
    assert!(renumbered.blocks()[1].contains_marker(";LAYER_COUNT:5"));

    let mut reverted = renumbered.clone();
    reverted.renumber_layers(LayerNumbering::PerModel);
    assert_eq!(
        layer_numbers(&reverted),
        vec![Some(0), Some(1), Some(0), Some(1), Some(2)]
    );
    assert!(reverted.blocks()[1].contains_marker(";LAYER_COUNT:2"));
    assert!(reverted.blocks()[3].contains_marker(";LAYER_COUNT:3"));

    reverted.renumber_layers(LayerNumbering::Continuous);
    assert_eq!(reverted, renumbered);
    assert!(reverted.invariant_violations().is_empty());
}

#[test]
fn test_inserts_never_displace_markers() {
    let mut doc = Document::parse(ONE_AT_A_TIME);
    for index in doc.layer_range() {
        let mut editor = doc.edit_block(index).unwrap();
        editor.insert_lines(0, ["M117 first"]);
        editor.insert_lines(usize::MAX, ["M117 last"]);
    }
    assert!(doc.invariant_violations().is_empty());
    for index in doc.layer_range() {
        let block = &doc.blocks()[index];
        assert!(block.starts_with_layer_marker());
        assert!(block.lines().last().unwrap().starts_with(";"));
        assert_eq!(block.line(1), Some("M117 first"));
    }
}

#[test]
fn test_map_lines_rewrites_feed_rates() {
    let mut doc = Document::parse(ONE_AT_A_TIME);
    let mut editor = doc.edit_block(2).unwrap();
    let changed = editor.map_lines(EditScope::Body, |_, text| match CommandLine::parse(text) {
        Some(mut cmd) if cmd.is_extrusion() => {
            cmd.set('F', 1200.0);
            LineEdit::Replace(cmd.render())
        }
        _ => LineEdit::Keep,
    });
    assert_eq!(changed, 1);
    assert_eq!(doc.blocks()[2].line(2), Some("G1 X1 Y1 E1 F1200"));
}

proptest! {
    #[test]
    fn prop_lenient_parse_never_panics(line in "\\PC{0,40}") {
        if let Some(cmd) = CommandLine::parse(&line) {
            let _ = cmd.get('X');
            let _ = cmd.render();
        }
        let _ = curapost_parser::gcode::get(&line, 'E');
    }

    #[test]
    fn prop_parse_round_trips_text(body in "(G1( [XYZEF]-?[0-9]{1,3}(\\.[0-9]{1,3})?){0,4}|;[a-z ]{0,10}|M117 [a-z]{0,8})\n?", count in 1usize..20) {
        let text = body.repeat(count);
        let doc = Document::parse(&text);
        prop_assert_eq!(doc.to_gcode(), text);
    }
}
