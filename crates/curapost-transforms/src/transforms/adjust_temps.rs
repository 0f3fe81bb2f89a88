//! Per-model print temperatures for One-at-a-Time prints
//!
//! Each model gets the next temperature from the list. The change is made
//! at the end of the block before the model's first layer, or before its
//! second layer when the initial layer temperature differs so that the
//! slicer's first layer heat-up is kept.

use serde::{Deserialize, Serialize};

use curapost_core::{format_number, PrintSequence, RewriteError, TransformError};
use curapost_parser::{prefix, Block, CommandLine, Document, EditScope, LineEdit};

use crate::transform::{skip, Capability, Transform, TransformContext, TransformResult};

/// Temperature per model, in print order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustTempsPerModel {
    /// Comma-separated temperatures, e.g. `"210,215,220"`
    pub temperatures: String,
}

impl Default for AdjustTempsPerModel {
    fn default() -> Self {
        Self {
            temperatures: "210,215,220".to_string(),
        }
    }
}

fn parse_temperatures(text: &str) -> Result<Vec<f64>, TransformError> {
    let temperatures = text
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| {
                    TransformError::invalid("temperatures", format!("'{}' is not a temperature", t))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if temperatures.is_empty() {
        return Err(TransformError::MissingSetting {
            setting: "temperatures".to_string(),
        });
    }
    Ok(temperatures)
}

/// `;MESH:` name of the model printed in `block`, with a copy suffix
fn model_name(block: &Block, order: usize) -> String {
    block
        .lines()
        .iter()
        .filter_map(|l| l.strip_prefix(prefix::MESH))
        .map(str::trim)
        .find(|name| !name.starts_with("NONMESH"))
        .map(|name| {
            if name.ends_with(')') {
                name.to_string()
            } else {
                format!("{}(0)", name)
            }
        })
        .unwrap_or_else(|| format!("model {}", order + 1))
}

/// Rewrite the command lines of one block picked by `edit`
fn rewrite_commands<F>(doc: &mut Document, block: usize, mut edit: F) -> Result<usize, RewriteError>
where
    F: FnMut(&CommandLine, &str) -> Option<String>,
{
    let mut editor = doc.edit_block(block)?;
    Ok(editor.map_lines(EditScope::Body, |_, text| {
        match CommandLine::parse(text).and_then(|cmd| edit(&cmd, text)) {
            Some(new) => LineEdit::Replace(new),
            None => LineEdit::Keep,
        }
    }))
}

fn is_set_temperature(cmd: &CommandLine, code: u32) -> bool {
    cmd.is('M', code) && cmd.has('S')
}

impl AdjustTempsPerModel {
    /// Apply one model's temperature; `block` holds the model's change layer
    fn retune(
        doc: &mut Document,
        block: usize,
        second_layer: bool,
        temperature: &str,
        model: &str,
    ) -> Result<(), RewriteError> {
        let host = block - 1;
        rewrite_commands(doc, block, |cmd, _| {
            is_set_temperature(cmd, 104)
                .then(|| format!("M104 S{} ; maintain temperature for {}", temperature, model))
        })?;
        if host >= doc.layer_range().start {
            rewrite_commands(doc, host, |cmd, text| {
                let heater = cmd.is('M', 109) || (second_layer && is_set_temperature(cmd, 104));
                heater.then(|| format!(";{}", text))
            })?;
        }
        if second_layer && host >= 2 {
            rewrite_commands(doc, host - 1, |cmd, text| {
                is_set_temperature(cmd, 109).then(|| text.replacen(" S", " R", 1))
            })?;
        }
        doc.edit_block(host)?.insert_before_trailer([format!(
            "M109 R{} ; adjust temperature for {}",
            temperature, model
        )]);
        Ok(())
    }
}

impl Transform for AdjustTempsPerModel {
    fn name(&self) -> &str {
        "adjust_temps_per_model"
    }

    fn description(&self) -> &str {
        "Sets a print temperature per model in One-at-a-Time prints"
    }

    fn requires(&self) -> Vec<Capability> {
        vec![Capability::LayerMarkers]
    }

    fn apply(&self, mut doc: Document, ctx: &mut TransformContext) -> TransformResult {
        if ctx.printer.print_sequence != PrintSequence::OneAtATime {
            return skip(
                doc,
                TransformError::precondition("per-model temperatures need a One-at-a-Time print"),
            );
        }
        let temperatures = match parse_temperatures(&self.temperatures) {
            Ok(temperatures) => temperatures,
            Err(e) => return skip(doc, e),
        };
        let extruder = ctx.printer.extruder(0);
        let second_layer = extruder.initial_temperature() != extruder.print_temperature;
        let change_layer = i32::from(second_layer);

        let targets: Vec<(usize, String)> = doc
            .layer_range()
            .filter(|&i| doc.blocks()[i].layer_number() == Some(change_layer))
            .enumerate()
            .map(|(order, i)| (i, model_name(&doc.blocks()[i], order)))
            .collect();
        if targets.is_empty() {
            return skip(
                doc,
                TransformError::marker(format!("{}{}", prefix::LAYER, change_layer)),
            );
        }
        if temperatures.len() < targets.len() {
            ctx.diagnostics.warn(
                self.name(),
                format!(
                    "{} temperatures for {} models, the rest print at {}",
                    temperatures.len(),
                    targets.len(),
                    format_number(extruder.print_temperature)
                ),
            );
        }

        let mut table = vec!["; Print Order          Model Name                  Temperature".to_string()];
        for (order, (block, model)) in targets.iter().enumerate() {
            let temperature = format_number(
                temperatures
                    .get(order)
                    .copied()
                    .unwrap_or(extruder.print_temperature),
            );
            if let Err(e) = Self::retune(&mut doc, *block, second_layer, &temperature, model) {
                return skip(doc, e.into());
            }
            table.push(format!(";      {}       {:<40}{}", order + 1, model, temperature));
        }
        match doc.edit_block(0) {
            Ok(mut header) => {
                header.insert_lines(usize::MAX, table);
            }
            Err(e) => return skip(doc, e.into()),
        }
        tracing::info!(models = targets.len(), change_layer, "adjusted per-model temperatures");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curapost_core::PrinterConfig;

    fn doc() -> Document {
        Document::from_blocks([
            ";FLAVOR:Marlin\n;Generated with Cura_SteamEngine 5.7.1\n",
            "M104 S200\nM109 S200\nG28\n;LAYER_COUNT:2\n",
            ";LAYER:0\n;MESH:cube.stl\nG1 X1 Y1 E1\n;TIME_ELAPSED:1\n",
            ";LAYER:1\n;MESH:cube.stl\nG1 X1 Y1 E2\nM109 S200\n;TIME_ELAPSED:2\n;LAYER_COUNT:2\n",
            ";LAYER:0\n;MESH:cylinder(1)\nM104 S200\nG1 X9 Y9 E3\n;TIME_ELAPSED:3\n",
            ";LAYER:1\n;MESH:NONMESH\n;MESH:cylinder(1)\nG1 X9 Y9 E4\n;TIME_ELAPSED:4\n",
            "M104 S0\nM84\n",
        ])
    }

    fn one_at_a_time() -> PrinterConfig {
        PrinterConfig {
            print_sequence: PrintSequence::OneAtATime,
            ..PrinterConfig::default()
        }
    }

    #[test]
    fn test_temperature_per_model_at_first_layer() {
        let t = AdjustTempsPerModel {
            temperatures: "210, 225".to_string(),
        };
        let mut ctx = TransformContext::new(one_at_a_time());
        let out = t.apply(doc(), &mut ctx).unwrap();

        assert_eq!(
            out.blocks()[1].lines(),
            [
                "M104 S200",
                "M109 S200",
                "G28",
                "M109 R210 ; adjust temperature for cube.stl(0)",
                ";LAYER_COUNT:2",
            ]
        );
        let previous = out.blocks()[3].lines();
        assert!(previous.contains(&";M109 S200".to_string()));
        assert_eq!(previous[4], "M109 R225 ; adjust temperature for cylinder(1)");
        assert_eq!(previous[5], ";TIME_ELAPSED:2");
        assert_eq!(
            out.blocks()[4].lines()[2],
            "M104 S225 ; maintain temperature for cylinder(1)"
        );
        let header = out.blocks()[0].to_text();
        assert!(header.contains(&format!(";      2       {:<40}225\n", "cylinder(1)")));
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn test_initial_layer_temperature_is_kept() {
        let mut printer = one_at_a_time();
        printer.extruders[0].print_temperature_layer_0 = Some(205.0);
        let t = AdjustTempsPerModel {
            temperatures: "230".to_string(),
        };
        let mut ctx = TransformContext::new(printer);
        let out = t.apply(doc(), &mut ctx).unwrap();

        assert_eq!(out.blocks()[1].lines()[1], "M109 R200");
        assert!(out.blocks()[2]
            .lines()
            .contains(&"M109 R230 ; adjust temperature for cube.stl(0)".to_string()));
        let second = out.blocks()[4].lines();
        assert_eq!(second[2], ";M104 S200");
        assert!(second.contains(&"M109 R200 ; adjust temperature for cylinder(1)".to_string()));
        assert_eq!(out.blocks()[3].lines()[3], "M109 R200");
        assert_eq!(ctx.diagnostics.len(), 1);
    }

    #[test]
    fn test_all_at_once_is_skipped() {
        let mut ctx = TransformContext::default();
        let skipped = AdjustTempsPerModel::default()
            .apply(doc(), &mut ctx)
            .unwrap_err();
        assert_eq!(skipped.document, doc());
        assert!(matches!(skipped.reason, TransformError::PreconditionNotMet { .. }));
    }

    #[test]
    fn test_bad_temperature_list() {
        assert!(parse_temperatures("210,abc").is_err());
        assert!(matches!(
            parse_temperatures(" , "),
            Err(TransformError::MissingSetting { .. })
        ));
        assert_eq!(parse_temperatures("200,215.5").unwrap(), vec![200.0, 215.5]);
    }
}
