//! Serializable transform selection
//!
//! A pipeline file lists transforms as tagged tables:
//!
//! ```toml
//! [[transforms]]
//! kind = "speed_limits"
//! speeds_to_check = "print"
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::transform::TransformHandle;
use crate::transforms::*;

/// One configured transform, tagged by its name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformConfig {
    RemoveComments(RemoveComments),
    RenumberLayers(RenumberLayers),
    SpeedLimits(SpeedLimits),
    VeryCoolFanpath(VeryCoolFanPath),
    PauseAtLayer(PauseAtLayer),
    SupportInterfaceMaterialChange(SupportInterfaceMaterialChange),
    PrinterSettingsPatch(PrinterSettingsPatch),
    AddPurgeLines(AddPurgeLines),
    MoveToStart(MoveToStart),
    UnloadFilament(UnloadFilament),
    LineNumbering(LineNumbering),
    PracticeFile(PracticeFile),
    FinalZ(FinalZ),
    DisableAbl(DisableAbl),
    SearchAndReplace(SearchAndReplace),
    LiftHeadPark(LiftHeadPark),
    KillWipes(KillWipes),
    AdjustTempsPerModel(AdjustTempsPerModel),
}

impl TransformConfig {
    /// The tag, equal to the built transform's name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RemoveComments(_) => "remove_comments",
            Self::RenumberLayers(_) => "renumber_layers",
            Self::SpeedLimits(_) => "speed_limits",
            Self::VeryCoolFanpath(_) => "very_cool_fanpath",
            Self::PauseAtLayer(_) => "pause_at_layer",
            Self::SupportInterfaceMaterialChange(_) => "support_interface_material_change",
            Self::PrinterSettingsPatch(_) => "printer_settings_patch",
            Self::AddPurgeLines(_) => "add_purge_lines",
            Self::MoveToStart(_) => "move_to_start",
            Self::UnloadFilament(_) => "unload_filament",
            Self::LineNumbering(_) => "line_numbering",
            Self::PracticeFile(_) => "practice_file",
            Self::FinalZ(_) => "final_z",
            Self::DisableAbl(_) => "disable_abl",
            Self::SearchAndReplace(_) => "search_and_replace",
            Self::LiftHeadPark(_) => "lift_head_park",
            Self::KillWipes(_) => "kill_wipes",
            Self::AdjustTempsPerModel(_) => "adjust_temps_per_model",
        }
    }

    pub fn build(&self) -> TransformHandle {
        match self {
            Self::RemoveComments(t) => Arc::new(t.clone()),
            Self::RenumberLayers(t) => Arc::new(t.clone()),
            Self::SpeedLimits(t) => Arc::new(t.clone()),
            Self::VeryCoolFanpath(t) => Arc::new(t.clone()),
            Self::PauseAtLayer(t) => Arc::new(t.clone()),
            Self::SupportInterfaceMaterialChange(t) => Arc::new(t.clone()),
            Self::PrinterSettingsPatch(t) => Arc::new(t.clone()),
            Self::AddPurgeLines(t) => Arc::new(t.clone()),
            Self::MoveToStart(t) => Arc::new(t.clone()),
            Self::UnloadFilament(t) => Arc::new(t.clone()),
            Self::LineNumbering(t) => Arc::new(t.clone()),
            Self::PracticeFile(t) => Arc::new(t.clone()),
            Self::FinalZ(t) => Arc::new(t.clone()),
            Self::DisableAbl(t) => Arc::new(t.clone()),
            Self::SearchAndReplace(t) => Arc::new(t.clone()),
            Self::LiftHeadPark(t) => Arc::new(t.clone()),
            Self::KillWipes(t) => Arc::new(t.clone()),
            Self::AdjustTempsPerModel(t) => Arc::new(t.clone()),
        }
    }

    /// Every transform with default settings
    pub fn all_defaults() -> Vec<TransformConfig> {
        vec![
            Self::RemoveComments(RemoveComments::default()),
            Self::RenumberLayers(RenumberLayers::default()),
            Self::SpeedLimits(SpeedLimits::default()),
            Self::VeryCoolFanpath(VeryCoolFanPath::default()),
            Self::PauseAtLayer(PauseAtLayer::default()),
            Self::SupportInterfaceMaterialChange(SupportInterfaceMaterialChange::default()),
            Self::PrinterSettingsPatch(PrinterSettingsPatch::default()),
            Self::AddPurgeLines(AddPurgeLines::default()),
            Self::MoveToStart(MoveToStart::default()),
            Self::UnloadFilament(UnloadFilament::default()),
            Self::LineNumbering(LineNumbering::default()),
            Self::PracticeFile(PracticeFile::default()),
            Self::FinalZ(FinalZ::default()),
            Self::DisableAbl(DisableAbl::default()),
            Self::SearchAndReplace(SearchAndReplace::default()),
            Self::LiftHeadPark(LiftHeadPark::default()),
            Self::KillWipes(KillWipes::default()),
            Self::AdjustTempsPerModel(AdjustTempsPerModel::default()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_transform_name() {
        for config in TransformConfig::all_defaults() {
            assert_eq!(config.kind(), config.build().name());
        }
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{"kind": "speed_limits", "speeds_to_check": "print"}"#;
        let config: TransformConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config,
            TransformConfig::SpeedLimits(SpeedLimits::new(SpeedCheck::Print))
        );

        let json = r#"{"kind": "move_to_start"}"#;
        let config: TransformConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind(), "move_to_start");
    }

    #[test]
    fn test_tag_round_trip() {
        let config = TransformConfig::PauseAtLayer(PauseAtLayer {
            layers: "3,8".to_string(),
            ..PauseAtLayer::default()
        });
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["kind"], "pause_at_layer");
        assert_eq!(serde_json::from_value::<TransformConfig>(json).unwrap(), config);
    }
}
