//! The named transforms
//!
//! Each transform is a plain serde-derivable settings struct implementing
//! [`Transform`](crate::transform::Transform).

pub mod adjust_temps;
pub mod disable_abl;
pub mod final_z;
pub mod lift_head;
pub mod kill_wipes;
pub mod line_numbering;
pub mod move_to_start;
pub mod pause_at_layer;
pub mod practice_file;
pub mod printer_settings;
pub mod purge_lines;
pub mod remove_comments;
pub mod renumber_layers;
pub mod search_replace;
pub mod speed_limits;
pub mod support_interface;
pub mod unload_filament;
pub mod very_cool;

pub use adjust_temps::AdjustTempsPerModel;
pub use disable_abl::DisableAbl;
pub use final_z::FinalZ;
pub use kill_wipes::{KillWipes, WipeTarget};
pub use lift_head::LiftHeadPark;
pub use line_numbering::LineNumbering;
pub use move_to_start::MoveToStart;
pub use pause_at_layer::{PauseAtLayer, PauseReason};
pub use practice_file::PracticeFile;
pub use printer_settings::{AxisValues, PrinterSettingsPatch};
pub use purge_lines::{AddPurgeLines, PurgeLocation};
pub use remove_comments::RemoveComments;
pub use renumber_layers::{RenumberLayers, RenumberMode};
pub use search_replace::SearchAndReplace;
pub use speed_limits::{SpeedCheck, SpeedLimits};
pub use support_interface::SupportInterfaceMaterialChange;
pub use unload_filament::UnloadFilament;
pub use very_cool::VeryCoolFanPath;
