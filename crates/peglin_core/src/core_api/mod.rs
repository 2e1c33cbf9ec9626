mod engine;
mod error;
mod save_files;
mod types;

pub use engine::{Engine, Session};
pub use error::{CoreError, CoreErrorCode};
pub use save_files::{
    conventional_install_dirs, detect_install_dir_from_save_path, first_install_dir,
    stats_path_for_save,
};
pub use types::{
    Capabilities, CapabilityIssue, ClassTotals, EnemyPlayData, OrbDetail, OrbPlayData, OrbTotals,
    RunRecord, RunSummary,
};
