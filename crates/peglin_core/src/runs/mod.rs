//! Normalizes the stats graph into [`RunRecord`](crate::core_api::RunRecord)s.

mod extract;
mod reconstruct;
mod summary;

pub use extract::{HISTORY_KEYS, extract_run_history, get_run_by_index, history_entries, run_from_value};
pub use reconstruct::{
    MAX_RECONSTRUCTED_RUNS, RUN_COUNT_KEYS, WIN_COUNT_KEYS, reconstruct, reconstruct_from_totals,
};
pub use summary::{TOP_ORB_COUNT, summarize};
