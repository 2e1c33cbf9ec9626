//! Approximate run list for saves without per-run history.
//!
//! Only the run and win totals survive in those saves. Records are listed
//! most recent first and the first `wins` of them are marked won, on the
//! assumption that the most recent runs were the wins. That ordering is a
//! heuristic, so every record carries `reconstructed = true`.

use crate::core_api::RunRecord;
use crate::graph::Graph;
use crate::navigator::{MAX_DUMP_DEPTH, find_counter};

pub const RUN_COUNT_KEYS: [&str; 3] = ["totalRuns", "runsStarted", "runCount"];
pub const WIN_COUNT_KEYS: [&str; 3] = ["totalWins", "wins", "runsWon"];
/// Upper bound on rebuilt records; larger totals are clamped.
pub const MAX_RECONSTRUCTED_RUNS: usize = 100_000;

pub fn reconstruct_from_totals(graph: &Graph) -> Vec<RunRecord> {
    let Some(total_runs) = find_counter(graph, &RUN_COUNT_KEYS, MAX_DUMP_DEPTH) else {
        return Vec::new();
    };
    let total_wins = find_counter(graph, &WIN_COUNT_KEYS, MAX_DUMP_DEPTH).unwrap_or(0);
    let runs = reconstruct(total_runs, total_wins);
    if !runs.is_empty() {
        tracing::warn!(
            runs = total_runs,
            wins = total_wins,
            "no run history; rebuilt approximate runs from totals"
        );
    }
    runs
}

/// `runs` records, most recent first, the first `min(wins, runs)` won.
/// At most [`MAX_RECONSTRUCTED_RUNS`] records are produced.
pub fn reconstruct(runs: i64, wins: i64) -> Vec<RunRecord> {
    let mut runs = usize::try_from(runs).unwrap_or(0);
    if runs > MAX_RECONSTRUCTED_RUNS {
        tracing::warn!(
            runs,
            limit = MAX_RECONSTRUCTED_RUNS,
            "run total exceeds the reconstruction limit; clamping"
        );
        runs = MAX_RECONSTRUCTED_RUNS;
    }
    let wins = usize::try_from(wins).unwrap_or(0).min(runs);
    (0..runs)
        .map(|index| RunRecord {
            id: format!("reconstructed-{}", index + 1),
            won: index < wins,
            class: "Unknown".to_string(),
            reconstructed: true,
            ..RunRecord::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{MAX_RECONSTRUCTED_RUNS, reconstruct};

    #[test]
    fn wins_never_exceed_runs() {
        let runs = reconstruct(3, 8);
        assert_eq!(runs.len(), 3);
        assert!(runs.iter().all(|r| r.won && r.reconstructed));
    }

    #[test]
    fn negative_totals_yield_nothing() {
        assert!(reconstruct(-2, 1).is_empty());
        let runs = reconstruct(2, -1);
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| !r.won));
    }

    #[test]
    fn huge_totals_are_clamped() {
        let runs = reconstruct(i64::MAX, i64::MAX);
        assert_eq!(runs.len(), MAX_RECONSTRUCTED_RUNS);
        assert!(runs.iter().all(|r| r.won));
    }
}
