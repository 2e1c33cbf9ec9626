use std::collections::BTreeMap;

use crate::core_api::{ClassTotals, OrbTotals, RunRecord, RunSummary};

pub const TOP_ORB_COUNT: usize = 5;

pub fn summarize(runs: &[RunRecord]) -> RunSummary {
    let total_runs = runs.len();
    let wins = runs.iter().filter(|r| r.won).count();

    let mut classes: BTreeMap<&str, ClassTotals> = BTreeMap::new();
    let mut orbs: BTreeMap<&str, OrbTotals> = BTreeMap::new();
    for run in runs {
        let totals = classes
            .entry(run.class.as_str())
            .or_insert_with(|| ClassTotals {
                class: run.class.clone(),
                ..ClassTotals::default()
            });
        totals.runs += 1;
        if run.won {
            totals.wins += 1;
            totals.highest_cruciball_won = totals
                .highest_cruciball_won
                .max(Some(run.cruciball_level));
        }

        for orb in run.orbs.values() {
            let entry = orbs.entry(orb.id.as_str()).or_insert_with(|| OrbTotals {
                id: orb.id.clone(),
                name: orb.name.clone(),
                ..OrbTotals::default()
            });
            entry.damage_dealt = entry.damage_dealt.saturating_add(orb.damage_dealt);
            entry.times_fired = entry.times_fired.saturating_add(orb.times_fired);
        }
    }

    let mut top_orbs: Vec<OrbTotals> = orbs.into_values().collect();
    top_orbs.sort_by(|a, b| {
        b.damage_dealt
            .cmp(&a.damage_dealt)
            .then_with(|| a.id.cmp(&b.id))
    });
    top_orbs.truncate(TOP_ORB_COUNT);

    RunSummary {
        total_runs,
        wins,
        losses: total_runs - wins,
        win_rate: if total_runs == 0 {
            0.0
        } else {
            wins as f64 / total_runs as f64
        },
        reconstructed_runs: runs.iter().filter(|r| r.reconstructed).count(),
        highest_cruciball_won: runs
            .iter()
            .filter(|r| r.won)
            .map(|r| r.cruciball_level)
            .max(),
        classes: classes.into_values().collect(),
        total_damage: runs
            .iter()
            .map(|r| r.damage_dealt)
            .fold(0i64, i64::saturating_add),
        total_play_time_ms: runs
            .iter()
            .filter_map(|r| r.duration_ms)
            .fold(0i64, i64::saturating_add),
        top_orbs,
    }
}
