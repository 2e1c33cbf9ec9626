use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One run, as recovered from the stats file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunRecord {
    pub id: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub won: bool,
    pub class: String,
    pub cruciball_level: i64,
    pub duration_ms: Option<i64>,
    pub damage_dealt: i64,
    pub damage_negated: i64,
    pub pegs_hit: i64,
    pub pegs_refreshed: i64,
    pub crit_pegs_hit: i64,
    pub bomb_pegs_hit: i64,
    pub shots: i64,
    pub crit_shots: i64,
    pub bombs_thrown: i64,
    pub coins_earned: i64,
    pub coins_spent: i64,
    pub defeated_by: Option<String>,
    pub rooms: Vec<String>,
    pub bosses: Vec<String>,
    pub status_effects: BTreeMap<String, i64>,
    pub slime_pegs: BTreeMap<String, i64>,
    pub enemies: BTreeMap<String, EnemyPlayData>,
    pub orbs: BTreeMap<String, OrbPlayData>,
    /// Synthesized from aggregate counters rather than a history entry.
    pub reconstructed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnemyPlayData {
    pub amount_fought: i64,
    pub melee_damage_received: i64,
    pub ranged_damage_received: i64,
    pub defeated_player: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbPlayData {
    pub id: String,
    pub name: String,
    pub damage_dealt: i64,
    pub times_fired: i64,
    pub times_discarded: i64,
    pub times_removed: i64,
    /// Copies of the orb held at each upgrade level, index 0 = level 1.
    pub level_instances: Vec<i64>,
    pub detail: OrbDetail,
}

/// Extra counters carried by composite orbs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrbDetail {
    #[default]
    Plain,
    DualComponent {
        component_damage: [i64; 2],
        component_fires: [i64; 2],
    },
    UnlimitedUpgrade {
        highest_level: i64,
    },
}

impl OrbDetail {
    pub fn is_plain(&self) -> bool {
        matches!(self, Self::Plain)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::DualComponent { .. } => "dual",
            Self::UnlimitedUpgrade { .. } => "unlimited",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTotals {
    pub class: String,
    pub runs: usize,
    pub wins: usize,
    pub highest_cruciball_won: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrbTotals {
    pub id: String,
    pub name: String,
    pub damage_dealt: i64,
    pub times_fired: i64,
}

/// Aggregate view over a run list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_runs: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub reconstructed_runs: usize,
    pub classes: Vec<ClassTotals>,
    pub highest_cruciball_won: Option<i64>,
    pub total_damage: i64,
    pub total_play_time_ms: i64,
    pub top_orbs: Vec<OrbTotals>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityIssue {
    /// No per-run history; the run list was rebuilt from totals.
    ReconstructedHistory,
    /// Enum-coded fields are shown as raw numbers.
    MissingTypeLibrary,
    /// No cruciball progression table yet, so cruciball edits are refused.
    FreshProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Capabilities {
    pub can_query: bool,
    pub can_apply_edits: bool,
    pub can_edit_cruciball: bool,
    pub issues: Vec<CapabilityIssue>,
}

impl Capabilities {
    pub fn editable(issues: Vec<CapabilityIssue>) -> Self {
        Self {
            can_query: true,
            can_apply_edits: true,
            can_edit_cruciball: !issues.contains(&CapabilityIssue::FreshProfile),
            issues,
        }
    }
}
