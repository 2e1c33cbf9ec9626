use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::core_api::{EnemyPlayData, OrbDetail, OrbPlayData, RunRecord};
use crate::graph::{Graph, Value};
use crate::navigator::{self, entries, field, field_any, get_section, items, key_label};
use crate::type_library::TypeResolver;

use super::reconstruct::reconstruct_from_totals;

/// History section names, newest save layout first.
pub const HISTORY_KEYS: [&str; 4] = ["RunStatsHistory", "runStatsHistory", "StatsHistory", "RunHistory"];
const HISTORY_LIST_KEYS: [&str; 2] = ["runs", "history"];

const ID_KEYS: [&str; 3] = ["guid", "runId", "id"];
const STARTED_KEYS: [&str; 3] = ["startDate", "startTime", "runStart"];
const ENDED_KEYS: [&str; 3] = ["endDate", "endTime", "runEnd"];
const WON_KEYS: [&str; 3] = ["isWin", "won", "victory"];
const CLASS_KEYS: [&str; 3] = ["selectedClass", "playerClass", "class"];
const CRUCIBALL_KEYS: [&str; 2] = ["cruciballLevel", "cruciball"];
const DEFEATED_BY_KEYS: [&str; 2] = ["defeatedBy", "killedBy"];
const ROOM_KEYS: [&str; 3] = ["visitedRooms", "rooms", "roomTypes"];
const BOSS_KEYS: [&str; 3] = ["visitedBosses", "bosses", "bossTypes"];
const STATUS_EFFECT_KEYS: [&str; 2] = ["statusEffects", "statusEffectStacks"];
const SLIME_PEG_KEYS: [&str; 2] = ["slimePegs", "slimePegsHit"];
const ENEMY_KEYS: [&str; 3] = ["enemyData", "enemyPlayData", "enemies"];

const ORB_STATS_KEY: &str = "orbStats";
const DUAL_ORB_STATS_KEY: &str = "dualOrbStats";
const UNLIMITED_ORB_STATS_KEY: &str = "unlimitedOrbStats";

const RUN_TIMER_KEY: &str = "runTimer";
const LEGACY_TIMER_KEY: &str = "runTimerElapsedMilliseconds";

const CLASS_ENUM: &str = "Class";
const ROOM_ENUM: &str = "RoomType";
const BOSS_ENUM: &str = "BossType";
const STATUS_EFFECT_ENUM: &str = "StatusEffectType";
const SLIME_ENUM: &str = "SlimeType";
const ENEMY_ENUM: &str = "EnemyType";

const TICKS_PER_MILLISECOND: i64 = 10_000;
const TICKS_PER_SECOND: i64 = 10_000_000;
/// .NET ticks at 1970-01-01T00:00:00Z.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Every run in the stats graph, in stored order.
///
/// Falls back to records rebuilt from aggregate counters only when no history
/// list exists; an empty list stays empty. Never fails; an unusable graph
/// yields an empty list.
pub fn extract_run_history(graph: &Graph, resolver: Option<&TypeResolver>) -> Vec<RunRecord> {
    if let Some((key, list)) = history_entries(graph) {
        let runs: Vec<RunRecord> = list
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| run_from_value(graph, entry, resolver, index))
            .collect();
        tracing::debug!(section = key, entries = list.len(), runs = runs.len(), "read run history");
        if runs.is_empty() {
            tracing::warn!(section = key, entries = list.len(), "run history holds no usable runs");
        }
        return runs;
    }

    let rebuilt = reconstruct_from_totals(graph);
    if rebuilt.is_empty() {
        tracing::warn!("no run history section and no aggregate run counters found");
    }
    rebuilt
}

/// The history list and the section key it was found under.
pub fn history_entries(graph: &Graph) -> Option<(&'static str, &[Value])> {
    for key in HISTORY_KEYS {
        let Some(section) = get_section(graph, key) else {
            continue;
        };
        if let Value::Array { items, .. } = section {
            return Some((key, items.as_slice()));
        }
        if let Some(Value::Array { items, .. }) = field_any(graph, section, &HISTORY_LIST_KEYS) {
            return Some((key, items.as_slice()));
        }
        tracing::debug!(
            section = key,
            kind = section.kind_label(),
            "history section has no run list"
        );
    }
    None
}

pub fn get_run_by_index(runs: &[RunRecord], index: usize) -> Option<&RunRecord> {
    runs.get(index)
}

/// Map one history entry to a [`RunRecord`]. Entries lost to corruption
/// (null) or of an unexpected kind are skipped.
pub fn run_from_value(
    graph: &Graph,
    entry: &Value,
    resolver: Option<&TypeResolver>,
    index: usize,
) -> Option<RunRecord> {
    let run = navigator::unwrap_envelope(graph, entry);
    if !matches!(run, Value::Node(_) | Value::Dictionary { .. }) {
        tracing::debug!(index, kind = run.kind_label(), "skipping non-record history entry");
        return None;
    }

    let int = |names: &[&str]| -> i64 {
        field_any(graph, run, names)
            .and_then(Value::as_i64)
            .unwrap_or(0)
    };

    let id = field_any(graph, run, &ID_KEYS)
        .and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            other => other.as_i64().map(|n| n.to_string()),
        })
        .unwrap_or_else(|| format!("run-{}", index + 1));

    Some(RunRecord {
        id,
        started_at: field_any(graph, run, &STARTED_KEYS).and_then(timestamp),
        ended_at: field_any(graph, run, &ENDED_KEYS).and_then(timestamp),
        won: field_any(graph, run, &WON_KEYS)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        class: field_any(graph, run, &CLASS_KEYS)
            .and_then(|v| enum_label(resolver, v, CLASS_ENUM))
            .unwrap_or_else(|| "Unknown".to_string()),
        cruciball_level: int(&CRUCIBALL_KEYS),
        duration_ms: duration_ms(graph, run),
        damage_dealt: int(&["damageDealt", "totalDamageDealt"]),
        damage_negated: int(&["damageNegated", "totalDamageNegated"]),
        pegs_hit: int(&["pegsHit", "totalPegsHit"]),
        pegs_refreshed: int(&["pegsRefreshed", "refreshPegsHit"]),
        crit_pegs_hit: int(&["critPegsHit", "critsHit"]),
        bomb_pegs_hit: int(&["bombPegsHit", "bombsHit"]),
        shots: int(&["shotsTaken", "shots"]),
        crit_shots: int(&["critShotsTaken", "critShots"]),
        bombs_thrown: int(&["bombsThrown"]),
        coins_earned: int(&["coinsEarned", "goldEarned"]),
        coins_spent: int(&["coinsSpent", "goldSpent"]),
        defeated_by: field_any(graph, run, &DEFEATED_BY_KEYS)
            .and_then(|v| enum_label(resolver, v, ENEMY_ENUM))
            .filter(|s| !s.is_empty()),
        rooms: enum_list(graph, run, &ROOM_KEYS, resolver, ROOM_ENUM),
        bosses: enum_list(graph, run, &BOSS_KEYS, resolver, BOSS_ENUM),
        status_effects: enum_counts(graph, run, &STATUS_EFFECT_KEYS, resolver, STATUS_EFFECT_ENUM),
        slime_pegs: enum_counts(graph, run, &SLIME_PEG_KEYS, resolver, SLIME_ENUM),
        enemies: enemies(graph, run, resolver),
        orbs: orbs(graph, run),
        reconstructed: false,
    })
}

/// Name for an enum-coded value: the library's label, else the raw number.
/// Older saves store plain integers, resolved against `fallback_enum`;
/// plain strings are used as-is.
fn enum_label(resolver: Option<&TypeResolver>, value: &Value, fallback_enum: &str) -> Option<String> {
    let (declared, raw) = match value {
        Value::String(s) => return Some(s.clone()),
        Value::Enum { type_name, raw } => (Some(type_name.as_str()), *raw),
        other => (None, i32::try_from(other.as_i64()?).ok()?),
    };
    let resolved = resolver.and_then(|r| {
        declared
            .and_then(|name| r.enum_name(name, raw))
            .or_else(|| r.enum_name(fallback_enum, raw))
    });
    Some(match resolved {
        Some(name) => name.to_string(),
        None => raw.to_string(),
    })
}

fn enum_list(
    graph: &Graph,
    run: &Value,
    keys: &[&str],
    resolver: Option<&TypeResolver>,
    enum_name: &str,
) -> Vec<String> {
    let Some(list) = field_any(graph, run, keys) else {
        return Vec::new();
    };
    items(graph, list)
        .iter()
        .filter_map(|item| enum_label(resolver, navigator::unwrap_envelope(graph, item), enum_name))
        .collect()
}

fn enum_counts(
    graph: &Graph,
    run: &Value,
    keys: &[&str],
    resolver: Option<&TypeResolver>,
    enum_name: &str,
) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    let Some(dict) = field_any(graph, run, keys) else {
        return out;
    };
    for (key, value) in entries(graph, dict) {
        let Some(label) = enum_label(resolver, navigator::unwrap_envelope(graph, key), enum_name)
        else {
            continue;
        };
        let count = navigator::as_i64(graph, value).unwrap_or(0);
        let slot = out.entry(label).or_insert(0);
        *slot = slot.saturating_add(count);
    }
    out
}

fn enemies(
    graph: &Graph,
    run: &Value,
    resolver: Option<&TypeResolver>,
) -> BTreeMap<String, EnemyPlayData> {
    let mut out = BTreeMap::new();
    let Some(dict) = field_any(graph, run, &ENEMY_KEYS) else {
        return out;
    };
    for (key, value) in entries(graph, dict) {
        let name = enum_label(resolver, navigator::unwrap_envelope(graph, key), ENEMY_ENUM)
            .unwrap_or_else(|| key_label(graph, key));
        let int = |names: &[&str]| {
            field_any(graph, value, names)
                .and_then(Value::as_i64)
                .unwrap_or(0)
        };
        out.insert(
            name,
            EnemyPlayData {
                amount_fought: int(&["amountFought", "timesFought"]),
                melee_damage_received: int(&["meleeDamageReceived"]),
                ranged_damage_received: int(&["rangedDamageReceived"]),
                defeated_player: field_any(graph, value, &["defeatedPlayer", "killedPlayer"])
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
        );
    }
    out
}

#[derive(Debug, Clone, Copy)]
enum OrbSource {
    Plain,
    Dual,
    Unlimited,
}

/// Merge the plain, dual and unlimited orb tables into one entry per orb id.
fn orbs(graph: &Graph, run: &Value) -> BTreeMap<String, OrbPlayData> {
    let mut out: BTreeMap<String, OrbPlayData> = BTreeMap::new();
    for (key, source) in [
        (ORB_STATS_KEY, OrbSource::Plain),
        (DUAL_ORB_STATS_KEY, OrbSource::Dual),
        (UNLIMITED_ORB_STATS_KEY, OrbSource::Unlimited),
    ] {
        let Some(dict) = field(graph, run, key) else {
            continue;
        };
        for (orb_key, value) in entries(graph, dict) {
            let id = key_label(graph, orb_key);
            let parsed = orb_from_value(graph, &id, value, source);
            match out.get_mut(&id) {
                Some(existing) => merge_orb(existing, parsed),
                None => {
                    out.insert(id, parsed);
                }
            }
        }
    }
    for orb in out.values_mut() {
        if orb.name.is_empty() {
            orb.name = orb.id.clone();
        }
    }
    out
}

fn orb_from_value(graph: &Graph, id: &str, value: &Value, source: OrbSource) -> OrbPlayData {
    let int = |names: &[&str]| {
        field_any(graph, value, names)
            .and_then(Value::as_i64)
            .unwrap_or(0)
    };
    let list = |name: &str| -> Vec<i64> {
        field(graph, value, name)
            .map(|list| {
                items(graph, list)
                    .iter()
                    .map(|item| navigator::as_i64(graph, item).unwrap_or(0))
                    .collect()
            })
            .unwrap_or_default()
    };
    let pair = |name: &str| -> [i64; 2] {
        let values = list(name);
        [
            values.first().copied().unwrap_or(0),
            values.get(1).copied().unwrap_or(0),
        ]
    };

    let detail = match source {
        OrbSource::Plain => OrbDetail::Plain,
        OrbSource::Dual => OrbDetail::DualComponent {
            component_damage: pair("componentDamage"),
            component_fires: pair("componentFires"),
        },
        OrbSource::Unlimited => OrbDetail::UnlimitedUpgrade {
            highest_level: int(&["highestLevel", "maxLevel"]),
        },
    };

    OrbPlayData {
        id: id.to_string(),
        name: field_any(graph, value, &["name", "orbName"])
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        damage_dealt: int(&["damageDealt", "totalDamage"]),
        times_fired: int(&["timesFired", "amountFired"]),
        times_discarded: int(&["timesDiscarded"]),
        times_removed: int(&["timesRemoved"]),
        level_instances: list("levelInstances"),
        detail,
    }
}

fn merge_orb(into: &mut OrbPlayData, other: OrbPlayData) {
    if into.name.is_empty() {
        into.name = other.name;
    }
    into.damage_dealt = into.damage_dealt.saturating_add(other.damage_dealt);
    into.times_fired = into.times_fired.saturating_add(other.times_fired);
    into.times_discarded = into.times_discarded.saturating_add(other.times_discarded);
    into.times_removed = into.times_removed.saturating_add(other.times_removed);
    if into.level_instances.len() < other.level_instances.len() {
        into.level_instances.resize(other.level_instances.len(), 0);
    }
    for (slot, count) in into.level_instances.iter_mut().zip(other.level_instances) {
        *slot = slot.saturating_add(count);
    }
    if into.detail.is_plain() {
        into.detail = other.detail;
    }
}

/// Run length from the stopwatch record, or the flat counter older saves use.
fn duration_ms(graph: &Graph, run: &Value) -> Option<i64> {
    if let Some(timer) = field(graph, run, RUN_TIMER_KEY).filter(|t| !t.is_null()) {
        if let Some(ms) = field(graph, timer, "elapsedMilliseconds").and_then(Value::as_i64) {
            return Some(ms);
        }
        if let Some(ticks) = field(graph, timer, "elapsedTicks").and_then(Value::as_i64) {
            return Some(ticks / TICKS_PER_MILLISECOND);
        }
    }
    field(graph, run, LEGACY_TIMER_KEY).and_then(Value::as_i64)
}

/// Timestamps are stored either as text or as .NET ticks.
fn timestamp(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Int64(ticks) => ticks_to_rfc3339(*ticks),
        _ => None,
    }
}

pub(crate) fn ticks_to_rfc3339(ticks: i64) -> Option<String> {
    if ticks <= 0 {
        return None;
    }
    let since_epoch = ticks.checked_sub(UNIX_EPOCH_TICKS)?;
    let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = u32::try_from(since_epoch.rem_euclid(TICKS_PER_SECOND) * 100).ok()?;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[cfg(test)]
mod tests {
    use super::{OrbSource, merge_orb, orb_from_value, ticks_to_rfc3339};
    use crate::core_api::OrbDetail;
    use crate::graph::{Dialect, GraphBuilder, Value};

    #[test]
    fn ticks_convert_to_utc_timestamps() {
        assert_eq!(
            ticks_to_rfc3339(638_396_640_000_000_000).as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
        assert_eq!(ticks_to_rfc3339(0), None);
    }

    #[test]
    fn merged_orb_sums_counters_and_keeps_composite_detail() {
        let mut b = GraphBuilder::new();
        let s = b.schema(
            "Stats.OrbPlayData",
            &[
                ("name", "System.String"),
                ("damageDealt", "System.Int32"),
                ("timesFired", "System.Int32"),
                ("levelInstances", "System.Int32[]"),
                ("componentDamage", "System.Int32[]"),
            ],
        );
        let plain = b.record(
            s,
            vec![
                ("name", Value::string("Dagger")),
                ("damageDealt", Value::Int32(100)),
                ("timesFired", Value::Int32(4)),
                (
                    "levelInstances",
                    Value::array("System.Int32", vec![Value::Int32(1)]),
                ),
            ],
        );
        let dual = b.record(
            s,
            vec![
                ("damageDealt", Value::Int32(50)),
                ("timesFired", Value::Int32(1)),
                (
                    "levelInstances",
                    Value::array("System.Int32", vec![Value::Int32(1), Value::Int32(2)]),
                ),
                (
                    "componentDamage",
                    Value::array("System.Int32", vec![Value::Int32(30), Value::Int32(20)]),
                ),
            ],
        );
        let graph = b.finish(Value::Null, Dialect::Permissive);

        let mut merged = orb_from_value(&graph, "dagger", &Value::Node(plain), OrbSource::Plain);
        merge_orb(
            &mut merged,
            orb_from_value(&graph, "dagger", &Value::Node(dual), OrbSource::Dual),
        );

        assert_eq!(merged.name, "Dagger");
        assert_eq!(merged.damage_dealt, 150);
        assert_eq!(merged.times_fired, 5);
        assert_eq!(merged.level_instances, vec![2, 2]);
        assert_eq!(
            merged.detail,
            OrbDetail::DualComponent {
                component_damage: [30, 20],
                component_fires: [0, 0],
            }
        );
    }
}
