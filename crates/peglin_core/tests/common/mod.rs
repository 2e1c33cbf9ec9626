#![allow(dead_code)]

use std::sync::Arc;

use peglin_core::graph::{Dialect, Graph, GraphBuilder, MEMBER_OPT_IN, NodeId, Value, serialize};
use peglin_core::type_library::{TypeLibrary, TypeResolver};

pub const ROOT_DICT: &str = "System.Collections.Generic.Dictionary`2[System.String,Item]";
pub const RUN_LIST: &str = "System.Collections.Generic.List`1[Stats.RunStats]";
pub const ORB_DICT: &str =
    "System.Collections.Generic.Dictionary`2[System.String,Stats.OrbPlayData]";
pub const STATUS_DICT: &str =
    "System.Collections.Generic.Dictionary`2[Battle.StatusEffects.StatusEffectType,System.Int32]";
pub const CLASS_LEVELS_DICT: &str =
    "System.Collections.Generic.Dictionary`2[Peglin.ClassSystem.Class,System.Int32]";
pub const CLASS_ENUM: &str = "Peglin.ClassSystem.Class";
pub const ROOM_ENUM: &str = "Worldmap.RoomType";
pub const STATUS_ENUM: &str = "Battle.StatusEffects.StatusEffectType";

pub const TYPE_LIBRARY_JSON: &str = r#"{
    "assembly": "Assembly-CSharp",
    "types": [
        {"name": "Peglin.ClassSystem.Class", "kind": "enum",
         "values": {"0": "Peglin", "1": "Balladin", "2": "Roundrel", "3": "Spinventor"}},
        {"name": "Worldmap.RoomType", "kind": "enum",
         "values": {"0": "Battle", "1": "Treasure", "2": "Boss", "3": "Store"}},
        {"name": "Battle.StatusEffects.StatusEffectType", "kind": "enum",
         "values": {"0": "None", "1": "Strength", "2": "Finesse"}},
        {"name": "Stats.RunStats", "kind": "record"},
        {"name": "Stats.RunTimer", "kind": "record"}
    ]
}"#;

pub fn library() -> TypeLibrary {
    TypeLibrary::from_json_str(TYPE_LIBRARY_JSON).expect("fixture type library parses")
}

pub fn resolver() -> Arc<TypeResolver> {
    Arc::new(TypeResolver::with_library(library()))
}

#[derive(Debug, Clone)]
pub struct RunSpec {
    pub guid: &'static str,
    pub won: bool,
    pub class: i32,
    pub cruciball: i32,
    pub damage: i64,
    pub pegs_hit: i32,
    pub rooms: Vec<i32>,
    pub timer_ms: Option<i64>,
    pub orbs: Vec<(&'static str, i32)>,
    pub strength_stacks: Option<i32>,
}

/// Won Peglin run: 15000 damage through Battle, Battle, Boss.
pub fn run_a() -> RunSpec {
    RunSpec {
        guid: "3f1c2a9e-0001",
        won: true,
        class: 0,
        cruciball: 4,
        damage: 15_000,
        pegs_hit: 812,
        rooms: vec![0, 0, 2],
        timer_ms: Some(1_234_000),
        orbs: vec![("StoneOrb", 9_000), ("Bombulet", 6_000)],
        strength_stacks: Some(3),
    }
}

/// Lost Balladin run: 500 damage, one Battle room.
pub fn run_b() -> RunSpec {
    RunSpec {
        guid: "3f1c2a9e-0002",
        won: false,
        class: 1,
        cruciball: 0,
        damage: 500,
        pegs_hit: 40,
        rooms: vec![0],
        timer_ms: Some(61_000),
        orbs: vec![("StoneOrb", 500)],
        strength_stacks: None,
    }
}

/// Root dictionary with a `RunStatsHistory` envelope holding `runs`.
///
/// With `opt_in_collections` false, the orb and status-effect dictionaries
/// are plain members, which only the permissive dialect writes.
pub fn stats_graph(runs: &[RunSpec], opt_in_collections: bool) -> Graph {
    let collection_flags = if opt_in_collections { MEMBER_OPT_IN } else { 0 };

    let mut b = GraphBuilder::new();
    let item = b.schema_with_flags("Item", &[("value", "System.Object", MEMBER_OPT_IN)]);
    let history = b.schema_with_flags(
        "Stats.RunStatsHistory",
        &[("runs", RUN_LIST, MEMBER_OPT_IN)],
    );
    let timer = b.schema("Stats.RunTimer", &[("elapsedMilliseconds", "System.Int64")]);
    let orb = b.schema(
        "Stats.OrbPlayData",
        &[
            ("name", "System.String"),
            ("damageDealt", "System.Int32"),
            ("timesFired", "System.Int32"),
            ("levelInstances", "System.Int32[]"),
        ],
    );
    let run = b.schema_with_flags(
        "Stats.RunStats",
        &[
            ("guid", "System.String", 0),
            ("isWin", "System.Boolean", 0),
            ("selectedClass", CLASS_ENUM, 0),
            ("cruciballLevel", "System.Int32", 0),
            ("damageDealt", "System.Int64", 0),
            ("pegsHit", "System.Int32", 0),
            ("visitedRooms", "Worldmap.RoomType[]", 0),
            ("runTimer", "Stats.RunTimer", 0),
            ("orbStats", ORB_DICT, collection_flags),
            ("statusEffects", STATUS_DICT, collection_flags),
        ],
    );

    let mut run_nodes = Vec::new();
    for spec in runs {
        let timer_value = match spec.timer_ms {
            Some(ms) => Value::Node(b.record(timer, vec![("elapsedMilliseconds", Value::Int64(ms))])),
            None => Value::Null,
        };
        let mut orb_entries = Vec::new();
        for (id, damage) in &spec.orbs {
            let node = b.record(
                orb,
                vec![
                    ("name", Value::string(*id)),
                    ("damageDealt", Value::Int32(*damage)),
                    ("timesFired", Value::Int32(damage / 100)),
                    (
                        "levelInstances",
                        Value::array("System.Int32", vec![Value::Int32(1), Value::Int32(0)]),
                    ),
                ],
            );
            orb_entries.push((Value::string(*id), Value::Node(node)));
        }
        let status_entries = spec
            .strength_stacks
            .map(|stacks| vec![(Value::enumeration(STATUS_ENUM, 1), Value::Int32(stacks))])
            .unwrap_or_default();

        let node = b.record(
            run,
            vec![
                ("guid", Value::string(spec.guid)),
                ("isWin", Value::Bool(spec.won)),
                ("selectedClass", Value::enumeration(CLASS_ENUM, spec.class)),
                ("cruciballLevel", Value::Int32(spec.cruciball)),
                ("damageDealt", Value::Int64(spec.damage)),
                ("pegsHit", Value::Int32(spec.pegs_hit)),
                (
                    "visitedRooms",
                    Value::array(
                        ROOM_ENUM,
                        spec.rooms
                            .iter()
                            .map(|&room| Value::enumeration(ROOM_ENUM, room))
                            .collect(),
                    ),
                ),
                ("runTimer", timer_value),
                ("orbStats", Value::dictionary(ORB_DICT, orb_entries)),
                ("statusEffects", Value::dictionary(STATUS_DICT, status_entries)),
            ],
        );
        run_nodes.push(Value::Node(node));
    }

    let history_node = b.record(
        history,
        vec![("runs", Value::array("Stats.RunStats", run_nodes))],
    );
    let envelope = b.record(item, vec![("value", Value::Node(history_node))]);
    let root = Value::dictionary(
        ROOT_DICT,
        vec![(Value::string("RunStatsHistory"), Value::Node(envelope))],
    );
    b.finish(root, Dialect::Permissive)
}

pub fn stats_bytes(runs: &[RunSpec]) -> Vec<u8> {
    serialize(&stats_graph(runs, true), Dialect::Permissive, None)
}

pub fn two_run_stats_bytes() -> Vec<u8> {
    stats_bytes(&[run_a(), run_b()])
}

/// Old layout: no history, only lifetime totals under `PermanentStats`.
pub fn totals_only_bytes(total_runs: i32, total_wins: i32) -> Vec<u8> {
    let mut b = GraphBuilder::new();
    let item = b.schema_with_flags("Item", &[("value", "System.Object", MEMBER_OPT_IN)]);
    let stats = b.schema(
        "PermanentStats",
        &[
            ("totalRuns", "System.Int32"),
            ("totalWins", "System.Int32"),
            ("highestCruciball", "System.Int32"),
        ],
    );
    let stats_node = b.record(
        stats,
        vec![
            ("totalRuns", Value::Int32(total_runs)),
            ("totalWins", Value::Int32(total_wins)),
            ("highestCruciball", Value::Int32(2)),
        ],
    );
    let envelope = b.record(item, vec![("value", Value::Node(stats_node))]);
    let root = Value::dictionary(
        ROOT_DICT,
        vec![(Value::string("PermanentStats"), Value::Node(envelope))],
    );
    serialize(&b.finish(root, Dialect::Permissive), Dialect::Permissive, None)
}

/// Save file with gold and, unless `fresh`, a per-class cruciball table
/// holding Peglin at level 3.
pub fn save_bytes(fresh: bool) -> Vec<u8> {
    let mut b = GraphBuilder::new();
    let item = b.schema_with_flags("Item", &[("value", "System.Object", MEMBER_OPT_IN)]);
    let gold = b.record(item, vec![("value", Value::Int32(100))]);
    let mut entries = vec![(Value::string("Gold"), Value::Node(gold))];
    if !fresh {
        let levels = Value::dictionary(
            CLASS_LEVELS_DICT,
            vec![(Value::enumeration(CLASS_ENUM, 0), Value::Int32(3))],
        );
        let node = b.record(item, vec![("value", levels)]);
        entries.push((Value::string("classCruciballLevels"), Value::Node(node)));
    }
    serialize(
        &b.finish(Value::dictionary(ROOT_DICT, entries), Dialect::Permissive),
        Dialect::Permissive,
        None,
    )
}

pub fn nth_occurrence(bytes: &[u8], needle: &[u8], n: usize) -> Option<usize> {
    bytes
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(pos, _)| pos)
        .nth(n)
}

pub fn first_record(graph: &Graph) -> Option<NodeId> {
    graph.root().node_id()
}
