use peglin_core::core_api::{Engine, RunRecord, Session};
use peglin_core::graph::{Dialect, GraphBuilder, MEMBER_OPT_IN, Value, serialize};
use peglin_render::{
    JsonStyle, Outcome, RunFilter, TextRenderOptions, render_graph_dump, render_json_run,
    render_json_runs, render_json_summary, render_text_run, render_text_runs, render_text_summary,
};

const ROOT_DICT: &str = "System.Collections.Generic.Dictionary`2[System.String,Item]";
const ORB_DICT: &str = "System.Collections.Generic.Dictionary`2[System.String,Stats.OrbPlayData]";

struct Fixture {
    guid: &'static str,
    won: bool,
    class: &'static str,
    cruciball: i32,
    damage: i64,
    timer_ms: i64,
    stone_damage: i32,
}

const FIXTURES: [Fixture; 2] = [
    Fixture {
        guid: "r-0001",
        won: true,
        class: "Peglin",
        cruciball: 4,
        damage: 15_000,
        timer_ms: 1_234_000,
        stone_damage: 9_000,
    },
    Fixture {
        guid: "r-0002",
        won: false,
        class: "Balladin",
        cruciball: 0,
        damage: 500,
        timer_ms: 61_000,
        stone_damage: 500,
    },
];

fn stats_bytes() -> Vec<u8> {
    let mut b = GraphBuilder::new();
    let item = b.schema_with_flags("Item", &[("value", "System.Object", MEMBER_OPT_IN)]);
    let history = b.schema("Stats.RunStatsHistory", &[("runs", "Stats.RunStats[]")]);
    let orb = b.schema(
        "Stats.OrbPlayData",
        &[
            ("name", "System.String"),
            ("damageDealt", "System.Int32"),
            ("timesFired", "System.Int32"),
        ],
    );
    let run = b.schema(
        "Stats.RunStats",
        &[
            ("guid", "System.String"),
            ("isWin", "System.Boolean"),
            ("selectedClass", "System.String"),
            ("cruciballLevel", "System.Int32"),
            ("damageDealt", "System.Int64"),
            ("runTimerElapsedMilliseconds", "System.Int64"),
            ("orbStats", ORB_DICT),
        ],
    );

    let mut runs = Vec::new();
    for f in &FIXTURES {
        let stone = b.record(
            orb,
            vec![
                ("name", Value::string("StoneOrb")),
                ("damageDealt", Value::Int32(f.stone_damage)),
                ("timesFired", Value::Int32(f.stone_damage / 100)),
            ],
        );
        let node = b.record(
            run,
            vec![
                ("guid", Value::string(f.guid)),
                ("isWin", Value::Bool(f.won)),
                ("selectedClass", Value::string(f.class)),
                ("cruciballLevel", Value::Int32(f.cruciball)),
                ("damageDealt", Value::Int64(f.damage)),
                ("runTimerElapsedMilliseconds", Value::Int64(f.timer_ms)),
                (
                    "orbStats",
                    Value::dictionary(
                        ORB_DICT,
                        vec![(Value::string("StoneOrb"), Value::Node(stone))],
                    ),
                ),
            ],
        );
        runs.push(Value::Node(node));
    }
    let history_node = b.record(
        history,
        vec![("runs", Value::array("Stats.RunStats", runs))],
    );
    let envelope = b.record(item, vec![("value", Value::Node(history_node))]);
    let root = Value::dictionary(
        ROOT_DICT,
        vec![(Value::string("RunStatsHistory"), Value::Node(envelope))],
    );
    serialize(
        &b.finish(root, Dialect::Permissive),
        Dialect::Permissive,
        None,
    )
}

fn session() -> Session {
    Engine::new()
        .open_bytes(stats_bytes(), None)
        .expect("fixture should parse")
}

#[test]
fn summary_json_uses_canonical_key_order() {
    let value = render_json_summary(&session(), JsonStyle::CanonicalV1);
    let keys: Vec<&str> = value
        .as_object()
        .expect("json should be an object")
        .keys()
        .map(String::as_str)
        .collect();

    assert_eq!(
        keys,
        vec![
            "total_runs",
            "wins",
            "losses",
            "win_rate",
            "reconstructed_runs",
            "highest_cruciball_won",
            "total_damage",
            "total_play_time_ms",
            "classes",
            "top_orbs",
            "issues",
        ]
    );
    assert_eq!(value["wins"], 1);
    assert_eq!(value["total_damage"], 15_500);
    assert_eq!(value["top_orbs"][0]["damage_dealt"], 9_500);
    assert!(
        value["issues"]
            .as_array()
            .expect("issues array")
            .contains(&serde_json::json!("missing_type_library"))
    );
}

#[test]
fn summary_text_reports_totals() {
    let text = render_text_summary(&session(), TextRenderOptions::default());
    assert!(text.starts_with("PEGLIN RUN STATISTICS\n"));
    assert!(text.contains("Win rate: 50.0%"), "{text}");
    assert!(text.contains("Highest cruciball won: 4"), "{text}");
    assert!(text.contains("Total damage: 15,500"), "{text}");
    assert!(text.contains("Play time: 21m 35s"), "{text}");
    assert!(text.contains("Note: Type library not loaded"), "{text}");
    assert!(!text.contains("Stream dialect"), "{text}");

    let verbose = render_text_summary(&session(), TextRenderOptions { verbose: true });
    assert!(verbose.contains("Stream dialect: permissive"), "{verbose}");
}

#[test]
fn run_list_filters_and_keeps_stored_indices() {
    let session = session();
    let losses = RunFilter {
        outcome: Some(Outcome::Losses),
        ..RunFilter::default()
    };
    let rows = losses.apply(session.runs());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, 1);

    let text = render_text_runs(&rows, TextRenderOptions::default());
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2, "{text}");
    assert_eq!(
        lines[1].split_whitespace().collect::<Vec<_>>(),
        vec!["1", "LOSS", "Balladin", "500", "1m", "01s"]
    );

    let by_class = RunFilter {
        class: Some("peglin".to_string()),
        limit: Some(5),
        ..RunFilter::default()
    };
    let json = render_json_runs(&by_class.apply(session.runs()), JsonStyle::CanonicalV1);
    let rows = json.as_array().expect("array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["index"], 0);
    assert_eq!(rows[0]["cruciball_level"], 4);
}

#[test]
fn reconstructed_runs_are_marked() {
    let runs = vec![
        RunRecord {
            id: "reconstructed-0".to_string(),
            won: true,
            class: "Unknown".to_string(),
            reconstructed: true,
            ..RunRecord::default()
        };
        2
    ];
    let rows: Vec<(usize, &RunRecord)> = runs.iter().enumerate().collect();
    let text = render_text_runs(&rows, TextRenderOptions::default());
    assert!(text.contains("0*"), "{text}");
    assert!(text.contains("rebuilt from lifetime totals"), "{text}");

    let empty = render_text_runs(&[], TextRenderOptions::default());
    assert_eq!(empty, "No runs recorded.\n");
}

#[test]
fn run_detail_hides_zero_cruciball() {
    let session = session();
    let won = render_text_run(0, &session.runs()[0], TextRenderOptions::default());
    assert!(won.starts_with("Run 0 (r-0001)\n"), "{won}");
    assert!(won.contains("  Cruciball: 4\n"), "{won}");
    assert!(won.contains("  Duration: 20m 34s\n"), "{won}");
    assert!(won.contains("StoneOrb"), "{won}");
    assert!(!won.contains("Pegs hit"), "{won}");

    let lost = render_text_run(1, &session.runs()[1], TextRenderOptions { verbose: true });
    assert!(!lost.contains("Cruciball:"), "{lost}");
    assert!(lost.contains("  Pegs hit: 0\n"), "{lost}");

    let json = render_json_run(1, &session.runs()[1], JsonStyle::CanonicalV1);
    let keys: Vec<&str> = json
        .as_object()
        .expect("object")
        .keys()
        .map(String::as_str)
        .take(2)
        .collect();
    assert_eq!(keys, vec!["index", "id"]);
    assert_eq!(json["class"], "Balladin");
}

#[test]
fn graph_dump_stops_at_requested_depth() {
    let session = session();
    let graph = session.graph();

    let shallow = render_graph_dump(graph, None, "<root>", graph.root(), 2);
    let lines: Vec<&str> = shallow.lines().collect();
    assert_eq!(
        lines,
        vec![
            "<root>: {1 entries}",
            "  RunStatsHistory: <Stats.RunStatsHistory>",
            "    runs: RunStats[2]",
        ]
    );

    let deep = render_graph_dump(graph, None, "<root>", graph.root(), 99);
    assert!(deep.contains("        damageDealt: 15000"), "{deep}");
    assert!(
        deep.lines().all(|line| !line.starts_with("          ")),
        "dump must stop at four levels: {deep}"
    );
}
