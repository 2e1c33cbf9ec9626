mod common;

use peglin_core::graph::{
    Dialect, DecodeErrorKind, GraphBuilder, Value, decode, decode_with, serialize,
};
use peglin_core::runs::extract_run_history;

use common::{nth_occurrence, resolver, run_a, run_b, stats_graph, two_run_stats_bytes};

#[test]
fn stream_written_without_dictionaries_falls_back_to_standard() {
    let graph = stats_graph(&[run_a(), run_b()], false);
    let bytes = serialize(&graph, Dialect::Standard, None);

    let err = decode_with(&bytes, Dialect::Permissive, None).expect_err("permissive must fail");
    assert!(matches!(
        err.kind,
        DecodeErrorKind::FieldCountMismatch { ref type_name, expected: 10, found: 8 }
            if type_name == "Stats.RunStats"
    ));

    let decoded = decode(&bytes, None, None).expect("fallback decode");
    assert_eq!(decoded.dialect(), Dialect::Standard);

    let runs = extract_run_history(&decoded, None);
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].damage_dealt, 15_000);
    assert!(runs[0].orbs.is_empty());
}

#[test]
fn hint_is_tried_first_but_never_forces_a_failed_parse() {
    let bytes = serialize(&stats_graph(&[run_a()], false), Dialect::Standard, None);
    let decoded = decode(&bytes, Some(Dialect::Permissive), None).expect("decode");
    assert_eq!(decoded.dialect(), Dialect::Standard);

    let decoded = decode(&bytes, Some(Dialect::Standard), None).expect("decode");
    assert_eq!(decoded.dialect(), Dialect::Standard);
}

#[test]
fn exhausted_dialects_report_every_attempt() {
    let mut bytes = two_run_stats_bytes();
    bytes.pop();

    let failure = decode(&bytes, None, None).expect_err("truncated stream");
    assert_eq!(failure.attempts.len(), 3);
    let tried: Vec<Dialect> = failure.attempts.iter().map(|a| a.dialect).collect();
    assert_eq!(tried, Dialect::PREFERENCE_ORDER.to_vec());
    assert_eq!(
        failure.attempts[0].error.kind,
        DecodeErrorKind::MissingTerminator
    );
    assert!(failure.furthest_offset().is_some());
}

#[test]
fn self_reference_decodes_to_the_same_node() {
    let mut b = GraphBuilder::new();
    let schema = b.schema(
        "Test.Node",
        &[("self", "Test.Node"), ("label", "System.String")],
    );
    let node = b.record(schema, vec![("label", Value::string("loop"))]);
    assert!(b.set_field(node, "self", Value::Node(node)));
    let graph = b.finish(Value::Node(node), Dialect::Permissive);

    let bytes = serialize(&graph, Dialect::Permissive, None);
    let decoded = decode(&bytes, None, None).expect("cyclic stream decodes");
    assert_eq!(decoded.node_count(), 1);

    let root = decoded.root().node_id().expect("record root");
    let fields = decoded.record_fields(root);
    assert_eq!(fields[0], ("self", &Value::Node(root)));
    assert_eq!(fields[1], ("label", &Value::string("loop")));
}

#[test]
fn shared_instances_keep_one_identity() {
    let mut b = GraphBuilder::new();
    let leaf = b.schema("Test.Leaf", &[("n", "System.Int32")]);
    let list = b.schema("Test.Holder", &[("items", "Test.Leaf[]")]);
    let shared = b.record(leaf, vec![("n", Value::Int32(1))]);
    let holder = b.record(
        list,
        vec![(
            "items",
            Value::array("Test.Leaf", vec![Value::Node(shared), Value::Node(shared)]),
        )],
    );
    let graph = b.finish(Value::Node(holder), Dialect::Permissive);

    let decoded = decode(&serialize(&graph, Dialect::Permissive, None), None, None)
        .expect("decode");
    assert_eq!(decoded.node_count(), 2);
    let root = decoded.root().node_id().expect("record root");
    let fields = decoded.record_fields(root);
    let Value::Array { items, .. } = fields[0].1 else {
        panic!("expected an array, found {:?}", fields[0].1);
    };
    assert_eq!(items[0], items[1]);
}

#[test]
fn corrupted_nested_record_only_nulls_that_field() {
    let mut bytes = two_run_stats_bytes();

    // The timer type name appears first in the run schema's member list,
    // then in the first timer record's own schema definition.
    let name_at = nth_occurrence(&bytes, b"Stats.RunTimer", 1).expect("timer schema");
    let tag_at = name_at - 14;
    assert_eq!(bytes[tag_at], 0x0A, "fixture layout changed");
    bytes[tag_at] = 0xEE;

    let resolver = resolver();
    let graph = decode(&bytes, None, Some(resolver.as_ref())).expect("corruption is contained");
    assert_eq!(graph.dialect(), Dialect::Permissive);

    let runs = extract_run_history(&graph, Some(resolver.as_ref()));
    assert_eq!(runs.len(), 2);
    let run = &runs[0];
    assert_eq!(run.duration_ms, None);
    assert_eq!(run.id, "3f1c2a9e-0001");
    assert!(run.won);
    assert_eq!(run.class, "Peglin");
    assert_eq!(run.cruciball_level, 4);
    assert_eq!(run.damage_dealt, 15_000);
    assert_eq!(run.pegs_hit, 812);
    assert_eq!(run.rooms, vec!["Battle", "Battle", "Boss"]);
    assert_eq!(run.orbs.len(), 2);
    assert_eq!(run.status_effects.get("Strength"), Some(&3));

    assert_eq!(runs[1].damage_dealt, 500);
}

#[test]
fn reserialized_stream_extracts_identically() {
    let resolver = resolver();
    let bytes = two_run_stats_bytes();
    let first = decode(&bytes, None, Some(resolver.as_ref())).expect("decode");
    let before = extract_run_history(&first, Some(resolver.as_ref()));

    let reencoded = serialize(&first, first.dialect(), Some(resolver.as_ref()));
    assert_eq!(reencoded, bytes);

    let second = decode_with(&reencoded, first.dialect(), Some(resolver.as_ref())).expect("re-decode");
    let after = extract_run_history(&second, Some(resolver.as_ref()));
    assert_eq!(before, after);
}

#[test]
fn decoding_is_independent_per_call() {
    let bytes = two_run_stats_bytes();
    let a = decode(&bytes, None, None).expect("first decode");
    let b = decode(&bytes, None, None).expect("second decode");
    assert_eq!(a, b);
}
