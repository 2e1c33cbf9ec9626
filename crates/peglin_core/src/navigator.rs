//! Read-only lookups over a decoded [`Graph`].
//!
//! Saves wrap most top-level values in a single-field `value` envelope and
//! have moved sections between a flat root dictionary and nested
//! player-data records over time. The helpers here hide both.

use std::collections::HashSet;

use crate::graph::{Graph, NodeId, Value};

/// Depth cap for dumps and aggregate searches.
pub const MAX_DUMP_DEPTH: usize = 4;

const ENVELOPE_FIELD: &str = "value";
const MAX_ENVELOPE_LAYERS: usize = 8;
const PLAYER_DATA_PARENTS: [&str; 2] = ["PersistentPlayerData", "PlayerPersistentData"];
const PERMANENT_STATS: &str = "PermanentStats";

/// Strip item envelopes: records with exactly one field named `value`.
pub fn unwrap_envelope<'g>(graph: &'g Graph, value: &'g Value) -> &'g Value {
    let mut current = value;
    for _ in 0..MAX_ENVELOPE_LAYERS {
        let Some(id) = current.node_id() else {
            return current;
        };
        match graph.record_fields(id).as_slice() {
            [(name, inner)] if name.eq_ignore_ascii_case(ENVELOPE_FIELD) => current = inner,
            _ => return current,
        }
    }
    current
}

/// Named child of a record or string-keyed dictionary, envelopes unwrapped
/// on both sides. Names match exactly first, then case-insensitively.
pub fn field<'g>(graph: &'g Graph, value: &'g Value, name: &str) -> Option<&'g Value> {
    let container = unwrap_envelope(graph, value);
    let found = match container {
        Value::Node(id) => {
            let node = graph.node(*id)?;
            let index = graph.schema_of(node)?.member_index(name)?;
            node.fields.get(index)
        }
        Value::Dictionary { entries, .. } => entries
            .iter()
            .find(|(key, _)| key.as_str() == Some(name))
            .or_else(|| {
                entries.iter().find(|(key, _)| {
                    key.as_str()
                        .is_some_and(|key| key.eq_ignore_ascii_case(name))
                })
            })
            .map(|(_, value)| value),
        _ => None,
    }?;
    Some(unwrap_envelope(graph, found))
}

/// First of `names` that is present and not null.
pub fn field_any<'g>(graph: &'g Graph, value: &'g Value, names: &[&str]) -> Option<&'g Value> {
    names
        .iter()
        .find_map(|name| field(graph, value, name).filter(|v| !v.is_null()))
}

pub fn as_i64(graph: &Graph, value: &Value) -> Option<i64> {
    unwrap_envelope(graph, value).as_i64()
}

pub fn as_bool(graph: &Graph, value: &Value) -> Option<bool> {
    unwrap_envelope(graph, value).as_bool()
}

pub fn as_str<'g>(graph: &'g Graph, value: &'g Value) -> Option<&'g str> {
    unwrap_envelope(graph, value).as_str()
}

/// Array elements, or an empty slice for anything else.
pub fn items<'g>(graph: &'g Graph, value: &'g Value) -> &'g [Value] {
    match unwrap_envelope(graph, value) {
        Value::Array { items, .. } => items.as_slice(),
        _ => &[],
    }
}

/// Dictionary entries, or an empty slice for anything else.
pub fn entries<'g>(graph: &'g Graph, value: &'g Value) -> &'g [(Value, Value)] {
    match unwrap_envelope(graph, value) {
        Value::Dictionary { entries, .. } => entries.as_slice(),
        _ => &[],
    }
}

pub fn type_name<'g>(graph: &'g Graph, value: &'g Value) -> Option<&'g str> {
    graph.type_name_of(unwrap_envelope(graph, value))
}

/// Printable form of a dictionary key.
pub fn key_label(graph: &Graph, key: &Value) -> String {
    let key = unwrap_envelope(graph, key);
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        other => match other.as_i64() {
            Some(n) => n.to_string(),
            None => format!("<{}>", other.kind_label()),
        },
    }
}

/// Keys of the root container, in stream order.
pub fn section_names(graph: &Graph) -> Vec<String> {
    let root = unwrap_envelope(graph, graph.root());
    match root {
        Value::Dictionary { entries, .. } => {
            entries.iter().map(|(key, _)| key_label(graph, key)).collect()
        }
        Value::Node(id) => graph
            .record_fields(*id)
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Find a named top-level section, including its historical nested homes.
pub fn get_section<'g>(graph: &'g Graph, name: &str) -> Option<&'g Value> {
    let path = section_path(graph, name)?;
    let mut current = graph.root();
    for part in &path {
        current = field(graph, current, part)?;
    }
    Some(current)
}

/// Key path from the root to a section, as it exists in this graph.
pub fn section_path(graph: &Graph, name: &str) -> Option<Vec<String>> {
    let root = graph.root();
    if present(graph, root, name) {
        return Some(vec![name.to_string()]);
    }

    for parent in PLAYER_DATA_PARENTS {
        let Some(player_data) = field(graph, root, parent) else {
            continue;
        };
        if present(graph, player_data, name) {
            return Some(vec![parent.to_string(), name.to_string()]);
        }
        if let Some(stats) = field(graph, player_data, PERMANENT_STATS)
            && present(graph, stats, name)
        {
            return Some(vec![
                parent.to_string(),
                PERMANENT_STATS.to_string(),
                name.to_string(),
            ]);
        }
    }

    if let Some(stats) = field(graph, root, PERMANENT_STATS)
        && present(graph, stats, name)
    {
        return Some(vec![PERMANENT_STATS.to_string(), name.to_string()]);
    }
    None
}

fn present(graph: &Graph, container: &Value, name: &str) -> bool {
    field(graph, container, name).is_some_and(|v| !v.is_null())
}

/// One step of a [`walk`].
#[derive(Debug)]
pub struct Visit<'g> {
    pub depth: usize,
    /// Dotted path from the walk's start, e.g. `runs[0].orbStats.bomb`.
    pub path: String,
    /// Field name, dictionary key label or array index of this value.
    pub key: Option<String>,
    pub value: &'g Value,
    /// The record was already visited through another path; its children
    /// are not walked again.
    pub repeated: bool,
}

/// Depth-first walk from `start`, visiting at most `max_depth` levels below
/// it. Each record is expanded once, so cycles terminate.
pub fn walk<'g, F>(graph: &'g Graph, start: &'g Value, max_depth: usize, mut visitor: F)
where
    F: FnMut(&Visit<'g>),
{
    let mut seen = HashSet::new();
    walk_inner(
        graph,
        start,
        None,
        String::new(),
        0,
        max_depth,
        &mut seen,
        &mut visitor,
    );
}

#[allow(clippy::too_many_arguments)]
fn walk_inner<'g, F>(
    graph: &'g Graph,
    value: &'g Value,
    key: Option<String>,
    path: String,
    depth: usize,
    max_depth: usize,
    seen: &mut HashSet<NodeId>,
    visitor: &mut F,
) where
    F: FnMut(&Visit<'g>),
{
    let value = unwrap_envelope(graph, value);
    let repeated = value.node_id().is_some_and(|id| !seen.insert(id));
    visitor(&Visit {
        depth,
        path: path.clone(),
        key,
        value,
        repeated,
    });
    if repeated || depth >= max_depth {
        return;
    }

    match value {
        Value::Node(id) => {
            for (name, child) in graph.record_fields(*id) {
                walk_inner(
                    graph,
                    child,
                    Some(name.to_string()),
                    join_field(&path, name),
                    depth + 1,
                    max_depth,
                    seen,
                    visitor,
                );
            }
        }
        Value::Dictionary { entries, .. } => {
            for (entry_key, child) in entries {
                let label = key_label(graph, entry_key);
                walk_inner(
                    graph,
                    child,
                    Some(label.clone()),
                    join_field(&path, &label),
                    depth + 1,
                    max_depth,
                    seen,
                    visitor,
                );
            }
        }
        Value::Array { items, .. } => {
            for (index, child) in items.iter().enumerate() {
                walk_inner(
                    graph,
                    child,
                    Some(index.to_string()),
                    format!("{path}[{index}]"),
                    depth + 1,
                    max_depth,
                    seen,
                    visitor,
                );
            }
        }
        _ => {}
    }
}

fn join_field(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

/// Integer stored under the first of `keys` (in priority order) that occurs
/// within `max_depth` levels of the root. Per key, the first match in walk
/// order wins.
pub fn find_counter(graph: &Graph, keys: &[&str], max_depth: usize) -> Option<i64> {
    keys.iter()
        .find_map(|key| find_counter_key(graph, key, max_depth))
}

fn find_counter_key(graph: &Graph, key: &str, max_depth: usize) -> Option<i64> {
    let mut found = None;
    walk(graph, graph.root(), max_depth, |visit| {
        if found.is_some() {
            return;
        }
        if visit
            .key
            .as_deref()
            .is_some_and(|k| k.eq_ignore_ascii_case(key))
            && let Some(n) = visit.value.as_i64()
        {
            found = Some(n);
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::{field, find_counter, get_section, section_names, section_path, walk};
    use crate::graph::{Dialect, GraphBuilder, Value};

    const STRING: &str = "System.String";
    const DICT: &str = "System.Collections.Generic.Dictionary`2[System.String,System.Object]";

    #[test]
    fn envelopes_are_transparent() {
        let mut b = GraphBuilder::new();
        let item = b.schema("Item", &[("value", "System.Object")]);
        let wrapped = b.record(item, vec![("value", Value::Int32(5))]);
        let root = Value::dictionary(
            DICT,
            vec![(Value::string("Gold"), Value::Node(wrapped))],
        );
        let graph = b.finish(root, Dialect::Permissive);

        let gold = get_section(&graph, "gold").expect("case-insensitive section");
        assert_eq!(gold, &Value::Int32(5));
        assert_eq!(section_names(&graph), vec!["Gold".to_string()]);
    }

    #[test]
    fn sections_are_found_under_nested_player_data() {
        let mut b = GraphBuilder::new();
        let stats = b.schema("PermanentStats", &[("RunStatsHistory", STRING)]);
        let player = b.schema("PlayerData", &[("PermanentStats", "PermanentStats")]);
        let stats_node = b.record(stats, vec![("RunStatsHistory", Value::string("here"))]);
        let player_node = b.record(player, vec![("PermanentStats", Value::Node(stats_node))]);
        let root = Value::dictionary(
            DICT,
            vec![(Value::string("PersistentPlayerData"), Value::Node(player_node))],
        );
        let graph = b.finish(root, Dialect::Permissive);

        assert_eq!(
            section_path(&graph, "RunStatsHistory"),
            Some(vec![
                "PersistentPlayerData".to_string(),
                "PermanentStats".to_string(),
                "RunStatsHistory".to_string(),
            ])
        );
        assert_eq!(
            get_section(&graph, "RunStatsHistory").and_then(Value::as_str),
            Some("here")
        );
        assert!(get_section(&graph, "Missing").is_none());
    }

    #[test]
    fn walk_terminates_on_cycles_and_respects_depth() {
        let mut b = GraphBuilder::new();
        let link = b.schema("Link", &[("next", "Link"), ("n", "System.Int32")]);
        let a = b.record(link, vec![("n", Value::Int32(1))]);
        let c = b.record(link, vec![("next", Value::Node(a)), ("n", Value::Int32(2))]);
        b.set_field(a, "next", Value::Node(c));
        let graph = b.finish(Value::Node(a), Dialect::Permissive);

        let mut paths = Vec::new();
        let mut repeats = 0;
        walk(&graph, graph.root(), 10, |visit| {
            paths.push(visit.path.clone());
            repeats += usize::from(visit.repeated);
        });
        assert_eq!(repeats, 1);
        assert!(paths.contains(&"next.next".to_string()));
        assert!(!paths.iter().any(|p| p.starts_with("next.next.")));

        let mut deepest = 0;
        walk(&graph, graph.root(), 1, |visit| deepest = deepest.max(visit.depth));
        assert_eq!(deepest, 1);

        let next = field(&graph, graph.root(), "next").expect("next field");
        assert_eq!(next, &Value::Node(c));
    }

    #[test]
    fn find_counter_follows_key_priority() {
        let mut b = GraphBuilder::new();
        let s = b.schema("Totals", &[("totalRuns", "System.Int32"), ("runCount", "System.Int32")]);
        let totals = b.record(
            s,
            vec![("totalRuns", Value::Int32(4)), ("runCount", Value::Int32(9))],
        );
        let root = Value::dictionary(DICT, vec![(Value::string("Totals"), Value::Node(totals))]);
        let graph = b.finish(root, Dialect::Permissive);

        assert_eq!(find_counter(&graph, &["runCount", "totalRuns"], 4), Some(9));
        assert_eq!(find_counter(&graph, &["totalRuns", "runCount"], 4), Some(4));
        assert_eq!(find_counter(&graph, &["totalRuns"], 0), None);
    }

    #[test]
    fn find_counter_prefers_totals_over_earlier_per_class_counts() {
        let mut b = GraphBuilder::new();
        let class_stats = b.schema("ClassStats", &[("wins", "System.Int32")]);
        let totals = b.schema("Totals", &[("totalWins", "System.Int32")]);
        let per_class = b.record(class_stats, vec![("wins", Value::Int32(2))]);
        let overall = b.record(totals, vec![("totalWins", Value::Int32(7))]);
        let root = Value::dictionary(
            DICT,
            vec![
                (Value::string("ClassStats"), Value::Node(per_class)),
                (Value::string("Totals"), Value::Node(overall)),
            ],
        );
        let graph = b.finish(root, Dialect::Permissive);

        assert_eq!(
            find_counter(&graph, &["totalWins", "wins", "runsWon"], 4),
            Some(7)
        );
    }
}
