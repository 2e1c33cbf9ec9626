//! JSON export and import of run lists.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::core_api::{CoreError, CoreErrorCode, RunRecord};
use crate::graph::{Graph, NodeId, Value};
use crate::navigator::{key_label, unwrap_envelope};
use crate::runs::history_entries;

/// Export document: the normalized runs plus the untouched graph view of
/// each history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEnvelope {
    pub exported: String,
    pub runs: Vec<RunRecord>,
    #[serde(default)]
    pub raw: Vec<JsonValue>,
}

pub fn export_runs(graph: &Graph, runs: &[RunRecord], exported: &str) -> ExportEnvelope {
    let raw = history_entries(graph)
        .map(|(_, entries)| entries.iter().map(|e| value_to_json(graph, e)).collect())
        .unwrap_or_default();
    ExportEnvelope {
        exported: exported.to_string(),
        runs: runs.to_vec(),
        raw,
    }
}

pub fn export_to_string(envelope: &ExportEnvelope) -> Result<String, CoreError> {
    serde_json::to_string_pretty(envelope).map_err(|e| {
        CoreError::new(
            CoreErrorCode::Validation,
            format!("failed to serialize export: {e}"),
        )
    })
}

/// Parse an export envelope or a bare array of runs.
pub fn import_runs(json: &str) -> Result<Vec<RunRecord>, CoreError> {
    let document: JsonValue = serde_json::from_str(json).map_err(|e| {
        CoreError::new(CoreErrorCode::Parse, format!("invalid JSON: {e}"))
    })?;

    let runs = match document {
        JsonValue::Array(_) => document,
        JsonValue::Object(mut object) => object.remove("runs").ok_or_else(|| {
            CoreError::new(
                CoreErrorCode::MissingSection,
                "import document has no \"runs\" field",
            )
        })?,
        other => {
            return Err(CoreError::new(
                CoreErrorCode::Parse,
                format!("expected an export object or a run array, found {other}"),
            ));
        }
    };

    serde_json::from_value(runs).map_err(|e| {
        CoreError::new(CoreErrorCode::Parse, format!("invalid run list: {e}"))
    })
}

/// Generic JSON view of a graph value. Records become objects with a
/// `$type` key; a record met again is written as `{"$ref": stream id}`.
pub fn value_to_json(graph: &Graph, value: &Value) -> JsonValue {
    let mut seen = HashSet::new();
    to_json(graph, value, &mut seen)
}

fn to_json(graph: &Graph, value: &Value, seen: &mut HashSet<NodeId>) -> JsonValue {
    match unwrap_envelope(graph, value) {
        Value::Null => JsonValue::Null,
        Value::Bool(v) => JsonValue::Bool(*v),
        Value::Int32(v) => JsonValue::from(*v),
        Value::Int64(v) => JsonValue::from(*v),
        Value::Float32(v) => JsonValue::from(f64::from(*v)),
        Value::Float64(v) => JsonValue::from(*v),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Enum { type_name, raw } => {
            let mut out = Map::new();
            out.insert("$enum".to_string(), JsonValue::String(type_name.clone()));
            out.insert("raw".to_string(), JsonValue::from(*raw));
            JsonValue::Object(out)
        }
        Value::Array { items, .. } => {
            JsonValue::Array(items.iter().map(|item| to_json(graph, item, seen)).collect())
        }
        Value::Dictionary { entries, .. } => {
            let mut out = Map::new();
            for (key, child) in entries {
                out.insert(key_label(graph, key), to_json(graph, child, seen));
            }
            JsonValue::Object(out)
        }
        Value::Node(id) => {
            let Some(node) = graph.node(*id) else {
                return JsonValue::Null;
            };
            let mut out = Map::new();
            if !seen.insert(*id) {
                out.insert("$ref".to_string(), JsonValue::from(node.stream_id));
                return JsonValue::Object(out);
            }
            if let Some(schema) = graph.schema_of(node) {
                out.insert(
                    "$type".to_string(),
                    JsonValue::String(schema.type_name.clone()),
                );
            }
            for (name, child) in graph.record_fields(*id) {
                out.insert(name.to_string(), to_json(graph, child, seen));
            }
            JsonValue::Object(out)
        }
    }
}
