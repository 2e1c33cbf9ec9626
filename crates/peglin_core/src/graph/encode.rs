use std::collections::{HashMap, HashSet};

use crate::type_library::TypeResolver;

use super::format::*;
use super::{Dialect, Graph, NodeId, SchemaId, Value};

/// Serialize `graph` under `dialect`.
///
/// Records keep their stream ids; each schema and type name is written
/// inline on first use and by id afterwards; a record reached a second time
/// is written as a reference. A stream decoded with the same dialect
/// therefore re-encodes to identical bytes as long as it was written in this
/// canonical order.
pub fn serialize(graph: &Graph, dialect: Dialect, resolver: Option<&TypeResolver>) -> Vec<u8> {
    let mut encoder = Encoder {
        graph,
        dialect,
        resolver,
        out: Vec::new(),
        type_ids: HashMap::new(),
        emitted_schemas: HashSet::new(),
        emitted_nodes: HashSet::new(),
    };
    encoder.value(graph.root());
    encoder.out.push(TAG_END_OF_STREAM);
    encoder.out
}

struct Encoder<'g, 'r> {
    graph: &'g Graph,
    dialect: Dialect,
    resolver: Option<&'r TypeResolver>,
    out: Vec<u8>,
    type_ids: HashMap<&'g str, u32>,
    emitted_schemas: HashSet<SchemaId>,
    emitted_nodes: HashSet<NodeId>,
}

impl<'g> Encoder<'g, '_> {
    fn value(&mut self, value: &'g Value) {
        match value {
            Value::Null => self.out.push(TAG_NULL),
            Value::Bool(v) => {
                self.out.push(TAG_BOOL);
                self.out.push(u8::from(*v));
            }
            Value::Int32(v) => {
                self.out.push(TAG_INT32);
                self.out.extend_from_slice(&v.to_le_bytes());
            }
            Value::Int64(v) => {
                self.out.push(TAG_INT64);
                self.out.extend_from_slice(&v.to_le_bytes());
            }
            Value::Float32(v) => {
                self.out.push(TAG_FLOAT32);
                self.out.extend_from_slice(&v.to_le_bytes());
            }
            Value::Float64(v) => {
                self.out.push(TAG_FLOAT64);
                self.out.extend_from_slice(&v.to_le_bytes());
            }
            Value::String(s) => {
                self.out.push(TAG_STRING);
                self.string(s);
            }
            Value::Enum { type_name, raw } => {
                self.out.push(TAG_ENUM);
                self.type_ref(type_name);
                self.out.extend_from_slice(&raw.to_le_bytes());
            }
            Value::Array {
                element_type,
                items,
            } => {
                self.out.push(TAG_ARRAY);
                self.type_ref(element_type);
                self.u32(items.len());
                for item in items {
                    self.value(item);
                }
            }
            Value::Dictionary { type_name, entries } => {
                self.out.push(TAG_DICTIONARY);
                self.type_ref(type_name);
                self.u32(entries.len());
                for (key, value) in entries {
                    self.value(key);
                    self.value(value);
                }
            }
            Value::Node(id) => self.record(*id),
        }
    }

    fn record(&mut self, id: NodeId) {
        let graph = self.graph;
        let Some(node) = graph.node(id) else {
            tracing::debug!(node = id.index(), "dangling node id; writing null");
            self.out.push(TAG_NULL);
            return;
        };
        if !self.emitted_nodes.insert(id) {
            self.out.push(TAG_REFERENCE);
            self.out.extend_from_slice(&node.stream_id.to_le_bytes());
            return;
        }
        let Some(schema) = graph.schema(node.schema) else {
            self.out.push(TAG_NULL);
            return;
        };

        self.out.push(TAG_RECORD);
        self.out.extend_from_slice(&node.stream_id.to_le_bytes());
        if self.emitted_schemas.insert(node.schema) {
            self.out.push(REF_DEFINE);
            self.out.extend_from_slice(&schema.stream_id.to_le_bytes());
            self.string(&schema.type_name);
            self.out
                .extend_from_slice(&(schema.members.len() as u16).to_le_bytes());
            for member in &schema.members {
                self.string(&member.name);
                self.string(&member.declared_type);
                self.out.push(member.flags);
            }
        } else {
            self.out.push(REF_REUSE);
            self.out.extend_from_slice(&schema.stream_id.to_le_bytes());
        }

        let wire = self.dialect.serialized_members(schema, self.resolver);
        self.out.extend_from_slice(&(wire.len() as u16).to_le_bytes());
        for index in wire {
            let len_at = self.out.len();
            self.out.extend_from_slice(&[0u8; 4]);
            match node.fields.get(index) {
                Some(field) => self.value(field),
                None => self.out.push(TAG_NULL),
            }
            let len = (self.out.len() - len_at - 4) as u32;
            self.out[len_at..len_at + 4].copy_from_slice(&len.to_le_bytes());
        }
    }

    fn type_ref(&mut self, name: &'g str) {
        if let Some(&id) = self.type_ids.get(name) {
            self.out.push(REF_REUSE);
            self.out.extend_from_slice(&id.to_le_bytes());
            return;
        }
        let id = self.type_ids.len() as u32;
        self.type_ids.insert(name, id);
        self.out.push(REF_DEFINE);
        self.out.extend_from_slice(&id.to_le_bytes());
        self.string(name);
    }

    fn string(&mut self, s: &str) {
        self.u32(s.len());
        self.out.extend_from_slice(s.as_bytes());
    }

    fn u32(&mut self, n: usize) {
        self.out.extend_from_slice(&(n as u32).to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::serialize;
    use crate::graph::{Dialect, GraphBuilder, Value, decode_with};

    #[test]
    fn shared_record_is_written_once() {
        let mut b = GraphBuilder::new();
        let leaf = b.schema("Test.Leaf", &[("n", "System.Int32")]);
        let pair = b.schema("Test.Pair", &[("a", "Test.Leaf"), ("b", "Test.Leaf")]);
        let shared = b.record(leaf, vec![("n", Value::Int32(9))]);
        let root = b.record(
            pair,
            vec![("a", Value::Node(shared)), ("b", Value::Node(shared))],
        );
        let graph = b.finish(Value::Node(root), Dialect::Permissive);

        let bytes = serialize(&graph, Dialect::Permissive, None);
        let occurrences = bytes
            .windows("Test.Leaf".len())
            .filter(|w| *w == b"Test.Leaf")
            .count();
        // twice in the pair's member list, once as the leaf's schema name
        assert_eq!(occurrences, 3);
        // second use of the leaf is a back-reference to stream id 0
        assert_eq!(&bytes[bytes.len() - 6..], &[0x0B, 0, 0, 0, 0, 0x7F]);

        let decoded = decode_with(&bytes, Dialect::Permissive, None).expect("decode");
        let root_id = decoded.root().node_id().expect("root record");
        let fields = decoded.record_fields(root_id);
        assert_eq!(fields[0].1, fields[1].1);
    }

    #[test]
    fn reencoding_decoded_stream_is_byte_identical() {
        let mut b = GraphBuilder::new();
        let s = b.schema(
            "Test.Thing",
            &[("name", "System.String"), ("tags", "System.String[]")],
        );
        let n = b.record(
            s,
            vec![
                ("name", Value::string("x")),
                (
                    "tags",
                    Value::array("System.String", vec![Value::string("a"), Value::string("b")]),
                ),
            ],
        );
        let graph = b.finish(Value::Node(n), Dialect::Standard);
        let bytes = serialize(&graph, Dialect::Standard, None);
        let decoded = decode_with(&bytes, Dialect::Standard, None).expect("decode");
        assert_eq!(serialize(&decoded, Dialect::Standard, None), bytes);
    }
}
