//! In-memory object graph recovered from the binary save format.
//!
//! Composite records live in an arena owned by [`Graph`]; every other value
//! refers to a record through [`Value::Node`]. Shared and cyclic instances in
//! the stream therefore decode to a single arena slot, and walking the graph
//! never has to follow owning pointers in a loop.

mod builder;
pub mod decode;
pub mod dialect;
pub mod encode;
pub(crate) mod format;

pub use builder::GraphBuilder;
pub use decode::{DecodeAttempt, DecodeError, DecodeErrorKind, DecodeFailure, decode, decode_with};
pub use dialect::Dialect;
pub use encode::serialize;

/// Member flag: the field is explicitly opted in to serialization.
pub const MEMBER_OPT_IN: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub declared_type: String,
    pub flags: u8,
}

impl Member {
    pub fn is_opted_in(&self) -> bool {
        self.flags & MEMBER_OPT_IN != 0
    }
}

/// Field layout of a composite record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub stream_id: u32,
    pub type_name: String,
    pub members: Vec<Member>,
}

impl Schema {
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|m| m.name == name)
            .or_else(|| {
                self.members
                    .iter()
                    .position(|m| m.name.eq_ignore_ascii_case(name))
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordNode {
    pub stream_id: u32,
    pub schema: SchemaId,
    /// One value per schema member, in member order.
    pub fields: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Enum {
        type_name: String,
        raw: i32,
    },
    Array {
        element_type: String,
        items: Vec<Value>,
    },
    Dictionary {
        type_name: String,
        entries: Vec<(Value, Value)>,
    },
    Node(NodeId),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn enumeration(type_name: impl Into<String>, raw: i32) -> Self {
        Self::Enum {
            type_name: type_name.into(),
            raw,
        }
    }

    pub fn array(element_type: impl Into<String>, items: Vec<Value>) -> Self {
        Self::Array {
            element_type: element_type.into(),
            items,
        }
    }

    pub fn dictionary(type_name: impl Into<String>, entries: Vec<(Value, Value)>) -> Self {
        Self::Dictionary {
            type_name: type_name.into(),
            entries,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view of numeric values; enum values yield their raw number.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int32(v) => Some(i64::from(v)),
            Self::Int64(v) => Some(v),
            Self::Float32(v) => Some(v as i64),
            Self::Float64(v) => Some(v as i64),
            Self::Enum { raw, .. } => Some(i64::from(raw)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            Self::Int32(v) => Some(v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn node_id(&self) -> Option<NodeId> {
        match *self {
            Self::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::String(_) => "string",
            Self::Enum { .. } => "enum",
            Self::Array { .. } => "array",
            Self::Dictionary { .. } => "dictionary",
            Self::Node(_) => "record",
        }
    }

    /// True when `other` could replace `self` without changing the wire shape.
    pub fn same_shape(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Enum { type_name: a, .. }, Self::Enum { type_name: b, .. }) => a == b,
            (Self::Array { element_type: a, .. }, Self::Array { element_type: b, .. }) => a == b,
            (Self::Dictionary { type_name: a, .. }, Self::Dictionary { type_name: b, .. }) => {
                a == b
            }
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

/// A fully decoded stream: root value, record arena and schema table.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    pub(crate) root: Value,
    pub(crate) nodes: Vec<RecordNode>,
    pub(crate) schemas: Vec<Schema>,
    pub(crate) dialect: Dialect,
}

impl Graph {
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// The dialect that decoded this graph, or that it was built for.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn node(&self, id: NodeId) -> Option<&RecordNode> {
        self.nodes.get(id.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn schema(&self, id: SchemaId) -> Option<&Schema> {
        self.schemas.get(id.0)
    }

    pub fn schema_of(&self, node: &RecordNode) -> Option<&Schema> {
        self.schema(node.schema)
    }

    /// Type name carried by a value, if the format records one.
    pub fn type_name_of<'g>(&'g self, value: &'g Value) -> Option<&'g str> {
        match value {
            Value::Enum { type_name, .. } | Value::Dictionary { type_name, .. } => Some(type_name),
            Value::Array { element_type, .. } => Some(element_type),
            Value::Node(id) => self
                .node(*id)
                .and_then(|node| self.schema_of(node))
                .map(|schema| schema.type_name.as_str()),
            _ => None,
        }
    }

    /// Named fields of a record, in member order.
    pub fn record_fields(&self, id: NodeId) -> Vec<(&str, &Value)> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        let Some(schema) = self.schema_of(node) else {
            return Vec::new();
        };
        schema
            .members
            .iter()
            .zip(node.fields.iter())
            .map(|(member, value)| (member.name.as_str(), value))
            .collect()
    }

    pub(crate) fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    pub(crate) fn field_slot_mut(&mut self, id: NodeId, index: usize) -> Option<&mut Value> {
        self.nodes.get_mut(id.0)?.fields.get_mut(index)
    }
}

/// Simple name of a qualified type: the part after the last `.` or `+`,
/// ignoring generic arguments.
pub fn simple_type_name(name: &str) -> &str {
    let head = name.split('[').next().unwrap_or(name);
    head.rsplit(['.', '+']).next().unwrap_or(head)
}
