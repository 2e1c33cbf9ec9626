use std::collections::HashMap;

use thiserror::Error;

use crate::reader::ByteReader;
use crate::type_library::TypeResolver;

use super::format::*;
use super::{Dialect, Graph, Member, NodeId, RecordNode, Schema, SchemaId, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    #[error("stream is empty")]
    Empty,
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("unknown value tag 0x{0:02X}")]
    BadTag(u8),
    #[error("invalid boolean byte 0x{0:02X}")]
    BadBool(u8),
    #[error("invalid UTF-8 in string")]
    BadUtf8,
    #[error("unknown reference marker 0x{0:02X}")]
    BadMarker(u8),
    #[error("type id {0} was never defined")]
    UnresolvedType(u32),
    #[error("schema id {0} was never defined")]
    UnknownSchema(u32),
    #[error("node id {0} was never defined")]
    UnknownReference(u32),
    #[error("node id {0} defined twice")]
    DuplicateNode(u32),
    #[error("field {field} left {leftover} bytes unread")]
    FieldLeftover { field: String, leftover: usize },
    #[error("record {type_name} carries {found} fields, dialect expects {expected}")]
    FieldCountMismatch {
        type_name: String,
        expected: usize,
        found: usize,
    },
    #[error("field length {len} overruns its record ({remaining} bytes left)")]
    FieldOverrun { len: usize, remaining: usize },
    #[error("nesting exceeds {0} levels")]
    TooDeep(usize),
    #[error("missing end-of-stream marker")]
    MissingTerminator,
    #[error("{0} trailing bytes after end-of-stream marker")]
    TrailingBytes(usize),
}

impl DecodeErrorKind {
    /// Structural errors invalidate the whole parse under the current dialect.
    /// Everything else is contained at the nearest length-framed field.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Empty
                | Self::FieldCountMismatch { .. }
                | Self::FieldOverrun { .. }
                | Self::TooDeep(_)
                | Self::MissingTerminator
                | Self::TrailingBytes(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at byte {offset}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeAttempt {
    pub dialect: Dialect,
    pub error: DecodeError,
}

/// Every dialect failed; one entry per attempt, in attempt order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no dialect could decode the stream ({})", describe_attempts(.attempts))]
pub struct DecodeFailure {
    pub attempts: Vec<DecodeAttempt>,
}

impl DecodeFailure {
    /// Furthest byte offset any attempt reached before failing.
    pub fn furthest_offset(&self) -> Option<usize> {
        self.attempts.iter().map(|a| a.error.offset).max()
    }
}

fn describe_attempts(attempts: &[DecodeAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.dialect, a.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Decode `bytes`, trying the hinted dialect first and then the remaining
/// dialects in preference order. The first structurally complete parse wins.
pub fn decode(
    bytes: &[u8],
    hint: Option<Dialect>,
    resolver: Option<&TypeResolver>,
) -> Result<Graph, DecodeFailure> {
    let mut attempts = Vec::new();
    for dialect in Dialect::attempt_order(hint) {
        match decode_with(bytes, dialect, resolver) {
            Ok(graph) => {
                tracing::info!(
                    dialect = %dialect,
                    nodes = graph.node_count(),
                    rejected = attempts.len(),
                    "decoded save stream"
                );
                return Ok(graph);
            }
            Err(error) => {
                tracing::debug!(dialect = %dialect, %error, "dialect rejected stream");
                attempts.push(DecodeAttempt { dialect, error });
            }
        }
    }
    Err(DecodeFailure { attempts })
}

/// Decode `bytes` under exactly one dialect.
pub fn decode_with(
    bytes: &[u8],
    dialect: Dialect,
    resolver: Option<&TypeResolver>,
) -> Result<Graph, DecodeError> {
    let mut r = ByteReader::new(bytes);
    if r.is_empty() {
        return Err(r.error(DecodeErrorKind::Empty));
    }

    let mut session = DecodeSession::new(dialect, resolver);
    let root = session.value(&mut r)?;

    if r.is_empty() || r.read_u8()? != TAG_END_OF_STREAM {
        return Err(r.error(DecodeErrorKind::MissingTerminator));
    }
    if !r.is_empty() {
        return Err(r.error(DecodeErrorKind::TrailingBytes(r.remaining())));
    }

    Ok(Graph {
        root,
        nodes: session.nodes,
        schemas: session.schemas,
        dialect,
    })
}

/// Tables scoped to one decode call: interned type names, interned schemas
/// and the node id map used to substitute back-references.
struct DecodeSession<'r> {
    dialect: Dialect,
    resolver: Option<&'r TypeResolver>,
    type_names: HashMap<u32, String>,
    schema_ids: HashMap<u32, SchemaId>,
    node_ids: HashMap<u32, NodeId>,
    wire_members: HashMap<SchemaId, Vec<usize>>,
    nodes: Vec<RecordNode>,
    schemas: Vec<Schema>,
    depth: usize,
}

impl<'r> DecodeSession<'r> {
    fn new(dialect: Dialect, resolver: Option<&'r TypeResolver>) -> Self {
        Self {
            dialect,
            resolver,
            type_names: HashMap::new(),
            schema_ids: HashMap::new(),
            node_ids: HashMap::new(),
            wire_members: HashMap::new(),
            nodes: Vec::new(),
            schemas: Vec::new(),
            depth: 0,
        }
    }

    fn value(&mut self, r: &mut ByteReader<'_>) -> Result<Value, DecodeError> {
        if self.depth >= MAX_NESTING {
            return Err(r.error(DecodeErrorKind::TooDeep(MAX_NESTING)));
        }
        self.depth += 1;
        let result = self.value_inner(r);
        self.depth -= 1;
        result
    }

    fn value_inner(&mut self, r: &mut ByteReader<'_>) -> Result<Value, DecodeError> {
        let tag_offset = r.position();
        let tag = r.read_u8()?;
        match tag {
            TAG_NULL => Ok(Value::Null),
            TAG_BOOL => match r.read_u8()? {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                other => Err(DecodeError {
                    kind: DecodeErrorKind::BadBool(other),
                    offset: r.position() - 1,
                }),
            },
            TAG_INT32 => r.read_i32().map(Value::Int32),
            TAG_INT64 => r.read_i64().map(Value::Int64),
            TAG_FLOAT32 => r.read_f32().map(Value::Float32),
            TAG_FLOAT64 => r.read_f64().map(Value::Float64),
            TAG_STRING => r.read_string().map(Value::String),
            TAG_ENUM => {
                let type_name = self.type_ref(r)?;
                let raw = r.read_i32()?;
                Ok(Value::Enum { type_name, raw })
            }
            TAG_ARRAY => {
                let element_type = self.type_ref(r)?;
                let count = self.count(r)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.value(r)?);
                }
                Ok(Value::Array {
                    element_type,
                    items,
                })
            }
            TAG_DICTIONARY => {
                let type_name = self.type_ref(r)?;
                let count = self.count(r)?;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = self.value(r)?;
                    let value = self.value(r)?;
                    entries.push((key, value));
                }
                Ok(Value::Dictionary { type_name, entries })
            }
            TAG_RECORD => self.record(r),
            TAG_REFERENCE => {
                let offset = r.position();
                let id = r.read_u32()?;
                self.node_ids
                    .get(&id)
                    .copied()
                    .map(Value::Node)
                    .ok_or(DecodeError {
                        kind: DecodeErrorKind::UnknownReference(id),
                        offset,
                    })
            }
            other => Err(DecodeError {
                kind: DecodeErrorKind::BadTag(other),
                offset: tag_offset,
            }),
        }
    }

    /// Element count for arrays and dictionaries. Every element takes at
    /// least one byte, so a count larger than the remaining input is bogus.
    fn count(&mut self, r: &mut ByteReader<'_>) -> Result<usize, DecodeError> {
        let count = r.read_u32()? as usize;
        if count > r.remaining() {
            return Err(r.error(DecodeErrorKind::Truncated {
                needed: count,
                remaining: r.remaining(),
            }));
        }
        Ok(count)
    }

    fn record(&mut self, r: &mut ByteReader<'_>) -> Result<Value, DecodeError> {
        let header_offset = r.position();
        let stream_id = r.read_u32()?;
        let schema_id = self.schema_ref(r)?;
        let found = r.read_u16()? as usize;

        let wire = self.wire_members(schema_id);
        let schema = &self.schemas[schema_id.0];
        if found != wire.len() {
            return Err(DecodeError {
                kind: DecodeErrorKind::FieldCountMismatch {
                    type_name: schema.type_name.clone(),
                    expected: wire.len(),
                    found,
                },
                offset: header_offset,
            });
        }
        if self.node_ids.contains_key(&stream_id) {
            return Err(DecodeError {
                kind: DecodeErrorKind::DuplicateNode(stream_id),
                offset: header_offset,
            });
        }

        let fields = schema
            .members
            .iter()
            .map(|member| self.dialect.missing_default(member))
            .collect();
        let node_id = NodeId(self.nodes.len());
        self.nodes.push(RecordNode {
            stream_id,
            schema: schema_id,
            fields,
        });
        // Registered before the fields so self-references resolve to this node.
        self.node_ids.insert(stream_id, node_id);

        for member_index in wire {
            let len = r.read_u32()? as usize;
            if len > r.remaining() {
                return Err(r.error(DecodeErrorKind::FieldOverrun {
                    len,
                    remaining: r.remaining(),
                }));
            }
            let mut field = r.split(len)?;
            let value = match self.value(&mut field) {
                Ok(value) if field.is_empty() => value,
                Ok(_) => {
                    let member = &self.schemas[schema_id.0].members[member_index];
                    self.contained(
                        member,
                        field.error(DecodeErrorKind::FieldLeftover {
                            field: member.name.clone(),
                            leftover: field.remaining(),
                        }),
                    )
                }
                Err(error) if error.kind.is_structural() => return Err(error),
                Err(error) => {
                    let member = &self.schemas[schema_id.0].members[member_index];
                    self.contained(member, error)
                }
            };
            self.nodes[node_id.0].fields[member_index] = value;
        }

        Ok(Value::Node(node_id))
    }

    fn contained(&self, member: &Member, error: DecodeError) -> Value {
        tracing::debug!(
            field = %member.name,
            declared_type = %member.declared_type,
            %error,
            "field could not be decoded; recording null"
        );
        Value::Null
    }

    fn wire_members(&mut self, schema_id: SchemaId) -> Vec<usize> {
        if let Some(cached) = self.wire_members.get(&schema_id) {
            return cached.clone();
        }
        let wire = self
            .dialect
            .serialized_members(&self.schemas[schema_id.0], self.resolver);
        self.wire_members.insert(schema_id, wire.clone());
        wire
    }

    fn type_ref(&mut self, r: &mut ByteReader<'_>) -> Result<String, DecodeError> {
        let offset = r.position();
        match r.read_u8()? {
            REF_DEFINE => {
                let id = r.read_u32()?;
                let name = r.read_string()?;
                self.type_names.insert(id, name.clone());
                Ok(name)
            }
            REF_REUSE => {
                let id = r.read_u32()?;
                self.type_names.get(&id).cloned().ok_or(DecodeError {
                    kind: DecodeErrorKind::UnresolvedType(id),
                    offset,
                })
            }
            other => Err(DecodeError {
                kind: DecodeErrorKind::BadMarker(other),
                offset,
            }),
        }
    }

    fn schema_ref(&mut self, r: &mut ByteReader<'_>) -> Result<SchemaId, DecodeError> {
        let offset = r.position();
        match r.read_u8()? {
            REF_DEFINE => {
                let stream_id = r.read_u32()?;
                let type_name = r.read_string()?;
                let member_count = r.read_u16()? as usize;
                let mut members = Vec::with_capacity(member_count.min(r.remaining()));
                for _ in 0..member_count {
                    let name = r.read_string()?;
                    let declared_type = r.read_string()?;
                    let flags = r.read_u8()?;
                    members.push(Member {
                        name,
                        declared_type,
                        flags,
                    });
                }
                let id = SchemaId(self.schemas.len());
                self.schemas.push(Schema {
                    stream_id,
                    type_name,
                    members,
                });
                self.schema_ids.insert(stream_id, id);
                Ok(id)
            }
            REF_REUSE => {
                let stream_id = r.read_u32()?;
                self.schema_ids.get(&stream_id).copied().ok_or(DecodeError {
                    kind: DecodeErrorKind::UnknownSchema(stream_id),
                    offset,
                })
            }
            other => Err(DecodeError {
                kind: DecodeErrorKind::BadMarker(other),
                offset,
            }),
        }
    }
}
