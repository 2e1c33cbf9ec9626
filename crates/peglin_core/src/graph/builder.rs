use super::{Dialect, Graph, Member, NodeId, RecordNode, Schema, SchemaId, Value};

/// Assembles a [`Graph`] in memory, for fixtures and for tools that emit
/// fresh streams.
///
/// Stream ids are assigned in creation order, matching what the encoder
/// expects for byte-stable output.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<RecordNode>,
    schemas: Vec<Schema>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a record type; members are `(name, declared type)` pairs.
    pub fn schema(&mut self, type_name: &str, members: &[(&str, &str)]) -> SchemaId {
        let members = members
            .iter()
            .map(|&(name, declared_type)| (name, declared_type, 0u8))
            .collect::<Vec<_>>();
        self.schema_with_flags(type_name, &members)
    }

    pub fn schema_with_flags(&mut self, type_name: &str, members: &[(&str, &str, u8)]) -> SchemaId {
        let id = SchemaId(self.schemas.len());
        self.schemas.push(Schema {
            stream_id: id.0 as u32,
            type_name: type_name.to_string(),
            members: members
                .iter()
                .map(|&(name, declared_type, flags)| Member {
                    name: name.to_string(),
                    declared_type: declared_type.to_string(),
                    flags,
                })
                .collect(),
        });
        id
    }

    /// Add a record; fields are matched to schema members by name and
    /// members without a value are left null. Unknown names are ignored.
    pub fn record(&mut self, schema: SchemaId, fields: Vec<(&str, Value)>) -> NodeId {
        let member_count = self
            .schemas
            .get(schema.0)
            .map(|s| s.members.len())
            .unwrap_or(0);
        let mut values = vec![Value::Null; member_count];
        for (name, value) in fields {
            let Some(index) = self
                .schemas
                .get(schema.0)
                .and_then(|s| s.member_index(name))
            else {
                continue;
            };
            values[index] = value;
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(RecordNode {
            stream_id: id.0 as u32,
            schema,
            fields: values,
        });
        id
    }

    /// Overwrite one field after the fact, e.g. to close a reference cycle.
    pub fn set_field(&mut self, node: NodeId, name: &str, value: Value) -> bool {
        let Some(record) = self.nodes.get_mut(node.0) else {
            return false;
        };
        let Some(index) = self
            .schemas
            .get(record.schema.0)
            .and_then(|s| s.member_index(name))
        else {
            return false;
        };
        record.fields[index] = value;
        true
    }

    pub fn finish(self, root: Value, dialect: Dialect) -> Graph {
        Graph {
            root,
            nodes: self.nodes,
            schemas: self.schemas,
            dialect,
        }
    }
}
