use std::fmt;

use serde::{Deserialize, Serialize};

use crate::type_library::{TypeKind, TypeResolver, classify_declared_type};

use super::{Member, Schema, Value};

/// Interpretation policy for the binary format.
///
/// The game changed which member types it serializes without an explicit
/// opt-in several times, so the same record header can describe different
/// field sets. Each variant reproduces one of those policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// Every declared member is serialized.
    Permissive,
    /// Opted-in members plus everything except dictionaries, sets and untyped objects.
    Standard,
    /// Opted-in members plus primitives, strings and enums.
    Strict,
}

impl Dialect {
    /// Decode attempt order, most permissive first.
    pub const PREFERENCE_ORDER: [Dialect; 3] =
        [Dialect::Permissive, Dialect::Standard, Dialect::Strict];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permissive => "permissive",
            Self::Standard => "standard",
            Self::Strict => "strict",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "permissive" | "everything" => Some(Self::Permissive),
            "standard" | "unity" => Some(Self::Standard),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }

    /// Dialects to try for a decode: the hint first, then the rest in preference order.
    pub fn attempt_order(hint: Option<Dialect>) -> Vec<Dialect> {
        let mut order = Vec::with_capacity(Self::PREFERENCE_ORDER.len());
        if let Some(hint) = hint {
            order.push(hint);
        }
        for dialect in Self::PREFERENCE_ORDER {
            if !order.contains(&dialect) {
                order.push(dialect);
            }
        }
        order
    }

    pub fn serializes(&self, member: &Member, resolver: Option<&TypeResolver>) -> bool {
        if member.is_opted_in() {
            return true;
        }
        let kind = classify_declared_type(&member.declared_type, resolver);
        match self {
            Self::Permissive => true,
            Self::Standard => !matches!(
                kind,
                TypeKind::Dictionary | TypeKind::Set | TypeKind::Object
            ),
            Self::Strict => matches!(
                kind,
                TypeKind::Primitive | TypeKind::String | TypeKind::Enum
            ),
        }
    }

    /// Indices of the schema members present on the wire under this dialect.
    pub fn serialized_members(
        &self,
        schema: &Schema,
        resolver: Option<&TypeResolver>,
    ) -> Vec<usize> {
        schema
            .members
            .iter()
            .enumerate()
            .filter(|(_, member)| self.serializes(member, resolver))
            .map(|(index, _)| index)
            .collect()
    }

    /// Value a record carries for a member this dialect does not serialize.
    pub fn missing_default(&self, member: &Member) -> Value {
        if *self == Self::Strict {
            return Value::Null;
        }
        match member.declared_type.as_str() {
            "System.Boolean" | "bool" => Value::Bool(false),
            "System.Int32" | "int" => Value::Int32(0),
            "System.Int64" | "long" => Value::Int64(0),
            "System.Single" | "float" => Value::Float32(0.0),
            "System.Double" | "double" => Value::Float64(0.0),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
