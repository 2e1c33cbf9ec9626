//! In-place edits of a decoded graph and the validated write back to disk.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core_api::{CoreError, CoreErrorCode};
use crate::graph::{Dialect, Graph, NodeId, Value, decode, decode_with, serialize};
use crate::navigator::{key_label, section_path};
use crate::type_library::TypeResolver;

pub const BACKUP_SUFFIX: &str = ".bak";
/// Anything shorter cannot hold a root record plus terminator.
pub const MIN_SERIALIZED_LEN: usize = 16;

/// Progression fields holding per-class cruciball levels, newest name first.
pub const CRUCIBALL_PROGRESS_KEYS: [&str; 2] = ["classCruciballLevels", "cruciballLevels"];

const CLASS_ENUM: &str = "Class";
const ENVELOPE_FIELD: &str = "value";
const MAX_ENVELOPE_LAYERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Dotted path into a graph, e.g. `RunStatsHistory.runs[0].damageDealt`.
/// The first field names a section and is resolved like
/// [`get_section`](crate::navigator::get_section).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let invalid = |why: &str| {
            CoreError::new(
                CoreErrorCode::Validation,
                format!("invalid field path {text:?}: {why}"),
            )
        };

        let mut segments = Vec::new();
        for part in text.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(open) => part.split_at(open),
                None => (part, ""),
            };
            if name.is_empty() && (segments.is_empty() || rest.is_empty()) {
                return Err(invalid("empty segment"));
            }
            if !name.is_empty() {
                segments.push(PathSegment::Field(name.to_string()));
            }
            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(|| invalid("unclosed '['"))?;
                let index = rest[1..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| invalid("index is not a number"))?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(invalid("unexpected text after ']'"));
                }
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Field(name.to_string()));
        Self { segments }
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }
}

impl FromStr for FieldPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i == 0 => write!(f, "{name}")?,
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Where a value lives: a root or record-field slot, then steps through
/// inline arrays and dictionaries.
#[derive(Debug, Clone)]
struct Location {
    base: Base,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy)]
enum Base {
    Root,
    Field(NodeId, usize),
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Item(usize),
    Entry(usize),
}

impl Location {
    fn field(id: NodeId, index: usize) -> Self {
        Self {
            base: Base::Field(id, index),
            steps: Vec::new(),
        }
    }
}

fn locate(graph: &Graph, path: &FieldPath) -> Option<Location> {
    let mut segments = path.segments.clone();
    let prefix = match segments.first() {
        Some(PathSegment::Field(section)) => section_path(graph, section),
        _ => None,
    };
    if let Some(prefix) = prefix {
        segments.splice(0..1, prefix.into_iter().map(PathSegment::Field));
    }

    let mut loc = Location {
        base: Base::Root,
        steps: Vec::new(),
    };
    let mut current = graph.root();
    for segment in &segments {
        match segment {
            PathSegment::Field(name) => {
                if let Some((next_loc, next)) = child(graph, current, &loc, name) {
                    loc = next_loc;
                    current = next;
                } else {
                    current = strip_envelopes(graph, current, &mut loc);
                    let (next_loc, next) = child(graph, current, &loc, name)?;
                    loc = next_loc;
                    current = next;
                }
            }
            PathSegment::Index(index) => {
                current = strip_envelopes(graph, current, &mut loc);
                let Value::Array { items, .. } = current else {
                    return None;
                };
                current = items.get(*index)?;
                loc.steps.push(Step::Item(*index));
            }
        }
    }
    strip_envelopes(graph, current, &mut loc);
    Some(loc)
}

fn child<'g>(
    graph: &'g Graph,
    current: &'g Value,
    loc: &Location,
    name: &str,
) -> Option<(Location, &'g Value)> {
    match current {
        Value::Node(id) => {
            let node = graph.node(*id)?;
            let index = graph.schema_of(node)?.member_index(name)?;
            Some((Location::field(*id, index), node.fields.get(index)?))
        }
        Value::Dictionary { entries, .. } => {
            let position = entries
                .iter()
                .position(|(key, _)| key_label(graph, key).eq_ignore_ascii_case(name))?;
            let mut next = loc.clone();
            next.steps.push(Step::Entry(position));
            Some((next, &entries[position].1))
        }
        _ => None,
    }
}

fn strip_envelopes<'g>(graph: &'g Graph, mut current: &'g Value, loc: &mut Location) -> &'g Value {
    for _ in 0..MAX_ENVELOPE_LAYERS {
        let Some(id) = current.node_id() else {
            break;
        };
        let Some(node) = graph.node(id) else {
            break;
        };
        let is_envelope = graph.schema_of(node).is_some_and(|schema| {
            schema.members.len() == 1 && schema.members[0].name.eq_ignore_ascii_case(ENVELOPE_FIELD)
        });
        match node.fields.first() {
            Some(inner) if is_envelope => {
                *loc = Location::field(id, 0);
                current = inner;
            }
            _ => break,
        }
    }
    current
}

fn slot<'g>(graph: &'g Graph, loc: &Location) -> Option<&'g Value> {
    let mut current = match loc.base {
        Base::Root => graph.root(),
        Base::Field(id, index) => graph.node(id)?.fields.get(index)?,
    };
    for step in &loc.steps {
        current = match (step, current) {
            (Step::Item(i), Value::Array { items, .. }) => items.get(*i)?,
            (Step::Entry(i), Value::Dictionary { entries, .. }) => &entries.get(*i)?.1,
            _ => return None,
        };
    }
    Some(current)
}

fn slot_mut<'g>(graph: &'g mut Graph, loc: &Location) -> Option<&'g mut Value> {
    let mut current = match loc.base {
        Base::Root => graph.root_mut(),
        Base::Field(id, index) => graph.field_slot_mut(id, index)?,
    };
    for step in &loc.steps {
        current = match (step, current) {
            (Step::Item(i), Value::Array { items, .. }) => items.get_mut(*i)?,
            (Step::Entry(i), Value::Dictionary { entries, .. }) => &mut entries.get_mut(*i)?.1,
            _ => return None,
        };
    }
    Some(current)
}

pub fn read_field<'g>(graph: &'g Graph, path: &FieldPath) -> Option<&'g Value> {
    let loc = locate(graph, path)?;
    slot(graph, &loc)
}

/// Replace the value at `path`. Only same-shaped replacements are applied;
/// anything else leaves the graph untouched and returns false.
pub fn update_field(graph: &mut Graph, path: &FieldPath, value: Value) -> bool {
    let Some(loc) = locate(graph, path) else {
        tracing::debug!(%path, "update target not found");
        return false;
    };
    let Some(slot) = slot_mut(graph, &loc) else {
        return false;
    };
    if !slot.same_shape(&value) {
        tracing::debug!(
            %path,
            expected = slot.kind_label(),
            found = value.kind_label(),
            "rejecting shape-changing update"
        );
        return false;
    }
    *slot = value;
    true
}

/// Path of the per-class cruciball table, if this profile has one.
pub fn cruciball_progress_path(graph: &Graph) -> Option<FieldPath> {
    CRUCIBALL_PROGRESS_KEYS.iter().find_map(|key| {
        let path = FieldPath {
            segments: vec![PathSegment::Field((*key).to_string())],
        };
        read_field(graph, &path)
            .filter(|v| !v.is_null())
            .map(|_| path)
    })
}

/// Set the cruciball level reached with `class`. Returns the path of the
/// written entry.
///
/// Refused on fresh profiles that have no progression table yet: creating
/// one would need a schema the game never wrote.
pub fn set_class_cruciball(
    graph: &mut Graph,
    resolver: Option<&TypeResolver>,
    class: &str,
    level: i64,
) -> Result<FieldPath, CoreError> {
    let table_path = cruciball_progress_path(graph).ok_or_else(|| {
        CoreError::new(
            CoreErrorCode::UnsupportedOperation,
            "profile has no cruciball progression yet; play one run before editing",
        )
    })?;
    let raw = class_raw_value(resolver, class)?;

    let loc = locate(graph, &table_path).ok_or_else(|| {
        CoreError::new(CoreErrorCode::MissingSection, "cruciball table vanished")
    })?;
    let table = slot_mut(graph, &loc).ok_or_else(|| {
        CoreError::new(CoreErrorCode::MissingSection, "cruciball table vanished")
    })?;

    match table {
        Value::Array { items, .. } => {
            let index = usize::try_from(raw).map_err(|_| {
                CoreError::new(CoreErrorCode::Validation, format!("invalid class index {raw}"))
            })?;
            let slot = items.get_mut(index).ok_or_else(|| {
                CoreError::new(
                    CoreErrorCode::Validation,
                    format!("class index {index} is outside the cruciball table"),
                )
            })?;
            *slot = shaped_int(slot, level)?;
            Ok(table_path.index(index))
        }
        Value::Dictionary { entries, .. } => {
            if let Some((key, slot)) = entries
                .iter_mut()
                .find(|(key, _)| key.as_i64() == Some(i64::from(raw)) || key.as_str() == Some(class))
            {
                *slot = shaped_int(slot, level)?;
                let label = match key {
                    Value::String(s) => s.clone(),
                    other => other.as_i64().unwrap_or_default().to_string(),
                };
                return Ok(table_path.child(&label));
            }

            let (template_key, template_value) = entries.first().cloned().ok_or_else(|| {
                CoreError::new(
                    CoreErrorCode::UnsupportedOperation,
                    "cruciball table is empty; cannot infer its entry shape",
                )
            })?;
            let key = match template_key {
                Value::Enum { type_name, .. } => Value::Enum { type_name, raw },
                Value::Int64(_) => Value::Int64(i64::from(raw)),
                Value::String(_) => Value::string(class),
                _ => Value::Int32(raw),
            };
            let label = match &key {
                Value::String(s) => s.clone(),
                other => other.as_i64().unwrap_or_default().to_string(),
            };
            entries.push((key, shaped_int(&template_value, level)?));
            Ok(table_path.child(&label))
        }
        other => Err(CoreError::new(
            CoreErrorCode::UnsupportedOperation,
            format!("cruciball table is a {}, not a list or map", other.kind_label()),
        )),
    }
}

fn class_raw_value(resolver: Option<&TypeResolver>, class: &str) -> Result<i32, CoreError> {
    if let Ok(raw) = class.trim().parse::<i32>() {
        return Ok(raw);
    }
    resolver
        .and_then(|r| r.enum_value(CLASS_ENUM, class))
        .ok_or_else(|| {
            CoreError::new(
                CoreErrorCode::Validation,
                format!("unknown class {class:?}; pass its number or load the type library"),
            )
        })
}

fn shaped_int(template: &Value, level: i64) -> Result<Value, CoreError> {
    let out_of_range = || {
        CoreError::new(
            CoreErrorCode::Validation,
            format!("cruciball level {level} does not fit the stored field"),
        )
    };
    match template {
        Value::Int64(_) => Ok(Value::Int64(level)),
        Value::Int32(_) | Value::Null => i32::try_from(level).map(Value::Int32).map_err(|_| out_of_range()),
        other => Err(CoreError::new(
            CoreErrorCode::Validation,
            format!("cruciball entry is a {}, not an integer", other.kind_label()),
        )),
    }
}

/// Serialize with the graph's own dialect and prove the result decodes
/// back with every `expected` field intact.
pub fn serialize_validated(
    graph: &Graph,
    resolver: Option<&TypeResolver>,
    expected: &[(FieldPath, Value)],
) -> Result<Vec<u8>, CoreError> {
    let dialect = graph.dialect();
    let bytes = serialize(graph, dialect, resolver);
    if bytes.len() < MIN_SERIALIZED_LEN {
        return Err(CoreError::new(
            CoreErrorCode::Validation,
            format!(
                "serialized output is only {} bytes; refusing to write",
                bytes.len()
            ),
        ));
    }

    let decoded = decode_with(&bytes, dialect, resolver).map_err(|e| {
        CoreError::new(
            CoreErrorCode::Validation,
            format!("serialized output does not decode as {dialect}: {e}"),
        )
    })?;
    for (path, value) in expected {
        if read_field(&decoded, path) != Some(value) {
            return Err(CoreError::new(
                CoreErrorCode::Validation,
                format!("field {path} did not survive re-serialization"),
            ));
        }
    }
    Ok(bytes)
}

pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(BACKUP_SUFFIX);
    path.with_file_name(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
    pub bytes_written: usize,
}

/// Back up the current file, then replace it through a sibling temp file.
pub fn commit_to_file(path: &Path, bytes: &[u8]) -> Result<CommitReport, CoreError> {
    let io_error = |what: &str, target: &Path, e: std::io::Error| {
        CoreError::new(
            CoreErrorCode::Io,
            format!("failed to {what} {}: {e}", target.display()),
        )
    };

    let backup = if path.exists() {
        let backup = backup_path_for(path);
        fs::copy(path, &backup).map_err(|e| io_error("back up", path, e))?;
        Some(backup)
    } else {
        None
    };

    let mut temp_name = std::ffi::OsString::from(".");
    temp_name.push(path.file_name().unwrap_or_default());
    temp_name.push(".tmp");
    let temp = path.with_file_name(temp_name);
    fs::write(&temp, bytes).map_err(|e| io_error("write", &temp, e))?;
    if let Err(e) = fs::rename(&temp, path) {
        if let Err(cleanup) = fs::remove_file(&temp) {
            tracing::warn!(path = %temp.display(), "failed to remove temp file: {cleanup}");
        }
        return Err(io_error("replace", path, e));
    }

    tracing::info!(
        path = %path.display(),
        bytes = bytes.len(),
        backup = backup.is_some(),
        "wrote save file"
    );
    Ok(CommitReport {
        path: path.to_path_buf(),
        backup,
        bytes_written: bytes.len(),
    })
}

/// A save file opened for editing. Changes are applied to the in-memory
/// graph immediately and written by [`SaveEditor::commit`].
#[derive(Debug)]
pub struct SaveEditor<'r> {
    path: PathBuf,
    graph: Graph,
    resolver: Option<&'r TypeResolver>,
    changes: Vec<(FieldPath, Value)>,
}

impl<'r> SaveEditor<'r> {
    pub fn open(
        path: &Path,
        resolver: Option<&'r TypeResolver>,
        hint: Option<Dialect>,
    ) -> Result<Self, CoreError> {
        let bytes = fs::read(path).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to read {}: {e}", path.display()),
            )
        })?;
        let graph = decode(&bytes, hint, resolver).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Parse,
                format!("failed to decode {}: {e}", path.display()),
            )
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            graph,
            resolver,
            changes: Vec::new(),
        })
    }

    /// Editor over a graph decoded elsewhere; [`SaveEditor::commit`] writes
    /// it to `path` with the graph's own dialect.
    pub fn from_graph(path: &Path, graph: Graph, resolver: Option<&'r TypeResolver>) -> Self {
        Self {
            path: path.to_path_buf(),
            graph,
            resolver,
            changes: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn set_field(&mut self, path: &FieldPath, value: Value) -> Result<(), CoreError> {
        if !update_field(&mut self.graph, path, value.clone()) {
            return Err(CoreError::new(
                CoreErrorCode::Validation,
                format!("cannot set {path}: field missing or of a different type"),
            ));
        }
        self.changes.push((path.clone(), value));
        Ok(())
    }

    pub fn set_class_cruciball(&mut self, class: &str, level: i64) -> Result<(), CoreError> {
        let path = set_class_cruciball(&mut self.graph, self.resolver, class, level)?;
        if let Some(value) = read_field(&self.graph, &path).cloned() {
            self.changes.push((path, value));
        }
        Ok(())
    }

    pub fn commit(self) -> Result<CommitReport, CoreError> {
        let bytes = serialize_validated(&self.graph, self.resolver, &self.changes)?;
        commit_to_file(&self.path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldPath, PathSegment, backup_path_for};
    use std::path::Path;

    #[test]
    fn parses_sections_indices_and_keys() {
        let path = FieldPath::parse("RunStatsHistory.runs[2].orbStats.bomb").expect("path");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Field("RunStatsHistory".to_string()),
                PathSegment::Field("runs".to_string()),
                PathSegment::Index(2),
                PathSegment::Field("orbStats".to_string()),
                PathSegment::Field("bomb".to_string()),
            ]
        );
        assert_eq!(path.to_string(), "RunStatsHistory.runs[2].orbStats.bomb");

        let nested: FieldPath = "grid[1][0]".parse().expect("nested indices");
        assert_eq!(nested.segments().len(), 3);
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse("a[x]").is_err());
        assert!(FieldPath::parse("a[1").is_err());
        assert!(FieldPath::parse("a[1]b").is_err());
    }

    #[test]
    fn backup_sits_next_to_the_file() {
        assert_eq!(
            backup_path_for(Path::new("/saves/Stats_0.data")),
            Path::new("/saves/Stats_0.data.bak")
        );
    }
}
