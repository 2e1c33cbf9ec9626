//! Type metadata for the game's serialized types.
//!
//! The game resolves field types by reflecting over its own compiled
//! assembly. We ship that information as an explicit descriptor file
//! (`Assembly-CSharp.types.json`, optionally gzip-compressed) that lives next
//! to the assembly in the install directory. Everything here degrades to
//! "not found" when the file is missing; callers fall back to raw values.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::core_api::{CoreError, CoreErrorCode};
use crate::graph::simple_type_name;

pub const LIBRARY_FILE_NAMES: [&str; 2] = [
    "Assembly-CSharp.types.json",
    "Assembly-CSharp.types.json.gz",
];

const MAX_SEARCH_DEPTH: usize = 5;

const WELL_KNOWN_NAMESPACES: [&str; 6] = [
    "Peglin",
    "Peglin.ClassSystem",
    "Stats",
    "Battle",
    "Battle.StatusEffects",
    "Worldmap",
];

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Primitive,
    String,
    Enum,
    Array,
    Dictionary,
    Set,
    Object,
    Record,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub kind: TypeKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<i32, String>,
}

impl TypeDescriptor {
    pub fn simple_name(&self) -> &str {
        simple_type_name(&self.name)
    }

    pub fn is_enum(&self) -> bool {
        self.kind == TypeKind::Enum
    }
}

#[derive(Debug, Deserialize)]
struct LibraryFile {
    #[serde(default)]
    assembly: String,
    types: Vec<TypeDescriptor>,
}

/// Parsed descriptor file, indexed by qualified and simple name.
#[derive(Debug, Clone, Default)]
pub struct TypeLibrary {
    source: Option<PathBuf>,
    assembly: String,
    types: HashMap<String, TypeDescriptor>,
    first_by_simple_name: HashMap<String, String>,
    first_enum_by_simple_name: HashMap<String, String>,
}

impl TypeLibrary {
    pub fn from_descriptors(assembly: &str, descriptors: Vec<TypeDescriptor>) -> Self {
        let mut library = Self {
            assembly: assembly.to_string(),
            ..Self::default()
        };
        for descriptor in descriptors {
            let simple = descriptor.simple_name().to_string();
            library
                .first_by_simple_name
                .entry(simple.clone())
                .or_insert_with(|| descriptor.name.clone());
            if descriptor.is_enum() {
                library
                    .first_enum_by_simple_name
                    .entry(simple)
                    .or_insert_with(|| descriptor.name.clone());
            }
            library
                .types
                .entry(descriptor.name.clone())
                .or_insert(descriptor);
        }
        library
    }

    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let file: LibraryFile = serde_json::from_str(json).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Parse,
                format!("invalid type library document: {e}"),
            )
        })?;
        Ok(Self::from_descriptors(&file.assembly, file.types))
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self, CoreError> {
        let file: LibraryFile = serde_json::from_value(value).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Parse,
                format!("invalid type library document: {e}"),
            )
        })?;
        Ok(Self::from_descriptors(&file.assembly, file.types))
    }

    /// Load a descriptor file; gzip input is detected by its magic bytes.
    pub fn load_file(path: &Path) -> Result<Self, CoreError> {
        let bytes = fs::read(path).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to read {}: {e}", path.display()),
            )
        })?;

        let json = if bytes.starts_with(&GZIP_MAGIC) {
            let mut out = String::new();
            GzDecoder::new(bytes.as_slice())
                .read_to_string(&mut out)
                .map_err(|e| {
                    CoreError::new(
                        CoreErrorCode::Parse,
                        format!("failed to decompress {}: {e}", path.display()),
                    )
                })?;
            out
        } else {
            String::from_utf8(bytes).map_err(|e| {
                CoreError::new(
                    CoreErrorCode::Parse,
                    format!("{} is not valid UTF-8: {e}", path.display()),
                )
            })?
        };

        let mut library = Self::from_json_str(&json)?;
        library.source = Some(path.to_path_buf());
        Ok(library)
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn assembly(&self) -> &str {
        &self.assembly
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Exact qualified name first, then the first type with that simple name.
    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name).or_else(|| {
            self.first_by_simple_name
                .get(simple_type_name(name))
                .and_then(|qualified| self.types.get(qualified))
        })
    }

    pub fn find_enum(&self, name: &str) -> Option<&TypeDescriptor> {
        if let Some(exact) = self.types.get(name).filter(|t| t.is_enum()) {
            return Some(exact);
        }
        let simple = simple_type_name(name);
        if let Some(found) = self
            .first_enum_by_simple_name
            .get(simple)
            .and_then(|qualified| self.types.get(qualified))
        {
            return Some(found);
        }
        WELL_KNOWN_NAMESPACES.iter().find_map(|namespace| {
            self.types
                .get(&format!("{namespace}.{simple}"))
                .filter(|t| t.is_enum())
        })
    }
}

/// Shared, load-once view of the type library.
///
/// Reads are lock-free after the first successful load; the mutex only
/// serializes concurrent first loads.
#[derive(Debug, Default)]
pub struct TypeResolver {
    library: OnceLock<TypeLibrary>,
    load_guard: Mutex<()>,
}

impl TypeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(library: TypeLibrary) -> Self {
        let resolver = Self::new();
        let _ = resolver.library.set(library);
        resolver
    }

    /// Locate and load the type library under `install_path`.
    /// Returns true when a library is available afterwards.
    pub fn load_type_library(&self, install_path: &Path) -> bool {
        if self.is_loaded() {
            return true;
        }
        let _guard = self
            .load_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.is_loaded() {
            return true;
        }

        let Some(path) = locate_type_library(install_path) else {
            tracing::warn!(
                install = %install_path.display(),
                "no type library found; enum names and member kinds will be unresolved"
            );
            return false;
        };

        match TypeLibrary::load_file(&path) {
            Ok(library) => {
                tracing::info!(
                    path = %path.display(),
                    types = library.len(),
                    "loaded type library"
                );
                let _ = self.library.set(library);
                true
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "type library unreadable");
                false
            }
        }
    }

    /// Install an already parsed library if none is loaded yet.
    pub fn install(&self, library: TypeLibrary) -> bool {
        self.library.set(library).is_ok()
    }

    pub fn is_loaded(&self) -> bool {
        self.library.get().is_some()
    }

    pub fn library(&self) -> Option<&TypeLibrary> {
        self.library.get()
    }

    pub fn resolve_type(&self, name: &str) -> Option<&TypeDescriptor> {
        self.library.get()?.get(name)
    }

    pub fn resolve_enum_values(&self, enum_name: &str) -> Option<&BTreeMap<i32, String>> {
        self.library
            .get()?
            .find_enum(enum_name)
            .map(|descriptor| &descriptor.values)
    }

    pub fn enum_name(&self, enum_name: &str, raw: i32) -> Option<&str> {
        self.resolve_enum_values(enum_name)?
            .get(&raw)
            .map(String::as_str)
    }

    /// Reverse lookup, case-insensitive on the label.
    pub fn enum_value(&self, enum_name: &str, label: &str) -> Option<i32> {
        self.resolve_enum_values(enum_name)?
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(label))
            .map(|(&raw, _)| raw)
    }
}

/// Classify a declared member type: built-in .NET names first, then the
/// type library. Unknown names are assumed to be records.
pub fn classify_declared_type(name: &str, resolver: Option<&TypeResolver>) -> TypeKind {
    if let Some(kind) = builtin_kind(name) {
        return kind;
    }
    resolver
        .and_then(|r| r.resolve_type(name))
        .map(|descriptor| descriptor.kind)
        .unwrap_or(TypeKind::Record)
}

fn builtin_kind(name: &str) -> Option<TypeKind> {
    match name {
        "System.Boolean" | "System.Byte" | "System.SByte" | "System.Int16" | "System.UInt16"
        | "System.Int32" | "System.UInt32" | "System.Int64" | "System.UInt64"
        | "System.Single" | "System.Double" | "System.Char" | "bool" | "byte" | "short"
        | "int" | "uint" | "long" | "ulong" | "float" | "double" | "char" => {
            return Some(TypeKind::Primitive);
        }
        "System.String" | "string" => return Some(TypeKind::String),
        "System.Object" | "object" => return Some(TypeKind::Object),
        _ => {}
    }

    let generic = name.split('[').next().unwrap_or(name);
    if name.ends_with("[]") || generic.starts_with("System.Collections.Generic.List`") {
        return Some(TypeKind::Array);
    }
    if generic.starts_with("System.Collections.Generic.Dictionary`")
        || generic.starts_with("System.Collections.Generic.SortedDictionary`")
    {
        return Some(TypeKind::Dictionary);
    }
    if generic.starts_with("System.Collections.Generic.HashSet`") {
        return Some(TypeKind::Set);
    }
    None
}

/// Find the descriptor file under an install root: fixed platform layouts
/// first, then a depth-bounded search.
pub fn locate_type_library(install_path: &Path) -> Option<PathBuf> {
    const LAYOUTS: [&[&str]; 4] = [
        &["Peglin_Data", "Managed"],
        &["Contents", "Resources", "Data", "Managed"],
        &["Peglin.app", "Contents", "Resources", "Data", "Managed"],
        &[],
    ];

    for layout in LAYOUTS {
        for file_name in LIBRARY_FILE_NAMES {
            let mut parts = layout.to_vec();
            parts.push(file_name);
            if let Some(path) = resolve_case_insensitive_path(install_path, &parts)
                && path.is_file()
            {
                return Some(path);
            }
        }
    }

    search_for_library(install_path, MAX_SEARCH_DEPTH)
}

fn search_for_library(dir: &Path, depth_left: usize) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            subdirs.push(path);
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if LIBRARY_FILE_NAMES
            .iter()
            .any(|candidate| name.eq_ignore_ascii_case(candidate))
        {
            return Some(path);
        }
    }

    if depth_left == 0 {
        return None;
    }
    subdirs.sort();
    subdirs
        .iter()
        .find_map(|subdir| search_for_library(subdir, depth_left - 1))
}

pub(crate) fn resolve_case_insensitive_path(base: &Path, parts: &[&str]) -> Option<PathBuf> {
    let mut current = base.to_path_buf();
    for part in parts {
        current = resolve_case_insensitive_component(&current, part)?;
    }
    Some(current)
}

fn resolve_case_insensitive_component(base: &Path, part: &str) -> Option<PathBuf> {
    let direct = base.join(part);
    if direct.exists() {
        return Some(direct);
    }

    let entries = fs::read_dir(base).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().eq_ignore_ascii_case(part) {
            return Some(entry.path());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write as _;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::{
        TypeKind, TypeLibrary, TypeResolver, classify_declared_type, locate_type_library,
    };
    use crate::core_api::CoreErrorCode;

    const LIBRARY_JSON: &str = r#"{
        "assembly": "Assembly-CSharp",
        "types": [
            {"name": "Peglin.ClassSystem.Class", "kind": "enum",
             "values": {"0": "Peglin", "1": "Balladin"}},
            {"name": "Legacy.Class", "kind": "enum", "values": {"0": "Old"}},
            {"name": "Worldmap.RoomType", "kind": "enum",
             "values": {"0": "Battle", "2": "Boss"}},
            {"name": "Stats.RunStats", "kind": "record"}
        ]
    }"#;

    fn library() -> TypeLibrary {
        TypeLibrary::from_json_str(LIBRARY_JSON).expect("library parses")
    }

    #[test]
    fn enum_lookup_prefers_exact_then_first_simple_name() {
        let resolver = TypeResolver::with_library(library());
        assert_eq!(resolver.enum_name("Legacy.Class", 0), Some("Old"));
        assert_eq!(resolver.enum_name("Class", 1), Some("Balladin"));
        assert_eq!(resolver.enum_name("Some.Other.RoomType", 2), Some("Boss"));
        assert_eq!(resolver.enum_name("RoomType", 7), None);
        assert_eq!(resolver.enum_value("Class", "balladin"), Some(1));
    }

    #[test]
    fn unloaded_resolver_answers_not_found() {
        let resolver = TypeResolver::new();
        assert!(!resolver.is_loaded());
        assert!(resolver.resolve_type("Stats.RunStats").is_none());
        assert!(resolver.resolve_enum_values("Class").is_none());
        assert!(!resolver.load_type_library(&std::env::temp_dir().join("no-such-install")));
    }

    #[test]
    fn classification_uses_builtins_then_library() {
        let resolver = TypeResolver::with_library(library());
        assert_eq!(classify_declared_type("System.Int64", None), TypeKind::Primitive);
        assert_eq!(
            classify_declared_type("System.Collections.Generic.List`1[Stats.RunStats]", None),
            TypeKind::Array
        );
        assert_eq!(
            classify_declared_type("System.Collections.Generic.HashSet`1[System.Int32]", None),
            TypeKind::Set
        );
        assert_eq!(classify_declared_type("Worldmap.RoomType", None), TypeKind::Record);
        assert_eq!(
            classify_declared_type("Worldmap.RoomType", Some(&resolver)),
            TypeKind::Enum
        );
    }

    #[test]
    fn locates_library_in_platform_layout_case_insensitively() {
        let root = tempfile::tempdir().expect("tempdir");
        let managed = root.path().join("PEGLIN_DATA").join("Managed");
        fs::create_dir_all(&managed).expect("create managed dir");
        fs::write(managed.join("Assembly-CSharp.types.json"), LIBRARY_JSON).expect("write");

        let found = locate_type_library(root.path()).expect("library should be found");
        assert!(found.ends_with("Assembly-CSharp.types.json"));

        let resolver = TypeResolver::new();
        assert!(resolver.load_type_library(root.path()));
        assert_eq!(resolver.enum_name("Class", 0), Some("Peglin"));
    }

    #[test]
    fn finds_gzip_library_by_bounded_search() {
        let root = tempfile::tempdir().expect("tempdir");
        let nested = root.path().join("a").join("b").join("c");
        fs::create_dir_all(&nested).expect("create nested dirs");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(LIBRARY_JSON.as_bytes())
            .expect("compress library");
        let compressed = encoder.finish().expect("finish gzip");
        fs::write(nested.join("Assembly-CSharp.types.json.gz"), compressed).expect("write");

        let found = locate_type_library(root.path()).expect("library should be found");
        let library = TypeLibrary::load_file(&found).expect("gzip library loads");
        assert_eq!(library.assembly(), "Assembly-CSharp");
        assert_eq!(library.len(), 4);
    }

    #[test]
    fn search_depth_is_bounded() {
        let root = tempfile::tempdir().expect("tempdir");
        let mut deep = root.path().to_path_buf();
        for i in 0..8 {
            deep = deep.join(format!("d{i}"));
        }
        fs::create_dir_all(&deep).expect("create deep dirs");
        fs::write(deep.join("Assembly-CSharp.types.json"), LIBRARY_JSON).expect("write");
        assert!(locate_type_library(root.path()).is_none());
    }

    #[test]
    fn invalid_utf8_library_is_rejected() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = root.path().join("Assembly-CSharp.types.json");
        let mut bytes = LIBRARY_JSON.as_bytes().to_vec();
        bytes.insert(20, 0xFF);
        fs::write(&path, bytes).expect("write");

        let err = TypeLibrary::load_file(&path).expect_err("invalid UTF-8 should fail");
        assert_eq!(err.code, CoreErrorCode::Parse);
        assert!(err.message.contains("not valid UTF-8"));
    }
}
