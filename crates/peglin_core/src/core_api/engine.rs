use std::path::Path;
use std::sync::Arc;

use crate::editor::{self, CommitReport, FieldPath};
use crate::export::{self, ExportEnvelope};
use crate::graph::{Dialect, Graph, Value, decode};
use crate::navigator;
use crate::runs::{extract_run_history, get_run_by_index, summarize};
use crate::type_library::TypeResolver;

use super::error::{CoreError, CoreErrorCode};
use super::types::{Capabilities, CapabilityIssue, RunRecord, RunSummary};

/// Entry point for opening save and stats streams. Cheap to clone; clones
/// share one type resolver.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    resolver: Arc<TypeResolver>,
}

/// One decoded stream plus the runs extracted from it.
#[derive(Debug)]
pub struct Session {
    resolver: Arc<TypeResolver>,
    original: Vec<u8>,
    graph: Graph,
    runs: Vec<RunRecord>,
    capabilities: Capabilities,
    changes: Vec<(FieldPath, Value)>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(resolver: Arc<TypeResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Arc<TypeResolver> {
        &self.resolver
    }

    /// Locate and load the type library under `install_path`.
    pub fn load_type_library(&self, install_path: &Path) -> bool {
        self.resolver.load_type_library(install_path)
    }

    pub fn open_bytes<B: AsRef<[u8]>>(
        &self,
        bytes: B,
        hint: Option<Dialect>,
    ) -> Result<Session, CoreError> {
        let bytes = bytes.as_ref();
        let resolver = self.resolver.as_ref();
        let graph = decode(bytes, hint, Some(resolver)).map_err(|e| {
            let furthest = e
                .furthest_offset()
                .map(|offset| format!(" (furthest byte reached: {offset})"))
                .unwrap_or_default();
            CoreError::new(
                CoreErrorCode::Parse,
                format!("failed to decode stream: {e}{furthest}"),
            )
        })?;

        let runs = extract_run_history(&graph, Some(resolver));
        let capabilities = capabilities_for(&graph, &runs, resolver);
        Ok(Session {
            resolver: Arc::clone(&self.resolver),
            original: bytes.to_vec(),
            graph,
            runs,
            capabilities,
            changes: Vec::new(),
        })
    }

    pub fn open_path(&self, path: &Path, hint: Option<Dialect>) -> Result<Session, CoreError> {
        let bytes = std::fs::read(path).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to read {}: {e}", path.display()),
            )
        })?;
        self.open_bytes(bytes, hint)
    }
}

impl Session {
    pub fn dialect(&self) -> Dialect {
        self.graph.dialect()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    pub fn run(&self, index: usize) -> Option<&RunRecord> {
        get_run_by_index(&self.runs, index)
    }

    pub fn summary(&self) -> RunSummary {
        summarize(&self.runs)
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        navigator::get_section(&self.graph, name)
    }

    pub fn section_names(&self) -> Vec<String> {
        navigator::section_names(&self.graph)
    }

    pub fn is_modified(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn export(&self, exported: &str) -> ExportEnvelope {
        export::export_runs(&self.graph, &self.runs, exported)
    }

    pub fn to_bytes_unmodified(&self) -> Result<Vec<u8>, CoreError> {
        Ok(self.original.clone())
    }

    /// Re-serialize the edited graph with the dialect it was decoded with,
    /// after checking that every edit survives a decode of the output.
    pub fn to_bytes_modified(&self) -> Result<Vec<u8>, CoreError> {
        editor::serialize_validated(&self.graph, Some(self.resolver.as_ref()), &self.changes)
    }

    pub fn set_field(&mut self, path: &str, value: Value) -> Result<(), CoreError> {
        let path = FieldPath::parse(path)?;
        if !editor::update_field(&mut self.graph, &path, value.clone()) {
            return Err(CoreError::new(
                CoreErrorCode::Validation,
                format!("cannot set {path}: field missing or of a different type"),
            ));
        }
        self.changes.push((path, value));
        self.refresh_runs();
        Ok(())
    }

    pub fn set_class_cruciball(&mut self, class: &str, level: i64) -> Result<(), CoreError> {
        let path = editor::set_class_cruciball(
            &mut self.graph,
            Some(self.resolver.as_ref()),
            class,
            level,
        )?;
        if let Some(value) = editor::read_field(&self.graph, &path).cloned() {
            self.changes.push((path, value));
        }
        Ok(())
    }

    /// Validate, back up and write the edited stream to `path`.
    pub fn write_update(&self, path: &Path) -> Result<CommitReport, CoreError> {
        if !self.is_modified() {
            return Err(CoreError::new(
                CoreErrorCode::UnsupportedOperation,
                "no changes to write",
            ));
        }
        let bytes = self.to_bytes_modified()?;
        editor::commit_to_file(path, &bytes)
    }

    fn refresh_runs(&mut self) {
        self.runs = extract_run_history(&self.graph, Some(self.resolver.as_ref()));
        self.capabilities = capabilities_for(&self.graph, &self.runs, &self.resolver);
    }
}

fn capabilities_for(graph: &Graph, runs: &[RunRecord], resolver: &TypeResolver) -> Capabilities {
    let mut issues = Vec::new();
    if runs.iter().any(|r| r.reconstructed) {
        issues.push(CapabilityIssue::ReconstructedHistory);
    }
    if !resolver.is_loaded() {
        issues.push(CapabilityIssue::MissingTypeLibrary);
    }
    if editor::cruciball_progress_path(graph).is_none() {
        issues.push(CapabilityIssue::FreshProfile);
    }
    Capabilities::editable(issues)
}
