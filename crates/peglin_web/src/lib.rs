use std::sync::Arc;

use peglin_core::core_api::{Engine, Session};
use peglin_core::graph::Dialect;
use peglin_core::type_library::{TypeLibrary, TypeResolver};
use peglin_render::{JsonStyle, TextRenderOptions, render_json_summary, render_text_summary};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

const METADATA_MODE_TYPE_LIBRARY: &str = "type_library";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WebRenderOptions {
    pub dialect_hint: Option<String>,
    pub json_output: bool,
    pub metadata: Option<MetadataOptions>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MetadataOptions {
    pub mode: String,
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
struct WebError {
    code: &'static str,
    message: String,
}

#[derive(Debug, Clone, Serialize)]
struct WebErrorPayload {
    code: String,
    message: String,
}

impl WebError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_js_value(&self) -> JsValue {
        let payload = WebErrorPayload {
            code: self.code.to_string(),
            message: self.message.clone(),
        };
        serde_wasm_bindgen::to_value(&payload).unwrap_or_else(|_| {
            JsValue::from_str(&format!("{}: {}", payload.code, payload.message))
        })
    }
}

#[wasm_bindgen]
pub fn render_stats_text(stats_bytes: &[u8], options: JsValue) -> Result<String, JsValue> {
    let parsed_options = parse_options(options).map_err(|err| err.to_js_value())?;
    render_stats_text_impl(stats_bytes, &parsed_options).map_err(|err| err.to_js_value())
}

#[wasm_bindgen]
pub fn extract_runs_json(stats_bytes: &[u8], options: JsValue) -> Result<String, JsValue> {
    let parsed_options = parse_options(options).map_err(|err| err.to_js_value())?;
    extract_runs_json_impl(stats_bytes, &parsed_options).map_err(|err| err.to_js_value())
}

fn render_stats_text_impl(
    stats_bytes: &[u8],
    options: &WebRenderOptions,
) -> Result<String, WebError> {
    let session = open_session(stats_bytes, options)?;
    if options.json_output {
        return to_pretty_json(&render_json_summary(&session, JsonStyle::CanonicalV1));
    }
    Ok(render_text_summary(
        &session,
        TextRenderOptions { verbose: false },
    ))
}

fn extract_runs_json_impl(
    stats_bytes: &[u8],
    options: &WebRenderOptions,
) -> Result<String, WebError> {
    let session = open_session(stats_bytes, options)?;
    let runs = serde_json::to_value(session.runs()).map_err(|err| {
        WebError::new("render_failed", format!("failed to serialize runs: {err}"))
    })?;
    let value = serde_json::json!({
        "summary": render_json_summary(&session, JsonStyle::CanonicalV1),
        "runs": runs,
    });
    to_pretty_json(&value)
}

fn open_session(stats_bytes: &[u8], options: &WebRenderOptions) -> Result<Session, WebError> {
    if stats_bytes.is_empty() {
        return Err(WebError::new(
            "unsupported_file",
            "The uploaded file is empty. Please provide a Stats_<N>.data file.",
        ));
    }

    let dialect_hint = parse_dialect_hint(options.dialect_hint.as_deref())?;
    let engine = match load_metadata(options.metadata.as_ref())? {
        Some(library) => Engine::with_resolver(Arc::new(TypeResolver::with_library(library))),
        None => Engine::new(),
    };
    engine
        .open_bytes(stats_bytes, dialect_hint)
        .map_err(|err| WebError::new("parse_failed", err.to_string()))
}

fn to_pretty_json(value: &serde_json::Value) -> Result<String, WebError> {
    serde_json::to_string_pretty(value).map_err(|err| {
        WebError::new(
            "render_failed",
            format!("failed to serialize rendered JSON output: {err}"),
        )
    })
}

fn parse_options(options: JsValue) -> Result<WebRenderOptions, WebError> {
    if options.is_null() || options.is_undefined() {
        return Ok(WebRenderOptions::default());
    }

    serde_wasm_bindgen::from_value(options).map_err(|err| {
        WebError::new(
            "invalid_options",
            format!("Failed to parse web render options: {err}"),
        )
    })
}

fn parse_dialect_hint(raw_hint: Option<&str>) -> Result<Option<Dialect>, WebError> {
    let Some(raw_hint) = raw_hint else {
        return Ok(None);
    };
    if raw_hint.trim().is_empty() {
        return Ok(None);
    }

    Dialect::parse(raw_hint).map(Some).ok_or_else(|| {
        WebError::new(
            "invalid_options",
            format!(
                "Invalid dialect_hint '{raw_hint}'. Expected one of: permissive, standard, strict"
            ),
        )
    })
}

fn load_metadata(metadata: Option<&MetadataOptions>) -> Result<Option<TypeLibrary>, WebError> {
    let Some(metadata) = metadata else {
        return Ok(None);
    };
    let mode = metadata.mode.trim();
    if mode.is_empty() && metadata.payload.is_none() {
        return Ok(None);
    }
    if mode != METADATA_MODE_TYPE_LIBRARY {
        return Err(WebError::new(
            "invalid_options",
            format!("Unsupported metadata mode '{mode}'. Expected '{METADATA_MODE_TYPE_LIBRARY}'"),
        ));
    }
    let payload = metadata.payload.clone().ok_or_else(|| {
        WebError::new(
            "invalid_options",
            "metadata mode 'type_library' needs a payload",
        )
    })?;
    TypeLibrary::from_json_value(payload)
        .map(Some)
        .map_err(|err| WebError::new("invalid_metadata", err.to_string()))
}
