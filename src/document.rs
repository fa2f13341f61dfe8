//! Loading and writing the YAML documents a run works with.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use crate::error::{GenerateError, InputRole, WriteError};

/// A parsed template together with the text form embedded in the prompt.
#[derive(Debug, Clone)]
pub struct Template {
    pub shape: Mapping,
    pub serialized: String,
}

/// Parse YAML text into a value with every `<<` merge key expanded.
fn parse_yaml(text: &str) -> Result<Value, serde_yaml::Error> {
    let mut value: Value = serde_yaml::from_str(text)?;
    value.apply_merge()?;
    Ok(value)
}

/// Read the free-text requirements. Any content is accepted, including an empty file.
pub fn load_requirements(path: &Path) -> Result<String, GenerateError> {
    let text = fs::read_to_string(path)
        .map_err(|e| GenerateError::from_read(InputRole::Requirements, path.to_path_buf(), e))?;
    debug!(path = ?path, bytes = text.len(), "requirements_loaded");
    Ok(text)
}

/// Read a YAML file that must hold a mapping at the top level.
pub fn load_mapping(path: &Path, role: InputRole) -> Result<Mapping, GenerateError> {
    let text = fs::read_to_string(path)
        .map_err(|e| GenerateError::from_read(role, path.to_path_buf(), e))?;
    let value = parse_yaml(&text).map_err(|e| GenerateError::Parse {
        role,
        path: path.to_path_buf(),
        source: e,
    })?;
    match value {
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(GenerateError::TemplateNotMapping {
            path: path.to_path_buf(),
        }),
    }
}

/// Load a template and re-serialize it for the prompt.
///
/// Re-serializing drops comments and normalizes quoting; key order is kept.
pub fn load_template(path: &Path) -> Result<Template, GenerateError> {
    let shape = load_mapping(path, InputRole::Template)?;
    let serialized = serde_yaml::to_string(&shape).map_err(|e| GenerateError::Parse {
        role: InputRole::Template,
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!(path = ?path, keys = shape.len(), "template_loaded");
    Ok(Template { shape, serialized })
}

/// Load any YAML document, without constraining its top-level kind.
pub fn load_document(path: &Path) -> Result<Value, GenerateError> {
    let text = fs::read_to_string(path)
        .map_err(|e| GenerateError::from_read(InputRole::Document, path.to_path_buf(), e))?;
    parse_yaml(&text).map_err(|e| GenerateError::Parse {
        role: InputRole::Document,
        path: path.to_path_buf(),
        source: e,
    })
}

/// Remove one enclosing markdown code fence, if the whole response is wrapped in one.
fn strip_code_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    let body_start = rest.find('\n')?;
    let info = rest[..body_start].trim();
    if !info.is_empty() && !info.eq_ignore_ascii_case("yaml") && !info.eq_ignore_ascii_case("yml")
    {
        return None;
    }
    let body = rest[body_start + 1..].trim_end();
    let body = body.strip_suffix("```")?;
    Some(body)
}

/// Parse the model's text response as YAML.
///
/// Surrounding whitespace and a single enclosing code fence are tolerated;
/// anything else that fails to parse is a `Response` error carrying the raw text.
pub fn parse_response(raw: &str) -> Result<Value, GenerateError> {
    let trimmed = raw.trim();
    let body = match strip_code_fence(trimmed) {
        Some(body) => {
            warn!("model_response_fenced");
            body
        }
        None => trimmed,
    };
    parse_yaml(body).map_err(|e| GenerateError::Response {
        source: e,
        raw: raw.to_string(),
    })
}

/// Serialize a document to YAML text, keeping mapping order.
pub fn render(value: &Value) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(value)
}

/// Write a document to `path`.
pub fn write_document(path: &Path, value: &Value) -> Result<(), GenerateError> {
    let write_failed = |source: WriteError| {
        warn!(path = ?path, error = %source, "document_write_failed");
        GenerateError::Write {
            path: path.to_path_buf(),
            source,
        }
    };
    let text = render(value).map_err(|e| write_failed(e.into()))?;
    fs::write(path, text).map_err(|e| write_failed(e.into()))?;
    debug!(path = ?path, "document_written");
    Ok(())
}

/// Write a rendered document to an open stream; `label` names it in errors.
pub fn write_stream(out: &mut dyn Write, label: &Path, value: &Value) -> Result<(), GenerateError> {
    let write_failed = |source: WriteError| GenerateError::Write {
        path: label.to_path_buf(),
        source,
    };
    let text = render(value).map_err(|e| write_failed(e.into()))?;
    out.write_all(text.as_bytes())
        .and_then(|()| out.flush())
        .map_err(|e| write_failed(e.into()))
}
