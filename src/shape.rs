//! Template shape validation.
//!
//! A template is a YAML mapping whose keys must all be present in a generated
//! document. Mapping and sequence values also fix the container kind of the
//! generated value, and the first element of a template sequence (when it is a
//! mapping) is the schema every generated item is checked against.

use std::fmt;

use serde_yaml::{Mapping, Value};

/// Coarse kind of a YAML node, as far as shape matching is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Mapping,
    Sequence,
    Scalar,
    Null,
}

impl ShapeKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Mapping(_) => Self::Mapping,
            Value::Sequence(_) => Self::Sequence,
            Value::Null => Self::Null,
            Value::Tagged(tagged) => Self::of(&tagged.value),
            Value::Bool(_) | Value::Number(_) | Value::String(_) => Self::Scalar,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Mapping => "mapping",
            Self::Sequence => "sequence",
            Self::Scalar => "scalar",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Location of a node inside a document, rendered like `inputs[1].width`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapePath(Vec<Segment>);

impl ShapePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn key(&self, key: &Value) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key_label(key)));
        Self(segments)
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        Self(segments)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ShapePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{}", key)?,
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// Renders a mapping key for display. Non-string keys fall back to their YAML form.
fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "~".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| "?".to_string()),
    }
}

/// A single mismatch between a template and a generated document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeViolation {
    MissingKey {
        path: ShapePath,
    },
    TypeMismatch {
        path: ShapePath,
        expected: ShapeKind,
        found: ShapeKind,
    },
}

impl ShapeViolation {
    pub fn path(&self) -> &ShapePath {
        match self {
            Self::MissingKey { path } | Self::TypeMismatch { path, .. } => path,
        }
    }
}

impl fmt::Display for ShapeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey { path } => write!(f, "key '{}' missing in generated output", path),
            Self::TypeMismatch {
                path,
                expected,
                found,
            } => write!(f, "'{}' should be a {}, found {}", path, expected, found),
        }
    }
}

/// Every violation found in one validation pass, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<ShapeViolation>,
}

impl ValidationReport {
    pub fn is_conforming(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

/// What the caller does with a non-empty report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Any violation fails the run.
    Strict,
    /// Violations are logged; the document is kept.
    Lenient,
}

impl ValidationPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict { Self::Strict } else { Self::Lenient }
    }
}

/// Check `generated` against the shape of `template`, collecting every violation.
///
/// A `generated` document that is not a mapping yields a single root
/// `TypeMismatch` and nothing else is checked.
pub fn validate(template: &Mapping, generated: &Value) -> ValidationReport {
    let mut violations = Vec::new();
    check_node(template, generated, &ShapePath::root(), &mut violations);
    ValidationReport { violations }
}

fn check_node(
    template: &Mapping,
    generated: &Value,
    path: &ShapePath,
    violations: &mut Vec<ShapeViolation>,
) {
    let Some(generated) = as_mapping(generated) else {
        violations.push(ShapeViolation::TypeMismatch {
            path: path.clone(),
            expected: ShapeKind::Mapping,
            found: ShapeKind::of(generated),
        });
        return;
    };
    check_mapping(template, generated, path, violations);
}

fn check_mapping(
    template: &Mapping,
    generated: &Mapping,
    path: &ShapePath,
    violations: &mut Vec<ShapeViolation>,
) {
    for (key, expected) in template {
        let key_path = path.key(key);
        let Some(actual) = generated.get(key) else {
            violations.push(ShapeViolation::MissingKey { path: key_path });
            continue;
        };

        if let Some(inner) = as_mapping(expected) {
            check_node(inner, actual, &key_path, violations);
        } else if let Some(items) = as_sequence(expected) {
            let Some(actual_items) = as_sequence(actual) else {
                violations.push(ShapeViolation::TypeMismatch {
                    path: key_path,
                    expected: ShapeKind::Sequence,
                    found: ShapeKind::of(actual),
                });
                continue;
            };
            // The first template item is the per-item schema
            if let Some(item_schema) = items.first().and_then(as_mapping) {
                for (index, item) in actual_items.iter().enumerate() {
                    check_node(item_schema, item, &key_path.index(index), violations);
                }
            }
        }
    }
}

fn as_mapping(value: &Value) -> Option<&Mapping> {
    match value {
        Value::Mapping(m) => Some(m),
        Value::Tagged(tagged) => as_mapping(&tagged.value),
        _ => None,
    }
}

fn as_sequence(value: &Value) -> Option<&[Value]> {
    match value {
        Value::Sequence(s) => Some(s.as_slice()),
        Value::Tagged(tagged) => as_sequence(&tagged.value),
        _ => None,
    }
}
