//! Error taxonomy for a generation run.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::ModelError;
use crate::shape::ShapeViolation;

/// Which input file an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRole {
    Requirements,
    Template,
    Document,
}

impl fmt::Display for InputRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requirements => "requirements",
            Self::Template => "template",
            Self::Document => "document",
        })
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("{role} file not found: {}", .path.display())]
    FileNotFound { role: InputRole, path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse YAML {role} {}: {source}", .path.display())]
    Parse {
        role: InputRole,
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{} must contain a mapping at the top level", .path.display())]
    TemplateNotMapping { path: PathBuf },

    #[error("model invocation failed: {0}")]
    Model(#[from] ModelError),

    #[error("model response is not valid YAML: {source}")]
    Response {
        #[source]
        source: serde_yaml::Error,
        raw: String,
    },

    #[error("generated output does not match the template ({} violation(s))", .violations.len())]
    Shape {
        violations: Vec<ShapeViolation>,
        raw: String,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: WriteError,
    },
}

/// Why an output document could not be written.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("could not render YAML: {0}")]
    Render(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl GenerateError {
    /// Raw model output attached to response and shape failures.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::Response { raw, .. } | Self::Shape { raw, .. } => Some(raw.as_str()),
            _ => None,
        }
    }

    /// Map a read failure, turning `NotFound` into `FileNotFound`.
    pub fn from_read(role: InputRole, path: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::FileNotFound { role, path }
        } else {
            Self::Io { path, source }
        }
    }
}
