//! Preflight path checks, run before any model call is made.

use std::path::Path;

/// Convert an I/O error to an appropriate error message for file validation.
fn file_error_message(error: &std::io::Error) -> String {
    match error.kind() {
        std::io::ErrorKind::NotFound => "File not found".to_string(),
        std::io::ErrorKind::PermissionDenied => "Cannot access file".to_string(),
        _ => "Invalid path".to_string(),
    }
}

/// Check if metadata indicates a valid file (pure function).
/// Returns an error message if validation fails, None if valid.
fn check_file_metadata(is_file: bool) -> Option<String> {
    if !is_file {
        Some("Path is not a file".to_string())
    } else {
        None
    }
}

/// Validate that a path points to an existing file.
/// Returns an error message if validation fails, None if valid.
pub fn validate_file_exists(path: &Path) -> Option<String> {
    if path.as_os_str().is_empty() {
        return Some("Path cannot be empty".to_string());
    }

    match std::fs::metadata(path) {
        Ok(metadata) => check_file_metadata(metadata.is_file()),
        Err(e) => Some(file_error_message(&e)),
    }
}

/// Check if metadata indicates a valid directory (pure function).
fn check_directory_metadata(is_dir: bool) -> Option<String> {
    if !is_dir {
        Some("Path is not a directory".to_string())
    } else {
        None
    }
}

/// Convert an I/O error to an appropriate error message for directory validation.
fn directory_error_message(error: &std::io::Error) -> String {
    match error.kind() {
        std::io::ErrorKind::NotFound => "Directory not found".to_string(),
        std::io::ErrorKind::PermissionDenied => "Cannot access directory".to_string(),
        _ => "Invalid path".to_string(),
    }
}

/// Validate that a path points to an existing directory.
pub fn validate_directory_exists(path: &Path) -> Option<String> {
    if path.as_os_str().is_empty() {
        return Some("Path cannot be empty".to_string());
    }

    match std::fs::metadata(path) {
        Ok(metadata) => check_directory_metadata(metadata.is_dir()),
        Err(e) => Some(directory_error_message(&e)),
    }
}

/// Validate that an output file can be created: its parent directory must exist
/// and the path itself must not be a directory.
pub fn validate_output_path(path: &Path) -> Option<String> {
    if path.as_os_str().is_empty() {
        return Some("Path cannot be empty".to_string());
    }
    if path.is_dir() {
        return Some("Path is a directory".to_string());
    }

    match path.parent() {
        // A bare file name lands in the working directory
        Some(parent) if parent.as_os_str().is_empty() => None,
        Some(parent) => validate_directory_exists(parent),
        None => Some("Invalid path".to_string()),
    }
}

/// A labelled preflight failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathProblem {
    pub label: &'static str,
    pub path: String,
    pub message: String,
}

/// Run every check and collect the failures, so all of them can be reported at once.
pub fn preflight(inputs: &[(&'static str, &Path)], output: Option<&Path>) -> Vec<PathProblem> {
    let mut problems = Vec::new();
    for &(label, path) in inputs {
        if let Some(message) = validate_file_exists(path) {
            problems.push(PathProblem {
                label,
                path: path.display().to_string(),
                message,
            });
        }
    }
    if let Some(path) = output
        && let Some(message) = validate_output_path(path)
    {
        problems.push(PathProblem {
            label: "output",
            path: path.display().to_string(),
            message,
        });
    }
    problems
}
