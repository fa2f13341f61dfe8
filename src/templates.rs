//! Starter files written by `specgen init`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

/// Example requirements: a small RTL counter.
pub const REQUIREMENTS_TXT: &str = r#"The project is to design a simple counter.
The counter should be 8 bits wide.
It should have an enable signal.
It should have a synchronous reset.
It should count up.
"#;

/// Example template for an RTL module specification.
///
/// Empty strings are placeholders. The first item of each list is the shape
/// every generated item must follow.
pub const TEMPLATE_YAML: &str = r#"module_name: ""  # Name of the module
description: ""  # Brief description of the module
inputs:
  - name: ""         # Input signal name
    width: ""        # Input signal width
    description: ""  # Input signal description
  - name: ""
    width: ""
    description: ""
outputs:
  - name: ""         # Output signal name
    width: ""        # Output signal width
    description: ""  # Output signal description
parameters:
  - name: ""         # Parameter name
    value: ""        # Parameter value
    description: ""  # Parameter description
"#;

/// Outcome for one starter file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Written(PathBuf),
    Skipped(PathBuf),
}

/// Write the starter requirements and template into `dir`.
///
/// Existing files are left untouched unless `force` is set.
pub fn write_starter_files(dir: &Path, force: bool) -> io::Result<Vec<FileOutcome>> {
    fs::create_dir_all(dir)?;

    let mut outcomes = Vec::new();
    for (name, contents) in [
        ("requirements.txt", REQUIREMENTS_TXT),
        ("template.yaml", TEMPLATE_YAML),
    ] {
        let path = dir.join(name);
        if path.exists() && !force {
            info!(path = ?path, "starter_file_skipped");
            outcomes.push(FileOutcome::Skipped(path));
            continue;
        }
        fs::write(&path, contents)?;
        info!(path = ?path, "starter_file_written");
        outcomes.push(FileOutcome::Written(path));
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;
    use tempfile::TempDir;

    #[test]
    fn test_template_parses_to_mapping_with_expected_keys() {
        let value: Value = serde_yaml::from_str(TEMPLATE_YAML).unwrap();
        let mapping = value.as_mapping().unwrap();
        let keys: Vec<&str> = mapping.keys().filter_map(Value::as_str).collect();
        assert_eq!(
            keys,
            vec!["module_name", "description", "inputs", "outputs", "parameters"]
        );
        assert!(value["inputs"][0].is_mapping());
    }

    #[test]
    fn test_requirements_mentions_counter() {
        assert!(REQUIREMENTS_TXT.contains("8 bits wide"));
    }

    #[test]
    fn test_write_starter_files_creates_both() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("project");
        let outcomes = write_starter_files(&target, false).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(o, FileOutcome::Written(_))));
        assert_eq!(
            fs::read_to_string(target.join("template.yaml")).unwrap(),
            TEMPLATE_YAML
        );
    }

    #[test]
    fn test_write_starter_files_skips_existing_without_force() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("template.yaml"), "custom: ''\n").unwrap();

        let outcomes = write_starter_files(dir.path(), false).unwrap();
        assert_eq!(
            outcomes[1],
            FileOutcome::Skipped(dir.path().join("template.yaml"))
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("template.yaml")).unwrap(),
            "custom: ''\n"
        );
    }

    #[test]
    fn test_write_starter_files_force_overwrites() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("template.yaml"), "custom: ''\n").unwrap();

        write_starter_files(dir.path(), true).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("template.yaml")).unwrap(),
            TEMPLATE_YAML
        );
    }
}
