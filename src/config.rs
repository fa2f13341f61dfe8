use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::model::ModelError;
use crate::prompt::DEFAULT_ROLE;

/// Status of config file loading
#[derive(Debug, Clone)]
pub enum ConfigLoadStatus {
    /// Config loaded successfully from existing file
    Loaded,
    /// Created default config file (first run)
    Created,
    /// Error occurred during loading, using defaults.
    /// String is used in Debug output for logging.
    #[allow(dead_code)]
    Error(String),
}

/// Gemini API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub model: String,
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Settings file consulted when the variable is not set in the environment.
    pub env_file: String,
    pub temperature: Option<f32>,
    /// Request timeout. `None` waits for as long as the model takes.
    pub timeout_secs: Option<u64>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            env_file: "project.env".to_string(),
            temperature: None,
            timeout_secs: None,
        }
    }
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub requirements: String,
    pub template: String,
    pub output: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            requirements: "./requirements.txt".to_string(),
            template: "./template.yaml".to_string(),
            output: "./spec.yaml".to_string(),
        }
    }
}

/// Prompt configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub role: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            role: DEFAULT_ROLE.to_string(),
        }
    }
}

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// When true, any shape violation fails the run.
    /// When false, violations are logged and the document is still written.
    pub strict: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Config {
    /// Expand `~` to home directory in a path string
    pub fn expand_tilde(path: &str) -> PathBuf {
        if let Some(stripped) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(stripped);
        }
        PathBuf::from(path)
    }

    pub fn requirements_path(&self) -> PathBuf {
        Self::expand_tilde(&self.paths.requirements)
    }

    pub fn template_path(&self) -> PathBuf {
        Self::expand_tilde(&self.paths.template)
    }

    pub fn output_path(&self) -> PathBuf {
        Self::expand_tilde(&self.paths.output)
    }

    pub fn env_file_path(&self) -> PathBuf {
        Self::expand_tilde(&self.gemini.env_file)
    }
}

/// Resolve the Gemini API key.
///
/// The process environment wins; otherwise the env file is read into a local
/// map. The process environment is never modified.
pub fn resolve_api_key(config: &Config) -> Result<String, ModelError> {
    let var = &config.gemini.api_key_env;
    if let Ok(key) = env::var(var)
        && !key.trim().is_empty()
    {
        debug!(source = "environment", "api_key_resolved");
        return Ok(key);
    }

    let env_file = config.env_file_path();
    if let Some(key) = read_env_file_var(&env_file, var)? {
        debug!(source = %env_file.display(), "api_key_resolved");
        return Ok(key);
    }

    Err(ModelError::MissingApiKey {
        env_var: var.clone(),
        env_file: env_file.display().to_string(),
    })
}

/// Look up `var` in a dotenv-style file. A missing file is not an error.
fn read_env_file_var(path: &Path, var: &str) -> Result<Option<String>, ModelError> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(dotenvy::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ModelError::EnvFile {
                path: path.display().to_string(),
                message: e.to_string(),
            });
        }
    };

    for item in iter {
        let (key, value) = item.map_err(|e| ModelError::EnvFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if key == var && !value.trim().is_empty() {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Partial Gemini configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialGeminiConfig {
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
    pub env_file: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
}

/// Partial path configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialPathsConfig {
    pub requirements: Option<String>,
    pub template: Option<String>,
    pub output: Option<String>,
}

/// Partial prompt configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialPromptConfig {
    pub role: Option<String>,
}

/// Partial validation configuration for project overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialValidationConfig {
    pub strict: Option<bool>,
}

/// Project-specific configuration where every field is optional.
/// Parsed from `.specgen.toml` files. Fields that are `None` inherit from the global config.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialConfig {
    pub gemini: PartialGeminiConfig,
    pub paths: PartialPathsConfig,
    pub prompt: PartialPromptConfig,
    pub validation: PartialValidationConfig,
}

/// Merge a global config with a project-level partial config.
/// Project values override global values where present.
pub fn merge_config(global: &Config, project: &PartialConfig) -> Config {
    let pick = |project: &Option<String>, global: &String| {
        project.clone().unwrap_or_else(|| global.clone())
    };

    Config {
        gemini: GeminiConfig {
            model: pick(&project.gemini.model, &global.gemini.model),
            endpoint: pick(&project.gemini.endpoint, &global.gemini.endpoint),
            api_key_env: pick(&project.gemini.api_key_env, &global.gemini.api_key_env),
            env_file: pick(&project.gemini.env_file, &global.gemini.env_file),
            temperature: project.gemini.temperature.or(global.gemini.temperature),
            timeout_secs: project.gemini.timeout_secs.or(global.gemini.timeout_secs),
        },
        paths: PathsConfig {
            requirements: pick(&project.paths.requirements, &global.paths.requirements),
            template: pick(&project.paths.template, &global.paths.template),
            output: pick(&project.paths.output, &global.paths.output),
        },
        prompt: PromptConfig {
            role: pick(&project.prompt.role, &global.prompt.role),
        },
        validation: ValidationConfig {
            strict: project
                .validation
                .strict
                .unwrap_or(global.validation.strict),
        },
    }
}

/// Loaded configuration with metadata
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_path: PathBuf,
    pub project_config_path: Option<PathBuf>,
    pub status: ConfigLoadStatus,
}

/// Get the platform-appropriate config directory
fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "specgen", "specgen").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the full path to the config file
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.specgen.toml in current working directory).
pub fn get_project_config_path() -> Option<PathBuf> {
    let path = std::env::current_dir().ok()?.join(".specgen.toml");
    if path.exists() { Some(path) } else { None }
}

/// Load a project config (.specgen.toml) from the given path.
/// Returns Ok(PartialConfig) on success, Err(String) on parse/read failure.
fn load_project_config(path: &Path) -> Result<PartialConfig, String> {
    let contents = fs::read_to_string(path).map_err(|e| {
        warn!(path = ?path, error = %e, "project_config_read_failed");
        format!("Failed to read .specgen.toml: {}", e)
    })?;

    toml::from_str::<PartialConfig>(&contents).map_err(|e| {
        warn!(path = ?path, error = %e, "project_config_parse_failed");
        format!("Invalid .specgen.toml: {}", e)
    })
}

/// Load configuration from file, environment, and defaults.
///
/// An explicit `config_path` replaces the platform config file and is never
/// created on demand.
pub fn load_config(config_path: Option<&Path>) -> LoadedConfig {
    let (config_path, (mut config, status)) = match config_path {
        Some(path) => (path.to_path_buf(), load_config_file(path, false)),
        None => match get_config_path() {
            Some(path) => {
                let loaded = load_config_file(&path, true);
                (path, loaded)
            }
            None => {
                warn!("Could not determine config directory, using defaults");
                return LoadedConfig {
                    config: apply_env_overrides(Config::default()),
                    config_path: PathBuf::from("config.toml"),
                    project_config_path: None,
                    status: ConfigLoadStatus::Error(
                        "Could not determine config directory".to_string(),
                    ),
                };
            }
        },
    };

    debug!("Config path: {:?}", config_path);

    // Check for project-level .specgen.toml file
    let project_config_path = get_project_config_path();
    if let Some(ref project_path) = project_config_path {
        match load_project_config(project_path) {
            Ok(partial) => {
                config = merge_config(&config, &partial);
                info!(path = ?project_path, "project_config_loaded");
            }
            Err(e) => {
                warn!(path = ?project_path, error = %e, "project_config_error");
                // Keep using global config only
            }
        }
    }

    let config = apply_env_overrides(config);

    LoadedConfig {
        config,
        config_path,
        project_config_path,
        status,
    }
}

/// Parse config file contents. Unknown keys are ignored.
fn parse_config(contents: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(contents)
}

/// Load config from file, falling back to defaults on any problem.
///
/// A missing file is created with defaults when `create_if_missing` is set;
/// otherwise it is reported as a read error.
fn load_config_file(config_path: &Path, create_if_missing: bool) -> (Config, ConfigLoadStatus) {
    let contents = match fs::read_to_string(config_path) {
        Ok(contents) => contents,
        Err(e) if create_if_missing && e.kind() == io::ErrorKind::NotFound => {
            return create_default_config(config_path);
        }
        Err(e) => {
            warn!(path = ?config_path, error = %e, "config_read_failed");
            let message = if e.kind() == io::ErrorKind::PermissionDenied {
                "Permission denied reading config".to_string()
            } else {
                format!("Read error: {}", e)
            };
            return (Config::default(), ConfigLoadStatus::Error(message));
        }
    };

    match parse_config(&contents) {
        Ok(config) => {
            info!("Loaded config from {:?}", config_path);
            (config, ConfigLoadStatus::Loaded)
        }
        Err(e) => {
            warn!(path = ?config_path, error = %e, "config_parse_failed");
            (
                Config::default(),
                ConfigLoadStatus::Error(format!("Malformed TOML: {}", e)),
            )
        }
    }
}

/// Create the default config file
fn create_default_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    let config = Config::default();

    // Ensure parent directory exists
    if let Some(parent) = config_path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!(
            "Could not create config directory {:?}: {}. Continuing without file.",
            parent, e
        );
        return (
            config,
            ConfigLoadStatus::Error(format!("Could not create config directory: {}", e)),
        );
    }

    let toml_content = match toml::to_string_pretty(&config) {
        Ok(s) => s,
        Err(e) => {
            warn!("Could not serialize default config: {}", e);
            return (
                config,
                ConfigLoadStatus::Error(format!("Serialization error: {}", e)),
            );
        }
    };

    match fs::write(config_path, &toml_content) {
        Ok(()) => {
            info!("Created default config at {:?}", config_path);
            (config, ConfigLoadStatus::Created)
        }
        Err(e) => {
            warn!(
                "Could not write default config to {:?}: {}. Continuing without file.",
                config_path, e
            );
            (
                config,
                ConfigLoadStatus::Error(format!("Write error: {}", e)),
            )
        }
    }
}

/// Apply environment variable overrides to config
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(model) = env::var("SPECGEN_MODEL") {
        debug!("Overriding gemini.model from SPECGEN_MODEL");
        config.gemini.model = model;
    }

    if let Ok(path) = env::var("SPECGEN_REQUIREMENTS") {
        debug!("Overriding paths.requirements from SPECGEN_REQUIREMENTS");
        config.paths.requirements = path;
    }

    if let Ok(path) = env::var("SPECGEN_TEMPLATE") {
        debug!("Overriding paths.template from SPECGEN_TEMPLATE");
        config.paths.template = path;
    }

    if let Ok(path) = env::var("SPECGEN_OUTPUT") {
        debug!("Overriding paths.output from SPECGEN_OUTPUT");
        config.paths.output = path;
    }

    config
}
