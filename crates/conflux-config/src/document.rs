// crates/conflux-config/src/document.rs
// ============================================================================
// Module: Conflux Configuration Document
// Description: Declarative configuration file model, loader and writer.
// Purpose: Read and write the operator-edited configuration file safely.
// Dependencies: conflux-core, serde, serde_json, toml, thiserror
// ============================================================================

//! ## Overview
//! [`ConfigDocument`] is the file form of the gateway configuration. It is
//! JSON or TOML, selected by file extension. Loading enforces path limits, a
//! size limit and UTF-8 content before parsing, then validates structure.
//! Provider names are normalized to lower case; two entries that normalize to
//! the same name are rejected.
//!
//! Values in a document are in declared form: secrets may be `env.NAME`
//! references. Nothing here resolves them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use conflux_core::ClientConfig;
use conflux_core::EnvSource;
use conflux_core::ModelError;
use conflux_core::ProviderConfig;
use conflux_core::ProviderName;
use conflux_core::ToolClientConfig;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default config file name when no path is provided.
pub const DEFAULT_CONFIG_NAME: &str = "conflux.json";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "CONFLUX_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading or writing configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// JSON or TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ModelError> for ConfigError {
    fn from(error: ModelError) -> Self {
        Self::Invalid(error.to_string())
    }
}

// ============================================================================
// SECTION: Format
// ============================================================================

/// Serialization format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON document.
    Json,
    /// TOML document.
    Toml,
}

impl ConfigFormat {
    /// Selects the format from the file extension; anything but `.toml` is JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

// ============================================================================
// SECTION: Document
// ============================================================================

/// Sections owned by other gateway subsystems, echoed on write-back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassthroughSections {
    /// Governance plugin settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governance: Option<Value>,
    /// Vector store settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_store: Option<Value>,
    /// Log store settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_store: Option<Value>,
    /// Plugin settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Value>,
}

impl PassthroughSections {
    /// Extracts only the passthrough sections from file bytes.
    ///
    /// Entity sections are not parsed. Unreadable content yields no sections.
    #[must_use]
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Self {
        let Ok(content) = std::str::from_utf8(bytes) else {
            return Self::default();
        };
        let parsed = match ConfigFormat::from_path(path) {
            ConfigFormat::Json => serde_json::from_str(content).ok(),
            ConfigFormat::Toml => toml::from_str(content).ok(),
        };
        parsed.unwrap_or_default()
    }
}

/// Declarative configuration file.
///
/// # Invariants
/// - Provider names are normalized and unique.
/// - Tool client names are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDocument")]
pub struct ConfigDocument {
    /// Client behavior settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientConfig>,
    /// Providers by normalized name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub providers: BTreeMap<ProviderName, ProviderConfig>,
    /// Tool-execution clients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_clients: Vec<ToolClientConfig>,
    /// Sections consumed by other subsystems.
    #[serde(flatten)]
    pub passthrough: PassthroughSections,
}

/// Document as written, before provider name normalization.
#[derive(Deserialize)]
struct RawDocument {
    /// Client behavior settings.
    #[serde(default)]
    client: Option<ClientConfig>,
    /// Providers by declared name.
    #[serde(default)]
    providers: BTreeMap<String, ProviderConfig>,
    /// Tool-execution clients.
    #[serde(default)]
    tool_clients: Vec<ToolClientConfig>,
    /// Sections consumed by other subsystems.
    #[serde(flatten)]
    passthrough: PassthroughSections,
}

impl TryFrom<RawDocument> for ConfigDocument {
    type Error = ConfigError;

    fn try_from(raw: RawDocument) -> Result<Self, Self::Error> {
        let mut providers = BTreeMap::new();
        for (declared, config) in raw.providers {
            let name = ProviderName::new(&declared);
            if name.is_empty() {
                return Err(ConfigError::Invalid("provider name must be non-empty".to_string()));
            }
            if providers.insert(name.clone(), config).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "provider {declared} duplicates provider {name}"
                )));
            }
        }
        Ok(Self {
            client: raw.client,
            providers,
            tool_clients: raw.tool_clients,
            passthrough: raw.passthrough,
        })
    }
}

impl ConfigDocument {
    /// Parses a document from file bytes in the given format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the content is not UTF-8, cannot be
    /// parsed, or fails validation.
    pub fn parse(bytes: &[u8], format: ConfigFormat) -> Result<Self, ConfigError> {
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let document: Self = match format {
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?
            }
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?
            }
        };
        document.validate()?;
        Ok(document)
    }

    /// Validates every section of the document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(client) = &self.client {
            client.validate()?;
        }
        for (name, provider) in &self.providers {
            provider.validate(name)?;
        }
        let mut names = BTreeSet::new();
        for client in &self.tool_clients {
            client.validate()?;
            if !names.insert(client.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate tool client name {}",
                    client.name
                )));
            }
        }
        Ok(())
    }

    /// Serializes the document in the given format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when serialization fails.
    pub fn to_bytes(&self, format: ConfigFormat) -> Result<Vec<u8>, ConfigError> {
        let text = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|err| ConfigError::Parse(err.to_string()))?,
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|err| ConfigError::Parse(err.to_string()))?
            }
        };
        let mut bytes = text.into_bytes();
        if bytes.last() != Some(&b'\n') {
            bytes.push(b'\n');
        }
        Ok(bytes)
    }
}

// ============================================================================
// SECTION: Files
// ============================================================================

/// Raw configuration file contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// Path the file was read from.
    pub path: PathBuf,
    /// File bytes.
    pub bytes: Vec<u8>,
}

impl ConfigFile {
    /// Returns the format implied by the path.
    #[must_use]
    pub fn format(&self) -> ConfigFormat {
        ConfigFormat::from_path(&self.path)
    }

    /// Parses the file into a validated document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn parse(&self) -> Result<ConfigDocument, ConfigError> {
        ConfigDocument::parse(&self.bytes, self.format())
    }
}

/// Resolves the config path from an explicit argument or the environment.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the path exceeds length limits.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    env: &dyn EnvSource,
) -> Result<PathBuf, ConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => env
            .var(CONFIG_ENV_VAR)
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_NAME), PathBuf::from),
    };
    validate_path(&path)?;
    Ok(path)
}

/// Reads a configuration file; `None` when it does not exist.
///
/// # Errors
///
/// Returns [`ConfigError`] when the path is invalid, the file cannot be read,
/// or it exceeds the size limit.
pub fn read_config_file(path: &Path) -> Result<Option<ConfigFile>, ConfigError> {
    validate_path(path)?;
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(ConfigError::Io(err.to_string())),
    };
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    Ok(Some(ConfigFile {
        path: path.to_path_buf(),
        bytes,
    }))
}

/// Writes a document, replacing the file atomically.
///
/// # Errors
///
/// Returns [`ConfigError`] when serialization or any file operation fails.
pub fn write_config_file(path: &Path, document: &ConfigDocument) -> Result<(), ConfigError> {
    validate_path(path)?;
    let bytes = document.to_bytes(ConfigFormat::from_path(path))?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|err| ConfigError::Io(err.to_string()))?;
    }
    let temp_path = path.with_extension("tmp");
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|err| ConfigError::Io(err.to_string()))?;
    file.write_all(&bytes).map_err(|err| ConfigError::Io(err.to_string()))?;
    file.sync_all().map_err(|err| ConfigError::Io(err.to_string()))?;
    fs::rename(&temp_path, path).map_err(|err| ConfigError::Io(err.to_string()))
}

/// Validates a path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
