// crates/conflux-core/src/model.rs
// ============================================================================
// Module: Conflux Configuration Model
// Description: Provider, key, tool-client and client configuration types.
// Purpose: Shared typed model for file ingestion, persistence and display.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The configuration model is the single shape shared by the file loader, the
//! persistence gateway and the in-memory store. Provider-family specific key
//! settings are a closed sum type ([`KeyFamilyConfig`]); every consumer that
//! touches secret fields goes through [`Key::fields_mut`] or
//! [`ToolClientConfig::fields_mut`], which match exhaustively over the variants.
//!
//! `config_hash` fields record the content hash of the file-declared form the
//! entity was last synchronized from. They are never serialized to files.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::identifiers::KeyId;
use crate::identifiers::ProviderName;
use crate::identifiers::ToolClientId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
/// Default initial retry backoff in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_INITIAL_MS: u64 = 500;
/// Default maximum retry backoff in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MAX_MS: u64 = 5_000;
/// Default per-provider concurrency.
pub const DEFAULT_CONCURRENCY: u32 = 10;
/// Default per-provider request buffer size.
pub const DEFAULT_BUFFER_SIZE: u32 = 100;
/// Default key weight.
pub const DEFAULT_KEY_WEIGHT: f64 = 1.0;
/// Default gateway connection pool size.
pub const DEFAULT_INITIAL_POOL_SIZE: u32 = 300;
/// Default maximum request body size in megabytes.
pub const DEFAULT_MAX_REQUEST_BODY_SIZE_MB: u32 = 100;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Structural validation failures for configuration entities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Entity violates a structural rule.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Value Kinds
// ============================================================================

/// Kind of configuration value an environment variable can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Key secret value.
    ApiKey,
    /// Field of an Azure key configuration.
    AzureConfig,
    /// Field of a Vertex key configuration.
    VertexConfig,
    /// Field of a Bedrock key configuration.
    BedrockConfig,
    /// Tool-client connection string.
    ConnectionString,
    /// Tool-client header value.
    ToolHeader,
}

impl ValueKind {
    /// Returns the stable label used in persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::AzureConfig => "azure_config",
            Self::VertexConfig => "vertex_config",
            Self::BedrockConfig => "bedrock_config",
            Self::ConnectionString => "connection_string",
            Self::ToolHeader => "tool_header",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "api_key" => Ok(Self::ApiKey),
            "azure_config" => Ok(Self::AzureConfig),
            "vertex_config" => Ok(Self::VertexConfig),
            "bedrock_config" => Ok(Self::BedrockConfig),
            "connection_string" => Ok(Self::ConnectionString),
            "tool_header" => Ok(Self::ToolHeader),
            other => Err(ModelError::Invalid(format!("unknown value kind: {other}"))),
        }
    }
}

// ============================================================================
// SECTION: Provider-Level Settings
// ============================================================================

/// Upstream network behavior for a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Base URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Headers added to every upstream request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_headers: BTreeMap<String, String>,
    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout_in_seconds")]
    pub default_request_timeout_in_seconds: u64,
    /// Maximum retries per request.
    #[serde(default)]
    pub max_retries: u32,
    /// Initial retry backoff in milliseconds.
    #[serde(default = "default_retry_backoff_initial_ms")]
    pub retry_backoff_initial_ms: u64,
    /// Maximum retry backoff in milliseconds.
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            extra_headers: BTreeMap::new(),
            default_request_timeout_in_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            max_retries: 0,
            retry_backoff_initial_ms: DEFAULT_RETRY_BACKOFF_INITIAL_MS,
            retry_backoff_max_ms: DEFAULT_RETRY_BACKOFF_MAX_MS,
        }
    }
}

impl NetworkConfig {
    /// Validates network settings.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] when a setting is out of range.
    pub fn validate(&self, path: &str) -> Result<(), ModelError> {
        if let Some(base_url) = &self.base_url
            && !(base_url.starts_with("http://") || base_url.starts_with("https://"))
        {
            return Err(invalid(format!("{path}.base_url must start with http:// or https://")));
        }
        if self.default_request_timeout_in_seconds == 0 {
            return Err(invalid(format!(
                "{path}.default_request_timeout_in_seconds must be greater than zero"
            )));
        }
        if self.retry_backoff_initial_ms > self.retry_backoff_max_ms {
            return Err(invalid(format!(
                "{path}.retry_backoff_initial_ms must not exceed retry_backoff_max_ms"
            )));
        }
        Ok(())
    }
}

/// Concurrency and buffer sizing for a provider queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyAndBufferSize {
    /// Concurrent upstream requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Queued request capacity.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: u32,
}

impl Default for ConcurrencyAndBufferSize {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ConcurrencyAndBufferSize {
    /// Validates sizing.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] when sizing is inconsistent.
    pub fn validate(&self, path: &str) -> Result<(), ModelError> {
        if self.concurrency == 0 {
            return Err(invalid(format!("{path}.concurrency must be at least 1")));
        }
        if self.buffer_size < self.concurrency {
            return Err(invalid(format!("{path}.buffer_size must be >= concurrency")));
        }
        Ok(())
    }
}

/// Proxy mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyType {
    /// Direct connections.
    #[default]
    None,
    /// HTTP proxy.
    Http,
    /// SOCKS5 proxy.
    Socks5,
    /// Proxy taken from the process environment.
    Environment,
}

/// Outbound proxy settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy mode.
    #[serde(rename = "type", default)]
    pub proxy_type: ProxyType,
    /// Proxy URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Proxy user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Proxy password. Redacted on display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Validates proxy settings.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] when a URL is required but missing.
    pub fn validate(&self, path: &str) -> Result<(), ModelError> {
        match self.proxy_type {
            ProxyType::Http | ProxyType::Socks5 => {
                if self.url.as_deref().is_none_or(str::is_empty) {
                    return Err(invalid(format!("{path}.url is required for this proxy type")));
                }
                Ok(())
            }
            ProxyType::None | ProxyType::Environment => Ok(()),
        }
    }
}

/// Metadata for a provider that wraps another provider's API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomProviderConfig {
    /// Provider whose wire protocol is reused.
    pub base_provider_type: String,
    /// Request types allowed through this provider. Empty allows all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_requests: Vec<String>,
}

// ============================================================================
// SECTION: Provider Configuration
// ============================================================================

/// Configuration for one upstream provider.
///
/// # Invariants
/// - Key identifiers are unique within the provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Credential keys.
    #[serde(default)]
    pub keys: Vec<Key>,
    /// Network settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_config: Option<NetworkConfig>,
    /// Concurrency settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency_and_buffer_size: Option<ConcurrencyAndBufferSize>,
    /// Proxy settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_config: Option<ProxyConfig>,
    /// Custom provider metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_provider_config: Option<CustomProviderConfig>,
    /// Surface raw upstream responses to callers.
    #[serde(default)]
    pub send_back_raw_response: bool,
    /// Hash of the file-declared provider-level fields last synchronized.
    #[serde(skip)]
    pub config_hash: Option<String>,
}

impl ProviderConfig {
    /// Validates the provider and all of its keys.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] describing the first violation found.
    pub fn validate(&self, name: &ProviderName) -> Result<(), ModelError> {
        if name.is_empty() {
            return Err(invalid("provider name must be non-empty".to_string()));
        }
        let path = format!("providers.{name}");
        if let Some(network) = &self.network_config {
            network.validate(&format!("{path}.network_config"))?;
        }
        if let Some(sizing) = &self.concurrency_and_buffer_size {
            sizing.validate(&format!("{path}.concurrency_and_buffer_size"))?;
        }
        if let Some(proxy) = &self.proxy_config {
            proxy.validate(&format!("{path}.proxy_config"))?;
        }
        if let Some(custom) = &self.custom_provider_config
            && custom.base_provider_type.trim().is_empty()
        {
            return Err(invalid(format!(
                "{path}.custom_provider_config.base_provider_type must be non-empty"
            )));
        }
        let mut seen = BTreeSet::new();
        for key in &self.keys {
            key.validate(&format!("{path}.keys[{}]", key.id))?;
            if !seen.insert(key.id.as_str()) {
                return Err(invalid(format!("{path} has duplicate key id {}", key.id)));
            }
        }
        Ok(())
    }

    /// Returns the key with the given identifier.
    #[must_use]
    pub fn key(&self, id: &KeyId) -> Option<&Key> {
        self.keys.iter().find(|key| &key.id == id)
    }
}

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Credential unit for a provider.
///
/// # Invariants
/// - `id` never changes after assignment.
/// - `models` empty means no model restriction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "KeyDocument", into = "KeyDocument")]
pub struct Key {
    /// Stable identifier.
    pub id: KeyId,
    /// Optional display name.
    pub name: Option<String>,
    /// Secret value (raw, env reference or redacted depending on context).
    pub value: String,
    /// Model allow-list.
    pub models: Vec<String>,
    /// Load distribution weight.
    pub weight: f64,
    /// Provider-family specific settings.
    pub family: Option<KeyFamilyConfig>,
    /// Hash of the file-declared key content last synchronized.
    pub config_hash: Option<String>,
}

impl Key {
    /// Creates a plain key with a generated identifier and default weight.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: KeyId::generate(),
            name: None,
            value: value.into(),
            models: Vec::new(),
            weight: DEFAULT_KEY_WEIGHT,
            family: None,
            config_hash: None,
        }
    }

    /// Validates the key.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] when the key is malformed.
    pub fn validate(&self, path: &str) -> Result<(), ModelError> {
        if self.id.as_str().trim().is_empty() {
            return Err(invalid(format!("{path}.id must be non-empty")));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(invalid(format!("{path}.weight must be a finite non-negative number")));
        }
        match &self.family {
            None if self.value.is_empty() => {
                Err(invalid(format!("{path}.value must be non-empty")))
            }
            None => Ok(()),
            Some(family) => family.validate(&format!("{path}.{}", family.section())),
        }
    }

    /// Returns every env-resolvable field of the key, the secret value first.
    pub fn fields_mut(&mut self) -> Vec<KeyField<'_>> {
        let mut fields = vec![KeyField {
            family_field: None,
            kind: ValueKind::ApiKey,
            sensitive: true,
            value: &mut self.value,
        }];
        if let Some(family) = &mut self.family {
            fields.extend(family.fields_mut());
        }
        fields
    }
}

/// Mutable view of one env-resolvable key field.
#[derive(Debug)]
pub struct KeyField<'a> {
    /// Family section and field name, `None` for the key value itself.
    pub family_field: Option<FamilyField>,
    /// Value kind recorded in provenance.
    pub kind: ValueKind,
    /// Whether the value is masked on display.
    pub sensitive: bool,
    /// Field value.
    pub value: &'a mut String,
}

/// Location of a field inside a family configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyField {
    /// Section name (for example `azure_key_config`).
    pub section: &'static str,
    /// Field name within the section.
    pub name: &'static str,
}

/// File representation of a key with one optional section per family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyDocument {
    /// Identifier; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<KeyId>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    /// Secret value.
    #[serde(default)]
    value: String,
    /// Model allow-list; `null` and `[]` are equivalent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    models: Option<Vec<String>>,
    /// Weight.
    #[serde(default = "default_key_weight")]
    weight: f64,
    /// Azure settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    azure_key_config: Option<AzureKeyConfig>,
    /// Vertex settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vertex_key_config: Option<VertexKeyConfig>,
    /// Bedrock settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bedrock_key_config: Option<BedrockKeyConfig>,
}

impl TryFrom<KeyDocument> for Key {
    type Error = ModelError;

    fn try_from(document: KeyDocument) -> Result<Self, Self::Error> {
        let family = match (
            document.azure_key_config,
            document.vertex_key_config,
            document.bedrock_key_config,
        ) {
            (None, None, None) => None,
            (Some(azure), None, None) => Some(KeyFamilyConfig::Azure(azure)),
            (None, Some(vertex), None) => Some(KeyFamilyConfig::Vertex(vertex)),
            (None, None, Some(bedrock)) => Some(KeyFamilyConfig::Bedrock(bedrock)),
            _ => {
                return Err(invalid(
                    "a key may carry at most one family configuration".to_string(),
                ));
            }
        };
        Ok(Self {
            id: document.id.unwrap_or_else(KeyId::generate),
            name: document.name,
            value: document.value,
            models: document.models.unwrap_or_default(),
            weight: document.weight,
            family,
            config_hash: None,
        })
    }
}

impl From<Key> for KeyDocument {
    fn from(key: Key) -> Self {
        let mut document = Self {
            id: Some(key.id),
            name: key.name,
            value: key.value,
            models: (!key.models.is_empty()).then_some(key.models),
            weight: key.weight,
            azure_key_config: None,
            vertex_key_config: None,
            bedrock_key_config: None,
        };
        match key.family {
            None => {}
            Some(KeyFamilyConfig::Azure(azure)) => document.azure_key_config = Some(azure),
            Some(KeyFamilyConfig::Vertex(vertex)) => document.vertex_key_config = Some(vertex),
            Some(KeyFamilyConfig::Bedrock(bedrock)) => document.bedrock_key_config = Some(bedrock),
        }
        document
    }
}

// ============================================================================
// SECTION: Key Families
// ============================================================================

/// Provider-family specific key settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyFamilyConfig {
    /// Azure OpenAI deployment.
    Azure(AzureKeyConfig),
    /// Google Vertex project.
    Vertex(VertexKeyConfig),
    /// AWS Bedrock account.
    Bedrock(BedrockKeyConfig),
}

/// Azure key settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AzureKeyConfig {
    /// Resource endpoint.
    pub endpoint: String,
    /// Model name to deployment name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deployments: BTreeMap<String, String>,
    /// API version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Entra client id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Entra client secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Entra tenant id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Vertex key settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VertexKeyConfig {
    /// GCP project id.
    pub project_id: String,
    /// GCP project number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_number: Option<String>,
    /// GCP region.
    pub region: String,
    /// Service account credentials.
    #[serde(default)]
    pub auth_credentials: String,
    /// Model name to endpoint id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deployments: BTreeMap<String, String>,
}

/// Bedrock key settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BedrockKeyConfig {
    /// AWS access key id.
    #[serde(default)]
    pub access_key: String,
    /// AWS secret access key.
    #[serde(default)]
    pub secret_key: String,
    /// AWS session token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// AWS region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Inference profile ARN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    /// Model name to inference profile.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deployments: BTreeMap<String, String>,
}

impl KeyFamilyConfig {
    /// Returns the file section name of this family.
    #[must_use]
    pub const fn section(&self) -> &'static str {
        match self {
            Self::Azure(_) => "azure_key_config",
            Self::Vertex(_) => "vertex_key_config",
            Self::Bedrock(_) => "bedrock_key_config",
        }
    }

    /// Returns the provenance kind for fields of this family.
    #[must_use]
    pub const fn value_kind(&self) -> ValueKind {
        match self {
            Self::Azure(_) => ValueKind::AzureConfig,
            Self::Vertex(_) => ValueKind::VertexConfig,
            Self::Bedrock(_) => ValueKind::BedrockConfig,
        }
    }

    /// Validates required fields of the family.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] when a required field is missing.
    pub fn validate(&self, path: &str) -> Result<(), ModelError> {
        match self {
            Self::Azure(azure) => {
                if azure.endpoint.is_empty() {
                    return Err(invalid(format!("{path}.endpoint must be non-empty")));
                }
            }
            Self::Vertex(vertex) => {
                if vertex.project_id.is_empty() || vertex.region.is_empty() {
                    return Err(invalid(format!("{path} requires project_id and region")));
                }
            }
            Self::Bedrock(bedrock) => {
                if bedrock.access_key.is_empty() != bedrock.secret_key.is_empty() {
                    return Err(invalid(format!(
                        "{path} requires access_key and secret_key together"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns every string field of the family that may be env-sourced.
    fn fields_mut(&mut self) -> Vec<KeyField<'_>> {
        let section = self.section();
        let kind = self.value_kind();
        let slot = |name: &'static str, sensitive: bool| (section, kind, name, sensitive);
        let mut fields = Vec::new();
        match self {
            Self::Azure(azure) => {
                fields.push(family_slot(slot("endpoint", true), &mut azure.endpoint));
                if let Some(value) = &mut azure.api_version {
                    fields.push(family_slot(slot("api_version", false), value));
                }
                if let Some(value) = &mut azure.client_id {
                    fields.push(family_slot(slot("client_id", true), value));
                }
                if let Some(value) = &mut azure.client_secret {
                    fields.push(family_slot(slot("client_secret", true), value));
                }
                if let Some(value) = &mut azure.tenant_id {
                    fields.push(family_slot(slot("tenant_id", true), value));
                }
            }
            Self::Vertex(vertex) => {
                fields.push(family_slot(slot("project_id", true), &mut vertex.project_id));
                if let Some(value) = &mut vertex.project_number {
                    fields.push(family_slot(slot("project_number", true), value));
                }
                fields.push(family_slot(slot("region", false), &mut vertex.region));
                fields.push(family_slot(slot("auth_credentials", true), &mut vertex.auth_credentials));
            }
            Self::Bedrock(bedrock) => {
                fields.push(family_slot(slot("access_key", true), &mut bedrock.access_key));
                fields.push(family_slot(slot("secret_key", true), &mut bedrock.secret_key));
                if let Some(value) = &mut bedrock.session_token {
                    fields.push(family_slot(slot("session_token", true), value));
                }
                if let Some(value) = &mut bedrock.region {
                    fields.push(family_slot(slot("region", false), value));
                }
                if let Some(value) = &mut bedrock.arn {
                    fields.push(family_slot(slot("arn", false), value));
                }
            }
        }
        fields
    }
}

// ============================================================================
// SECTION: Tool Clients
// ============================================================================

/// How a tool client is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolConnection {
    /// Spawned child process speaking over stdio.
    Stdio {
        /// Executable.
        command: String,
        /// Arguments.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        /// Environment variable names passed through to the process.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        envs: Vec<String>,
    },
    /// Streamable HTTP endpoint.
    Http {
        /// Endpoint URL, possibly an env reference.
        connection_string: String,
    },
    /// Server-sent events endpoint.
    Sse {
        /// Endpoint URL, possibly an env reference.
        connection_string: String,
    },
}

/// Configuration of one tool-execution client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolClientConfig {
    /// Stable identifier; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ToolClientId>,
    /// Unique client name.
    pub name: String,
    /// Connection descriptor.
    pub connection: ToolConnection,
    /// Tools the client may execute. Empty allows all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_to_execute: Vec<String>,
    /// Tools that are never executed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_to_skip: Vec<String>,
    /// Headers sent on network connections.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Hash of the file-declared client last synchronized.
    #[serde(skip)]
    pub config_hash: Option<String>,
}

impl ToolClientConfig {
    /// Validates the tool client.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] when the client is malformed.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(invalid("tool client name must be non-empty".to_string()));
        }
        if self.name.contains('.') {
            return Err(invalid(format!("tool client name {} must not contain '.'", self.name)));
        }
        let path = format!("tool_clients.{}", self.name);
        match &self.connection {
            ToolConnection::Stdio {
                command, ..
            } if command.trim().is_empty() => {
                return Err(invalid(format!("{path}.connection.command must be non-empty")));
            }
            ToolConnection::Http {
                connection_string,
            }
            | ToolConnection::Sse {
                connection_string,
            } if connection_string.trim().is_empty() => {
                return Err(invalid(format!(
                    "{path}.connection.connection_string must be non-empty"
                )));
            }
            _ => {}
        }
        validate_tool_lists(&path, &self.tools_to_execute, &self.tools_to_skip)
    }

    /// Returns every env-resolvable field of the client.
    pub fn fields_mut(&mut self) -> Vec<ToolClientField<'_>> {
        let mut fields = Vec::new();
        match &mut self.connection {
            ToolConnection::Stdio {
                ..
            } => {}
            ToolConnection::Http {
                connection_string,
            }
            | ToolConnection::Sse {
                connection_string,
            } => fields.push(ToolClientField {
                suffix: "connection_string".to_string(),
                kind: ValueKind::ConnectionString,
                sensitive: false,
                value: connection_string,
            }),
        }
        for (header, value) in &mut self.headers {
            fields.push(ToolClientField {
                suffix: format!("headers.{header}"),
                kind: ValueKind::ToolHeader,
                sensitive: true,
                value,
            });
        }
        fields
    }
}

/// Validates tool inclusion and exclusion lists.
///
/// # Errors
///
/// Returns [`ModelError::Invalid`] when a tool appears in both lists.
pub fn validate_tool_lists(
    path: &str,
    tools_to_execute: &[String],
    tools_to_skip: &[String],
) -> Result<(), ModelError> {
    if let Some(tool) = tools_to_execute.iter().find(|tool| tools_to_skip.contains(tool)) {
        return Err(invalid(format!("{path} lists tool {tool} as both executed and skipped")));
    }
    Ok(())
}

/// Mutable view of one env-resolvable tool-client field.
#[derive(Debug)]
pub struct ToolClientField<'a> {
    /// Path suffix below `tool_clients.{name}`.
    pub suffix: String,
    /// Value kind recorded in provenance.
    pub kind: ValueKind,
    /// Whether a literal value is masked on display.
    pub sensitive: bool,
    /// Field value.
    pub value: &'a mut String,
}

// ============================================================================
// SECTION: Client Configuration
// ============================================================================

/// Process-wide gateway behavior switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Reject requests when provider buffers are full.
    #[serde(default)]
    pub drop_excess_requests: bool,
    /// Pre-allocated request objects.
    #[serde(default = "default_initial_pool_size")]
    pub initial_pool_size: u32,
    /// Extra metric labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prometheus_labels: Vec<String>,
    /// Request logging.
    #[serde(default = "default_true")]
    pub enable_logging: bool,
    /// Drop request and response bodies from logs.
    #[serde(default)]
    pub disable_content_logging: bool,
    /// Governance plugin.
    #[serde(default = "default_true")]
    pub enable_governance: bool,
    /// Require the governance header on every request.
    #[serde(default)]
    pub enforce_governance_header: bool,
    /// Accept keys supplied directly by callers.
    #[serde(default)]
    pub allow_direct_keys: bool,
    /// CORS origins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_origins: Vec<String>,
    /// Request body limit in megabytes.
    #[serde(default = "default_max_request_body_size_mb")]
    pub max_request_body_size_mb: u32,
    /// Hash of the file-declared client section last synchronized.
    #[serde(skip)]
    pub config_hash: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            drop_excess_requests: false,
            initial_pool_size: DEFAULT_INITIAL_POOL_SIZE,
            prometheus_labels: Vec::new(),
            enable_logging: true,
            disable_content_logging: false,
            enable_governance: true,
            enforce_governance_header: false,
            allow_direct_keys: false,
            allowed_origins: Vec::new(),
            max_request_body_size_mb: DEFAULT_MAX_REQUEST_BODY_SIZE_MB,
            config_hash: None,
        }
    }
}

impl ClientConfig {
    /// Validates client settings.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Invalid`] when a limit is zero.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.initial_pool_size == 0 {
            return Err(invalid("client.initial_pool_size must be greater than zero".to_string()));
        }
        if self.max_request_body_size_mb == 0 {
            return Err(invalid(
                "client.max_request_body_size_mb must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a validation error.
const fn invalid(message: String) -> ModelError {
    ModelError::Invalid(message)
}

/// Builds a mutable family field view.
const fn family_slot<'a>(
    (section, kind, name, sensitive): (&'static str, ValueKind, &'static str, bool),
    value: &'a mut String,
) -> KeyField<'a> {
    KeyField {
        family_field: Some(FamilyField {
            section,
            name,
        }),
        kind,
        sensitive,
        value,
    }
}

/// Default request timeout.
const fn default_request_timeout_in_seconds() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECONDS
}

/// Default initial backoff.
const fn default_retry_backoff_initial_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_INITIAL_MS
}

/// Default maximum backoff.
const fn default_retry_backoff_max_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_MAX_MS
}

/// Default concurrency.
const fn default_concurrency() -> u32 {
    DEFAULT_CONCURRENCY
}

/// Default buffer size.
const fn default_buffer_size() -> u32 {
    DEFAULT_BUFFER_SIZE
}

/// Default key weight.
const fn default_key_weight() -> f64 {
    DEFAULT_KEY_WEIGHT
}

/// Default pool size.
const fn default_initial_pool_size() -> u32 {
    DEFAULT_INITIAL_POOL_SIZE
}

/// Default body size limit.
const fn default_max_request_body_size_mb() -> u32 {
    DEFAULT_MAX_REQUEST_BODY_SIZE_MB
}

/// Serde default for flags that are on unless disabled.
const fn default_true() -> bool {
    true
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use serde_json::json;

    use super::*;

    #[test]
    fn key_document_null_models_means_unrestricted() {
        let key: Key = serde_json::from_value(json!({"value": "sk", "models": null})).unwrap();
        assert!(key.models.is_empty());
        assert!((key.weight - DEFAULT_KEY_WEIGHT).abs() < f64::EPSILON);
    }

    #[test]
    fn key_document_generates_missing_id() {
        let key: Key = serde_json::from_value(json!({"value": "sk"})).unwrap();
        assert!(!key.id.as_str().is_empty());
    }

    #[test]
    fn key_document_rejects_two_families() {
        let result = serde_json::from_value::<Key>(json!({
            "value": "",
            "azure_key_config": {"endpoint": "https://a"},
            "bedrock_key_config": {"access_key": "a", "secret_key": "b"}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn key_serializes_family_as_named_section() {
        let mut key = Key::new("sk");
        key.family = Some(KeyFamilyConfig::Azure(AzureKeyConfig {
            endpoint: "https://example.openai.azure.com".to_string(),
            ..AzureKeyConfig::default()
        }));
        let value = serde_json::to_value(&key).unwrap();
        assert_eq!(value["azure_key_config"]["endpoint"], "https://example.openai.azure.com");
        assert!(value.get("config_hash").is_none());
    }

    #[test]
    fn key_fields_cover_present_family_fields_only() {
        let mut key = Key::new("");
        key.family = Some(KeyFamilyConfig::Bedrock(BedrockKeyConfig {
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            region: Some("us-east-1".to_string()),
            ..BedrockKeyConfig::default()
        }));
        let names: Vec<_> = key
            .fields_mut()
            .into_iter()
            .map(|field| field.family_field.map(|f| f.name))
            .collect();
        assert_eq!(names, vec![None, Some("access_key"), Some("secret_key"), Some("region")]);
    }

    #[test]
    fn key_value_may_be_empty_only_with_family() {
        let key = Key::new("");
        assert!(key.validate("k").is_err());
        let mut vertex = Key::new("");
        vertex.family = Some(KeyFamilyConfig::Vertex(VertexKeyConfig {
            project_id: "p".to_string(),
            region: "us-central1".to_string(),
            ..VertexKeyConfig::default()
        }));
        assert!(vertex.validate("k").is_ok());
    }

    #[test]
    fn provider_rejects_duplicate_key_ids() {
        let key = Key::new("a");
        let provider = ProviderConfig {
            keys: vec![key.clone(), key],
            ..ProviderConfig::default()
        };
        assert!(provider.validate(&ProviderName::new("openai")).is_err());
    }

    #[test]
    fn concurrency_requires_buffer_at_least_concurrency() {
        let sizing = ConcurrencyAndBufferSize {
            concurrency: 20,
            buffer_size: 10,
        };
        assert!(sizing.validate("p").is_err());
    }

    #[test]
    fn http_proxy_requires_url() {
        let proxy = ProxyConfig {
            proxy_type: ProxyType::Http,
            ..ProxyConfig::default()
        };
        assert!(proxy.validate("p").is_err());
    }

    #[test]
    fn tool_client_rejects_overlapping_lists() {
        let client = ToolClientConfig {
            id: None,
            name: "fs".to_string(),
            connection: ToolConnection::Stdio {
                command: "fs-server".to_string(),
                args: Vec::new(),
                envs: Vec::new(),
            },
            tools_to_execute: vec!["read".to_string()],
            tools_to_skip: vec!["read".to_string()],
            headers: BTreeMap::new(),
            config_hash: None,
        };
        assert!(client.validate().is_err());
    }

    #[test]
    fn tool_client_rejects_dotted_name() {
        let client = ToolClientConfig {
            id: None,
            name: "docs.v2".to_string(),
            connection: ToolConnection::Http {
                connection_string: "https://docs".to_string(),
            },
            tools_to_execute: Vec::new(),
            tools_to_skip: Vec::new(),
            headers: BTreeMap::new(),
            config_hash: None,
        };
        assert!(matches!(client.validate(), Err(ModelError::Invalid(message)) if message.contains("'.'")));
    }

    #[test]
    fn value_kind_labels_round_trip() {
        for kind in [
            ValueKind::ApiKey,
            ValueKind::AzureConfig,
            ValueKind::VertexConfig,
            ValueKind::BedrockConfig,
            ValueKind::ConnectionString,
            ValueKind::ToolHeader,
        ] {
            assert_eq!(kind.as_str().parse::<ValueKind>().unwrap(), kind);
        }
    }
}
