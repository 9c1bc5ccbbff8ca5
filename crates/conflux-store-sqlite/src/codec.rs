// crates/conflux-store-sqlite/src/codec.rs
// ============================================================================
// Module: SQLite Row Codec
// Description: Explicit encode/decode between model entities and table rows.
// Purpose: Keep the storage boundary visible and independently testable.
// Dependencies: conflux-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Scalar fields map to columns; family configurations, list-valued fields and
//! settings blocks are stored as JSON text blobs. The gateway calls
//! `encode` before every write and `decode` after every read. Nothing on the
//! model types knows about these rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::str::FromStr;

use conflux_core::ClientConfig;
use conflux_core::Key;
use conflux_core::KeyId;
use conflux_core::ProviderConfig;
use conflux_core::ProviderName;
use conflux_core::ProvenanceEntry;
use conflux_core::ToolClientConfig;
use conflux_core::ToolClientId;
use conflux_core::ValueKind;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Blob Helpers
// ============================================================================

/// Serializes a value into a JSON text column.
fn encode_blob<T: Serialize + ?Sized>(column: &str, value: &T) -> Result<String, SqliteStoreError> {
    serde_json::to_string(value)
        .map_err(|err| SqliteStoreError::Invalid(format!("cannot encode {column}: {err}")))
}

/// Serializes an optional value into a nullable JSON text column.
fn encode_optional_blob<T: Serialize>(
    column: &str,
    value: Option<&T>,
) -> Result<Option<String>, SqliteStoreError> {
    value.map(|value| encode_blob(column, value)).transpose()
}

/// Parses a JSON text column.
fn decode_blob<T: DeserializeOwned>(column: &str, text: &str) -> Result<T, SqliteStoreError> {
    serde_json::from_str(text)
        .map_err(|err| SqliteStoreError::Corrupt(format!("cannot decode {column}: {err}")))
}

/// Parses a nullable JSON text column.
fn decode_optional_blob<T: DeserializeOwned>(
    column: &str,
    text: Option<&str>,
) -> Result<Option<T>, SqliteStoreError> {
    text.map(|text| decode_blob(column, text)).transpose()
}

// ============================================================================
// SECTION: Providers
// ============================================================================

/// Row of the `providers` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRow {
    /// Provider name.
    pub name: String,
    /// Network settings blob.
    pub network_json: Option<String>,
    /// Sizing blob.
    pub concurrency_json: Option<String>,
    /// Proxy blob.
    pub proxy_json: Option<String>,
    /// Custom provider blob.
    pub custom_json: Option<String>,
    /// Raw-response flag.
    pub send_back_raw_response: bool,
    /// Provider-level content hash.
    pub config_hash: Option<String>,
}

impl ProviderRow {
    /// Encodes provider-level fields. Keys are encoded separately.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a block cannot be serialized.
    pub fn encode(name: &ProviderName, config: &ProviderConfig) -> Result<Self, SqliteStoreError> {
        Ok(Self {
            name: name.as_str().to_string(),
            network_json: encode_optional_blob("network_json", config.network_config.as_ref())?,
            concurrency_json: encode_optional_blob(
                "concurrency_json",
                config.concurrency_and_buffer_size.as_ref(),
            )?,
            proxy_json: encode_optional_blob("proxy_json", config.proxy_config.as_ref())?,
            custom_json: encode_optional_blob("custom_json", config.custom_provider_config.as_ref())?,
            send_back_raw_response: config.send_back_raw_response,
            config_hash: config.config_hash.clone(),
        })
    }

    /// Decodes the row and attaches its keys.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Corrupt`] when a blob cannot be parsed.
    pub fn decode(self, keys: Vec<Key>) -> Result<(ProviderName, ProviderConfig), SqliteStoreError> {
        let config = ProviderConfig {
            keys,
            network_config: decode_optional_blob("network_json", self.network_json.as_deref())?,
            concurrency_and_buffer_size: decode_optional_blob(
                "concurrency_json",
                self.concurrency_json.as_deref(),
            )?,
            proxy_config: decode_optional_blob("proxy_json", self.proxy_json.as_deref())?,
            custom_provider_config: decode_optional_blob(
                "custom_json",
                self.custom_json.as_deref(),
            )?,
            send_back_raw_response: self.send_back_raw_response,
            config_hash: self.config_hash,
        };
        Ok((ProviderName::new(self.name), config))
    }
}

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Row of the `provider_keys` table.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRow {
    /// Owning provider.
    pub provider: String,
    /// Key identifier.
    pub key_id: String,
    /// Order within the provider.
    pub position: i64,
    /// Display name.
    pub name: Option<String>,
    /// Live secret value.
    pub value: String,
    /// Model allow-list blob.
    pub models_json: String,
    /// Weight.
    pub weight: f64,
    /// Family configuration blob.
    pub family_json: Option<String>,
    /// Key content hash.
    pub config_hash: Option<String>,
}

impl KeyRow {
    /// Encodes a key at a position within its provider.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a blob cannot be serialized.
    pub fn encode(
        provider: &ProviderName,
        position: usize,
        key: &Key,
    ) -> Result<Self, SqliteStoreError> {
        Ok(Self {
            provider: provider.as_str().to_string(),
            key_id: key.id.as_str().to_string(),
            position: i64::try_from(position)
                .map_err(|_| SqliteStoreError::Invalid("key position overflow".to_string()))?,
            name: key.name.clone(),
            value: key.value.clone(),
            models_json: encode_blob("models_json", &key.models)?,
            weight: key.weight,
            family_json: encode_optional_blob("family_json", key.family.as_ref())?,
            config_hash: key.config_hash.clone(),
        })
    }

    /// Decodes the row into a key.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Corrupt`] when a blob cannot be parsed.
    pub fn decode(self) -> Result<Key, SqliteStoreError> {
        Ok(Key {
            id: KeyId::new(self.key_id),
            name: self.name,
            value: self.value,
            models: decode_blob("models_json", &self.models_json)?,
            weight: self.weight,
            family: decode_optional_blob("family_json", self.family_json.as_deref())?,
            config_hash: self.config_hash,
        })
    }
}

// ============================================================================
// SECTION: Tool Clients
// ============================================================================

/// Row of the `tool_clients` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolClientRow {
    /// Client identifier.
    pub client_id: String,
    /// Unique client name.
    pub name: String,
    /// Connection descriptor blob.
    pub connection_json: String,
    /// Included tools blob.
    pub tools_to_execute_json: String,
    /// Excluded tools blob.
    pub tools_to_skip_json: String,
    /// Header blob.
    pub headers_json: String,
    /// Content hash.
    pub config_hash: Option<String>,
}

impl ToolClientRow {
    /// Encodes a tool client, which must already carry an id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the id is missing or a blob
    /// cannot be serialized.
    pub fn encode(client: &ToolClientConfig) -> Result<Self, SqliteStoreError> {
        let Some(id) = &client.id else {
            return Err(SqliteStoreError::Invalid(format!("tool client {} has no id", client.name)));
        };
        Ok(Self {
            client_id: id.as_str().to_string(),
            name: client.name.clone(),
            connection_json: encode_blob("connection_json", &client.connection)?,
            tools_to_execute_json: encode_blob("tools_to_execute_json", &client.tools_to_execute)?,
            tools_to_skip_json: encode_blob("tools_to_skip_json", &client.tools_to_skip)?,
            headers_json: encode_blob("headers_json", &client.headers)?,
            config_hash: client.config_hash.clone(),
        })
    }

    /// Decodes the row into a tool client.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Corrupt`] when a blob cannot be parsed.
    pub fn decode(self) -> Result<ToolClientConfig, SqliteStoreError> {
        let headers: BTreeMap<String, String> = decode_blob("headers_json", &self.headers_json)?;
        Ok(ToolClientConfig {
            id: Some(ToolClientId::new(self.client_id)),
            name: self.name,
            connection: decode_blob("connection_json", &self.connection_json)?,
            tools_to_execute: decode_blob("tools_to_execute_json", &self.tools_to_execute_json)?,
            tools_to_skip: decode_blob("tools_to_skip_json", &self.tools_to_skip_json)?,
            headers,
            config_hash: self.config_hash,
        })
    }
}

// ============================================================================
// SECTION: Client Settings And Provenance
// ============================================================================

/// Row of the singleton `client_config` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfigRow {
    /// Settings blob.
    pub config_json: String,
    /// Content hash.
    pub config_hash: Option<String>,
}

impl ClientConfigRow {
    /// Encodes client settings.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when serialization fails.
    pub fn encode(config: &ClientConfig) -> Result<Self, SqliteStoreError> {
        Ok(Self {
            config_json: encode_blob("config_json", config)?,
            config_hash: config.config_hash.clone(),
        })
    }

    /// Decodes client settings.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Corrupt`] when the blob cannot be parsed.
    pub fn decode(self) -> Result<ClientConfig, SqliteStoreError> {
        let mut config: ClientConfig = decode_blob("config_json", &self.config_json)?;
        config.config_hash = self.config_hash;
        Ok(config)
    }
}

/// Row of the `env_provenance` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceRow {
    /// Configuration path, unique.
    pub config_path: String,
    /// Variable name.
    pub env_var: String,
    /// Owning provider.
    pub provider: Option<String>,
    /// Value kind label.
    pub value_kind: String,
    /// Owning key.
    pub key_id: Option<String>,
}

impl ProvenanceRow {
    /// Encodes a provenance entry.
    #[must_use]
    pub fn encode(entry: &ProvenanceEntry) -> Self {
        Self {
            config_path: entry.config_path.clone(),
            env_var: entry.env_var.clone(),
            provider: entry.provider.as_ref().map(|p| p.as_str().to_string()),
            value_kind: entry.kind.as_str().to_string(),
            key_id: entry.key_id.as_ref().map(|id| id.as_str().to_string()),
        }
    }

    /// Decodes a provenance entry.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Corrupt`] for an unknown value kind.
    pub fn decode(self) -> Result<ProvenanceEntry, SqliteStoreError> {
        let kind = ValueKind::from_str(&self.value_kind)
            .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
        Ok(ProvenanceEntry {
            env_var: self.env_var,
            config_path: self.config_path,
            provider: self.provider.map(ProviderName::new),
            kind,
            key_id: self.key_id.map(KeyId::new),
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
