// crates/conflux-core/src/hashing.rs
// ============================================================================
// Module: Conflux Content Hashing
// Description: RFC 8785 canonical JSON hashing for configuration entities.
// Purpose: Detect which entities changed between the file and persistence.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Every content hash is SHA-256 over RFC 8785 (JCS) canonical JSON, so map
//! ordering and whitespace never affect the digest. Entity hashes cover only
//! the fields that belong to the entity's own content:
//!
//! - [`provider_hash`] covers the provider name, its optional settings blocks
//!   and the raw-response flag. Keys are excluded.
//! - [`key_hash`] covers name, value, model allow-list (sorted), weight and the
//!   family configuration. The identifier is excluded.
//!
//! Hashes are computed over the file-declared form of an entity, so a value
//! written as `env.NAME` hashes as the reference rather than its resolution.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

use crate::identifiers::ProviderName;
use crate::model::ClientConfig;
use crate::model::ConcurrencyAndBufferSize;
use crate::model::CustomProviderConfig;
use crate::model::Key;
use crate::model::KeyFamilyConfig;
use crate::model::NetworkConfig;
use crate::model::ProviderConfig;
use crate::model::ProxyConfig;
use crate::model::ToolClientConfig;
use crate::model::ToolConnection;

// ============================================================================
// SECTION: Hash Algorithm
// ============================================================================

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 hashing.
    Sha256,
}

/// Default hash algorithm.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// Deterministic content hash representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigest {
    /// Hash algorithm identifier.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

impl HashDigest {
    /// Creates a new digest from raw bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            value: hex_encode(bytes),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// JSON canonicalization failed (for example a non-finite weight).
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes canonical JSON using the provided algorithm.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Hashes raw bytes using the provided algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let digest = hasher.finalize();
            HashDigest::new(HashAlgorithm::Sha256, &digest)
        }
    }
}

// ============================================================================
// SECTION: Entity Hashes
// ============================================================================

/// Hash input for provider-level content.
#[derive(Serialize)]
struct ProviderHashInput<'a> {
    /// Provider name.
    name: &'a str,
    /// Network block.
    network_config: Option<&'a NetworkConfig>,
    /// Sizing block.
    concurrency_and_buffer_size: Option<&'a ConcurrencyAndBufferSize>,
    /// Proxy block.
    proxy_config: Option<&'a ProxyConfig>,
    /// Custom provider block.
    custom_provider_config: Option<&'a CustomProviderConfig>,
    /// Raw-response flag.
    send_back_raw_response: bool,
}

/// Hash input for key content.
#[derive(Serialize)]
struct KeyHashInput<'a> {
    /// Display name.
    name: Option<&'a str>,
    /// Declared value.
    value: &'a str,
    /// Sorted model allow-list.
    models: Vec<&'a str>,
    /// Weight.
    weight: f64,
    /// Family configuration.
    family: Option<&'a KeyFamilyConfig>,
}

/// Hash input for tool-client content.
#[derive(Serialize)]
struct ToolClientHashInput<'a> {
    /// Client name.
    name: &'a str,
    /// Connection descriptor.
    connection: &'a ToolConnection,
    /// Included tools.
    tools_to_execute: &'a [String],
    /// Excluded tools.
    tools_to_skip: &'a [String],
    /// Header map.
    headers: &'a std::collections::BTreeMap<String, String>,
}

/// Computes the provider-level content hash, excluding keys.
///
/// # Errors
///
/// Returns [`HashError`] when the content cannot be canonicalized.
pub fn provider_hash(name: &ProviderName, config: &ProviderConfig) -> Result<String, HashError> {
    let input = ProviderHashInput {
        name: name.as_str(),
        network_config: config.network_config.as_ref(),
        concurrency_and_buffer_size: config.concurrency_and_buffer_size.as_ref(),
        proxy_config: config.proxy_config.as_ref(),
        custom_provider_config: config.custom_provider_config.as_ref(),
        send_back_raw_response: config.send_back_raw_response,
    };
    Ok(hash_canonical_json(DEFAULT_HASH_ALGORITHM, &input)?.value)
}

/// Computes the key content hash, excluding the identifier.
///
/// # Errors
///
/// Returns [`HashError`] when the content cannot be canonicalized.
pub fn key_hash(key: &Key) -> Result<String, HashError> {
    let mut models: Vec<&str> = key.models.iter().map(String::as_str).collect();
    models.sort_unstable();
    let input = KeyHashInput {
        name: key.name.as_deref(),
        value: &key.value,
        models,
        weight: key.weight,
        family: key.family.as_ref(),
    };
    Ok(hash_canonical_json(DEFAULT_HASH_ALGORITHM, &input)?.value)
}

/// Computes the tool-client content hash, excluding the identifier.
///
/// # Errors
///
/// Returns [`HashError`] when the content cannot be canonicalized.
pub fn tool_client_hash(client: &ToolClientConfig) -> Result<String, HashError> {
    let input = ToolClientHashInput {
        name: &client.name,
        connection: &client.connection,
        tools_to_execute: &client.tools_to_execute,
        tools_to_skip: &client.tools_to_skip,
        headers: &client.headers,
    };
    Ok(hash_canonical_json(DEFAULT_HASH_ALGORITHM, &input)?.value)
}

/// Computes the client settings hash.
///
/// # Errors
///
/// Returns [`HashError`] when the content cannot be canonicalized.
pub fn client_config_hash(config: &ClientConfig) -> Result<String, HashError> {
    Ok(hash_canonical_json(DEFAULT_HASH_ALGORITHM, config)?.value)
}

/// Hashes the raw bytes of a configuration file.
#[must_use]
pub fn file_hash(bytes: &[u8]) -> String {
    hash_bytes(DEFAULT_HASH_ALGORITHM, bytes).value
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
