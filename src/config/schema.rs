//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the registry.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the registry service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Where the resource aggregate and policy attachments live.
    pub storage: StorageConfig,

    /// Policy compiler settings.
    pub policy: PolicyConfig,

    /// Schema sync pipeline settings.
    pub sync: SyncConfig,

    /// Periodic attachment reconciliation.
    pub reconciliation: ReconciliationConfig,

    /// Version-conflict retry configuration.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8090").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8090".to_string(),
            request_timeout_secs: 60,
            max_body_bytes: 4 * 1024 * 1024, // 4MB
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Filesystem,
    ObjectStorage,
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Selected backend.
    pub backend: StorageBackend,

    pub filesystem: FileSystemStorageConfig,

    pub object_storage: ObjectStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Filesystem,
            filesystem: FileSystemStorageConfig::default(),
            object_storage: ObjectStorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FileSystemStorageConfig {
    /// JSON file holding the resource aggregate.
    pub resource_file_path: PathBuf,

    /// Directory holding compiled policy attachments.
    pub policy_attachments_dir: PathBuf,
}

impl Default for FileSystemStorageConfig {
    fn default() -> Self {
        Self {
            resource_file_path: PathBuf::from("./data/resources.json"),
            policy_attachments_dir: PathBuf::from("./data/policies"),
        }
    }
}

/// S3-compatible object storage.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObjectStorageConfig {
    /// Endpoint URL (e.g., "http://minio:9000").
    pub endpoint: String,

    pub bucket: String,

    /// Object key of the resource aggregate.
    pub resource_key: String,

    /// Key prefix under which policy attachments are stored.
    pub policy_attachments_prefix: String,

    /// Optional bearer token sent with every request.
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            bucket: "registry".to_string(),
            resource_key: "resources.json".to_string(),
            policy_attachments_prefix: "policies".to_string(),
            auth_token: None,
            request_timeout_secs: 10,
        }
    }
}

/// Policy compiler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Path or name of the `opa` binary.
    pub opa_binary: PathBuf,

    /// Local scratch directory for compiled attachments.
    pub scratch_dir: PathBuf,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            opa_binary: PathBuf::from("opa"),
            scratch_dir: std::env::temp_dir().join("gateway-registry"),
        }
    }
}

/// Schema sync pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between polls of the repository in milliseconds.
    pub poll_interval_ms: u64,

    /// Watch the resource file for changes (filesystem backend only).
    pub watch_filesystem: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            watch_filesystem: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Enable the periodic sweep.
    pub enabled: bool,

    /// Sweep interval in seconds.
    pub interval_secs: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

/// Retry configuration for updates that lose the version race.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// API key for mutating and admin endpoints (Bearer token). Unset disables the check.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}
