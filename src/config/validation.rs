//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the settings of the selected storage backend
//! - Validate value ranges (intervals > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RegistryConfig → Result<(), Vec<InvalidSetting>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{RegistryConfig, StorageBackend};

/// One rejected setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSetting {
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for InvalidSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

pub fn validate_config(config: &RegistryConfig) -> Result<(), Vec<InvalidSetting>> {
    let mut errors = Vec::new();
    let mut reject = |field: &'static str, reason: String| errors.push(InvalidSetting { field, reason });

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        reject(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        );
    }
    if config.listener.request_timeout_secs == 0 {
        reject("listener.request_timeout_secs", "must be positive".into());
    }
    if config.listener.max_body_bytes == 0 {
        reject("listener.max_body_bytes", "must be positive".into());
    }

    match config.storage.backend {
        StorageBackend::Filesystem => {
            let fs = &config.storage.filesystem;
            if fs.resource_file_path.as_os_str().is_empty() {
                reject("storage.filesystem.resource_file_path", "is required".into());
            }
            if fs.policy_attachments_dir.as_os_str().is_empty() {
                reject("storage.filesystem.policy_attachments_dir", "is required".into());
            }
        }
        StorageBackend::ObjectStorage => {
            let os = &config.storage.object_storage;
            match url::Url::parse(&os.endpoint) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                _ => reject(
                    "storage.object_storage.endpoint",
                    format!("`{}` is not an http(s) URL", os.endpoint),
                ),
            }
            if os.bucket.trim().is_empty() {
                reject("storage.object_storage.bucket", "is required".into());
            }
            if os.resource_key.trim_matches('/').is_empty() {
                reject("storage.object_storage.resource_key", "is required".into());
            }
            if os.policy_attachments_prefix.trim_matches('/').is_empty() {
                reject("storage.object_storage.policy_attachments_prefix", "is required".into());
            }
            if os.request_timeout_secs == 0 {
                reject("storage.object_storage.request_timeout_secs", "must be positive".into());
            }
        }
        StorageBackend::Memory => {}
    }

    if config.policy.opa_binary.as_os_str().is_empty() {
        reject("policy.opa_binary", "is required".into());
    }
    if config.sync.poll_interval_ms == 0 {
        reject("sync.poll_interval_ms", "must be positive".into());
    }
    if config.reconciliation.enabled && config.reconciliation.interval_secs == 0 {
        reject("reconciliation.interval_secs", "must be positive".into());
    }

    let retries = &config.retries;
    if retries.max_attempts == 0 {
        reject("retries.max_attempts", "must be at least 1".into());
    }
    if retries.base_delay_ms > retries.max_delay_ms {
        reject(
            "retries.base_delay_ms",
            format!("{} exceeds max_delay_ms {}", retries.base_delay_ms, retries.max_delay_ms),
        );
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        reject(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        );
    }
    if config.admin.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
        reject("admin.api_key", "must not be blank when set".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        validate_config(&RegistryConfig::default()).unwrap();
    }

    #[test]
    fn test_all_errors_are_reported() {
        let mut config = RegistryConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.storage.backend = StorageBackend::ObjectStorage;
        config.storage.object_storage.endpoint = "ftp://files".into();
        config.retries.max_attempts = 0;
        config.retries.base_delay_ms = 5000;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "storage.object_storage.endpoint",
                "retries.max_attempts",
                "retries.base_delay_ms",
            ]
        );
    }

    #[test]
    fn test_filesystem_paths_required() {
        let mut config = RegistryConfig::default();
        config.storage.filesystem.resource_file_path = Default::default();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "storage.filesystem.resource_file_path");
    }
}
