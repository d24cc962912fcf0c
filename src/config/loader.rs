//! Configuration loading from disk and environment.

use std::path::{Path, PathBuf};
use std::fs;

use thiserror::Error;

use crate::config::schema::{RegistryConfig, StorageBackend};
use crate::config::validation::{validate_config, InvalidSetting};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid environment override {name}: {reason}")]
    Env { name: &'static str, reason: String },

    #[error("Validation failed: {}", join(.0))]
    Invalid(Vec<InvalidSetting>),
}

fn join(errors: &[InvalidSetting]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: TOML file (or defaults), then environment overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<RegistryConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => RegistryConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Invalid)?;

    Ok(config)
}

pub fn parse_config(content: &str) -> Result<RegistryConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply the supported environment variables, read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut RegistryConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("REGISTRY_BIND_ADDRESS") {
        config.listener.bind_address = value;
    }
    if let Some(value) = lookup("REGISTRY_STORAGE_BACKEND") {
        config.storage.backend = match value.as_str() {
            "filesystem" => StorageBackend::Filesystem,
            "object_storage" => StorageBackend::ObjectStorage,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::Env {
                    name: "REGISTRY_STORAGE_BACKEND",
                    reason: format!("unknown backend `{}`", other),
                })
            }
        };
    }
    if let Some(value) = lookup("FS_RESOURCE_REPOSITORY_PATH") {
        config.storage.filesystem.resource_file_path = PathBuf::from(value);
    }
    if let Some(value) = lookup("FS_REPOSITORY_POLICY_ATTACHMENTS_FOLDER_PATH") {
        config.storage.filesystem.policy_attachments_dir = PathBuf::from(value);
    }
    if let Some(value) = lookup("OBJECT_STORAGE_ENDPOINT") {
        config.storage.object_storage.endpoint = value;
    }
    if let Some(value) = lookup("OBJECT_STORAGE_BUCKET") {
        config.storage.object_storage.bucket = value;
    }
    if let Some(value) = lookup("OBJECT_STORAGE_TOKEN") {
        config.storage.object_storage.auth_token = Some(value);
    }
    if let Some(value) = lookup("REGISTRY_ADMIN_API_KEY") {
        config.admin.api_key = Some(value);
    }
    if let Some(value) = lookup("OPA_BINARY") {
        config.policy.opa_binary = PathBuf::from(value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_partial_file() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:7000"

            [storage]
            backend = "object_storage"

            [storage.object_storage]
            endpoint = "http://minio:9000"
            bucket = "gateway"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:7000");
        assert_eq!(config.storage.backend, StorageBackend::ObjectStorage);
        assert_eq!(config.storage.object_storage.bucket, "gateway");
        assert_eq!(config.storage.object_storage.resource_key, "resources.json");
        assert_eq!(config.reconciliation.interval_secs, 300);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("REGISTRY_STORAGE_BACKEND", "memory"),
            ("FS_RESOURCE_REPOSITORY_PATH", "/srv/resources.json"),
            ("REGISTRY_ADMIN_API_KEY", "k"),
        ]
        .into_iter()
        .collect();

        let mut config = RegistryConfig::default();
        apply_env_overrides(&mut config, |name| env.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.filesystem.resource_file_path, PathBuf::from("/srv/resources.json"));
        assert_eq!(config.admin.api_key.as_deref(), Some("k"));

        let err = apply_env_overrides(&mut config, |name| {
            (name == "REGISTRY_STORAGE_BACKEND").then(|| "tape".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
