//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → RegistryConfig (validated, immutable)
//!     → handed to lifecycle::startup to build the subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, FileSystemStorageConfig, ListenerConfig, LogFormat, ObjectStorageConfig, ObservabilityConfig,
    PolicyConfig, ReconciliationConfig, RegistryConfig, RetryConfig, StorageBackend, StorageConfig, SyncConfig,
};
pub use validation::InvalidSetting;
