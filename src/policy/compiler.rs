//! Policy compiler seam and the local scratch area.
//!
//! A compiler turns `(metadata, source)` into attachment bytes. Compiled bytes
//! land in the scratch area first; they only reach the repository when the
//! batch is persisted after a successful commit.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;

use crate::resources::{PolicyType, ResourceMetadata};

#[derive(Debug, Error)]
pub enum CompilerError {
    /// The compiler ran and rejected the source.
    #[error("{0}")]
    Rejected(String),

    #[error("failed to run policy compiler: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait PolicyCompiler: Send + Sync {
    fn policy_type(&self) -> PolicyType;

    /// Deterministic attachment name for a policy.
    fn attachment_filename(&self, metadata: &ResourceMetadata) -> String {
        format!("{}.{}.tar.gz", metadata.namespace, metadata.name)
    }

    async fn compile(&self, metadata: &ResourceMetadata, source: &str) -> Result<Vec<u8>, CompilerError>;
}

/// Compiles Rego sources into OPA bundles with the `opa` binary.
#[derive(Debug, Clone)]
pub struct OpaCompiler {
    binary: PathBuf,
    work_dir: PathBuf,
}

impl OpaCompiler {
    pub fn new(binary: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            work_dir: work_dir.into(),
        }
    }

    async fn build(&self, dir: &Path, metadata: &ResourceMetadata, source: &str) -> Result<Vec<u8>, CompilerError> {
        let rego = dir.join(format!("{}.{}.rego", metadata.namespace, metadata.name));
        let bundle = dir.join("bundle.tar.gz");
        fs::write(&rego, source).await?;

        let output = Command::new(&self.binary)
            .arg("build")
            .arg("-o")
            .arg(&bundle)
            .arg(&rego)
            .current_dir(dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let message = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(CompilerError::Rejected(message.trim().to_string()));
        }

        Ok(fs::read(&bundle).await?)
    }
}

#[async_trait]
impl PolicyCompiler for OpaCompiler {
    fn policy_type(&self) -> PolicyType {
        PolicyType::Opa
    }

    async fn compile(&self, metadata: &ResourceMetadata, source: &str) -> Result<Vec<u8>, CompilerError> {
        let dir = self.work_dir.join(format!("opa-{}", uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&dir).await?;

        let result = self.build(&dir, metadata, source).await;
        if let Err(e) = fs::remove_dir_all(&dir).await {
            tracing::warn!(error = %e, dir = ?dir, "Failed to remove compiler work directory");
        }
        result
    }
}

/// Local directory holding generated attachments until they are persisted.
#[derive(Debug, Clone)]
pub struct ScratchArea {
    dir: PathBuf,
}

impl ScratchArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `content` under a unique scratch path derived from `filename`.
    pub async fn write(&self, filename: &str, content: &[u8]) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}-{}", uuid::Uuid::new_v4().simple(), filename));
        fs::write(&path, content).await?;
        Ok(path)
    }

    pub async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        fs::read(path).await
    }

    /// Remove a scratch file; a missing file is already clean.
    pub async fn remove(&self, path: &Path) -> std::io::Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
