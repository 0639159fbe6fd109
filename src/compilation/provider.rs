use super::artifacts::{CompilerOutput, SolcInput};
use crate::compiler::DetailedVersion;
use async_trait::async_trait;
use std::{path::Path, process::Stdio};
use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("couldn't run the compiler: {0}")]
    Io(#[from] std::io::Error),
    #[error("compiler exited with {status}: {stderr}")]
    NonZeroExit {
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("compiler produced invalid output: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

/// A compiler family capable of turning a standard-json input into a
/// standard-json output. One implementation per toolchain family; the
/// verification flow is polymorphic over this closed set.
#[async_trait]
pub trait ToolchainProvider: Send + Sync {
    async fn compile(
        &self,
        compiler_path: &Path,
        version: &DetailedVersion,
        input: &SolcInput,
    ) -> Result<CompilerOutput, ProviderError>;
}

/// Drives a `solc` binary over `--standard-json`.
///
/// The subprocess is spawned with `kill_on_drop`, so cancelling or timing
/// out the compile future terminates the compiler instead of leaving it
/// running in the background.
#[derive(Debug, Default)]
pub struct SolcToolchain {}

impl SolcToolchain {
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl ToolchainProvider for SolcToolchain {
    async fn compile(
        &self,
        compiler_path: &Path,
        _version: &DetailedVersion,
        input: &SolcInput,
    ) -> Result<CompilerOutput, ProviderError> {
        let serialized = serde_json::to_vec(input)?;

        let mut child = Command::new(compiler_path)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        {
            // stdin handle is dropped after the write so the compiler sees EOF
            let mut stdin = child.stdin.take().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "compiler stdin not captured")
            })?;
            stdin.write_all(&serialized).await?;
        }

        let output = child.wait_with_output().await?;

        // solc reports compilation problems inside the json on exit code 0;
        // a non-zero exit means the invocation itself failed
        if !output.status.success() {
            return Err(ProviderError::NonZeroExit {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}
