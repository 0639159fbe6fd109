use super::{
    artifacts::{CompilerOutput, SolcInput, SourceLocation},
    provider::{ProviderError, ToolchainProvider},
};
use crate::compiler::ToolchainHandle;
use anyhow::Context;
use std::{num::NonZeroUsize, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum Error {
    #[error("too many pending compilations, timed out waiting for a free compiler slot")]
    QueueTimeout,
    #[error("compilation took longer than {0:?} and was aborted")]
    ExecutionTimeout(Duration),
    #[error("compilation error: {message}")]
    Compilation {
        message: String,
        location: Option<SourceLocation>,
    },
    #[error("internal error while compiling: {0:#}")]
    Internal(#[from] anyhow::Error),
}

/// Runs compilations behind a bounded pool of compiler slots.
///
/// Compiler invocations are CPU- and memory-heavy; the semaphore caps how
/// many run at once, the queue timeout bounds how long a request may wait
/// for a slot, and the execution timeout bounds a single invocation. An
/// expired execution timeout drops the compile future, which kills the
/// compiler subprocess.
pub struct CompilationDriver {
    provider: Arc<dyn ToolchainProvider>,
    slots: Arc<Semaphore>,
    queue_timeout: Duration,
    execution_timeout: Duration,
}

impl CompilationDriver {
    pub fn new(
        provider: Arc<dyn ToolchainProvider>,
        concurrency: NonZeroUsize,
        queue_timeout: Duration,
        execution_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            slots: Arc::new(Semaphore::new(concurrency.get())),
            queue_timeout,
            execution_timeout,
        }
    }

    #[instrument(name = "compile", skip(self, input), level = "debug")]
    pub async fn compile(
        &self,
        toolchain: &ToolchainHandle,
        input: &SolcInput,
    ) -> Result<CompilerOutput, Error> {
        let permit = tokio::time::timeout(self.queue_timeout, self.slots.acquire())
            .await
            .map_err(|_| Error::QueueTimeout)?
            .context("acquiring compiler slot")?;

        let output = tokio::time::timeout(
            self.execution_timeout,
            self.provider
                .compile(&toolchain.solc_path, &toolchain.version, input),
        )
        .await
        .map_err(|_| Error::ExecutionTimeout(self.execution_timeout))?
        .map_err(|err: ProviderError| anyhow::Error::new(err).context("invoking compiler"))?;
        drop(permit);

        check_diagnostics(output)
    }
}

/// Aborts on fatal diagnostics; warnings are logged and dropped, they have
/// no bearing on the verification verdict.
fn check_diagnostics(output: CompilerOutput) -> Result<CompilerOutput, Error> {
    let mut errors = output.errors.iter().filter(|e| e.is_error()).peekable();
    if errors.peek().is_some() {
        let location = output
            .errors
            .iter()
            .find(|e| e.is_error())
            .and_then(|e| e.source_location.clone());
        let message = errors
            .map(|e| e.display_message().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        return Err(Error::Compilation { message, location });
    }

    for warning in &output.errors {
        tracing::debug!(message = warning.display_message(), "compiler warning");
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compilation::artifacts::Diagnostic,
        compiler::{DetailedVersion, ToolchainHandle},
        sources::SourceSet,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::{path::Path, str::FromStr};

    fn toolchain() -> ToolchainHandle {
        ToolchainHandle {
            version: DetailedVersion::from_str("0.8.0+commit.c7dfd78e").unwrap(),
            solc_path: "solc".into(),
        }
    }

    fn input() -> SolcInput {
        let mut sources = SourceSet::default();
        sources.insert("source.sol", "pragma");
        SolcInput::new(sources, false, None, None, &Default::default())
    }

    fn driver(provider: Arc<dyn ToolchainProvider>, concurrency: usize) -> CompilationDriver {
        CompilationDriver::new(
            provider,
            NonZeroUsize::new(concurrency).unwrap(),
            Duration::from_millis(100),
            Duration::from_millis(100),
        )
    }

    struct FixedOutput(CompilerOutput);

    #[async_trait]
    impl ToolchainProvider for FixedOutput {
        async fn compile(
            &self,
            _: &Path,
            _: &DetailedVersion,
            _: &SolcInput,
        ) -> Result<CompilerOutput, ProviderError> {
            Ok(self.0.clone())
        }
    }

    struct Hanging;

    #[async_trait]
    impl ToolchainProvider for Hanging {
        async fn compile(
            &self,
            _: &Path,
            _: &DetailedVersion,
            _: &SolcInput,
        ) -> Result<CompilerOutput, ProviderError> {
            futures::future::pending().await
        }
    }

    fn diagnostic(severity: &str, message: &str) -> Diagnostic {
        Diagnostic {
            source_location: Some(SourceLocation {
                file: "source.sol".into(),
                start: 0,
                end: 1,
            }),
            severity: severity.into(),
            message: message.into(),
            formatted_message: None,
        }
    }

    #[tokio::test]
    async fn warnings_are_dropped() {
        let output = CompilerOutput {
            errors: vec![diagnostic("warning", "Unused local variable.")],
            contracts: Default::default(),
        };
        let driver = driver(Arc::new(FixedOutput(output.clone())), 1);
        let compiled = driver.compile(&toolchain(), &input()).await.unwrap();
        assert_eq!(compiled, output);
    }

    #[tokio::test]
    async fn fatal_diagnostics_abort() {
        let output = CompilerOutput {
            errors: vec![
                diagnostic("warning", "Unused local variable."),
                diagnostic("error", "ParserError: Expected ';'"),
            ],
            contracts: Default::default(),
        };
        let driver = driver(Arc::new(FixedOutput(output)), 1);
        let err = driver.compile(&toolchain(), &input()).await.unwrap_err();
        match err {
            Error::Compilation { message, location } => {
                assert_eq!(message, "ParserError: Expected ';'");
                assert_eq!(location.unwrap().file, "source.sol");
            }
            other => panic!("expected compilation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn execution_timeout_aborts_the_compilation() {
        let driver = driver(Arc::new(Hanging), 1);
        let err = driver.compile(&toolchain(), &input()).await.unwrap_err();
        assert!(matches!(err, Error::ExecutionTimeout(_)));
    }

    #[tokio::test]
    async fn saturated_pool_rejects_after_queue_timeout() {
        let driver = Arc::new(CompilationDriver::new(
            Arc::new(Hanging),
            NonZeroUsize::new(1).unwrap(),
            Duration::from_millis(50),
            Duration::from_secs(10),
        ));

        let occupant = {
            let driver = Arc::clone(&driver);
            tokio::spawn(async move { driver.compile(&toolchain(), &input()).await })
        };
        tokio::task::yield_now().await;

        let err = driver.compile(&toolchain(), &input()).await.unwrap_err();
        assert!(matches!(err, Error::QueueTimeout));
        occupant.abort();
    }
}
