//! The verification flow: validate the request, fetch the deployed code,
//! resolve the toolchain and the import closure, compile, pick the contract
//! and match its bytecode against chain state. Every failure is terminal and
//! typed; nothing is retried behind the caller's back.

use crate::{
    blockchain::{BlockchainClient, ClientError},
    compilation::{self, CompilationDriver, SolcInput},
    compilation::artifacts::SourceLocation,
    compiler::{self, DetailedVersion, EvmVersion, ToolchainCache},
    sources::{self, SourceSet, UnresolvedImport},
    verifier::{self, MatchError, MatchType, SelectorError},
};
use primitive_types::H160;
use std::{collections::BTreeMap, str::FromStr, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{instrument, Instrument};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceInput {
    /// A single flattened source; the file is named after the contract.
    Single { content: String },
    /// Logical path to content, as the paths appear in import statements.
    Files(BTreeMap<String, String>),
}

#[derive(Clone, Debug)]
pub struct VerificationRequest {
    pub contract_address: H160,
    pub sources: SourceInput,
    pub compiler_version: String,
    pub contract_name: String,
    pub optimization_used: bool,
    pub optimization_runs: Option<u32>,
    pub evm_version: Option<String>,
    pub constructor_arguments: Option<String>,
    pub libraries: BTreeMap<String, String>,
    pub import_aliases: BTreeMap<String, String>,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("address 0x{} has no deployed code", hex::encode(.0))]
    NotAContract(H160),
    #[error("compiler version `{0}` is not available")]
    UnsupportedVersion(String),
    #[error("EVM target `{requested}` is not supported by compiler {compiler}")]
    UnsupportedEvmVersion { requested: String, compiler: String },
    #[error("cannot resolve import `{path}` requested from `{from}`")]
    UnresolvedImport { path: String, from: String },
    #[error("compilation failed: {message}")]
    CompileError {
        message: String,
        location: Option<SourceLocation>,
    },
    #[error(
        "contract `{contract}` was not found; files seen: [{}], contracts seen: [{}]",
        .files.join(", "),
        .contracts.join(", ")
    )]
    ContractNotFound {
        contract: String,
        files: Vec<String>,
        contracts: Vec<String>,
    },
    #[error("contract `{contract}` is ambiguous, defined in: [{}]", .files.join(", "))]
    AmbiguousContractName { contract: String, files: Vec<String> },
    #[error("library `{name}` was not linked")]
    UnlinkedLibrary { name: String },
    #[error(
        "bytecode does not match chain state: first difference at byte {offset}, \
         on-chain code is {expected_length} bytes, compiled code is {actual_length}"
    )]
    BytecodeMismatch {
        offset: usize,
        expected_length: usize,
        actual_length: usize,
    },
    #[error("verification timed out: {0}")]
    Timeout(String),
    #[error("blockchain client error: {0}")]
    Blockchain(#[from] ClientError),
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl From<compiler::Error> for Error {
    fn from(err: compiler::Error) -> Self {
        match err {
            compiler::Error::VersionNotFound(version) => Error::UnsupportedVersion(version),
            compiler::Error::UnsupportedEvmVersion {
                requested,
                compiler,
            } => Error::UnsupportedEvmVersion {
                requested: requested.to_string(),
                compiler: compiler.to_string(),
            },
            compiler::Error::Fetch(err) => Error::Internal(err.into()),
        }
    }
}

impl From<UnresolvedImport> for Error {
    fn from(err: UnresolvedImport) -> Self {
        Error::UnresolvedImport {
            path: err.import_path,
            from: err.requesting_file,
        }
    }
}

impl From<compilation::Error> for Error {
    fn from(err: compilation::Error) -> Self {
        match err {
            compilation::Error::QueueTimeout | compilation::Error::ExecutionTimeout(_) => {
                Error::Timeout(err.to_string())
            }
            compilation::Error::Compilation { message, location } => {
                Error::CompileError { message, location }
            }
            compilation::Error::Internal(err) => Error::Internal(err),
        }
    }
}

impl From<SelectorError> for Error {
    fn from(err: SelectorError) -> Self {
        match err {
            SelectorError::NotFound {
                contract,
                files,
                contracts,
            } => Error::ContractNotFound {
                contract,
                files,
                contracts,
            },
            SelectorError::Ambiguous { contract, files } => {
                Error::AmbiguousContractName { contract, files }
            }
        }
    }
}

impl From<MatchError> for Error {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::UnlinkedLibrary { name } => Error::UnlinkedLibrary { name },
            MatchError::InvalidLibraryAddress { name } => {
                Error::InvalidRequest(format!("library `{name}` address is not valid"))
            }
            MatchError::Mismatch {
                offset,
                expected_length,
                actual_length,
            } => Error::BytecodeMismatch {
                offset,
                expected_length,
                actual_length,
            },
            MatchError::InvalidBytecode(message) => Error::Internal(anyhow::anyhow!(message)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct VerificationSuccess {
    pub file_path: String,
    pub contract_name: String,
    pub abi: Vec<serde_json::Value>,
    pub metadata: Option<String>,
    pub compiler_version: DetailedVersion,
    pub evm_version: Option<EvmVersion>,
    pub match_type: MatchType,
    pub constructor_arguments: Option<String>,
    pub sources: SourceSet,
}

pub struct VerificationClient {
    toolchains: Arc<ToolchainCache>,
    driver: Arc<CompilationDriver>,
    blockchain: Arc<dyn BlockchainClient>,
    total_timeout: Duration,
}

impl VerificationClient {
    pub fn new(
        toolchains: Arc<ToolchainCache>,
        driver: Arc<CompilationDriver>,
        blockchain: Arc<dyn BlockchainClient>,
        total_timeout: Duration,
    ) -> Self {
        Self {
            toolchains,
            driver,
            blockchain,
            total_timeout,
        }
    }

    /// Runs the whole flow under one budget. On expiry the in-flight
    /// compiler subprocess, if any, is killed with the dropped future.
    #[instrument(name = "verify", skip_all, fields(address = ?request.contract_address, contract = %request.contract_name))]
    pub async fn verify(
        &self,
        request: VerificationRequest,
    ) -> Result<VerificationSuccess, Error> {
        tokio::time::timeout(self.total_timeout, self.run(request))
            .in_current_span()
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "exceeded the overall budget of {:?}",
                    self.total_timeout
                ))
            })?
    }

    async fn run(&self, request: VerificationRequest) -> Result<VerificationSuccess, Error> {
        let (files, entries) = validate(&request)?;

        let on_chain_code = self.blockchain.get_code(request.contract_address).await?;
        if on_chain_code.trim_start_matches("0x").is_empty() {
            return Err(Error::NotAContract(request.contract_address));
        }

        let requested_version = DetailedVersion::from_str(&request.compiler_version)
            .map_err(|e| Error::InvalidRequest(format!("compiler version: {e}")))?;
        let toolchain = self.toolchains.get(&requested_version).await?;

        let requested_evm = request
            .evm_version
            .as_deref()
            .map(|name| {
                EvmVersion::from_str(name).map_err(|_| Error::UnsupportedEvmVersion {
                    requested: name.to_string(),
                    compiler: toolchain.version.to_string(),
                })
            })
            .transpose()?;
        let evm_version = ToolchainCache::resolve_evm_version(&toolchain.version, requested_evm)?;

        let source_set = sources::resolve(&entries, &files, &request.import_aliases)?;
        tracing::debug!(files = source_set.len(), "resolved import closure");

        let input = SolcInput::new(
            source_set.clone(),
            request.optimization_used,
            request.optimization_runs,
            evm_version,
            &request.libraries,
        );
        let output = self.driver.compile(&toolchain, &input).await?;

        let (file_path, contract) = verifier::select(&output.contracts, &request.contract_name)?;

        let deployed = contract
            .evm
            .as_ref()
            .and_then(|evm| evm.deployed_bytecode.as_ref())
            .ok_or_else(|| {
                anyhow::anyhow!("compiler produced no deployed bytecode for `{file_path}`")
            })?;
        // well-formedness check only; the raw json is what callers persist
        serde_json::from_value::<ethabi::Contract>(serde_json::Value::Array(
            contract.abi.clone(),
        ))
        .map_err(|e| anyhow::anyhow!("compiler produced an invalid abi: {e}"))?;

        let linked = verifier::link_libraries(
            &deployed.object,
            &deployed.link_references,
            &request.libraries,
        )?;
        let match_type = verifier::compare(&on_chain_code, &linked)?;
        tracing::info!(?match_type, file = file_path, "bytecode matched");

        Ok(VerificationSuccess {
            file_path: file_path.to_string(),
            contract_name: request.contract_name,
            abi: contract.abi.clone(),
            metadata: contract.metadata.clone(),
            evm_version: evm_version
                .or_else(|| ToolchainCache::default_evm_version(&toolchain.version)),
            compiler_version: toolchain.version,
            match_type,
            constructor_arguments: request.constructor_arguments,
            sources: source_set,
        })
    }
}

/// Request-shape checks that need no collaborator: something to compile,
/// a contract name and syntactically valid constructor arguments. Returns
/// the file map and the entry files the import resolution starts from.
fn validate(
    request: &VerificationRequest,
) -> Result<(BTreeMap<String, String>, Vec<String>), Error> {
    if request.contract_name.trim().is_empty() {
        return Err(Error::InvalidRequest("contract name is empty".into()));
    }
    if let Some(args) = &request.constructor_arguments {
        if !verifier::validate_constructor_arguments(args) {
            return Err(Error::InvalidRequest(
                "constructor arguments are not valid hex".into(),
            ));
        }
    }

    match &request.sources {
        SourceInput::Single { content } => {
            if content.trim().is_empty() {
                return Err(Error::InvalidRequest("source code is empty".into()));
            }
            let path = format!("{}.sol", request.contract_name);
            Ok((
                BTreeMap::from([(path.clone(), content.clone())]),
                vec![path],
            ))
        }
        SourceInput::Files(files) => {
            if files.is_empty() {
                return Err(Error::InvalidRequest("no source files supplied".into()));
            }
            // every submitted file is an entry, so each one's imports are
            // validated even if the target contract does not reach them
            Ok((files.clone(), files.keys().cloned().collect()))
        }
    }
}
