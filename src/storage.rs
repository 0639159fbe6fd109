//! Storage collaborator interface. The verification core never writes here
//! itself; the calling layer persists results after a verdict, which keeps
//! the core side-effect free and easy to test against the in-memory variant.

use crate::verifier::MatchType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use primitive_types::H160;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("contract 0x{} is not stored", hex::encode(.0))]
    NotFound(H160),
    #[error("storage error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub address: H160,
    pub bytecode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<H160>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Everything the caller chose to persist about a successful (or failed)
/// verification attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub verified: bool,
    pub sources: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<serde_json::Value>,
    pub compiler_version: String,
    pub optimization_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization_runs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor_arguments: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub libraries: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    pub verified_at: DateTime<Utc>,
}

#[async_trait]
pub trait ContractStorage: Send + Sync {
    async fn get_contract(&self, address: H160) -> Result<Option<ContractRecord>, StorageError>;

    async fn store_contract(&self, record: ContractRecord) -> Result<(), StorageError>;

    async fn get_contract_verification(
        &self,
        address: H160,
    ) -> Result<Option<VerificationRecord>, StorageError>;

    /// Fails with `NotFound` when the contract itself was never stored.
    async fn update_contract_verification(
        &self,
        address: H160,
        record: VerificationRecord,
    ) -> Result<(), StorageError>;
}

/// Hash-map backed storage for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryStorage {
    contracts: RwLock<HashMap<H160, (ContractRecord, Option<VerificationRecord>)>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContractStorage for InMemoryStorage {
    async fn get_contract(&self, address: H160) -> Result<Option<ContractRecord>, StorageError> {
        Ok(self
            .contracts
            .read()
            .get(&address)
            .map(|(record, _)| record.clone()))
    }

    async fn store_contract(&self, record: ContractRecord) -> Result<(), StorageError> {
        self.contracts
            .write()
            .entry(record.address)
            .and_modify(|(stored, _)| *stored = record.clone())
            .or_insert((record, None));
        Ok(())
    }

    async fn get_contract_verification(
        &self,
        address: H160,
    ) -> Result<Option<VerificationRecord>, StorageError> {
        Ok(self
            .contracts
            .read()
            .get(&address)
            .and_then(|(_, verification)| verification.clone()))
    }

    async fn update_contract_verification(
        &self,
        address: H160,
        record: VerificationRecord,
    ) -> Result<(), StorageError> {
        match self.contracts.write().get_mut(&address) {
            Some((_, verification)) => {
                *verification = Some(record);
                Ok(())
            }
            None => Err(StorageError::NotFound(address)),
        }
    }
}
