//! Thin JSON-RPC wrapper around the node; the verification core only ever
//! needs the deployed code and, for display, the creation transaction.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use primitive_types::{H160, H256};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected rpc response: {0}")]
    InvalidResponse(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractCreationInfo {
    pub creator: H160,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    pub transaction_hash: H256,
}

#[async_trait]
pub trait BlockchainClient: Send + Sync {
    /// Deployed runtime bytecode at the address, hex encoded. `0x` for
    /// externally owned accounts.
    async fn get_code(&self, address: H160) -> Result<String, ClientError>;

    async fn is_contract(&self, address: H160) -> Result<bool, ClientError> {
        let code = self.get_code(address).await?;
        Ok(!code.trim_start_matches("0x").is_empty())
    }

    /// Creation transaction details, when the node can answer. Nodes without
    /// the otterscan namespace return `None` rather than an error.
    async fn get_contract_creation_info(
        &self,
        address: H160,
    ) -> Result<Option<ContractCreationInfo>, ClientError>;
}

const METHOD_NOT_FOUND: i64 = -32601;

pub struct JsonRpcClient {
    http: reqwest::Client,
    url: Url,
}

impl JsonRpcClient {
    pub fn new(url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        #[derive(Deserialize)]
        struct RpcResponse {
            result: Option<serde_json::Value>,
            error: Option<RpcError>,
        }
        #[derive(Deserialize)]
        struct RpcError {
            code: i64,
            message: String,
        }

        let response: RpcResponse = self
            .http
            .post(self.url.clone())
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl BlockchainClient for JsonRpcClient {
    async fn get_code(&self, address: H160) -> Result<String, ClientError> {
        let result = self
            .call("eth_getCode", json!([encode_address(address), "latest"]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::InvalidResponse("eth_getCode returned non-string".into()))
    }

    async fn get_contract_creation_info(
        &self,
        address: H160,
    ) -> Result<Option<ContractCreationInfo>, ClientError> {
        #[derive(Deserialize)]
        struct Creator {
            creator: H160,
            hash: H256,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Transaction {
            block_number: String,
        }
        #[derive(Deserialize)]
        struct Block {
            timestamp: String,
        }

        let result = match self
            .call("ots_getContractCreator", json!([encode_address(address)]))
            .await
        {
            Err(ClientError::Rpc { code, .. }) if code == METHOD_NOT_FOUND => return Ok(None),
            other => other?,
        };
        if result.is_null() {
            return Ok(None);
        }
        let creator: Creator = serde_json::from_value(result)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        let transaction: Transaction = serde_json::from_value(
            self.call(
                "eth_getTransactionByHash",
                json!([format!("0x{}", hex::encode(creator.hash))]),
            )
            .await?,
        )
        .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        let block_number = decode_quantity(&transaction.block_number)?;

        let block: Block = serde_json::from_value(
            self.call(
                "eth_getBlockByNumber",
                json!([transaction.block_number, false]),
            )
            .await?,
        )
        .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        let timestamp = Utc
            .timestamp_opt(decode_quantity(&block.timestamp)? as i64, 0)
            .single()
            .ok_or_else(|| ClientError::InvalidResponse("block timestamp out of range".into()))?;

        Ok(Some(ContractCreationInfo {
            creator: creator.creator,
            block_number,
            timestamp,
            transaction_hash: creator.hash,
        }))
    }
}

fn encode_address(address: H160) -> String {
    format!("0x{}", hex::encode(address))
}

fn decode_quantity(quantity: &str) -> Result<u64, ClientError> {
    u64::from_str_radix(quantity.trim_start_matches("0x"), 16)
        .map_err(|_| ClientError::InvalidResponse(format!("bad quantity `{quantity}`")))
}
