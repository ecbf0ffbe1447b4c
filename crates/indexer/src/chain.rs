//! On-chain reads over HTTP JSON-RPC

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{hex, Address, U256};
use alloy_rpc_types::Log;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use raffle_sync_contracts::{IDrawInstance, LogMeta, RawLog};
use raffle_sync_core::TokenId;
use serde_json::{json, Value};

use crate::error::{IndexerError, IndexerResult};

/// View calls against a deployed draw instance
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn name(&self, draw: Address) -> IndexerResult<String>;

    async fn owner(&self, draw: Address) -> IndexerResult<Address>;

    async fn total_supply(&self, draw: Address) -> IndexerResult<U256>;

    async fn owner_of(&self, draw: Address, token: TokenId) -> IndexerResult<Address>;
}

pub struct RpcChain {
    client: reqwest::Client,
    rpc_url: String,
    next_id: AtomicU64,
}

impl RpcChain {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn request(&self, method: &str, params: Value) -> IndexerResult<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| IndexerError::ChainRead(e.to_string()))?;

        let mut json: Value = response
            .json()
            .await
            .map_err(|e| IndexerError::ChainRead(e.to_string()))?;

        if let Some(error) = json.get("error") {
            return Err(IndexerError::ChainRead(format!("{method}: {error}")));
        }

        json.get_mut("result")
            .map(Value::take)
            .ok_or_else(|| IndexerError::ChainRead(format!("{method}: no result in response")))
    }

    /// `eth_call` against the latest block
    async fn call<C: SolCall>(&self, to: Address, call: C) -> IndexerResult<C::Return> {
        let params = json!([
            {
                "to": format!("{:?}", to),
                "data": hex::encode_prefixed(call.abi_encode()),
            },
            "latest"
        ]);
        let result = self.request("eth_call", params).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| IndexerError::ChainRead("eth_call result is not a string".into()))?;
        let bytes = hex::decode(raw)
            .map_err(|e| IndexerError::ChainRead(format!("eth_call returned bad hex: {e}")))?;

        C::abi_decode_returns(&bytes).map_err(|e| {
            IndexerError::ChainRead(format!("{} on {:?}: {}", C::SIGNATURE, to, e))
        })
    }

    /// Current block number via eth_blockNumber
    pub async fn block_number(&self) -> IndexerResult<u64> {
        let result = self.request("eth_blockNumber", json!([])).await?;
        let hex_number = result
            .as_str()
            .ok_or_else(|| IndexerError::ChainRead("eth_blockNumber result is not a string".into()))?;

        u64::from_str_radix(hex_number.trim_start_matches("0x"), 16)
            .map_err(|e| IndexerError::ChainRead(format!("Invalid block number: {}", e)))
    }

    /// Logs emitted by `addresses` in `[from_block, to_block]`
    pub async fn logs(
        &self,
        addresses: &[Address],
        from_block: u64,
        to_block: u64,
    ) -> IndexerResult<Vec<RawLog>> {
        let filter = json!({
            "address": addresses.iter().map(|a| format!("{:?}", a)).collect::<Vec<_>>(),
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
        });
        let result = self.request("eth_getLogs", json!([filter])).await?;

        let logs: Vec<Log> = serde_json::from_value(result)
            .map_err(|e| IndexerError::ChainRead(format!("eth_getLogs: {e}")))?;

        Ok(logs.into_iter().filter_map(raw_log).collect())
    }
}

#[async_trait]
impl ChainReader for RpcChain {
    async fn name(&self, draw: Address) -> IndexerResult<String> {
        self.call(draw, IDrawInstance::nameCall {}).await
    }

    async fn owner(&self, draw: Address) -> IndexerResult<Address> {
        self.call(draw, IDrawInstance::ownerCall {}).await
    }

    async fn total_supply(&self, draw: Address) -> IndexerResult<U256> {
        self.call(draw, IDrawInstance::totalSupplyCall {}).await
    }

    async fn owner_of(&self, draw: Address, token: TokenId) -> IndexerResult<Address> {
        self.call(
            draw,
            IDrawInstance::ownerOfCall {
                tokenId: U256::from(token),
            },
        )
        .await
    }
}

/// Convert an RPC log. Removed (reorged) logs are dropped.
pub fn raw_log(log: Log) -> Option<RawLog> {
    if log.removed {
        return None;
    }
    Some(RawLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        meta: LogMeta {
            block_number: log.block_number.unwrap_or_default(),
            transaction_hash: log.transaction_hash.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
        },
    })
}
