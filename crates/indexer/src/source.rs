//! Log source: historical backfill followed by a live subscription
//!
//! The subscription is opened before each gap backfill so nothing emitted
//! between the two is lost. Overlapping deliveries are dropped by the ledger.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_rpc_types::Log;
use futures_util::{SinkExt, StreamExt};
use raffle_sync_contracts::RawLog;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::chain::{raw_log, RpcChain};
use crate::error::{IndexerError, IndexerResult};

pub struct LogSource {
    chain: Arc<RpcChain>,
    ws_url: String,
    addresses: Vec<Address>,
    batch_size: u64,
    reconnect_delay: Duration,
}

impl LogSource {
    pub fn new(
        chain: Arc<RpcChain>,
        ws_url: impl Into<String>,
        addresses: Vec<Address>,
        batch_size: u64,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            chain,
            ws_url: ws_url.into(),
            addresses,
            batch_size: batch_size.max(1),
            reconnect_delay,
        }
    }

    /// Send every log in `[from_block, head]` in chain order. Returns the
    /// first block not yet covered.
    pub async fn backfill(
        &self,
        from_block: u64,
        tx: &mpsc::UnboundedSender<RawLog>,
    ) -> IndexerResult<u64> {
        let head = self.chain.block_number().await?;
        if from_block > head {
            return Ok(from_block);
        }

        let mut start = from_block;
        while start <= head {
            let end = start.saturating_add(self.batch_size - 1).min(head);
            let mut logs = self.chain.logs(&self.addresses, start, end).await?;
            logs.sort_by_key(|log| (log.meta.block_number, log.meta.log_index));

            tracing::debug!("Backfilled {} logs from blocks {}..={}", logs.len(), start, end);
            for log in logs {
                tx.send(log)
                    .map_err(|_| IndexerError::Internal("log receiver dropped".into()))?;
            }
            start = end + 1;
        }

        Ok(head + 1)
    }

    /// Run until the receiver is dropped.
    pub fn spawn(self, from_block: u64) -> (mpsc::UnboundedReceiver<RawLog>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move { self.run(from_block, tx).await });
        (rx, handle)
    }

    async fn run(self, from_block: u64, tx: mpsc::UnboundedSender<RawLog>) {
        let mut next_block = from_block;

        loop {
            match self.backfill(next_block, &tx).await {
                Ok(next) => {
                    next_block = next;
                    break;
                }
                Err(_) if tx.is_closed() => return,
                Err(e) => {
                    tracing::warn!(
                        "Backfill from block {} failed: {}. Retrying in {:?}",
                        next_block,
                        e,
                        self.reconnect_delay
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
        tracing::info!("Backfill complete, following chain head from block {}", next_block);

        loop {
            match self.stream(&tx, &mut next_block).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(
                        "WebSocket disconnected: {}. Reconnecting in {:?}...",
                        e,
                        self.reconnect_delay
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    /// One subscription lifetime. `Ok` means the receiver is gone.
    async fn stream(
        &self,
        tx: &mpsc::UnboundedSender<RawLog>,
        next_block: &mut u64,
    ) -> IndexerResult<()> {
        let (ws_stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| IndexerError::Subscription(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe_msg = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": [
                "logs",
                { "address": self.addresses.iter().map(|a| format!("{:?}", a)).collect::<Vec<_>>() }
            ]
        });
        write
            .send(Message::Text(subscribe_msg.to_string().into()))
            .await
            .map_err(|e| IndexerError::Subscription(e.to_string()))?;

        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let json: serde_json::Value = serde_json::from_str(&text)
                        .map_err(|e| IndexerError::Subscription(e.to_string()))?;
                    if let Some(error) = json.get("error") {
                        return Err(IndexerError::Subscription(error.to_string()));
                    }
                    if let Some(id) = json.get("result").and_then(|r| r.as_str()) {
                        tracing::debug!("Subscribed with ID: {}", id);
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(IndexerError::Subscription(e.to_string())),
                None => return Err(IndexerError::Subscription("connection closed".into())),
            }
        }

        // Cover whatever was emitted while disconnected
        *next_block = self.backfill(*next_block, tx).await?;

        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let Some(log) = parse_notification(&text) else {
                        continue;
                    };
                    // Logs later in the same block may still be missing after a drop
                    *next_block = (*next_block).max(log.meta.block_number);
                    if tx.send(log).is_err() {
                        return Ok(());
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(IndexerError::Subscription("connection closed".into()));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(IndexerError::Subscription(e.to_string())),
            }
        }
    }
}

/// Extract the log from an `eth_subscription` notification
fn parse_notification(text: &str) -> Option<RawLog> {
    let mut json: serde_json::Value = serde_json::from_str(text).ok()?;
    if json.get("method").and_then(|m| m.as_str()) != Some("eth_subscription") {
        return None;
    }
    let result = json.get_mut("params")?.get_mut("result")?.take();
    match serde_json::from_value::<Log>(result) {
        Ok(log) => raw_log(log),
        Err(e) => {
            tracing::warn!("Failed to parse log: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    #[test]
    fn test_parse_notification() {
        let text = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {
                "subscription": "0x1",
                "result": {
                    "address": "0x2612fc96119df2d88c5be25ddd1276b06c7a763d",
                    "topics": [format!("{:?}", B256::repeat_byte(1))],
                    "data": "0x",
                    "blockNumber": "0x10",
                    "blockHash": format!("{:?}", B256::repeat_byte(2)),
                    "transactionHash": format!("{:?}", B256::repeat_byte(3)),
                    "transactionIndex": "0x0",
                    "logIndex": "0x2",
                    "removed": false
                }
            }
        })
        .to_string();

        let log = parse_notification(&text).unwrap();
        assert_eq!(log.meta.block_number, 16);
        assert_eq!(log.meta.log_index, 2);
        assert_eq!(log.meta.transaction_hash, B256::repeat_byte(3));
        assert_eq!(log.topics, vec![B256::repeat_byte(1)]);
    }

    #[test]
    fn test_non_notifications_ignored() {
        assert!(parse_notification(r#"{"jsonrpc":"2.0","id":1,"result":"0xabc"}"#).is_none());
        assert!(parse_notification("not json").is_none());
    }
}
