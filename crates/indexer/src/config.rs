//! Indexer configuration
//!
//! Values come from [`IndexerConfig::default`], then the environment, then
//! command line overrides applied by the binary.

use std::env;
use std::time::Duration;

use alloy_primitives::Address;
use raffle_sync_contracts::FactoryAddresses;

use crate::error::{IndexerError, IndexerResult};

pub const DEFAULT_START_BLOCK: u64 = 3_725_000;
pub const DEFAULT_BATCH_SIZE: u64 = 10_000;
pub const DEFAULT_PROOF_DELAY: Duration = Duration::from_millis(300_000);
pub const DEFAULT_MIN_ROOT_DELAY: Duration = Duration::from_millis(2_000);
pub const DEFAULT_ASSET_BASE_URL: &str = "https://cryptoraffles.io/media/images";
pub const DEFAULT_ASSET_COUNT: u32 = 20;

#[derive(Clone, Debug)]
pub struct IndexerConfig {
    /// HTTP JSON-RPC endpoint
    pub rpc_url: String,
    /// Websocket endpoint; derived from `rpc_url` when unset
    pub ws_url: Option<String>,
    /// Record store base URL
    pub store_url: String,
    pub api_key: String,
    pub factories: FactoryAddresses,
    pub start_block: u64,
    pub batch_size: u64,
    /// SQLite ledger path
    pub db_path: String,
    /// Status server address
    pub listen: String,
    /// Delay between root publication and proof generation
    pub proof_delay: Duration,
    /// Floor for the root generation timer
    pub min_root_delay: Duration,
    pub reconnect_delay: Duration,
    pub asset_base_url: String,
    pub asset_count: u32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            ws_url: None,
            store_url: String::new(),
            api_key: String::new(),
            factories: FactoryAddresses::production(),
            start_block: DEFAULT_START_BLOCK,
            batch_size: DEFAULT_BATCH_SIZE,
            db_path: "raffle-sync.db".into(),
            listen: "0.0.0.0:3300".into(),
            proof_delay: DEFAULT_PROOF_DELAY,
            min_root_delay: DEFAULT_MIN_ROOT_DELAY,
            reconnect_delay: Duration::from_secs(5),
            asset_base_url: DEFAULT_ASSET_BASE_URL.into(),
            asset_count: DEFAULT_ASSET_COUNT,
        }
    }
}

impl IndexerConfig {
    pub fn from_env() -> IndexerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> IndexerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("RAFFLE_SYNC_RPC_URL").or_else(|| lookup("API_URL")) {
            config.rpc_url = url;
        }
        config.ws_url = lookup("RAFFLE_SYNC_WS_URL");
        if let Some(url) = lookup("RAFFLE_SYNC_STORE_URL") {
            config.store_url = url;
        }
        if let Some(key) = lookup("REST_API_KEY") {
            config.api_key = key;
        }
        if let Some(raw) = lookup("RAFFLE_SYNC_RAFFLE_FACTORY") {
            config.factories.raffle = parse_address("RAFFLE_SYNC_RAFFLE_FACTORY", &raw)?;
        }
        if let Some(raw) = lookup("RAFFLE_SYNC_GIVEAWAY_FACTORY") {
            config.factories.giveaway = parse_address("RAFFLE_SYNC_GIVEAWAY_FACTORY", &raw)?;
        }
        if let Some(raw) = lookup("RAFFLE_SYNC_START_BLOCK") {
            config.start_block = parse_number("RAFFLE_SYNC_START_BLOCK", &raw)?;
        }
        if let Some(raw) = lookup("RAFFLE_SYNC_BATCH_SIZE") {
            config.batch_size = parse_number("RAFFLE_SYNC_BATCH_SIZE", &raw)?;
        }
        if let Some(path) = lookup("RAFFLE_SYNC_DB") {
            config.db_path = path;
        }
        if let Some(addr) = lookup("RAFFLE_SYNC_LISTEN") {
            config.listen = addr;
        }
        if let Some(raw) = lookup("RAFFLE_SYNC_PROOF_DELAY_MS") {
            config.proof_delay =
                Duration::from_millis(parse_number("RAFFLE_SYNC_PROOF_DELAY_MS", &raw)?);
        }
        if let Some(raw) = lookup("RAFFLE_SYNC_MIN_ROOT_DELAY_MS") {
            config.min_root_delay =
                Duration::from_millis(parse_number("RAFFLE_SYNC_MIN_ROOT_DELAY_MS", &raw)?);
        }
        if let Some(url) = lookup("RAFFLE_SYNC_ASSET_BASE_URL") {
            config.asset_base_url = url;
        }
        if let Some(raw) = lookup("RAFFLE_SYNC_ASSET_COUNT") {
            config.asset_count = parse_number::<u64>("RAFFLE_SYNC_ASSET_COUNT", &raw)?
                .try_into()
                .map_err(|_| IndexerError::Config(format!("RAFFLE_SYNC_ASSET_COUNT too large: {raw}")))?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> IndexerResult<()> {
        if self.rpc_url.is_empty() {
            return Err(IndexerError::Config("RPC URL is not set".into()));
        }
        if self.store_url.is_empty() {
            return Err(IndexerError::Config("record store URL is not set".into()));
        }
        if self.api_key.is_empty() {
            return Err(IndexerError::Config("REST_API_KEY is not set".into()));
        }
        if self.batch_size == 0 {
            return Err(IndexerError::Config("batch size must be positive".into()));
        }
        if self.asset_count == 0 {
            return Err(IndexerError::Config("asset count must be positive".into()));
        }
        Ok(())
    }

    pub fn ws_url(&self) -> String {
        self.ws_url
            .clone()
            .unwrap_or_else(|| http_to_ws(&self.rpc_url))
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path)
    }
}

/// Convert an HTTP URL to the matching websocket URL
pub fn http_to_ws(http_url: &str) -> String {
    if http_url.starts_with("https://") {
        http_url.replacen("https://", "wss://", 1)
    } else if http_url.starts_with("http://") {
        http_url.replacen("http://", "ws://", 1)
    } else {
        http_url.to_string()
    }
}

fn parse_address(key: &str, raw: &str) -> IndexerResult<Address> {
    raw.parse()
        .map_err(|e| IndexerError::Config(format!("{key}: invalid address {raw}: {e}")))
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> IndexerResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| IndexerError::Config(format!("{key}: invalid number {raw}: {e}")))
}
