//! Raffle/giveaway indexer
//!
//! Usage:
//!   raffle-sync [--rpc <URL>] [--ws <URL>] [--store <URL>] [--start-block <N>] [--db <PATH>] [--listen <ADDR>]

use std::env;

use raffle_sync_indexer::{Indexer, IndexerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "info,raffle_sync_indexer=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = IndexerConfig::from_env()?;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rpc" | "-r" => {
                i += 1;
                if let Some(url) = args.get(i) {
                    config.rpc_url = url.clone();
                }
            }
            "--ws" | "-w" => {
                i += 1;
                config.ws_url = args.get(i).cloned();
            }
            "--store" | "-s" => {
                i += 1;
                if let Some(url) = args.get(i) {
                    config.store_url = url.clone();
                }
            }
            "--start-block" | "-b" => {
                i += 1;
                if let Some(block) = args.get(i).and_then(|s| s.parse().ok()) {
                    config.start_block = block;
                }
            }
            "--db" | "-d" => {
                i += 1;
                if let Some(path) = args.get(i) {
                    config.db_path = path.clone();
                }
            }
            "--listen" | "-l" => {
                i += 1;
                if let Some(addr) = args.get(i) {
                    config.listen = addr.clone();
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => tracing::warn!("Ignoring unknown argument {}", other),
        }
        i += 1;
    }

    tracing::info!("Starting raffle-sync");
    tracing::info!("  RPC: {}", config.rpc_url);
    tracing::info!("  WebSocket: {}", config.ws_url());
    tracing::info!("  Record store: {}", config.store_url);
    tracing::info!("  Raffle factory: {:?}", config.factories.raffle);
    tracing::info!("  Giveaway factory: {:?}", config.factories.giveaway);
    tracing::info!("  Database: {}", config.db_path);
    tracing::info!("  Status: {}", config.listen);

    let indexer = Indexer::new(config).await?;
    indexer.run().await
}

fn print_help() {
    println!(
        r#"raffle-sync

Follows the raffle and giveaway factory contracts and mirrors every draw
into the record store. Giveaways get a Merkle whitelist root when they end
and a membership proof per winner once they are raffled.

USAGE:
    raffle-sync [OPTIONS]

OPTIONS:
    -r, --rpc <URL>           HTTP JSON-RPC endpoint
                              Default: $RAFFLE_SYNC_RPC_URL or $API_URL
    -w, --ws <URL>            WebSocket endpoint
                              Default: $RAFFLE_SYNC_WS_URL or derived from the RPC URL
    -s, --store <URL>         Record store base URL
                              Default: $RAFFLE_SYNC_STORE_URL
    -b, --start-block <N>     First block to backfill from
                              Default: 3725000
    -d, --db <PATH>           SQLite ledger path
                              Default: raffle-sync.db
    -l, --listen <ADDR>       Status server address
                              Default: 0.0.0.0:3300
    -h, --help                Print help

ENVIRONMENT VARIABLES:
    REST_API_KEY                      Record store API key (required)
    RAFFLE_SYNC_RAFFLE_FACTORY        Raffle factory address
    RAFFLE_SYNC_GIVEAWAY_FACTORY      Giveaway factory address
    RAFFLE_SYNC_BATCH_SIZE            Blocks per eth_getLogs request (default: 10000)
    RAFFLE_SYNC_PROOF_DELAY_MS        Root to proof delay (default: 300000)
    RAFFLE_SYNC_MIN_ROOT_DELAY_MS     Minimum root timer (default: 2000)
    RAFFLE_SYNC_ASSET_BASE_URL        Winner asset base URL
    RAFFLE_SYNC_ASSET_COUNT           Winner asset count (default: 20)
    RUST_LOG                          Logging level (default: info,raffle_sync_indexer=debug)

STATUS ENDPOINTS:
    GET /health           Liveness
    GET /commitments      Pending giveaway commitments
"#
    );
}
