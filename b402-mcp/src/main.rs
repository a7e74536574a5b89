//! x402 Bazaar MCP server.
//!
//! # Usage
//!
//! ```bash
//! # Run against the default registry
//! EVM_PRIVATE_KEY=0x... SVM_PRIVATE_KEY=... b402-mcp
//!
//! # Point at a different registry and Solana RPC
//! b402-mcp --registry-url https://registry.example.com --solana-rpc-url http://localhost:8899
//!
//! # Configure logging (stderr; stdout carries the MCP transport)
//! RUST_LOG=debug b402-mcp
//! ```
//!
//! # Environment Variables
//!
//! - `EVM_PRIVATE_KEY` - hex private key for EVM networks
//! - `SVM_PRIVATE_KEY` - base58 keypair for Solana clusters
//! - `BAZAAR_REGISTRY_URL` - override the upstream registry base URL
//! - `SOLANA_RPC_URL` - override the Solana RPC endpoint
//! - `RUST_LOG` - log level filter (default: `info`)

use b402_http::constants::DEFAULT_REGISTRY_URL;
use b402_http::{BazaarClient, PaidRequestExecutor};
use b402_mcp::{BazaarTools, McpServer};
use b402_wallet::SignerRegistry;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "b402-mcp", version, about = "x402 Bazaar MCP server over stdio")]
struct Args {
    /// Base URL of the upstream Bazaar registry.
    #[arg(long, env = "BAZAAR_REGISTRY_URL", default_value = DEFAULT_REGISTRY_URL)]
    registry_url: String,

    /// Override the default RPC endpoint for Solana clusters.
    #[arg(long, env = "SOLANA_RPC_URL")]
    solana_rpc_url: Option<String>,
}

#[tokio::main]
async fn main() {
    // Secrets may live in a local .env during development.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut signers = SignerRegistry::from_env();
    if let Some(url) = args.solana_rpc_url {
        signers = signers.with_solana_rpc_url(url);
    }

    let tools = BazaarTools::new(
        BazaarClient::new(args.registry_url),
        signers,
        PaidRequestExecutor::new(),
    );

    tracing::info!("Bazaar MCP server running on stdio");
    if let Err(error) = McpServer::new(tools).run_stdio().await {
        tracing::error!("MCP server failed: {error}");
        std::process::exit(1);
    }
}
