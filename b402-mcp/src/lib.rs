//! MCP tool surface for the x402 Bazaar engine.
//!
//! Exposes the engine's three operations to an agent runtime as MCP tools:
//!
//! - `list-bazaar-services` - discover services with optional filters
//! - `inspect-bazaar-service` - full metadata for one resource URL
//! - `call-bazaar-service` - execute a paid request via the x402 flow
//!
//! The crate is framework-agnostic: tool inputs and results are plain
//! [`serde_json::Value`]-based types, and [`server`] speaks JSON-RPC 2.0
//! over stdio directly. Discovery and inspection degrade to descriptive
//! text on upstream failures so a bad registry call never crashes the tool
//! surface; paid execution propagates its errors, since a paid call's
//! failure must stay visible.

pub mod server;
pub mod tools;
pub mod types;

pub use server::McpServer;
pub use tools::{BazaarTools, ToolError};
