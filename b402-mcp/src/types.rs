//! Framework-agnostic MCP tool types.
//!
//! These mirror the MCP `CallToolResult`/tool-definition wire shapes using
//! [`serde_json::Value`]-based structures, so the tool surface works with
//! any MCP transport implementation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single content item in a tool call result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
#[non_exhaustive]
pub enum ContentItem {
    /// Text content.
    Text {
        /// The text value.
        text: String,
    },
}

impl ContentItem {
    /// Creates a new text content item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Result of an MCP tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Content items returned by the tool.
    #[serde(default)]
    pub content: Vec<ContentItem>,
    /// Whether the tool returned an error.
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl CallToolResult {
    /// A successful result with the given text blocks.
    #[must_use]
    pub fn text_blocks(blocks: impl IntoIterator<Item = String>) -> Self {
        Self {
            content: blocks.into_iter().map(ContentItem::text).collect(),
            is_error: false,
        }
    }

    /// A successful result with one text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            is_error: false,
        }
    }

    /// An error result with one text block.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            is_error: true,
        }
    }
}

/// A tool advertised in `tools/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// The tool name clients invoke.
    pub name: &'static str,
    /// Short human-readable title.
    pub title: &'static str,
    /// What the tool does.
    pub description: &'static str,
    /// JSON schema of the tool's arguments.
    pub input_schema: Value,
}
