//! Prompt content blocks and their rendering to linear text.
//!
//! A prompt arrives as a list of typed blocks. Known kinds deserialize into
//! [`ContentBlock`]; anything else falls back to a salvage pass that keeps
//! whatever `text` or `content` string the block happens to carry. Blocks
//! render independently, blank renders are dropped, and the survivors join
//! with one blank line.

use serde::Deserialize;
use serde_json::Value;

/// An embedded resource payload inside a `resource` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmbeddedResource {
    /// Resource URI.
    pub uri: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Embedded text contents, when the host inlined them.
    pub text: Option<String>,
}

/// A recognized prompt content block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text, rendered verbatim.
    Text {
        /// The text itself.
        text: String,
    },
    /// A resource with its payload embedded.
    Resource {
        /// The embedded payload.
        resource: EmbeddedResource,
    },
    /// A reference to a resource by URI.
    ResourceLink {
        /// Resource URI.
        uri: String,
        /// Display name.
        #[serde(default)]
        name: Option<String>,
    },
    /// An image; rendered as a placeholder.
    Image {
        /// Source URI, when the image is not inlined.
        #[serde(default)]
        uri: Option<String>,
        /// MIME type of the payload.
        #[serde(default, rename = "mimeType")]
        mime_type: Option<String>,
    },
    /// An audio clip; rendered as a placeholder.
    Audio {
        /// Source URI, when the clip is not inlined.
        #[serde(default)]
        uri: Option<String>,
        /// MIME type of the payload.
        #[serde(default, rename = "mimeType")]
        mime_type: Option<String>,
    },
}

impl ContentBlock {
    /// Render one block to linear text.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Resource { resource } => {
                let label = resource
                    .name
                    .as_deref()
                    .or(resource.uri.as_deref())
                    .unwrap_or("unnamed");
                match &resource.text {
                    Some(text) if !text.trim().is_empty() => {
                        format!("[resource: {label}]\n{text}")
                    }
                    _ => format!("[resource: {label}]"),
                }
            }
            Self::ResourceLink { uri, name } => match name {
                Some(name) if !name.trim().is_empty() => {
                    format!("[resource: {name} ({uri})]")
                }
                _ => format!("[resource: {uri}]"),
            },
            Self::Image { uri, mime_type } => placeholder("image", uri, mime_type),
            Self::Audio { uri, mime_type } => placeholder("audio", uri, mime_type),
        }
    }
}

/// Render a prompt's blocks to one linear text.
///
/// Unknown block kinds salvage a `text` or `content` string field when one
/// exists and render empty otherwise. Blank renders are dropped; the rest
/// join with a blank-line separator.
#[must_use]
pub fn render_blocks(blocks: &[Value]) -> String {
    blocks
        .iter()
        .map(render_block)
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render one raw block value, salvaging unknown kinds.
fn render_block(block: &Value) -> String {
    match serde_json::from_value::<ContentBlock>(block.clone()) {
        Ok(known) => known.render(),
        Err(_) => salvage(block),
    }
}

/// Best-effort text extraction from an unrecognized block.
fn salvage(block: &Value) -> String {
    block
        .get("text")
        .or_else(|| block.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// Placeholder line for media blocks.
fn placeholder(kind: &str, uri: &Option<String>, mime_type: &Option<String>) -> String {
    let label = uri
        .as_deref()
        .or(mime_type.as_deref())
        .unwrap_or("inline data");
    format!("[{kind}: {label}]")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
