//! The document text envelope: YAML front matter between `---` fences,
//! followed by the block sequence in YAML.
//!
//! Round-trip law: `parse(render(doc)) == doc`.

use crate::document::{Block, Document};
use aviary_core::{DocumentId, StagingError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct FrontMatter {
    id: DocumentId,
    title: String,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Render a document as its on-disk envelope.
pub fn render(doc: &Document) -> Result<String, StagingError> {
    let front = FrontMatter {
        id: doc.id.clone(),
        title: doc.title.clone(),
        created: doc.created_at,
        updated: doc.updated_at,
        tags: doc.tags.clone(),
    };
    let front_yaml =
        serde_yml::to_string(&front).map_err(|e| StagingError::Envelope(e.to_string()))?;
    let body_yaml = if doc.blocks.is_empty() {
        String::new()
    } else {
        serde_yml::to_string(&doc.blocks).map_err(|e| StagingError::Envelope(e.to_string()))?
    };
    Ok(format!("---\n{front_yaml}---\n{body_yaml}"))
}

/// Parse an on-disk envelope back into a document.
pub fn parse(input: &str) -> Result<Document, StagingError> {
    let rest = input
        .strip_prefix("---\n")
        .ok_or_else(|| StagingError::Envelope("missing front matter fence".into()))?;
    let (front_str, body_str) = rest
        .split_once("---\n")
        .ok_or_else(|| StagingError::Envelope("unterminated front matter".into()))?;

    let front: FrontMatter =
        serde_yml::from_str(front_str).map_err(|e| StagingError::Envelope(e.to_string()))?;
    let blocks: Vec<Block> = if body_str.trim().is_empty() {
        Vec::new()
    } else {
        serde_yml::from_str(body_str).map_err(|e| StagingError::Envelope(e.to_string()))?
    };

    Ok(Document {
        id: front.id,
        title: front.title,
        blocks,
        tags: front.tags,
        created_at: front.created,
        updated_at: front.updated,
    })
}
