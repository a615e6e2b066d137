//! Documents and their typed blocks.

use aviary_core::{AgentId, BlockId, DocumentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a todo-list block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Item text.
    pub text: String,
    /// Whether it is checked off.
    pub done: bool,
}

/// The typed content of a block.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BlockBody {
    /// Paragraph text.
    Text {
        /// The text content.
        text: String,
    },
    /// Section heading, level 1–6.
    Heading {
        /// Heading level (1–6).
        level: u8,
        /// Heading text.
        text: String,
    },
    /// Unordered list.
    BulletList {
        /// List items.
        items: Vec<String>,
    },
    /// Ordered list.
    NumberedList {
        /// List items.
        items: Vec<String>,
    },
    /// Checkable list.
    TodoList {
        /// List items.
        items: Vec<TodoItem>,
    },
    /// Code block.
    Code {
        /// Language hint.
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        /// The code.
        code: String,
    },
    /// Quotation.
    Quote {
        /// Quoted text.
        text: String,
        /// Who said it.
        #[serde(skip_serializing_if = "Option::is_none")]
        attribution: Option<String>,
    },
    /// Horizontal rule.
    Divider,
    /// Highlighted aside.
    Callout {
        /// Visual style name.
        style: String,
        /// Icon name.
        #[serde(skip_serializing_if = "Option::is_none")]
        icon: Option<String>,
        /// Callout text.
        text: String,
    },
    /// Embedded image.
    Image {
        /// Image URL.
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Caption.
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    /// Marker tying a region to an agent's contribution.
    Agent {
        /// The contributing agent.
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
    },
}

/// One block: a stable id plus typed content. Block ids are the merge
/// granularity for concurrent modifies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Stable block id.
    pub id: BlockId,
    /// Typed content.
    #[serde(flatten)]
    pub body: BlockBody,
}

impl Block {
    /// A block with a fresh id.
    pub fn new(body: BlockBody) -> Self {
        Self {
            id: BlockId::fresh(),
            body,
        }
    }

    /// A text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(BlockBody::Text { text: text.into() })
    }

    /// A heading block; the level is clamped to 1–6.
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::new(BlockBody::Heading {
            level: level.clamp(1, 6),
            text: text.into(),
        })
    }
}

/// A document: ordered typed blocks plus metadata. Created, updated, and
/// removed only through the staging engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable document id.
    pub id: DocumentId,
    /// Title.
    pub title: String,
    /// Ordered blocks.
    pub blocks: Vec<Block>,
    /// Tags.
    pub tags: Vec<String>,
    /// When the document was created.
    pub created_at: DateTime<Utc>,
    /// When the document last changed.
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A new empty document.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::fresh(),
            title: title.into(),
            blocks: Vec::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a block.
    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// The block with the given id, if present.
    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_level_is_clamped() {
        let low = Block::heading(0, "t");
        let high = Block::heading(9, "t");
        assert!(matches!(low.body, BlockBody::Heading { level: 1, .. }));
        assert!(matches!(high.body, BlockBody::Heading { level: 6, .. }));
    }

    #[test]
    fn block_serde_is_flat_and_tagged() {
        let block = Block::text("hello");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hello");
        assert!(json["id"].is_string());
        let back: Block = serde_json::from_value(json).unwrap();
        assert_eq!(block, back);
    }

    #[test]
    fn kebab_case_tags() {
        let block = Block::new(BlockBody::BulletList {
            items: vec!["a".into()],
        });
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "bullet-list");
    }

    #[test]
    fn document_block_lookup() {
        let block = Block::text("x");
        let id = block.id.clone();
        let doc = Document::new("notes").with_block(block);
        assert!(doc.block(&id).is_some());
        assert!(doc.block(&BlockId::fresh()).is_none());
    }
}
