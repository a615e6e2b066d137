//! Typed ID wrappers for the entities that services reference by name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed ID wrappers prevent mixing up agent ids, event ids, commit ids, etc.
/// Underneath they are strings — the protocol imposes no format. `fresh()`
/// mints a random 128-bit identifier in URL-safe hex form for callers that
/// need a new one.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a typed ID from anything that converts to String.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Mint a new random identifier.
            pub fn fresh() -> Self {
                Self(uuid::Uuid::new_v4().simple().to_string())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(AgentId, "Unique identifier for an agent.");
typed_id!(SourceId, "Unique identifier for an event source.");
typed_id!(EventId, "Unique identifier for a trigger event.");
typed_id!(ToolCallId, "Unique identifier for one tool invocation within a turn.");
typed_id!(WorkspaceId, "Unique identifier for a workspace.");
typed_id!(DocumentId, "Unique identifier for a document within a workspace.");
typed_id!(BlockId, "Unique identifier for a block within a document.");
typed_id!(ChangeId, "Unique identifier for a staged change.");
typed_id!(CommitId, "Content-derived identifier for a history commit.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_compare_and_display() {
        let a = AgentId::new("alpha");
        let b = AgentId::from("alpha");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "alpha");
        assert_eq!(a.as_str(), "alpha");
    }

    #[test]
    fn fresh_ids_are_distinct_and_url_safe() {
        let a = EventId::fresh();
        let b = EventId::fresh();
        assert_ne!(a, b);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn ids_serde_as_plain_strings() {
        let id = CommitId::new("abc123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc123\"");
        let back: CommitId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
