#![deny(missing_docs)]
//! Workspace staging and history engine for aviary.
//!
//! The non-destructive write model: every agent mutation to a workspace
//! lands in the staging area, scoped by (agent, change-id), and reaches
//! the working tree only through an atomic commit recorded in a
//! content-addressed, append-only history log. Until a change is
//! committed or discarded, the corresponding workspace path is
//! byte-identical to its pre-submission state.

mod document;
mod envelope;
mod history;
mod staging;
mod workspace;

pub use document::{Block, BlockBody, Document, TodoItem};
pub use envelope::{parse as parse_envelope, render as render_envelope};
pub use history::{Commit, HistoryLog, MAIN_BRANCH};
pub use staging::{ChangePayload, ChangeType, StagedChange, StagingEngine};
pub use workspace::{ContributorRole, Workspace, WorkspaceMeta};
