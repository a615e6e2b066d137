//! In-memory implementations for testing.
//!
//! Available behind the `test-utils` feature flag. These are minimal
//! implementations that prove the trait APIs are usable and let the
//! runtime crates test against scripted behavior without live backends.

mod manual_source;
mod recording_sink;
mod scripted_provider;
mod static_tool;

pub use manual_source::{ManualHandle, ManualSource};
pub use recording_sink::RecordingWakeSink;
pub use scripted_provider::{script_text, script_tool_call, ScriptedCall, ScriptedProvider};
pub use static_tool::StaticTool;
