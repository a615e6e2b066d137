//! Filesystem watch source backed by the platform notifier.
//!
//! Duplicate changes to the same path within the coalescing window are
//! collapsed, keeping the latest; the bus therefore sees at most one
//! event per (path, kind) per window.

use aviary_core::{
    DurationMs, EventPayload, EventPriority, EventSource, EventType, FileChangeKind,
    OverflowPolicy, SourceError, SourceId, SourceState, TriggerEvent, TriggerStream,
};
use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

const COALESCE_WINDOW: DurationMs = DurationMs::from_secs(60);

/// Watches a set of directory roots and emits `file-changed` events.
pub struct FileWatchSource {
    id: SourceId,
    roots: Vec<PathBuf>,
    state: Mutex<SourceState>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    tx: mpsc::UnboundedSender<TriggerEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<TriggerEvent>>>,
    recent: Arc<Mutex<HashMap<(PathBuf, FileChangeKind), Instant>>>,
}

impl FileWatchSource {
    /// Watch the given roots recursively.
    pub fn new(id: SourceId, roots: Vec<PathBuf>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            id,
            roots,
            state: Mutex::new(SourceState::Idle),
            watcher: Mutex::new(None),
            tx,
            rx: Mutex::new(Some(rx)),
            recent: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn map_error(err: &notify::Error) -> SourceError {
        match &err.kind {
            notify::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                SourceError::AccessDenied
            }
            notify::ErrorKind::PathNotFound => {
                SourceError::MissingDependency(format!("watch root missing: {err}"))
            }
            _ => SourceError::TransientUnavailable(err.to_string()),
        }
    }
}

fn change_kind(kind: &notify::EventKind) -> Option<FileChangeKind> {
    match kind {
        notify::EventKind::Create(_) => Some(FileChangeKind::Created),
        notify::EventKind::Modify(_) => Some(FileChangeKind::Modified),
        notify::EventKind::Remove(_) => Some(FileChangeKind::Removed),
        _ => None,
    }
}

#[async_trait]
impl EventSource for FileWatchSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn name(&self) -> &str {
        "file-watch"
    }

    fn description(&self) -> &str {
        "Watches directories for file changes"
    }

    fn supported_event_types(&self) -> Vec<EventType> {
        vec![EventType::FileChanged]
    }

    fn state(&self) -> SourceState {
        *self.state.lock().unwrap()
    }

    fn overflow_policy(&self) -> OverflowPolicy {
        OverflowPolicy::Coalesce {
            window: COALESCE_WINDOW,
        }
    }

    async fn start(&self) -> Result<(), SourceError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == SourceState::Running {
                return Ok(());
            }
            *state = SourceState::Starting;
        }

        let tx = self.tx.clone();
        let source_id = self.id.clone();
        let recent = Arc::clone(&self.recent);
        let window = COALESCE_WINDOW.to_std();

        let handler = move |result: Result<notify::Event, notify::Error>| {
            let event = match result {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "watch backend error");
                    return;
                }
            };
            let Some(kind) = change_kind(&event.kind) else {
                return;
            };
            for path in event.paths {
                let key = (path.clone(), kind);
                {
                    let mut recent = recent.lock().unwrap();
                    let now = Instant::now();
                    if let Some(last) = recent.get(&key) {
                        if now.duration_since(*last) < window {
                            // Coalesced: the latest occurrence wins the slot.
                            recent.insert(key, now);
                            continue;
                        }
                    }
                    recent.insert(key, now);
                }
                debug!(source = %source_id, path = %path.display(), ?kind, "file change");
                let trigger = TriggerEvent::new(
                    source_id.clone(),
                    EventType::FileChanged,
                    EventPayload::FileChange { path, kind },
                    EventPriority::Normal,
                );
                let _ = tx.send(trigger);
            }
        };

        let mut watcher = notify::recommended_watcher(handler).map_err(|e| {
            *self.state.lock().unwrap() = SourceState::Error;
            FileWatchSource::map_error(&e)
        })?;
        for root in &self.roots {
            watcher.watch(root, RecursiveMode::Recursive).map_err(|e| {
                *self.state.lock().unwrap() = SourceState::Error;
                FileWatchSource::map_error(&e)
            })?;
        }

        *self.watcher.lock().unwrap() = Some(watcher);
        *self.state.lock().unwrap() = SourceState::Running;
        Ok(())
    }

    async fn stop(&self) -> Result<(), SourceError> {
        self.watcher.lock().unwrap().take();
        *self.state.lock().unwrap() = SourceState::Stopped;
        Ok(())
    }

    fn events(&self) -> TriggerStream {
        match self.rx.lock().unwrap().take() {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => Box::pin(futures::stream::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn missing_root_fails_start() {
        let source = FileWatchSource::new(
            SourceId::new("fw"),
            vec![PathBuf::from("/definitely/not/here")],
        );
        let err = source.start().await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::MissingDependency(_) | SourceError::TransientUnavailable(_)
        ));
        assert_eq!(source.state(), SourceState::Error);
    }

    #[tokio::test]
    async fn emits_change_for_created_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileWatchSource::new(SourceId::new("fw"), vec![dir.path().to_path_buf()]);
        let mut events = source.events();
        source.start().await.unwrap();
        assert_eq!(source.state(), SourceState::Running);

        tokio::fs::write(dir.path().join("note.md"), "hello")
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .expect("watcher produced no event")
            .unwrap();
        assert_eq!(event.event_type, EventType::FileChanged);
        match event.payload {
            EventPayload::FileChange { path, .. } => {
                assert!(path.ends_with("note.md"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        source.stop().await.unwrap();
        assert_eq!(source.state(), SourceState::Stopped);
    }
}
