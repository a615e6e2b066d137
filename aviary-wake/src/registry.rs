//! Agent registry — the exclusive owner of identities and status.
//!
//! Identity mutations are written through a durable [`IdentityStore`]
//! before the in-memory view changes. Status is ephemeral and never
//! persisted.

use aviary_core::{AgentId, AgentIdentity, AgentStatus, RegistryError, TrustLevel};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Durable backing for agent identities.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Load every stored identity.
    async fn load_all(&self) -> Result<Vec<AgentIdentity>, RegistryError>;

    /// Create or overwrite one identity.
    async fn persist(&self, identity: &AgentIdentity) -> Result<(), RegistryError>;

    /// Remove one identity. No-op if absent.
    async fn remove(&self, id: &AgentId) -> Result<(), RegistryError>;
}

/// In-memory identity store for tests and ephemeral deployments.
pub struct MemoryIdentityStore {
    identities: Mutex<HashMap<AgentId, AgentIdentity>>,
}

impl MemoryIdentityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            identities: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn load_all(&self) -> Result<Vec<AgentIdentity>, RegistryError> {
        Ok(self.identities.lock().unwrap().values().cloned().collect())
    }

    async fn persist(&self, identity: &AgentIdentity) -> Result<(), RegistryError> {
        self.identities
            .lock()
            .unwrap()
            .insert(identity.id.clone(), identity.clone());
        Ok(())
    }

    async fn remove(&self, id: &AgentId) -> Result<(), RegistryError> {
        self.identities.lock().unwrap().remove(id);
        Ok(())
    }
}

/// Filesystem identity store: one JSON file per agent under the root.
/// The directory is created lazily on first write.
pub struct FsIdentityStore {
    root: PathBuf,
}

impl FsIdentityStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn path_for(&self, id: &AgentId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }
}

#[async_trait]
impl IdentityStore for FsIdentityStore {
    async fn load_all(&self) -> Result<Vec<AgentIdentity>, RegistryError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(RegistryError::Store(e.to_string())),
        };

        let mut identities = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RegistryError::Store(e.to_string()))?
        {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = tokio::fs::read_to_string(entry.path())
                .await
                .map_err(|e| RegistryError::Store(e.to_string()))?;
            let identity: AgentIdentity = serde_json::from_str(&contents)
                .map_err(|e| RegistryError::Serialization(e.to_string()))?;
            identities.push(identity);
        }
        Ok(identities)
    }

    async fn persist(&self, identity: &AgentIdentity) -> Result<(), RegistryError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| RegistryError::Store(e.to_string()))?;
        let contents = serde_json::to_string_pretty(identity)
            .map_err(|e| RegistryError::Serialization(e.to_string()))?;
        tokio::fs::write(self.path_for(&identity.id), contents)
            .await
            .map_err(|e| RegistryError::Store(e.to_string()))
    }

    async fn remove(&self, id: &AgentId) -> Result<(), RegistryError> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryError::Store(e.to_string())),
        }
    }
}

struct RegistryState {
    identities: HashMap<AgentId, AgentIdentity>,
    status: HashMap<AgentId, AgentStatus>,
}

/// The registry. Holds the in-memory view; every identity mutation is
/// written through the store first.
pub struct AgentRegistry {
    store: Arc<dyn IdentityStore>,
    state: Mutex<RegistryState>,
}

impl AgentRegistry {
    /// Create a registry over a store. Call [`AgentRegistry::load`] to
    /// populate it.
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            state: Mutex::new(RegistryState {
                identities: HashMap::new(),
                status: HashMap::new(),
            }),
        }
    }

    /// Load all stored identities. Loaded agents start `Offline` until
    /// the runtime brings them up.
    pub async fn load(&self) -> Result<(), RegistryError> {
        let identities = self.store.load_all().await?;
        let mut state = self.state.lock().unwrap();
        for identity in identities {
            state
                .status
                .entry(identity.id.clone())
                .or_insert(AgentStatus::Offline);
            state.identities.insert(identity.id.clone(), identity);
        }
        Ok(())
    }

    /// Register a new agent. Persists before the in-memory insert; the
    /// agent comes up `Available`.
    pub async fn create(&self, identity: AgentIdentity) -> Result<(), RegistryError> {
        self.store.persist(&identity).await?;
        let mut state = self.state.lock().unwrap();
        state
            .status
            .insert(identity.id.clone(), AgentStatus::Available);
        state.identities.insert(identity.id.clone(), identity);
        Ok(())
    }

    /// Remove an agent entirely.
    pub async fn delete(&self, id: &AgentId) -> Result<(), RegistryError> {
        self.store.remove(id).await?;
        let mut state = self.state.lock().unwrap();
        state.identities.remove(id);
        state.status.remove(id);
        Ok(())
    }

    /// Look up an identity.
    pub fn identity(&self, id: &AgentId) -> Option<AgentIdentity> {
        self.state.lock().unwrap().identities.get(id).cloned()
    }

    /// Current status, if the agent exists.
    pub fn status(&self, id: &AgentId) -> Option<AgentStatus> {
        self.state.lock().unwrap().status.get(id).copied()
    }

    /// Every known agent id.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.state.lock().unwrap().identities.keys().cloned().collect()
    }

    /// Identities of every agent currently in the given status.
    pub fn agents_in_status(&self, status: AgentStatus) -> Vec<AgentIdentity> {
        let state = self.state.lock().unwrap();
        state
            .identities
            .values()
            .filter(|a| state.status.get(&a.id) == Some(&status))
            .cloned()
            .collect()
    }

    /// Set an agent's status unconditionally.
    pub fn set_status(&self, id: &AgentId, status: AgentStatus) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap();
        if !state.identities.contains_key(id) {
            return Err(RegistryError::NotFound(id.clone()));
        }
        state.status.insert(id.clone(), status);
        Ok(())
    }

    /// Atomically transition `Available → Busy`. Returns whether the
    /// transition happened. This is the only path into `Busy`.
    pub fn mark_busy_if_available(&self, id: &AgentId) -> Result<bool, RegistryError> {
        let mut state = self.state.lock().unwrap();
        match state.status.get_mut(id) {
            None => Err(RegistryError::NotFound(id.clone())),
            Some(status @ AgentStatus::Available) => {
                *status = AgentStatus::Busy;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    /// Update an agent's coarse trust level. Persisted before the
    /// in-memory view changes. The trust governor calls this when the
    /// continuous metric crosses an integer boundary; direct calls are
    /// the explicit-user-action escape hatch.
    pub async fn update_trust(&self, id: &AgentId, trust: TrustLevel) -> Result<(), RegistryError> {
        let updated = {
            let state = self.state.lock().unwrap();
            let mut identity = state
                .identities
                .get(id)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
            identity.trust = trust;
            identity
        };
        self.store.persist(&updated).await?;
        self.state
            .lock()
            .unwrap()
            .identities
            .insert(id.clone(), updated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aviary_core::AgentProfile;

    fn identity(name: &str) -> AgentIdentity {
        AgentIdentity::new(name, AgentProfile::Concierge)
    }

    #[tokio::test]
    async fn create_makes_agent_available() {
        let reg = AgentRegistry::new(Arc::new(MemoryIdentityStore::new()));
        let a = identity("scout");
        let id = a.id.clone();
        reg.create(a).await.unwrap();
        assert_eq!(reg.status(&id), Some(AgentStatus::Available));
        assert_eq!(reg.identity(&id).unwrap().name, "scout");
    }

    #[tokio::test]
    async fn mark_busy_is_atomic_and_single_shot() {
        let reg = AgentRegistry::new(Arc::new(MemoryIdentityStore::new()));
        let a = identity("scout");
        let id = a.id.clone();
        reg.create(a).await.unwrap();

        assert!(reg.mark_busy_if_available(&id).unwrap());
        assert!(!reg.mark_busy_if_available(&id).unwrap());
        assert_eq!(reg.status(&id), Some(AgentStatus::Busy));
    }

    #[tokio::test]
    async fn unknown_agent_errors() {
        let reg = AgentRegistry::new(Arc::new(MemoryIdentityStore::new()));
        let id = AgentId::new("ghost");
        assert!(matches!(
            reg.set_status(&id, AgentStatus::Offline),
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            reg.mark_busy_if_available(&id),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn trust_update_persists() {
        let store = Arc::new(MemoryIdentityStore::new());
        let reg = AgentRegistry::new(store.clone());
        let a = identity("scout");
        let id = a.id.clone();
        reg.create(a).await.unwrap();

        reg.update_trust(&id, TrustLevel::Contributor).await.unwrap();
        assert_eq!(reg.identity(&id).unwrap().trust, TrustLevel::Contributor);

        let stored = store.load_all().await.unwrap();
        assert_eq!(stored[0].trust, TrustLevel::Contributor);
    }

    #[tokio::test]
    async fn fs_store_roundtrip_and_loaded_agents_start_offline() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsIdentityStore::new(dir.path()));

        let reg = AgentRegistry::new(store.clone());
        let a = identity("archivist");
        let id = a.id.clone();
        reg.create(a).await.unwrap();

        // A second registry over the same root sees the identity.
        let reg2 = AgentRegistry::new(store);
        reg2.load().await.unwrap();
        assert_eq!(reg2.identity(&id).unwrap().name, "archivist");
        assert_eq!(reg2.status(&id), Some(AgentStatus::Offline));
    }

    #[tokio::test]
    async fn fs_store_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsIdentityStore::new(dir.path());
        let a = identity("temp");
        store.persist(&a).await.unwrap();
        store.remove(&a.id).await.unwrap();
        store.remove(&a.id).await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
