use crate::{
    Connection, ConnectionProfile, CredentialVault, DbError, DbKind, EngineAdapter, ProfileStore,
    StoredProfile,
};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

/// Per-profile slot in the live-handle cache. The `OnceCell` serializes
/// handle creation: concurrent `get_or_open` calls for the same profile id
/// share one slot, and exactly one of them runs the native connect.
type HandleSlot = Arc<OnceCell<Arc<dyn Connection>>>;

/// Owns the catalog of named connection profiles and the lazily-created
/// pool of live engine handles, keyed by profile id.
///
/// Adapters are registered once at startup, keyed by `DbKind`; services
/// only ever dispatch through the registry and the adapter trait.
pub struct ConnectionRegistry {
    adapters: HashMap<DbKind, Arc<dyn EngineAdapter>>,
    store: ProfileStore,
    handles: Mutex<HashMap<Uuid, HandleSlot>>,
}

impl ConnectionRegistry {
    pub fn new(store: ProfileStore) -> Self {
        Self {
            adapters: HashMap::new(),
            store,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Registers an adapter for its engine kind. Later registrations for
    /// the same kind replace earlier ones.
    pub fn register(&mut self, adapter: Arc<dyn EngineAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn adapter_for(&self, kind: DbKind) -> Result<Arc<dyn EngineAdapter>, DbError> {
        self.adapters
            .get(&kind)
            .cloned()
            .ok_or_else(|| DbError::not_supported(format!("no adapter registered for {kind}")))
    }

    // --- Profile catalog ---

    /// Persists the profile, assigning an id if it has none and encrypting
    /// the password. Saving with an existing id replaces that record
    /// entirely.
    pub fn save_profile(&self, mut profile: ConnectionProfile) -> Result<Uuid, DbError> {
        if profile.name.trim().is_empty() {
            return Err(DbError::invalid_profile("profile name must not be empty"));
        }

        let id = profile.ensure_id();

        let password = match &profile.password {
            Some(plaintext) => Some(CredentialVault::encrypt(plaintext)?),
            None => None,
        };

        self.store
            .save(&StoredProfile::from_profile(&profile, password))?;
        info!("Saved profile {} ({})", profile.name, id);

        Ok(id)
    }

    /// All stored profiles with passwords decrypted, in directory-listing
    /// order. A record whose password cannot be decrypted is returned with
    /// the credential unavailable rather than dropped.
    pub fn list_profiles(&self) -> Result<Vec<ConnectionProfile>, DbError> {
        Ok(self
            .store
            .load_all()?
            .into_iter()
            .map(|stored| Self::decrypt_stored(stored))
            .collect())
    }

    pub fn get_profile(&self, id: Uuid) -> Result<Option<ConnectionProfile>, DbError> {
        Ok(self.store.load(id)?.map(Self::decrypt_stored))
    }

    fn decrypt_stored(stored: StoredProfile) -> ConnectionProfile {
        let password = match &stored.password {
            Some(secret) => match CredentialVault::decrypt(secret) {
                Ok(plaintext) => Some(plaintext),
                Err(e) => {
                    warn!("Password unavailable for profile {}: {e}", stored.id);
                    None
                }
            },
            None => None,
        };
        stored.into_profile(password)
    }

    /// Deletes the stored record, closing any cached live handle first so
    /// no handle outlives its profile. Returns whether a record existed.
    pub async fn delete_profile(&self, id: Uuid) -> Result<bool, DbError> {
        self.close(id).await;
        self.store.delete(id)
    }

    /// Raw at-rest record, for callers that need the stored form.
    pub fn raw_record(&self, id: Uuid) -> Result<Option<String>, DbError> {
        self.store.raw_record(id)
    }

    // --- Live handles ---

    /// Returns the cached handle for the profile id, opening one via the
    /// matching adapter if absent. At most one native connect runs per
    /// profile id, however many callers race here; a failed connect leaves
    /// the slot empty so the next caller retries.
    pub async fn get_or_open(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<Arc<dyn Connection>, DbError> {
        let slot = {
            let mut handles = self.handles.lock().await;
            handles.entry(profile.id).or_default().clone()
        };

        let conn = slot
            .get_or_try_init(|| async {
                let adapter = self.adapter_for(profile.kind)?;
                info!("Opening {} connection for {}", profile.kind, profile.name);
                let conn = adapter.connect(profile).await?;
                Ok::<_, DbError>(Arc::from(conn))
            })
            .await?;

        Ok(conn.clone())
    }

    /// Closes and evicts the cached handle for the profile id, if any.
    pub async fn close(&self, id: Uuid) {
        let slot = self.handles.lock().await.remove(&id);
        let Some(slot) = slot else { return };

        if let Some(conn) = slot.get() {
            match conn.close().await {
                Ok(()) => info!("Closed connection for profile {id}"),
                Err(e) => warn!("Error closing connection for profile {id}: {e}"),
            }
        }
    }

    pub async fn close_all(&self) {
        let ids: Vec<Uuid> = self.handles.lock().await.keys().copied().collect();
        for id in ids {
            self.close(id).await;
        }
    }

    /// Whether a live handle is currently cached for the profile id.
    pub async fn has_handle(&self, id: Uuid) -> bool {
        self.handles
            .lock()
            .await
            .get(&id)
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Dispatches a connectivity test to the matching adapter. No handle
    /// is cached by a test.
    pub async fn test_connection(&self, profile: &ConnectionProfile) -> Result<(), DbError> {
        let adapter = self.adapter_for(profile.kind)?;
        adapter.test_connection(profile).await
    }
}
