//! crates/lesson_planner_core/src/store.rs
//!
//! The resource synchronization store: one generic implementation of the
//! fetch / generate / save / delete / version-list protocol, instantiated once
//! per resource family (lessons, plans, profiles).
//!
//! The in-memory cache is the UI's working view; the server copy stays
//! authoritative. State lives behind a lock that is never held across an
//! `.await`, so every operation restores its loading/saving flags itself.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use tracing::{debug, warn};

use crate::api::SaveResponse;
use crate::domain::{SaveStatus, VersionList};
use crate::ports::PortResult;

//=========================================================================================
// Store Contracts
//=========================================================================================

/// How a store reconciles after a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Keep the entity the server returned (or the one submitted).
    TrustServer,
    /// Reconcile locally, then re-run `list()` to resynchronize.
    Relist,
}

/// Whether a save creates a new entity or updates a cached one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Create,
    Update,
}

/// A server-backed entity held in a store's cache.
pub trait Resource: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Snapshot type returned by the family's version endpoint.
    type Version: Clone + fmt::Debug + DeserializeOwned + Send + Sync + 'static;

    /// Name of the list inside an envelope response, e.g. `lessons`.
    const COLLECTION: &'static str;
    /// Name of the saved entity inside a save response, e.g. `lesson`.
    const ITEM: &'static str;
    const CONSISTENCY: Consistency;

    /// The cache key: a server id, or the profile name for profiles.
    fn key(&self) -> &str;

    /// Display order used by `ResourceStore::sorted`.
    fn display_order(a: &Self, b: &Self) -> Ordering;
}

/// Endpoint mapping for one resource family.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    type Entity: Resource;

    async fn list(&self) -> PortResult<Vec<Self::Entity>>;

    async fn save(
        &self,
        entity: &Self::Entity,
        mode: SaveMode,
    ) -> PortResult<SaveResponse<Self::Entity>>;

    async fn remove(&self, key: &str) -> PortResult<()>;
}

#[async_trait]
pub trait VersionedApi: ResourceApi {
    async fn versions(
        &self,
        key: &str,
    ) -> PortResult<VersionList<<Self::Entity as Resource>::Version>>;
}

/// Caller-supplied generation parameters.
///
/// Validation happens here, before any request is built, so a missing
/// required field never reaches the network.
pub trait GenerateParams: Send {
    type Request: Serialize + Send + Sync;

    fn validate(self) -> PortResult<Self::Request>;
}

#[async_trait]
pub trait GenerativeApi: ResourceApi {
    type Params: GenerateParams;

    /// Returns the synthesized content as an opaque payload.
    async fn generate(
        &self,
        request: &<Self::Params as GenerateParams>::Request,
    ) -> PortResult<Value>;
}

//=========================================================================================
// Store State
//=========================================================================================

/// A save or delete that completed while a list was in flight.
enum LocalChange<R> {
    Upsert(R),
    Remove(String),
}

struct StoreState<R: Resource> {
    entities: Vec<R>,
    current: Option<R>,
    loading: bool,
    generating: bool,
    initialized: bool,
    error: Option<String>,
    save_status: SaveStatus,
    versions: Vec<R::Version>,
    total_versions: usize,
    /// Bumped by every completed save/remove.
    mutation_epoch: u64,
    /// Changes made under a list in flight, tagged with their epoch. They are
    /// re-applied on top of the list response when it lands.
    changes: Vec<(u64, LocalChange<R>)>,
    /// Set when a re-listing save completes while a list is already in flight.
    relist_pending: bool,
    /// Bumped by `reset`. A list that started under an older generation is dropped.
    generation: u64,
}

impl<R: Resource> StoreState<R> {
    fn new() -> Self {
        Self {
            entities: Vec::new(),
            current: None,
            loading: false,
            generating: false,
            initialized: false,
            error: None,
            save_status: SaveStatus::Idle,
            versions: Vec::new(),
            total_versions: 0,
            mutation_epoch: 0,
            changes: Vec::new(),
            relist_pending: false,
            generation: 0,
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entities.iter().position(|entity| entity.key() == key)
    }

    /// Replaces in place when the key is cached, appends otherwise.
    fn upsert(&mut self, entity: R) {
        match self.position(entity.key()) {
            Some(index) => self.entities[index] = entity,
            None => self.entities.push(entity),
        }
    }

    fn apply(&mut self, change: &LocalChange<R>) {
        match change {
            LocalChange::Upsert(entity) => self.upsert(entity.clone()),
            LocalChange::Remove(key) => self.entities.retain(|entity| entity.key() != key),
        }
    }

    /// Applies a completed change to the cache and remembers it if a list
    /// response could still overwrite it.
    fn record(&mut self, change: LocalChange<R>) {
        self.apply(&change);
        self.mutation_epoch += 1;
        if self.loading {
            self.changes.push((self.mutation_epoch, change));
        }
    }

    /// Installs a list result, then replays every local change made after
    /// the request went out.
    fn install_list(&mut self, result: PortResult<Vec<R>>, since: u64) {
        let collection = R::COLLECTION;
        match result {
            Ok(entities) => {
                debug!(collection, count = entities.len(), "Cache refreshed");
                self.entities = entities;
                self.error = None;
                self.initialized = true;
            }
            Err(e) => {
                warn!(collection, error = %e, "Failed to fetch list");
                self.entities.clear();
                self.error = Some(e.to_string());
            }
        }
        let changes = std::mem::take(&mut self.changes);
        for (epoch, change) in &changes {
            if *epoch > since {
                debug!(collection, "Re-applying a change made while the list was in flight");
                self.apply(change);
            }
        }
        self.changes = changes;
    }
}

//=========================================================================================
// ResourceStore
//=========================================================================================

pub struct ResourceStore<A: ResourceApi> {
    api: A,
    state: Mutex<StoreState<A::Entity>>,
}

impl<A: ResourceApi> ResourceStore<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            state: Mutex::new(StoreState::new()),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Replaces the cache with the server's list.
    ///
    /// A call made while a list is already in flight returns immediately
    /// without touching the network or the state. Saves and deletes that
    /// complete while the request is out are kept on top of the response, and
    /// a re-listing save asks for one more fetch. On failure the cache is
    /// emptied and the error recorded; the loading flag is always cleared.
    pub async fn list(&self) {
        let collection = A::Entity::COLLECTION;
        let (generation, mut since) = {
            let mut state = self.state.lock();
            if state.loading {
                debug!(collection, "List already in flight; ignoring request");
                return;
            }
            state.loading = true;
            (state.generation, state.mutation_epoch)
        };

        loop {
            let result = self.api.list().await;

            let mut state = self.state.lock();
            if state.generation != generation {
                debug!(collection, "Dropping list response from before a reset");
                return;
            }
            state.install_list(result, since);
            if !state.relist_pending {
                state.loading = false;
                state.changes.clear();
                return;
            }
            state.relist_pending = false;
            since = state.mutation_epoch;
            state.changes.clear();
            drop(state);
            debug!(collection, "Fetching the list again after a save");
        }
    }

    /// Saves an entity, choosing create or update from the cache.
    ///
    /// A key that is not cached yet is a create. Use `save_as` when the cache
    /// may not reflect the server, e.g. before the first list.
    pub async fn save(&self, entity: A::Entity) -> PortResult<SaveResponse<A::Entity>> {
        let mode = if self.state.lock().position(entity.key()).is_some() {
            SaveMode::Update
        } else {
            SaveMode::Create
        };
        self.save_as(entity, mode).await
    }

    /// Saves an entity with an explicit mode and reconciles the cache by key.
    ///
    /// A failed save leaves the cache exactly as it was.
    pub async fn save_as(
        &self,
        entity: A::Entity,
        mode: SaveMode,
    ) -> PortResult<SaveResponse<A::Entity>> {
        self.state.lock().save_status = SaveStatus::Saving;

        let response = match self.api.save(&entity, mode).await {
            Ok(response) => response,
            Err(e) => {
                warn!(collection = A::Entity::COLLECTION, error = %e, "Save failed");
                let mut state = self.state.lock();
                state.save_status = SaveStatus::Error;
                state.error = Some(e.to_string());
                return Err(e);
            }
        };

        let relist = A::Entity::CONSISTENCY == Consistency::Relist;
        {
            let mut state = self.state.lock();
            let reconciled = response.entity.clone().unwrap_or(entity);
            if reconciled.key().is_empty() {
                debug!("Saved entity has no server key yet; waiting for the next list");
            } else {
                if state.current.as_ref().map(|c| c.key()) == Some(reconciled.key()) {
                    state.current = Some(reconciled.clone());
                }
                state.record(LocalChange::Upsert(reconciled));
            }
            if relist && state.loading {
                state.relist_pending = true;
            }
            state.save_status = SaveStatus::Saved;
            state.error = None;
        }

        if relist {
            self.list().await;
        }
        Ok(response)
    }

    /// Deletes on the server, then drops the key from the cache.
    ///
    /// The cache is only touched after the server confirms. The current
    /// selection is cleared when it was the deleted entity.
    pub async fn remove(&self, key: &str) -> PortResult<()> {
        let result = self.api.remove(key).await;
        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                state.record(LocalChange::Remove(key.to_string()));
                if state.current.as_ref().map(|c| c.key()) == Some(key) {
                    state.current = None;
                }
                state.error = None;
                Ok(())
            }
            Err(e) => {
                warn!(collection = A::Entity::COLLECTION, key, error = %e, "Delete failed");
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Marks the entity the user is working on. It need not be cached yet,
    /// e.g. freshly generated content before its first save.
    pub fn set_current(&self, entity: Option<A::Entity>) {
        self.state.lock().current = entity;
    }

    //-------------------------------------------------------------------------------------
    // Read side
    //-------------------------------------------------------------------------------------

    /// The cache in server order.
    pub fn entities(&self) -> Vec<A::Entity> {
        self.state.lock().entities.clone()
    }

    pub fn get(&self, key: &str) -> Option<A::Entity> {
        let state = self.state.lock();
        state.position(key).map(|index| state.entities[index].clone())
    }

    /// The cache in the family's display order.
    pub fn sorted(&self) -> Vec<A::Entity> {
        let mut entities = self.entities();
        entities.sort_by(A::Entity::display_order);
        entities
    }

    pub fn len(&self) -> usize {
        self.state.lock().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn is_generating(&self) -> bool {
        self.state.lock().generating
    }

    /// Whether a list has succeeded at least once since construction or reset.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn save_status(&self) -> SaveStatus {
        self.state.lock().save_status
    }

    pub fn is_saving(&self) -> bool {
        self.save_status() == SaveStatus::Saving
    }

    pub fn is_saved(&self) -> bool {
        self.save_status() == SaveStatus::Saved
    }

    pub fn has_save_error(&self) -> bool {
        self.save_status() == SaveStatus::Error
    }

    /// The cached history from the last `versions` call.
    pub fn version_history(&self) -> Vec<<A::Entity as Resource>::Version> {
        self.state.lock().versions.clone()
    }

    pub fn total_versions(&self) -> usize {
        self.state.lock().total_versions
    }

    pub fn current(&self) -> Option<A::Entity> {
        self.state.lock().current.clone()
    }

    pub fn clear_error(&self) {
        self.state.lock().error = None;
    }

    pub fn clear_save_status(&self) {
        self.state.lock().save_status = SaveStatus::Idle;
    }

    /// Drops all cached state, e.g. after sign-out. Any list still in flight
    /// will be discarded when it lands.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let generation = state.generation + 1;
        *state = StoreState::new();
        state.generation = generation;
    }
}

impl<A: VersionedApi> ResourceStore<A> {
    /// Replaces the version cache with the entity's history. Never merges.
    pub async fn versions(&self, key: &str) -> PortResult<usize> {
        let result = self.api.versions(key).await;
        let mut state = self.state.lock();
        match result {
            Ok(list) => {
                state.total_versions = list.total_versions;
                state.versions = list.versions;
                state.error = None;
                Ok(state.total_versions)
            }
            Err(e) => {
                warn!(collection = A::Entity::COLLECTION, key, error = %e, "Failed to fetch versions");
                state.versions.clear();
                state.total_versions = 0;
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

impl<A: GenerativeApi> ResourceStore<A> {
    /// Validates the parameters and asks the server to synthesize content.
    ///
    /// The cache is untouched; callers `save` the result to persist it.
    pub async fn generate(&self, params: A::Params) -> PortResult<Value> {
        let request = match params.validate() {
            Ok(request) => request,
            Err(e) => {
                self.state.lock().error = Some(e.to_string());
                return Err(e);
            }
        };

        self.state.lock().generating = true;
        let result = self.api.generate(&request).await;

        let mut state = self.state.lock();
        state.generating = false;
        match &result {
            Ok(_) => state.error = None,
            Err(e) => {
                warn!(collection = A::Entity::COLLECTION, error = %e, "Generation failed");
                state.error = Some(e.to_string());
            }
        }
        result
    }
}
