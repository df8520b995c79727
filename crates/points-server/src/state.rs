//! Shared application state for the control API server.
//!
//! [`AppState`] holds the live [`PointCollection`] behind a single
//! read-write lock, the [`PointStore`] it is written through to, and the
//! shared secret checked on every request.
//!
//! # Locking
//!
//! Reads take the read guard and may run concurrently. Every mutating
//! command goes through [`AppState::mutate`], which holds the write guard
//! for the whole command: the glide, the state change, and the database
//! write. Hardware-affecting commands are therefore fully serialised,
//! matching the single physical bus. Backup and restore use the same
//! gate.

use std::sync::Arc;

use points_core::PointCollection;
use points_store::PointStore;
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::error::ApiError;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
pub struct AppState {
    points: Arc<RwLock<PointCollection>>,
    store: PointStore,
    secret: String,
}

impl AppState {
    /// Create application state around a loaded collection.
    pub fn new(points: PointCollection, store: PointStore, secret: impl Into<String>) -> Self {
        Self {
            points: Arc::new(RwLock::new(points)),
            store,
            secret: secret.into(),
        }
    }

    /// The shared credential requests must present.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// The persistence store.
    pub const fn store(&self) -> &PointStore {
        &self.store
    }

    /// Acquire shared read access to the collection.
    pub async fn read(&self) -> RwLockReadGuard<'_, PointCollection> {
        self.points.read().await
    }

    /// Run `f` with exclusive access to the collection.
    ///
    /// The closure runs on the blocking thread pool because glides sleep
    /// between micro-steps. The write guard is held until `f` returns;
    /// there is no cancellation once the closure has started.
    pub async fn mutate<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut PointCollection, &PointStore) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let mut guard = Arc::clone(&self.points).write_owned().await;
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&mut guard, &store))
            .await
            .map_err(|e| ApiError::Internal(format!("command task failed: {e}")))?
    }
}

impl core::fmt::Debug for AppState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
