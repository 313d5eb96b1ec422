//! Process-local image handles.
//!
//! A handle is a `blob:meme/<uuid>` URL that resolves to an in-memory
//! [`ImagePayload`] for as long as it is registered. The URL can be used
//! anywhere an image reference is accepted, for example as an image layer's
//! `src` attribute.
//!
//! Handles are never released automatically. Whoever receives one must call
//! [`HandleRegistry::revoke`] once nothing displays it anymore; until then the
//! payload stays in memory.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use uuid::Uuid;

use crate::{ImagePayload, ImageRef};

/// URL scheme prefix of every handle.
pub const HANDLE_URL_PREFIX: &str = "blob:meme/";

/// A registered, releasable reference to an image payload.
///
/// Deliberately not `Clone`: one handle, one owner. Copy the [`url`](Self::url)
/// into layer attributes instead.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "an image handle holds its payload in memory until revoked"]
pub struct ImageHandle {
    id: Uuid,
    url: String,
}

impl ImageHandle {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            url: format!("{HANDLE_URL_PREFIX}{id}"),
        }
    }

    /// Parse a handle URL back into a handle value.
    ///
    /// This only checks the URL shape; the handle may already be revoked.
    #[must_use]
    pub fn parse(url: &str) -> Option<Self> {
        let id = url.strip_prefix(HANDLE_URL_PREFIX)?;
        Uuid::parse_str(id).ok().map(Self::new)
    }

    /// The unique id of this handle.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The handle URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// This handle as an image reference.
    #[must_use]
    pub fn as_image_ref(&self) -> ImageRef {
        ImageRef::new(self.url.clone())
    }
}

impl std::fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Table of live handles.
///
/// Cloning yields another view of the same table. Thread-safe.
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    entries: Arc<RwLock<HashMap<Uuid, Arc<ImagePayload>>>>,
}

impl HandleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `payload` under a fresh handle.
    pub fn create(&self, payload: ImagePayload) -> ImageHandle {
        let handle = ImageHandle::new(Uuid::new_v4());
        let size = payload.len();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id, Arc::new(payload));
        tracing::debug!(handle = %handle, size, "Created image handle");
        handle
    }

    /// Look up the payload behind a handle.
    #[must_use]
    pub fn resolve(&self, handle: &ImageHandle) -> Option<Arc<ImagePayload>> {
        self.get(handle.id)
    }

    /// Look up the payload behind a handle URL.
    ///
    /// Returns `None` for URLs that are not handle URLs or whose handle was
    /// revoked.
    #[must_use]
    pub fn resolve_url(&self, url: &str) -> Option<Arc<ImagePayload>> {
        ImageHandle::parse(url).and_then(|handle| self.resolve(&handle))
    }

    /// Release a handle.
    ///
    /// Returns `false` if it was already released.
    pub fn revoke(&self, handle: ImageHandle) -> bool {
        self.remove(handle.id)
    }

    /// Release a handle by URL, e.g. the `src` of a layer being deleted.
    pub fn revoke_url(&self, url: &str) -> bool {
        ImageHandle::parse(url).is_some_and(|handle| self.revoke(handle))
    }

    /// Release every live handle. Returns how many were released.
    pub fn revoke_all(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let count = entries.len();
        entries.clear();
        if count > 0 {
            tracing::debug!(count, "Revoked all image handles");
        }
        count
    }

    /// Number of handles not yet released.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn get(&self, id: Uuid) -> Option<Arc<ImagePayload>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn remove(&self, id: Uuid) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            tracing::debug!(handle = %id, "Revoked image handle");
        }
        removed
    }
}
