//! Blobs and revocable preview handles
//!
//! A preview handle is the in-process equivalent of a browser object URL: a
//! string key that resolves to a blob until it is revoked. Handles are wrapped
//! in [`Resource`], which releases exactly once, either through
//! [`Resource::release`] or on drop.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::utils::lock_mutex_recover;

/// Immutable binary payload with its content type and file name
#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Arc<[u8]>,
    content_type: String,
    file_name: String,
}

impl Blob {
    pub fn new(
        bytes: impl Into<Arc<[u8]>>,
        content_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            file_name: file_name.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

type ReleaseFn<T> = Box<dyn FnOnce(&T) + Send>;

/// A single-owner value with a release action that runs exactly once.
pub struct Resource<T> {
    value: T,
    on_release: Option<ReleaseFn<T>>,
}

impl<T> Resource<T> {
    pub fn create(value: T, on_release: impl FnOnce(&T) + Send + 'static) -> Self {
        Self {
            value,
            on_release: Some(Box::new(on_release)),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Release now; consuming `self` makes a second release impossible.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.on_release.take() {
            release(&self.value);
        }
    }
}

impl<T> Drop for Resource<T> {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl<T: fmt::Debug> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resource").field(&self.value).finish()
    }
}

/// A revocable preview URL
pub type PreviewHandle = Resource<String>;

const PREVIEW_SCHEME: &str = "blob:report-preview/";

/// Issues preview handles and resolves live ones back to their blobs.
///
/// Cloning shares the same registry.
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<Mutex<HashMap<String, Blob>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new handle for `blob`.
    pub fn create(&self, blob: &Blob) -> PreviewHandle {
        let url = format!("{}{}", PREVIEW_SCHEME, uuid::Uuid::new_v4());
        lock_mutex_recover(&self.live).insert(url.clone(), blob.clone());
        log::debug!("Created preview handle {} for {}", url, blob.file_name());

        let live = Arc::clone(&self.live);
        Resource::create(url, move |url: &String| {
            if lock_mutex_recover(&live).remove(url).is_some() {
                log::debug!("Released preview handle {}", url);
            } else {
                log::warn!("Preview handle {} was already gone at release", url);
            }
        })
    }

    /// Resolve a live handle to its blob
    pub fn resolve(&self, url: &str) -> Option<Blob> {
        lock_mutex_recover(&self.live).get(url).cloned()
    }

    pub fn is_live(&self, url: &str) -> bool {
        lock_mutex_recover(&self.live).contains_key(url)
    }

    /// Number of handles created but not yet released
    pub fn outstanding(&self) -> usize {
        lock_mutex_recover(&self.live).len()
    }
}

impl fmt::Debug for PreviewRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewRegistry")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
