//! URI-keyed blob cache with deferred destruction.
//!
//! The cache has two kinds of owners:
//! - the [`ResourceCache`] handle held by the loading session, and
//! - one [`UploadTicket`] per asynchronous GPU upload still in flight.
//!
//! Both hold the same `Arc`. Releasing the owner handle while uploads are in
//! flight moves the cache to [`CacheState::ReleasedPending`]; the last ticket
//! to be redeemed then destroys it. With no upload in flight, releasing
//! destroys it immediately. Either way destruction happens exactly once.
//!
//! ```text
//!   Active ──release()──► ReleasedPending ──last ticket──► Destroyed
//!     │                                                      ▲
//!     └──────────release() with 0 pending────────────────────┘
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

// ============================================================================
// Blob
// ============================================================================

/// Immutable bytes resolved from a buffer URI.
///
/// Cloning is cheap and shares the allocation.
#[derive(Clone, PartialEq, Eq)]
pub struct Blob(Arc<[u8]>);

impl Blob {
    /// Returns `true` if both blobs share the same allocation.
    #[inline]
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns a weak reference, used to observe when the bytes are freed.
    #[must_use]
    pub fn downgrade(&self) -> Weak<[u8]> {
        Arc::downgrade(&self.0)
    }
}

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<&[u8]> for Blob {
    fn from(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob({} bytes)", self.0.len())
    }
}

// ============================================================================
// Shared State
// ============================================================================

/// Lifecycle state of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// The owner still holds the cache.
    Active,
    /// The owner released the cache; uploads are still in flight.
    ReleasedPending,
    /// Terminal: blobs have been freed.
    Destroyed,
}

type DestroyCallback = Box<dyn FnOnce() + Send>;

struct CacheShared {
    blobs: RwLock<FxHashMap<String, Blob>>,
    pending_uploads: AtomicUsize,
    owner_released: AtomicBool,
    on_destroyed: Mutex<Vec<DestroyCallback>>,
}

impl CacheShared {
    fn begin_upload(&self) {
        self.pending_uploads.fetch_add(1, Ordering::AcqRel);
    }

    fn complete_upload(&self) {
        let result = self
            .pending_uploads
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        assert!(
            result.is_ok(),
            "resource cache upload counter underflow: more completions than uploads"
        );
    }
}

// Runs on whichever thread drops the last owner: the loading thread on
// release, or an engine thread on the last upload completion.
impl Drop for CacheShared {
    fn drop(&mut self) {
        let blobs = std::mem::take(self.blobs.get_mut());
        log::debug!("Destroying resource cache ({} blobs)", blobs.len());
        drop(blobs);

        for callback in self.on_destroyed.get_mut().drain(..) {
            callback();
        }
    }
}

// ============================================================================
// ResourceCache
// ============================================================================

/// Owner handle of a URI -> [`Blob`] cache.
///
/// Not `Clone`: there is exactly one owner. Dropping the handle is the same as
/// calling [`release`](Self::release).
pub struct ResourceCache {
    shared: Arc<CacheShared>,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(CacheShared {
                blobs: RwLock::default(),
                pending_uploads: AtomicUsize::new(0),
                owner_released: AtomicBool::new(false),
                on_destroyed: Mutex::new(Vec::new()),
            }),
        }
    }

    /// [Read] Returns the blob loaded for `uri`, if any.
    #[must_use]
    pub fn lookup(&self, uri: &str) -> Option<Blob> {
        self.shared.blobs.read().get(uri).cloned()
    }

    /// [Write] Stores `blob` for `uri` and returns the resident blob.
    ///
    /// The first writer wins: if `uri` is already cached the new blob is
    /// dropped and the existing one is returned.
    pub fn insert(&self, uri: impl Into<String>, blob: Blob) -> Blob {
        let mut guard = self.shared.blobs.write();
        guard.entry(uri.into()).or_insert(blob).clone()
    }

    /// Number of cached blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.blobs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers one asynchronous upload that must complete before the cache
    /// may be destroyed.
    #[must_use = "dropping the ticket completes the upload immediately"]
    pub fn begin_upload(&self) -> UploadTicket {
        self.shared.begin_upload();
        UploadTicket {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of uploads dispatched but not yet completed.
    #[inline]
    #[must_use]
    pub fn pending_uploads(&self) -> usize {
        self.shared.pending_uploads.load(Ordering::Acquire)
    }

    /// Returns a handle that observes the cache without keeping it alive.
    #[must_use]
    pub fn monitor(&self) -> CacheMonitor {
        CacheMonitor {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Registers a callback invoked once, when the cache is destroyed.
    pub fn on_destroyed(&self, callback: impl FnOnce() + Send + 'static) {
        self.shared.on_destroyed.lock().push(Box::new(callback));
    }

    /// Relinquishes the owner handle.
    ///
    /// The cache is destroyed now if no upload is pending, otherwise when the
    /// last pending upload completes.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ResourceCache {
    fn drop(&mut self) {
        self.shared.owner_released.store(true, Ordering::Release);
        let pending = self.pending_uploads();
        if pending > 0 {
            log::debug!("Resource cache released with {pending} pending uploads");
        }
    }
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("blobs", &self.len())
            .field("pending_uploads", &self.pending_uploads())
            .finish()
    }
}

// ============================================================================
// UploadTicket
// ============================================================================

/// One pending upload's share of the cache lifetime.
///
/// Redeemed exactly once: explicitly through [`redeem`](Self::redeem) or
/// implicitly when dropped.
pub struct UploadTicket {
    shared: Arc<CacheShared>,
}

impl UploadTicket {
    /// Signals that the upload has consumed its bytes.
    pub fn redeem(self) {
        drop(self);
    }
}

impl Drop for UploadTicket {
    fn drop(&mut self) {
        // The counter drops before the Arc, so observers never see a
        // destroyed cache with uploads still counted.
        self.shared.complete_upload();
    }
}

impl fmt::Debug for UploadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTicket").finish_non_exhaustive()
    }
}

// ============================================================================
// CacheMonitor
// ============================================================================

/// Non-owning view of a cache's lifecycle.
#[derive(Clone)]
pub struct CacheMonitor {
    shared: Weak<CacheShared>,
}

impl CacheMonitor {
    #[must_use]
    pub fn state(&self) -> CacheState {
        match self.shared.upgrade() {
            None => CacheState::Destroyed,
            Some(shared) if shared.owner_released.load(Ordering::Acquire) => CacheState::ReleasedPending,
            Some(_) => CacheState::Active,
        }
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.shared.strong_count() == 0
    }

    /// Pending uploads, zero once destroyed.
    #[must_use]
    pub fn pending_uploads(&self) -> usize {
        self.shared
            .upgrade()
            .map_or(0, |shared| shared.pending_uploads.load(Ordering::Acquire))
    }
}

impl fmt::Debug for CacheMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheMonitor").field("state", &self.state()).finish()
    }
}
