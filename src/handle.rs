//! Contact handle repository
//!
//! A `ContactHandle` is an opaque integer alias for a SIP URI. The
//! repository guarantees a stable URI<->handle mapping for the lifetime of
//! a `ConnectionCore` and reference-counts handles so they are released
//! once no channel, session, or pending resolution refers to them anymore.
//!
//! Handle `0` is reserved and always means "none" — it is never minted for
//! a real URI.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Opaque identifier for a SIP URI, minted by a [`HandleRepository`].
///
/// `ContactHandle(0)` is reserved and means "no peer yet" — it is the value
/// a freshly minted outgoing `MediaChannel` carries before `AddMember` sets
/// its peer.
pub type ContactHandle = u32;

/// Reserved handle meaning "none".
pub const NO_HANDLE: ContactHandle = 0;

/// Bidirectional, reference-counted URI<->handle repository.
///
/// One repository is owned per `ConnectionCore`. Handles are stable for as
/// long as anything holds a reference; `release` drops the refcount and
/// reclaims the handle once it hits zero.
#[derive(Debug, Default)]
pub struct HandleRepository {
    by_uri: DashMap<String, ContactHandle>,
    by_handle: DashMap<ContactHandle, Entry>,
    next: AtomicU32,
}

#[derive(Debug)]
struct Entry {
    uri: String,
    refcount: u32,
}

impl HandleRepository {
    /// Create an empty repository. Handle allocation starts at 1 — handle 0 is reserved.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            by_uri: DashMap::new(),
            by_handle: DashMap::new(),
            next: AtomicU32::new(1),
        })
    }

    /// Resolve a URI to a handle, minting a new one if it hasn't been seen
    /// before. Returns a held (refcount >= 1) handle.
    pub fn handle_for_uri(&self, uri: &str) -> ContactHandle {
        if let Some(existing) = self.by_uri.get(uri) {
            let handle = *existing;
            drop(existing);
            self.hold(handle);
            return handle;
        }

        let handle = self.next.fetch_add(1, Ordering::SeqCst);
        self.by_uri.insert(uri.to_string(), handle);
        self.by_handle.insert(
            handle,
            Entry {
                uri: uri.to_string(),
                refcount: 1,
            },
        );
        handle
    }

    /// Look up the URI a handle was minted for. Returns `None` for
    /// `NO_HANDLE` or an unknown/released handle.
    pub fn uri_for_handle(&self, handle: ContactHandle) -> Option<String> {
        if handle == NO_HANDLE {
            return None;
        }
        self.by_handle.get(&handle).map(|e| e.uri.clone())
    }

    /// Increment the refcount of a known handle. No-op for `NO_HANDLE`.
    pub fn hold(&self, handle: ContactHandle) {
        if handle == NO_HANDLE {
            return;
        }
        if let Some(mut entry) = self.by_handle.get_mut(&handle) {
            entry.refcount += 1;
        }
    }

    /// Decrement the refcount of a handle, releasing the mapping once it
    /// reaches zero. No-op for `NO_HANDLE`.
    pub fn release(&self, handle: ContactHandle) {
        if handle == NO_HANDLE {
            return;
        }
        let should_remove = if let Some(mut entry) = self.by_handle.get_mut(&handle) {
            entry.refcount = entry.refcount.saturating_sub(1);
            entry.refcount == 0
        } else {
            false
        };

        if should_remove {
            if let Some((_, entry)) = self.by_handle.remove(&handle) {
                self.by_uri.remove(&entry.uri);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_uri_maps_to_stable_handle() {
        let repo = HandleRepository::new();
        let a = repo.handle_for_uri("sip:alice@example.com");
        let b = repo.handle_for_uri("sip:alice@example.com");
        assert_eq!(a, b);
        assert_ne!(a, NO_HANDLE);
    }

    #[test]
    fn distinct_uris_get_distinct_handles() {
        let repo = HandleRepository::new();
        let a = repo.handle_for_uri("sip:alice@example.com");
        let b = repo.handle_for_uri("sip:bob@example.com");
        assert_ne!(a, b);
    }

    #[test]
    fn release_reclaims_once_refcount_hits_zero() {
        let repo = HandleRepository::new();
        let a = repo.handle_for_uri("sip:alice@example.com"); // refcount 1
        repo.hold(a); // refcount 2
        repo.release(a); // refcount 1
        assert_eq!(repo.uri_for_handle(a), Some("sip:alice@example.com".to_string()));
        repo.release(a); // refcount 0, reclaimed
        assert_eq!(repo.uri_for_handle(a), None);

        // A later lookup of the same URI mints a fresh mapping (handle reuse
        // policy is unspecified; only the URI round-trip is guaranteed).
        let b = repo.handle_for_uri("sip:alice@example.com");
        assert_eq!(repo.uri_for_handle(b), Some("sip:alice@example.com".to_string()));
    }

    #[test]
    fn no_handle_operations_are_noops() {
        let repo = HandleRepository::new();
        repo.hold(NO_HANDLE);
        repo.release(NO_HANDLE);
        assert_eq!(repo.uri_for_handle(NO_HANDLE), None);
    }
}
