//! Subscriber Registry
//!
//! Tracks the live set of downstream sinks for the broadcaster.
//!
//! # Design
//!
//! Membership is a copy-on-read list guarded by a `parking_lot::RwLock`.
//! The broadcaster takes a [`SubscriberRegistry::snapshot`] and iterates it
//! with the lock released, so attach/detach during a fan-out can neither
//! corrupt the iteration nor cause a duplicate dispatch. A sink detached
//! before the snapshot is taken never sees the message.
//!
//! The registry is generic over the sink type so it stays free of any
//! transport concerns; the application layer instantiates it with
//! `dyn FrameSink`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

// =============================================================================
// Subscriber Handle
// =============================================================================

/// Opaque identity of one attached subscriber.
///
/// Every attach yields a fresh handle, even for the same sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberHandle(u64);

impl SubscriberHandle {
    /// Raw numeric id, for logs.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// One registry entry as returned by a snapshot.
pub type SubscriberEntry<S> = (SubscriberHandle, Arc<S>);

/// Thread-safe set of attached sinks.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use alpaca_sse_bridge::domain::subscriber::SubscriberRegistry;
///
/// let registry: SubscriberRegistry<str> = SubscriberRegistry::new();
/// let a = registry.attach(Arc::from("a"));
/// let b = registry.attach(Arc::from("a"));
/// assert_ne!(a, b);
///
/// assert!(registry.detach(a));
/// assert!(!registry.detach(a));
/// assert_eq!(registry.len(), 1);
/// ```
pub struct SubscriberRegistry<S: ?Sized> {
    next_id: AtomicU64,
    entries: RwLock<Vec<SubscriberEntry<S>>>,
}

impl<S: ?Sized> SubscriberRegistry<S> {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Register a sink and return its handle. Never fails.
    pub fn attach(&self, sink: Arc<S>) -> SubscriberHandle {
        let handle = SubscriberHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((handle, sink));
        handle
    }

    /// Remove a sink.
    ///
    /// Returns `false` if the handle was unknown or already detached.
    pub fn detach(&self, handle: SubscriberHandle) -> bool {
        let mut entries = self.entries.write();
        match entries.iter().position(|(h, _)| *h == handle) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Copy of the current membership, in attach order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SubscriberEntry<S>> {
        self.entries
            .read()
            .iter()
            .map(|(handle, sink)| (*handle, Arc::clone(sink)))
            .collect()
    }

    /// Check whether a handle is still attached.
    #[must_use]
    pub fn contains(&self, handle: SubscriberHandle) -> bool {
        self.entries.read().iter().any(|(h, _)| *h == handle)
    }

    /// Number of attached sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if no sinks are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Detach every sink, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        removed
    }
}

impl<S: ?Sized> Default for SubscriberRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized> fmt::Debug for SubscriberRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
