// 📣 Change Bus - tells store instances about writes made by other contexts
//
// A context is one tab / process holding one store. Events carry the
// writer's context and are never delivered back to it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

// ============================================================================
// CONTEXT IDENTITY
// ============================================================================

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Identity of one execution context attached to a storage region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a process-unique context id
    pub fn next() -> Self {
        ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// A persisted value changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// Raw stored text; `None` when the key was removed
    pub new_value: Option<String>,
    pub origin: ContextId,
}

type Listener = Arc<dyn Fn(&StorageEvent) + Send + Sync>;

struct Registration {
    id: u64,
    context: ContextId,
    key: String,
    listener: Listener,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    registrations: Vec<Registration>,
}

// ============================================================================
// BUS
// ============================================================================

/// Process-wide publish point for storage changes.
///
/// `Clone` is cheap; clones share one registry.
#[derive(Clone, Default)]
pub struct ChangeBus {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for changes to `key` made by any context other
    /// than `context`. Delivery stops when the returned handle is dropped.
    pub fn subscribe<F>(&self, context: ContextId, key: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&StorageEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.registrations.push(Registration {
            id,
            context,
            key: key.into(),
            listener: Arc::new(listener),
        });

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every matching listener. Returns how many were
    /// notified.
    ///
    /// Listeners run after the registry lock is released, so they may
    /// publish or subscribe themselves.
    pub fn publish(&self, event: &StorageEvent) -> usize {
        let targets: Vec<Listener> = {
            let registry = self.registry.lock();
            registry
                .registrations
                .iter()
                .filter(|r| r.key == event.key && r.context != event.origin)
                .map(|r| Arc::clone(&r.listener))
                .collect()
        };

        tracing::debug!(
            key = %event.key,
            origin = event.origin.as_u64(),
            listeners = targets.len(),
            "publishing storage change"
        );

        for listener in &targets {
            listener(event);
        }
        targets.len()
    }

    pub fn listener_count(&self) -> usize {
        self.registry.lock().registrations.len()
    }
}

// ============================================================================
// SUBSCRIPTION HANDLE
// ============================================================================

/// Unsubscribe handle returned by [`ChangeBus::subscribe`].
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Stop delivery. Same as dropping the handle.
    pub fn unsubscribe(self) {}

    fn remove(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().registrations.retain(|r| r.id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
