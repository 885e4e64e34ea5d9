//! # Event Bus
//!
//! Typed, synchronous publish/subscribe. The gateway publishes failures
//! here; UI code subscribes and turns them into notifications. Neither side
//! knows about the other.
//!
//! ## Delivery
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       publish::<ApiError>(msg)                          │
//! │                                                                         │
//! │  1. Snapshot the handler list for the topic (lock released after)      │
//! │  2. Call each handler in registration order                            │
//! │       │                                                                 │
//! │       ├── handler returns ──────────► next handler                     │
//! │       └── handler panics ──► logged ► next handler                     │
//! │  3. Return () to the publisher, whatever happened                      │
//! │                                                                         │
//! │  Handlers may subscribe/unsubscribe from inside a callback; the change │
//! │  applies from the next publish.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Topics
//! A topic is a zero-sized type naming its payload type, so publishing the
//! wrong payload to a topic is a compile error.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, error};

use imutis_core::{Severity, Toast};

// =============================================================================
// Topics
// =============================================================================

/// A named channel with a fixed payload type.
pub trait Topic: 'static {
    type Payload: 'static;

    /// Name used in logs.
    const NAME: &'static str;
}

/// Network and authentication failures. Payload is a display string.
#[derive(Debug, Clone, Copy)]
pub struct ApiError;

impl Topic for ApiError {
    type Payload = String;
    const NAME: &'static str = "API_ERROR";
}

/// Requests a transient on-screen notification.
#[derive(Debug, Clone, Copy)]
pub struct ShowToast;

impl Topic for ShowToast {
    type Payload = Toast;
    const NAME: &'static str = "SHOW_TOAST";
}

// =============================================================================
// Registry
// =============================================================================

type Handler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    topics: HashMap<TypeId, Vec<(u64, Handler)>>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // A handler panic never happens while the lock is held, but a poisoned
    // lock still holds a consistent registry.
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// Event Bus
// =============================================================================

/// Cloneable handle to a shared set of subscriptions.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = lock(&self.registry).topics.len();
        f.debug_struct("EventBus").field("topics", &topics).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for topic `T`.
    ///
    /// The returned [`Subscription`] removes exactly this handler when
    /// unsubscribed. Dropping it leaves the handler registered.
    pub fn subscribe<T, F>(&self, handler: F) -> Subscription
    where
        T: Topic,
        F: Fn(&T::Payload) + Send + Sync + 'static,
    {
        let wrapped: Handler = Arc::new(move |payload: &dyn Any| {
            if let Some(payload) = payload.downcast_ref::<T::Payload>() {
                handler(payload);
            }
        });

        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .topics
            .entry(TypeId::of::<T>())
            .or_default()
            .push((id, wrapped));

        debug!(topic = T::NAME, subscription = id, "Subscribed");

        Subscription {
            registry: Arc::downgrade(&self.registry),
            topic: TypeId::of::<T>(),
            topic_name: T::NAME,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Delivers `payload` to every handler of topic `T`.
    ///
    /// Never fails: a panicking handler is logged and skipped.
    pub fn publish<T: Topic>(&self, payload: T::Payload) {
        let handlers: Vec<Handler> = {
            let registry = lock(&self.registry);
            match registry.topics.get(&TypeId::of::<T>()) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };

        for handler in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(&payload)));
            if let Err(panic) = outcome {
                error!(
                    topic = T::NAME,
                    panic = %panic_message(panic.as_ref()),
                    "Event handler panicked"
                );
            }
        }
    }

    /// Shortcut for publishing a [`ShowToast`] event.
    pub fn show_toast(&self, message: impl Into<String>, severity: Severity) {
        self.publish::<ShowToast>(Toast::new(message, severity));
    }

    /// Number of live handlers on topic `T`.
    pub fn subscriber_count<T: Topic>(&self) -> usize {
        lock(&self.registry)
            .topics
            .get(&TypeId::of::<T>())
            .map_or(0, Vec::len)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Handle returned by [`EventBus::subscribe`].
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    topic: TypeId,
    topic_name: &'static str,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Removes this handler. Later calls do nothing.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }

        let Some(registry) = self.registry.upgrade() else {
            return;
        };

        let mut registry = lock(&registry);
        if let Some(list) = registry.topics.get_mut(&self.topic) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                registry.topics.remove(&self.topic);
            }
        }

        debug!(topic = self.topic_name, subscription = self.id, "Unsubscribed");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic_name)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
