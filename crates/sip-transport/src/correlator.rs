//! Content-based response correlation
//!
//! Every outbound request that expects an answer registers a *correlator*: an
//! async predicate that is shown every inbound message and decides by content
//! whether the message belongs to it. A correlator that returns `true` has
//! finished its transaction and is removed from the registry.
//!
//! There is no addressing by transaction id: each inbound message is fanned
//! out to all active correlators, one task per correlator, with no ordering
//! guarantee between them.
//!
//! ```rust
//! # use wsphone_sip_transport::correlator::{handler, CorrelatorRegistry};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = CorrelatorRegistry::new();
//! registry.register(handler(|text| async move { text.contains("200 OK") }));
//!
//! for task in registry.dispatch("SIP/2.0 100 Trying\r\n\r\n".into()) {
//!     task.await.unwrap();
//! }
//! assert_eq!(registry.len(), 1);
//!
//! for task in registry.dispatch("SIP/2.0 200 OK\r\n\r\n".into()) {
//!     task.await.unwrap();
//! }
//! assert!(registry.is_empty());
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

/// Future returned by a correlator; resolves to `true` when the transaction is complete
pub type CorrelatorFuture = BoxFuture<'static, bool>;

/// A registered response predicate
pub type ResponseHandler = Arc<dyn Fn(Arc<str>) -> CorrelatorFuture + Send + Sync>;

/// Wrap an async closure as a [`ResponseHandler`]
pub fn handler<F, Fut>(f: F) -> ResponseHandler
where
    F: Fn(Arc<str>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(move |text| Box::pin(f(text)))
}

/// Opaque key of a registered correlator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelatorKey(Uuid);

impl CorrelatorKey {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CorrelatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Entry {
    handler: ResponseHandler,
    completed: AtomicBool,
}

/// Concurrency-safe registry of pending correlators
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone, Default)]
pub struct CorrelatorRegistry {
    entries: Arc<DashMap<CorrelatorKey, Arc<Entry>>>,
}

impl CorrelatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a fresh key
    pub fn register(&self, handler: ResponseHandler) -> CorrelatorKey {
        let key = CorrelatorKey::new();
        self.entries.insert(
            key,
            Arc::new(Entry {
                handler,
                completed: AtomicBool::new(false),
            }),
        );
        trace!("Registered correlator {}", key);
        key
    }

    /// Remove a correlator. Returns `false` if it was not registered.
    pub fn unregister(&self, key: &CorrelatorKey) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                entry.completed.store(true, Ordering::Release);
                trace!("Unregistered correlator {}", key);
                true
            }
            None => false,
        }
    }

    /// Drop every pending correlator without invoking it.
    ///
    /// Handlers are released, so anything waiting on state they own observes
    /// the drop.
    pub fn clear(&self) {
        for item in self.entries.iter() {
            item.value().completed.store(true, Ordering::Release);
        }
        let dropped = self.entries.len();
        self.entries.clear();
        if dropped > 0 {
            debug!("Dropped {} pending correlators", dropped);
        }
    }

    pub fn contains(&self, key: &CorrelatorKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Show `message` to every active correlator, each in its own task.
    ///
    /// The entries are snapshotted first so no map lock is held while the
    /// handlers run; correlators registered during dispatch only see later
    /// messages.
    pub fn dispatch(&self, message: Arc<str>) -> Vec<JoinHandle<()>> {
        let active: Vec<(CorrelatorKey, Arc<Entry>)> = self
            .entries
            .iter()
            .map(|item| (*item.key(), Arc::clone(item.value())))
            .collect();

        trace!("Dispatching inbound message to {} correlators", active.len());

        active
            .into_iter()
            .map(|(key, entry)| {
                let registry = self.clone();
                let message = Arc::clone(&message);
                tokio::spawn(async move {
                    if entry.completed.load(Ordering::Acquire) {
                        return;
                    }
                    let done = (entry.handler)(message).await;
                    if done && !entry.completed.swap(true, Ordering::AcqRel) {
                        registry.entries.remove(&key);
                        debug!("Correlator {} completed", key);
                    }
                })
            })
            .collect()
    }
}

impl fmt::Debug for CorrelatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelatorRegistry")
            .field("pending", &self.entries.len())
            .finish()
    }
}
