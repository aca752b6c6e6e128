use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::Shared;

use crate::{CacheContents, CacheError};

/// The shareable channel through which an entry's terminal outcome is published.
///
/// The sender side is owned by the spawned fetch task and fires exactly once,
/// which is what makes status transitions monotonic: after the send there is
/// nothing left that could write to the entry.
type SettlementChannel<T> = Shared<oneshot::Receiver<CacheContents<T>>>;

type EntryMap<K, T> = Arc<Mutex<BTreeMap<K, SettlementChannel<T>>>>;

/// A render-scoped cache for the outcomes of one-shot fetch operations.
///
/// Entries are keyed by a caller-supplied stable key. The first registration
/// for a key spawns the fetch; later registrations for the same key are
/// coalesced onto the existing entry without running the fetch again. Entries
/// are never evicted, so a settled outcome is served to every accessor for as
/// long as the cache lives.
///
/// Clones share the same entry map, so a cache can be handed to whichever
/// parts of a render pass need to register or read entries.
pub struct SuspenseCache<K, T> {
    entries: EntryMap<K, T>,
}

impl<K, T> Clone for SuspenseCache<K, T> {
    fn clone(&self) -> Self {
        SuspenseCache {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K, T> Default for SuspenseCache<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> fmt::Debug for SuspenseCache<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.try_lock().map(|e| e.len()).unwrap_or_default();
        f.debug_struct("SuspenseCache")
            .field("entries", &entries)
            .finish()
    }
}

impl<K, T> SuspenseCache<K, T> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        SuspenseCache {
            entries: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// The number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether no entry has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

impl<K, T> SuspenseCache<K, T>
where
    K: Ord,
    T: Clone + Send + 'static,
{
    /// Registers a fetch operation under `key` and returns an [`Accessor`]
    /// bound to its entry.
    ///
    /// If no entry exists for `key`, the `fetch` closure is invoked and the
    /// resulting future is eagerly spawned onto the current runtime; when it
    /// settles, the entry transitions to its terminal state exactly once. If
    /// an entry already exists, `fetch` is not invoked at all and the accessor
    /// is bound to the existing entry.
    ///
    /// Registration itself is synchronous and never suspends. It must be
    /// called from within a tokio runtime, as the fetch is spawned eagerly.
    pub fn register<F, Fut>(&self, key: K, fetch: F) -> Accessor<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheContents<T>> + Send + 'static,
    {
        let mut entries = self.entries.lock().unwrap();
        let channel = match entries.entry(key) {
            Entry::Occupied(existing) => {
                // A repeated registration was coalesced onto the running entry.
                tracing::trace!("Coalescing registration into existing entry");
                existing.get().clone()
            }
            Entry::Vacant(vacant) => {
                tracing::trace!("Spawning fetch for new cache entry");
                vacant.insert(spawn_fetch(fetch())).clone()
            }
        };

        Accessor { channel }
    }
}

/// Spawns the fetch as a separate task and returns the channel over which its
/// outcome is published.
///
/// NOTE: This function is *not* `async` on purpose; the fetch makes progress
/// even if no accessor ever awaits its settlement.
fn spawn_fetch<T, F>(fetch: F) -> SettlementChannel<T>
where
    T: Clone + Send + 'static,
    F: Future<Output = CacheContents<T>> + Send + 'static,
{
    let (sender, receiver) = oneshot::channel();

    tokio::spawn(async move {
        let contents = fetch.await;
        // The receiver is gone if the cache was dropped mid-flight.
        sender.send(contents).ok();
    });

    receiver.shared()
}

/// A handle to one cache entry, handed out by [`SuspenseCache::register`].
///
/// All accessors bound to the same entry observe a consistent state: the same
/// in-flight operation while pending, and the same terminal outcome forever
/// after settlement.
pub struct Accessor<T> {
    channel: SettlementChannel<T>,
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        Accessor {
            channel: self.channel.clone(),
        }
    }
}

impl<T> fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor").finish_non_exhaustive()
    }
}

impl<T: Clone> Accessor<T> {
    /// Takes a snapshot of the entry's current state, without blocking.
    ///
    /// While the fetch is in flight this returns [`Snapshot::Pending`] with a
    /// [`Settlement`] to await before polling again. Once the fetch has
    /// settled, every call returns the same [`Snapshot::Ready`] value or
    /// [`Snapshot::Failed`] error, synchronously.
    pub fn get(&self) -> Snapshot<T> {
        // A single poll with a no-op waker. This observes a settled fetch even
        // if nothing has awaited the channel yet.
        match self.channel.clone().now_or_never() {
            None => Snapshot::Pending(Settlement {
                channel: self.channel.clone(),
            }),
            Some(Ok(Ok(value))) => Snapshot::Ready(value),
            Some(Ok(Err(error))) => Snapshot::Failed(error),
            // The fetch task dropped its sender without settling.
            Some(Err(oneshot::Canceled)) => Snapshot::Failed(CacheError::Dropped),
        }
    }

    /// Waits for the fetch to settle and returns the terminal outcome.
    ///
    /// This is the settle-then-read strategy for consumers that do not poll;
    /// it returns exactly what a post-settlement [`get`](Self::get) observes.
    pub async fn wait(&self) -> CacheContents<T> {
        self.channel
            .clone()
            .await
            .unwrap_or(Err(CacheError::Dropped))
    }
}

/// The state of a cache entry, as observed by a single [`Accessor::get`] call.
#[derive(Debug)]
pub enum Snapshot<T> {
    /// The fetch has not settled yet. Await the contained [`Settlement`] and
    /// poll again.
    Pending(Settlement<T>),
    /// The fetch resolved with this value.
    Ready(T),
    /// The fetch rejected with this error.
    Failed(CacheError),
}

impl<T> Snapshot<T> {
    /// Whether the fetch is still in flight.
    pub fn is_pending(&self) -> bool {
        matches!(self, Snapshot::Pending(_))
    }

    /// Returns the terminal contents, or `None` while still pending.
    pub fn settled(self) -> Option<CacheContents<T>> {
        match self {
            Snapshot::Pending(_) => None,
            Snapshot::Ready(value) => Some(Ok(value)),
            Snapshot::Failed(error) => Some(Err(error)),
        }
    }
}

/// A future that completes once the entry's fetch has settled.
///
/// Carried by [`Snapshot::Pending`]. Its output is intentionally `()`: the
/// terminal outcome is only ever read back through the [`Accessor`], so all
/// consumers go through the same code path regardless of how they waited.
pub struct Settlement<T> {
    channel: SettlementChannel<T>,
}

impl<T> fmt::Debug for Settlement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settlement").finish_non_exhaustive()
    }
}

impl<T: Clone> Future for Settlement<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().channel.poll_unpin(cx).map(|_| ())
    }
}
