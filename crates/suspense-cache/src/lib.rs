//! Render-time memoization of one-shot async fetch results.
//!
//! A [`SuspenseCache`] bridges an asynchronous fetch operation into a synchronous
//! "read-or-not-ready" accessor, suitable for use inside a rendering pass that
//! re-invokes the accessor on every attempt until the data is available.
//!
//! Registering a fetch under a key spawns it onto the ambient runtime and hands
//! back an [`Accessor`]. The accessor's [`get`](Accessor::get) never blocks:
//! it returns a [`Snapshot`] that is either the settled outcome, or a
//! [`Settlement`] handle the caller can await before polling again.
//! Registrations are coalesced per key, so the fetch for a given key runs at
//! most once per cache, and its outcome is permanent for the cache's lifetime.
//!
//! The cache is an explicit, render-scoped object. Create one per top-level
//! render (or request), and drop it to discard all entries.
//!
//! ```
//! use suspense_cache::{Snapshot, SuspenseCache};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = SuspenseCache::new();
//! let accessor = cache.register("project/1", || async {
//!     Ok("Intro to React".to_string())
//! });
//!
//! // The render loop: poll, and await settlement while not ready.
//! let name = loop {
//!     match accessor.get() {
//!         Snapshot::Pending(settlement) => settlement.await,
//!         Snapshot::Ready(value) => break value,
//!         Snapshot::Failed(error) => panic!("fetch failed: {error}"),
//!     }
//! };
//! assert_eq!(name, "Intro to React");
//! # }
//! ```

#![warn(missing_docs)]

mod cache;
mod error;

pub use cache::{Accessor, Settlement, Snapshot, SuspenseCache};
pub use error::{CacheContents, CacheError};
