//! Fixed-capacity least-recently-used cache.
//!
//! - [`LruCache`] -- non-locking cache for single-threaded or externally
//!   synchronized use (`&mut self` operations)
//! - [`SyncLruCache`] -- locking variant, every operation under a mutex
//!
//! Both evict the least recently touched entry once `max_entries` is
//! exceeded; a `max_entries` of 0 means no limit. Every operation is O(1)
//! amortized.

pub mod cache;
pub mod sync;

pub use cache::LruCache;
pub use sync::SyncLruCache;
