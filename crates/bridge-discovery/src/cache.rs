//! Coalescing lookup cache.
//!
//! Entries never expire. Concurrent misses for the same key share a single
//! in-flight lookup; a failed lookup leaves the key empty so the next caller
//! tries again.

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct LookupCache<K, V> {
	entries: DashMap<K, Arc<OnceCell<V>>>,
}

impl<K, V> Default for LookupCache<K, V>
where
	K: Eq + Hash,
{
	fn default() -> Self {
		Self {
			entries: DashMap::new(),
		}
	}
}

impl<K, V> LookupCache<K, V>
where
	K: Eq + Hash + Clone,
	V: Clone,
{
	pub fn new() -> Self {
		Self {
			entries: DashMap::new(),
		}
	}

	/// Returns the cached value for `key`, running `lookup` on a miss.
	pub async fn get_or_try_init<F, Fut, E>(&self, key: K, lookup: F) -> Result<V, E>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<V, E>>,
	{
		let cell = self
			.entries
			.entry(key)
			.or_insert_with(|| Arc::new(OnceCell::new()))
			.value()
			.clone();
		cell.get_or_try_init(lookup).await.cloned()
	}

	/// The cached value, without looking it up.
	pub fn get(&self, key: &K) -> Option<V> {
		self.entries.get(key)?.get().cloned()
	}

	/// Number of keys with a completed lookup.
	pub fn len(&self) -> usize {
		self.entries.iter().filter(|entry| entry.initialized()).count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
