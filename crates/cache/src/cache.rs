use std::sync::Arc;

use holdfast_runtime::LoadedUnit;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::CacheError;
use crate::root_set::{self, Pinned};
use crate::weak_map::WeakIdentityMap;

/// Memoizing map from unit identity to a lazily computed value.
///
/// `get_or_create` runs the supplied factory at most once per unit for the
/// cache's lifetime; the produced `Arc<V>` is rooted in the unit's own load
/// group, so it survives exactly as long as the group does regardless of
/// what the caller or the cache retain. The cache's own state is pure
/// bookkeeping (weak handles and per-unit creation gates) and never keeps a
/// unit, a group, or a value alive.
///
/// There is no eviction: entries vanish on their own once the unit they
/// describe is reclaimed.
pub struct UnitCache<V: Send + Sync + 'static> {
	entries: Mutex<WeakIdentityMap<V>>,
	gates: Mutex<FxHashMap<usize, Arc<Mutex<()>>>>,
}

impl<V: Send + Sync + 'static> Default for UnitCache<V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<V: Send + Sync + 'static> UnitCache<V> {
	/// Creates an empty cache.
	pub fn new() -> Self {
		Self {
			entries: Mutex::new(WeakIdentityMap::new()),
			gates: Mutex::new(FxHashMap::default()),
		}
	}

	/// Returns the value for `unit`, computing and rooting it on first use.
	///
	/// Concurrent calls for the same unit serialize on a per-unit gate: one
	/// caller runs the factory, the rest block and then return the memoized
	/// value, so the factory runs at most once per unit no matter how many
	/// callers race. Calls for distinct units only contend on brief table
	/// mutations; no lock is held while a factory runs.
	///
	/// A factory error or a pinning refusal propagates to the caller and
	/// records nothing; the next call for that unit starts over.
	pub fn get_or_create(
		&self,
		unit: &LoadedUnit,
		factory: impl FnOnce(&LoadedUnit) -> anyhow::Result<V>,
	) -> Result<Arc<V>, CacheError> {
		if let Some(value) = self.entries.lock().probe(unit) {
			tracing::trace!(unit = %unit.name(), "cache hit");
			return Ok(value);
		}

		let gate = self
			.gates
			.lock()
			.entry(unit.addr())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone();
		let _creating = gate.lock();

		// A racing caller may have published while we waited on the gate.
		if let Some(value) = self.entries.lock().probe(unit) {
			tracing::trace!(unit = %unit.name(), "cache hit after gate");
			return Ok(value);
		}

		let value = match factory(unit) {
			Ok(value) => Arc::new(value),
			Err(source) => {
				self.release_gate(unit, &gate);
				return Err(CacheError::FactoryFailed {
					unit: unit.name().to_string(),
					source,
				});
			}
		};

		match root_set::pin_in_group(unit, &value) {
			Ok(Pinned::Rooted) => {}
			Ok(Pinned::Ephemeral) => {
				tracing::debug!(
					unit = %unit.name(),
					"group already unloaded; value left unpinned"
				);
			}
			Err(reason) => {
				self.release_gate(unit, &gate);
				return Err(CacheError::PinningDenied {
					unit: unit.name().to_string(),
					group: unit.group().name().to_string(),
					reason,
				});
			}
		}

		self.entries.lock().insert(unit, &value);
		self.release_gate(unit, &gate);
		tracing::debug!(unit = %unit.name(), "cached value for unit");
		Ok(value)
	}

	/// [`get_or_create`](Self::get_or_create) with an infallible factory.
	///
	/// Pinning can still be refused, so the result remains fallible.
	pub fn get_or_init(
		&self,
		unit: &LoadedUnit,
		factory: impl FnOnce(&LoadedUnit) -> V,
	) -> Result<Arc<V>, CacheError> {
		self.get_or_create(unit, |unit| Ok(factory(unit)))
	}

	/// Returns the number of entries whose unit and value are both live.
	pub fn len(&self) -> usize {
		self.entries.lock().live_len()
	}

	/// Returns true if no entry is live.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Drops the gate for `unit` once a creation attempt concludes.
	///
	/// Only removes the exact gate this attempt used: callers still blocked
	/// on it hold their own clones, and a later attempt installs a fresh one.
	fn release_gate(&self, unit: &LoadedUnit, gate: &Arc<Mutex<()>>) {
		let mut gates = self.gates.lock();
		if gates.get(&unit.addr()).is_some_and(|g| Arc::ptr_eq(g, gate)) {
			gates.remove(&unit.addr());
		}
	}
}

impl<V: Send + Sync + 'static> core::fmt::Debug for UnitCache<V> {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("UnitCache").field("live", &self.len()).finish()
	}
}
