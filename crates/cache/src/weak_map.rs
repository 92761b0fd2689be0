use std::sync::{Arc, Weak};

use holdfast_runtime::{LoadedUnit, WeakUnit};
use rustc_hash::FxHashMap;

/// Sweep once the table grows past this many slots, then re-arm at twice the
/// post-sweep size.
const SWEEP_FLOOR: usize = 16;

struct Slot<V> {
	unit: WeakUnit,
	value: Weak<V>,
}

/// Map from unit identity to a weakly held value.
///
/// Keys are unit identity addresses paired with a [`WeakUnit`] guard: a slot
/// counts only while its unit is still alive, which also protects against
/// the address being reused by a later allocation. Values are stored weak as
/// well, so the map never contributes reachability to either side. Dead slots
/// are compacted lazily on insert; there is no removal API.
pub(crate) struct WeakIdentityMap<V> {
	slots: FxHashMap<usize, Slot<V>>,
	sweep_at: usize,
}

impl<V> WeakIdentityMap<V> {
	pub(crate) fn new() -> Self {
		Self {
			slots: FxHashMap::default(),
			sweep_at: SWEEP_FLOOR,
		}
	}

	/// Returns the live value for `unit`, if any.
	///
	/// A slot whose unit died, or whose value died, is a miss.
	pub(crate) fn probe(&self, unit: &LoadedUnit) -> Option<Arc<V>> {
		let slot = self.slots.get(&unit.addr())?;
		let held = slot.unit.upgrade()?;
		debug_assert!(held.ptr_eq(unit));
		slot.value.upgrade()
	}

	/// Records `value` for `unit`, replacing any dead slot at the same
	/// identity.
	pub(crate) fn insert(&mut self, unit: &LoadedUnit, value: &Arc<V>) {
		if self.slots.len() >= self.sweep_at {
			self.sweep();
		}
		self.slots.insert(
			unit.addr(),
			Slot {
				unit: unit.downgrade(),
				value: Arc::downgrade(value),
			},
		);
	}

	/// Returns the number of live entries.
	pub(crate) fn live_len(&self) -> usize {
		self.slots
			.values()
			.filter(|slot| slot.unit.is_alive() && slot.value.strong_count() > 0)
			.count()
	}

	fn sweep(&mut self) {
		self.slots
			.retain(|_, slot| slot.unit.is_alive() && slot.value.strong_count() > 0);
		self.sweep_at = SWEEP_FLOOR.max(self.slots.len() * 2);
	}
}
