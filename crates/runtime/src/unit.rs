use std::sync::{Arc, Weak};

use crate::group::{GroupCore, LoadGroup};

/// Backing state for one loaded unit.
///
/// Holds its group strongly: a unit handle is inseparable from the group
/// that loaded it. The group in turn owns its units strongly, so the cycle
/// is internal to the group and is broken by [`LoadGroup::unload`].
pub(crate) struct UnitCore {
	pub(crate) name: String,
	pub(crate) group: Arc<GroupCore>,
}

/// Handle to one unit of code loaded within a specific group.
///
/// Cheap to clone. Compared by identity, never by name: two loads of the
/// same name in different groups are distinct units. Holding a `LoadedUnit`
/// keeps its group's memory reachable.
#[derive(Clone)]
pub struct LoadedUnit {
	pub(crate) core: Arc<UnitCore>,
}

impl LoadedUnit {
	/// Returns the unit's name within its group.
	pub fn name(&self) -> &str {
		&self.core.name
	}

	/// Returns the group this unit was loaded into.
	pub fn group(&self) -> LoadGroup {
		LoadGroup::from_core(self.core.group.clone())
	}

	/// Returns true if both handles refer to the same loaded unit.
	pub fn ptr_eq(&self, other: &LoadedUnit) -> bool {
		Arc::ptr_eq(&self.core, &other.core)
	}

	/// Returns a stable identity address, valid while the unit is live.
	///
	/// Suitable as a key in identity-keyed containers; any such container
	/// must pair it with a [`WeakUnit`] to guard against address reuse after
	/// the unit dies.
	pub fn addr(&self) -> usize {
		Arc::as_ptr(&self.core) as usize
	}

	/// Downgrades to a non-owning handle.
	pub fn downgrade(&self) -> WeakUnit {
		WeakUnit {
			core: Arc::downgrade(&self.core),
		}
	}
}

impl core::fmt::Debug for LoadedUnit {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("LoadedUnit")
			.field("group", &self.core.group.name)
			.field("name", &self.core.name)
			.finish()
	}
}

/// Non-owning handle to a [`LoadedUnit`].
#[derive(Clone)]
pub struct WeakUnit {
	core: Weak<UnitCore>,
}

impl WeakUnit {
	/// Attempts to recover the owning handle.
	pub fn upgrade(&self) -> Option<LoadedUnit> {
		self.core.upgrade().map(|core| LoadedUnit { core })
	}

	/// Returns true if the unit's memory is still reachable.
	pub fn is_alive(&self) -> bool {
		self.core.strong_count() > 0
	}
}

impl core::fmt::Debug for WeakUnit {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_tuple("WeakUnit").field(&self.is_alive()).finish()
	}
}
