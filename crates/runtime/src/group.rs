use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::companion::{Companion, CompanionCore, CompanionTemplate};
use crate::error::{GroupError, InstallError};
use crate::unit::{LoadedUnit, UnitCore};

/// Backing state for one load group.
///
/// The unit table and the companion table both hold strong references, so
/// everything rooted in the group lives exactly as long as the group is
/// loaded. Units point back at the group strongly; the resulting cycle is
/// confined to the group and broken by [`LoadGroup::unload`].
pub(crate) struct GroupCore {
	pub(crate) name: String,
	sealed: bool,
	torn_down: AtomicBool,
	units: Mutex<FxHashMap<String, Arc<UnitCore>>>,
	companions: Mutex<FxHashMap<&'static str, Arc<CompanionCore>>>,
}

/// Handle to an isolated container of dynamically loaded units.
///
/// Cheap to clone. A group stays loaded until [`LoadGroup::unload`] is
/// called; its memory stays reachable until the last handle to the group or
/// to any of its units drops.
#[derive(Clone)]
pub struct LoadGroup {
	core: Arc<GroupCore>,
}

impl LoadGroup {
	/// Creates a fresh, empty group.
	pub fn new(name: impl Into<String>) -> Self {
		Self::with_policy(name.into(), false)
	}

	/// Creates a group that refuses companion installation.
	pub fn sealed(name: impl Into<String>) -> Self {
		Self::with_policy(name.into(), true)
	}

	fn with_policy(name: String, sealed: bool) -> Self {
		tracing::trace!(group = %name, sealed, "created load group");
		Self {
			core: Arc::new(GroupCore {
				name,
				sealed,
				torn_down: AtomicBool::new(false),
				units: Mutex::new(FxHashMap::default()),
				companions: Mutex::new(FxHashMap::default()),
			}),
		}
	}

	pub(crate) fn from_core(core: Arc<GroupCore>) -> Self {
		Self { core }
	}

	/// Returns the group's name.
	pub fn name(&self) -> &str {
		&self.core.name
	}

	/// Defines a unit in this group, or returns the existing unit when the
	/// name is already defined.
	///
	/// Loading is idempotent by name within one group; the same name in
	/// another group is a distinct unit.
	pub fn load_unit(&self, name: &str) -> Result<LoadedUnit, GroupError> {
		let mut units = self.core.units.lock();
		if self.core.torn_down.load(Ordering::Acquire) {
			return Err(GroupError::Unloaded {
				group: self.core.name.clone(),
			});
		}
		if let Some(core) = units.get(name) {
			return Ok(LoadedUnit { core: core.clone() });
		}
		let core = Arc::new(UnitCore {
			name: name.to_string(),
			group: self.core.clone(),
		});
		units.insert(name.to_string(), core.clone());
		tracing::trace!(group = %self.core.name, unit = %name, "defined unit");
		Ok(LoadedUnit { core })
	}

	/// Looks up an already-defined unit by name.
	///
	/// This is the group's normal resolution path; it never observes
	/// companions.
	pub fn resolve(&self, name: &str) -> Option<LoadedUnit> {
		let units = self.core.units.lock();
		units.get(name).map(|core| LoadedUnit { core: core.clone() })
	}

	/// Looks up an installed companion by its reserved name.
	pub fn companion(&self, name: &str) -> Option<Companion> {
		let companions = self.core.companions.lock();
		companions.get(name).map(|core| Companion { core: core.clone() })
	}

	/// Finds or installs the companion described by `template`.
	///
	/// Lookup always precedes synthesis, and the whole operation holds the
	/// group's companion lock, so racing installers for one group converge
	/// on a single companion. Installation into distinct groups is
	/// independent.
	pub fn install_companion(&self, template: &CompanionTemplate) -> Result<Companion, InstallError> {
		let mut companions = self.core.companions.lock();
		if self.core.torn_down.load(Ordering::Acquire) {
			return Err(InstallError::Unloaded {
				group: self.core.name.clone(),
			});
		}
		if let Some(core) = companions.get(template.name()) {
			return Ok(Companion { core: core.clone() });
		}
		if self.core.sealed {
			return Err(InstallError::Sealed {
				group: self.core.name.clone(),
			});
		}
		let core = Arc::new(template.synthesize());
		companions.insert(core.name, core.clone());
		tracing::debug!(group = %self.core.name, companion = %core.name, "installed companion");
		Ok(Companion { core })
	}

	/// Tears the group down as a single unit.
	///
	/// Clears the unit table and the companion table in one critical
	/// section, dropping every companion's state and with it everything
	/// rooted in the group. Idempotent. Handles that outlive the unload keep
	/// their individual allocations reachable but the group itself is gone:
	/// further loads and installations fail.
	pub fn unload(&self) {
		let (units, companions) = {
			let mut units = self.core.units.lock();
			let mut companions = self.core.companions.lock();
			if self.core.torn_down.swap(true, Ordering::AcqRel) {
				return;
			}
			(
				std::mem::take(&mut *units),
				std::mem::take(&mut *companions),
			)
		};
		tracing::debug!(
			group = %self.core.name,
			units = units.len(),
			companions = companions.len(),
			"unloaded group"
		);
		// Contents drop here, outside the table locks.
		drop(units);
		drop(companions);
	}

	/// Returns true once [`LoadGroup::unload`] has run.
	pub fn is_unloaded(&self) -> bool {
		self.core.torn_down.load(Ordering::Acquire)
	}

	/// Returns the number of defined units.
	pub fn unit_count(&self) -> usize {
		self.core.units.lock().len()
	}

	/// Returns the number of installed companions.
	pub fn companion_count(&self) -> usize {
		self.core.companions.lock().len()
	}

	/// Returns true if both handles refer to the same group.
	pub fn ptr_eq(&self, other: &LoadGroup) -> bool {
		Arc::ptr_eq(&self.core, &other.core)
	}

	/// Downgrades to a non-owning handle.
	pub fn downgrade(&self) -> WeakGroup {
		WeakGroup {
			core: Arc::downgrade(&self.core),
		}
	}
}

impl core::fmt::Debug for LoadGroup {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("LoadGroup")
			.field("name", &self.core.name)
			.field("unloaded", &self.is_unloaded())
			.finish()
	}
}

/// Non-owning handle to a [`LoadGroup`].
#[derive(Clone)]
pub struct WeakGroup {
	core: Weak<GroupCore>,
}

impl WeakGroup {
	/// Attempts to recover the owning handle.
	pub fn upgrade(&self) -> Option<LoadGroup> {
		self.core.upgrade().map(|core| LoadGroup { core })
	}

	/// Returns true if the group's memory is still reachable.
	///
	/// Note this tracks memory, not loadedness: an unloaded group stays
	/// alive while handles to it or to its units remain.
	pub fn is_alive(&self) -> bool {
		self.core.strong_count() > 0
	}
}

impl core::fmt::Debug for WeakGroup {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_tuple("WeakGroup").field(&self.is_alive()).finish()
	}
}

#[cfg(test)]
mod tests {
	use std::any::Any;

	use super::*;

	fn counter_state() -> Box<dyn Any + Send + Sync> {
		Box::new(0u32)
	}

	static TEMPLATE: CompanionTemplate = CompanionTemplate::new("test.companion", counter_state);

	#[test]
	fn loading_is_idempotent_by_name() {
		let group = LoadGroup::new("g");
		let a = group.load_unit("A").unwrap();
		let a2 = group.load_unit("A").unwrap();
		assert!(a.ptr_eq(&a2));
		assert_eq!(group.unit_count(), 1);
	}

	#[test]
	fn same_name_in_different_groups_is_a_different_unit() {
		let g1 = LoadGroup::new("g1");
		let g2 = LoadGroup::new("g2");
		let a1 = g1.load_unit("A").unwrap();
		let a2 = g2.load_unit("A").unwrap();
		assert!(!a1.ptr_eq(&a2));
		assert_ne!(a1.addr(), a2.addr());
	}

	#[test]
	fn resolve_finds_loaded_units_only() {
		let group = LoadGroup::new("g");
		group.load_unit("A").unwrap();
		assert!(group.resolve("A").is_some());
		assert!(group.resolve("B").is_none());
	}

	#[test]
	fn companions_are_invisible_to_resolution() {
		let group = LoadGroup::new("g");
		group.install_companion(&TEMPLATE).unwrap();
		assert!(group.resolve("test.companion").is_none());
		assert!(group.companion("test.companion").is_some());
		// And the reserved namespace does not shadow units either.
		let unit = group.load_unit("test.companion").unwrap();
		assert_eq!(unit.name(), "test.companion");
		assert_eq!(group.companion_count(), 1);
		assert_eq!(group.unit_count(), 1);
	}

	#[test]
	fn installation_is_idempotent_per_group() {
		let group = LoadGroup::new("g");
		let first = group.install_companion(&TEMPLATE).unwrap();
		let second = group.install_companion(&TEMPLATE).unwrap();
		assert!(first.ptr_eq(&second));
		assert_eq!(group.companion_count(), 1);
	}

	#[test]
	fn sealed_group_refuses_installation_but_still_loads_units() {
		let group = LoadGroup::sealed("g");
		assert!(group.load_unit("A").is_ok());
		match group.install_companion(&TEMPLATE) {
			Err(InstallError::Sealed { group }) => assert_eq!(group, "g"),
			other => panic!("expected Sealed, got {other:?}"),
		}
	}

	#[test]
	fn unit_handle_pins_group_memory() {
		let group = LoadGroup::new("g");
		let unit = group.load_unit("A").unwrap();
		let weak = group.downgrade();
		drop(group);
		// The group handle is gone; the unit keeps the group reachable.
		assert!(weak.is_alive());
		let group = unit.group();
		assert_eq!(group.name(), "g");
		group.unload();
		drop(group);
		drop(unit);
		assert!(!weak.is_alive());
	}

	#[test]
	fn unload_tears_down_units_and_companions_together() {
		let group = LoadGroup::new("g");
		let unit = group.load_unit("A").unwrap();
		group.install_companion(&TEMPLATE).unwrap();
		let weak_unit = unit.downgrade();
		let weak_group = group.downgrade();

		group.unload();
		assert!(group.is_unloaded());
		assert_eq!(group.unit_count(), 0);
		assert_eq!(group.companion_count(), 0);
		assert!(group.companion("test.companion").is_none());

		match group.load_unit("B") {
			Err(GroupError::Unloaded { group }) => assert_eq!(group, "g"),
			other => panic!("expected Unloaded, got {other:?}"),
		}
		match group.install_companion(&TEMPLATE) {
			Err(InstallError::Unloaded { .. }) => {}
			other => panic!("expected Unloaded, got {other:?}"),
		}

		// Outstanding handles still pin the memory.
		assert!(weak_unit.is_alive());
		drop(unit);
		assert!(!weak_unit.is_alive());
		drop(group);
		assert!(!weak_group.is_alive());
	}

	#[test]
	fn unload_is_idempotent() {
		let group = LoadGroup::new("g");
		group.load_unit("A").unwrap();
		group.unload();
		group.unload();
		assert!(group.is_unloaded());
	}
}
