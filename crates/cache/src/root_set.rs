use std::any::Any;
use std::sync::Arc;

use holdfast_runtime::{CompanionTemplate, InstallError, LoadedUnit};
use parking_lot::Mutex;

/// Reserved companion name for the per-group root set.
///
/// The runtime keeps companions in their own namespace, so this can never
/// collide with or shadow a user-visible unit.
pub(crate) const ROOT_SET_NAME: &str = "holdfast.cache.root-set";

static ROOT_SET_TEMPLATE: CompanionTemplate = CompanionTemplate::new(ROOT_SET_NAME, new_root_set);

fn new_root_set() -> Box<dyn Any + Send + Sync> {
	Box::new(RootSet::default())
}

/// Group-rooted collection of strong value references.
///
/// One root set exists per group, installed lazily on first use and shared
/// by every cache that pins values into that group; each registration takes
/// one slot. The group owns the root set's state, so everything registered
/// here lives exactly as long as the group stays loaded and drops with it at
/// teardown.
#[derive(Default)]
pub(crate) struct RootSet {
	values: Mutex<Vec<Box<dyn Any + Send + Sync>>>,
}

impl RootSet {
	fn register(&self, value: Box<dyn Any + Send + Sync>) {
		self.values.lock().push(value);
	}

	fn len(&self) -> usize {
		self.values.lock().len()
	}
}

/// How a freshly produced value ended up rooted.
pub(crate) enum Pinned {
	/// Registered in the group's root set; lives as long as the group.
	Rooted,
	/// The group was already unloaded, so there is nowhere to root the
	/// value. Not an error: the unit is on its way out with its group, and
	/// the value simply lives as long as the caller keeps it.
	Ephemeral,
}

/// Roots `value` in the load group owning `unit`.
///
/// Finds or installs the group's root set companion and appends the value.
/// Fails only when the group refuses installation outright; an unload racing
/// ahead of us yields [`Pinned::Ephemeral`] instead.
pub(crate) fn pin_in_group<V>(unit: &LoadedUnit, value: &Arc<V>) -> Result<Pinned, String>
where
	V: Send + Sync + 'static,
{
	let group = unit.group();
	let companion = match group.install_companion(&ROOT_SET_TEMPLATE) {
		Ok(companion) => companion,
		Err(InstallError::Unloaded { .. }) => return Ok(Pinned::Ephemeral),
		Err(err @ InstallError::Sealed { .. }) => return Err(err.to_string()),
	};
	let Some(roots) = companion.state().downcast_ref::<RootSet>() else {
		// The reserved name is occupied by foreign state; refuse to clobber.
		return Err(format!(
			"reserved companion `{ROOT_SET_NAME}` holds foreign state"
		));
	};
	roots.register(Box::new(Arc::clone(value)));
	tracing::trace!(
		group = %group.name(),
		unit = %unit.name(),
		rooted = roots.len(),
		"pinned value into group root set"
	);
	Ok(Pinned::Rooted)
}

#[cfg(test)]
mod tests {
	use holdfast_runtime::LoadGroup;

	use super::*;

	#[test]
	fn pinning_outlives_the_callers_reference() {
		let group = LoadGroup::new("g");
		let unit = group.load_unit("A").unwrap();

		let value = Arc::new(String::from("artifact"));
		let weak = Arc::downgrade(&value);
		assert!(matches!(pin_in_group(&unit, &value), Ok(Pinned::Rooted)));

		drop(value);
		// The group's root set still holds it.
		assert!(weak.upgrade().is_some());

		group.unload();
		assert!(weak.upgrade().is_none());
	}

	#[test]
	fn one_root_set_per_group_accumulates() {
		let group = LoadGroup::new("g");
		let a = group.load_unit("A").unwrap();
		let b = group.load_unit("B").unwrap();

		pin_in_group(&a, &Arc::new(1u32)).unwrap();
		pin_in_group(&b, &Arc::new(2u32)).unwrap();

		assert_eq!(group.companion_count(), 1);
		let roots = group
			.companion(ROOT_SET_NAME)
			.expect("root set installed");
		assert_eq!(roots.state().downcast_ref::<RootSet>().unwrap().len(), 2);
	}

	#[test]
	fn sealed_group_denies_pinning() {
		let group = LoadGroup::sealed("g");
		let unit = group.load_unit("A").unwrap();
		let value = Arc::new(1u32);
		assert!(pin_in_group(&unit, &value).is_err());
		assert_eq!(group.companion_count(), 0);
	}

	#[test]
	fn unloaded_group_yields_an_ephemeral_value() {
		let group = LoadGroup::new("g");
		let unit = group.load_unit("A").unwrap();
		group.unload();

		let value = Arc::new(1u32);
		assert!(matches!(
			pin_in_group(&unit, &value),
			Ok(Pinned::Ephemeral)
		));
		let weak = Arc::downgrade(&value);
		drop(value);
		assert!(weak.upgrade().is_none());
	}
}
