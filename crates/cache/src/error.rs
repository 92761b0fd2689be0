use thiserror::Error;

/// Errors surfaced by [`UnitCache::get_or_create`](crate::UnitCache::get_or_create).
///
/// Neither variant is memoized: a later call for the same unit starts over
/// and may succeed.
#[derive(Error, Debug)]
pub enum CacheError {
	/// The caller-supplied factory returned an error.
	#[error("value factory failed for unit `{unit}`")]
	FactoryFailed {
		/// Name of the unit the value was being computed for.
		unit: String,
		/// The factory's error.
		#[source]
		source: anyhow::Error,
	},
	/// The unit's group refused to host the value's group-rooted reference.
	#[error("group `{group}` denied pinning for unit `{unit}`: {reason}")]
	PinningDenied {
		/// Name of the unit the value was computed for.
		unit: String,
		/// Name of the refusing group.
		group: String,
		/// Why the group refused.
		reason: String,
	},
}
