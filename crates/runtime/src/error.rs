use thiserror::Error;

/// Errors raised by group-level unit operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
	/// The group was already torn down.
	#[error("load group `{group}` is unloaded")]
	Unloaded {
		/// Name of the group.
		group: String,
	},
}

/// Errors raised by companion installation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
	/// The group's policy forbids installing new companions.
	#[error("load group `{group}` is sealed against companion installation")]
	Sealed {
		/// Name of the group.
		group: String,
	},
	/// The group was torn down before the installation could happen.
	///
	/// Callers racing against an unload should treat this as benign: the
	/// group-rooted state they wanted to create has nowhere to live, and
	/// everything keyed to the group is already on its way out.
	#[error("load group `{group}` was unloaded before installation")]
	Unloaded {
		/// Name of the group.
		group: String,
	},
}
