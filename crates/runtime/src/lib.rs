//! Load group runtime.
//!
//! A [`LoadGroup`] is an isolated, independently unloadable container of
//! dynamically loaded code units. Each [`LoadedUnit`] belongs to exactly one
//! group, is compared by identity, and pins its group for as long as the
//! handle is held. Groups also accept *companions*: synthesized units
//! installed into a reserved namespace that the normal resolution path never
//! observes, used by infrastructure that needs group-rooted state.
//!
//! Reclamation is unload-driven: [`LoadGroup::unload`] tears the group down
//! as a single unit (units, companions, and all state rooted through them),
//! after which memory unwinds deterministically once the last external
//! handle drops. Liveness is observable through [`WeakGroup`] and
//! [`WeakUnit`].

mod companion;
mod error;
mod group;
mod unit;

pub use companion::{Companion, CompanionTemplate};
pub use error::{GroupError, InstallError};
pub use group::{LoadGroup, WeakGroup};
pub use unit::{LoadedUnit, WeakUnit};
