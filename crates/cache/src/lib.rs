//! Identity cache for loaded units.
//!
//! [`UnitCache`] memoizes one lazily computed value per
//! [`LoadedUnit`](holdfast_runtime::LoadedUnit) identity, without ever
//! distorting the unit's lifetime: the cache itself holds only weak handles,
//! while each value is rooted *inside the unit's own load group* through a
//! companion root set. The value therefore lives exactly as long as its
//! group does: it cannot be dropped early while the group is loaded, and it
//! cannot keep the group alive once the group is gone.
//!
//! Values commonly hold their own unit handle (and through it the group);
//! that is expected and safe. The cache contributes no strong references of
//! its own, so unloading a group and dropping the external handles reclaims
//! the group, its units, its companions, and every value pinned for it as a
//! single step.

mod cache;
mod error;
mod root_set;
mod weak_map;

pub use cache::UnitCache;
pub use error::CacheError;
