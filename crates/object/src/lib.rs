//! Object model: `Object`, `Params`, `Configurator`, `ItemId`-addressing and
//! `ObjectLink`/`LinkedObjectWrapper` (§3/§4.2).
//!
//! This is layer 2 of the core (~20% of it): everything a hardware adapter,
//! instrument, or module is made of *before* it gets a worker thread or a
//! task/event queue (that's `labcore-runnable`'s job) and before it is owned
//! by a manager (`labcore-manager`'s job).

mod category;
mod configurator;
mod item_id;
mod library;
mod object;
mod params;
mod use_count;

pub use category::{Category, ObjectState};
pub use configurator::Configurator;
pub use item_id::{IdAllocator, ItemId};
pub use library::{Library, LibraryEntry};
pub use object::{LinkedObjectWrapper, Object, ObjectBase};
pub use params::{Bounds, FieldSpec, FieldValue, ObjectLinkValue, Params};
