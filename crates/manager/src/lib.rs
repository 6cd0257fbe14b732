//! Per-category resource managers (§4.6): the generic
//! [`ResourceManager<T>`] every hardware adapter, instrument and module
//! lives in, plus the category-specific [`HardwareManager`],
//! [`InstrumentManager`] and [`ModuleManager`] built on top of it.
//!
//! This is layer 4 of the core (~15% of it): the thing that owns every
//! live object and resolves `ObjectLink` fields against them, sitting
//! between the per-object runtime (`labcore-runnable`) and project
//! persistence (`labcore-project`).

mod hardware_manager;
mod instrument_manager;
mod module_manager;
mod resource_manager;

pub use hardware_manager::HardwareManager;
pub use instrument_manager::InstrumentManager;
pub use module_manager::ModuleManager;
pub use resource_manager::{ResourceAny, ResourceEntry, ResourceManager};
