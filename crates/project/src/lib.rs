//! Project file persistence (§6): round-tripping the three resource
//! managers (hardware adapters, instruments, modules) to and from one XML
//! document.
//!
//! This crate is generic over the object trait each category's
//! [`labcore_manager::ResourceManager`]/[`labcore_object::Library`] pair is
//! built on, so it depends only on `labcore-object`/`labcore-manager` —
//! never on `labcore-hardware`/`labcore-runnable` — and can serialize any
//! of the three categories without knowing their concrete traits.

mod document;
mod xml;

pub use document::{
    ProjectLibraries, ProjectManagers, load_project_from_file, load_project_from_str,
    save_project_to_file, save_project_to_string,
};
