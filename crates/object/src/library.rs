//! §4.7: the compile-time library bridging a textual `(category, name)`
//! pair — as stored in project XML — to concrete object construction.
//!
//! `Library<T>` is generic over the object trait it constructs (`dyn
//! HardwareAdapter`, `dyn Instrument`, `dyn Module`, each defined in their
//! own crate) so hardware/runnable/manager crates each get a
//! `Library<dyn TheirTrait>` without this crate needing to know about them.

use std::sync::Arc;

use labcore_error::Result;
use snafu::IntoError;

use crate::{configurator::Configurator, item_id::ItemId, params::Params};

/// One entry: `(object factory, configurator, name)`. `category` lives on
/// the `Library` itself since every entry in one `Library<T>` shares it.
pub struct LibraryEntry<T: ?Sized> {
    pub name: String,
    pub configurator: Arc<dyn Configurator>,
    pub factory: Arc<dyn Fn(ItemId, Params) -> Arc<T> + Send + Sync>,
}

impl<T: ?Sized> Clone for LibraryEntry<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            configurator: Arc::clone(&self.configurator),
            factory: Arc::clone(&self.factory),
        }
    }
}

/// A sorted-by-name compile-time list of entries for one object category.
pub struct Library<T: ?Sized> {
    entries: Vec<LibraryEntry<T>>,
}

impl<T: ?Sized> Default for Library<T> {
    /// An empty library, resolving no names. The natural starting point for
    /// an embedding program that registers its own concrete hardware
    /// adapters/instruments/modules before opening a project (§4.7).
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T: ?Sized> Library<T> {
    #[must_use]
    pub fn new(mut entries: Vec<LibraryEntry<T>>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[LibraryEntry<T>] {
        &self.entries
    }

    /// `FindInLibraryVector`: raises [`labcore_error::Error::NotFound`] on miss.
    pub fn find(&self, name: &str) -> Result<&LibraryEntry<T>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| {
                labcore_error::NotFoundSnafu {
                    message: format!("no library entry named '{name}'"),
                }
                .into_error(snafu::NoneError)
            })
    }

    /// Construct a new instance of `name` at `id`, with `params` already
    /// populated (by a configuration dialog or `ConfigFromXML`).
    pub fn instantiate(&self, name: &str, id: ItemId, params: Params) -> Result<Arc<T>> {
        let entry = self.find(name)?;
        Ok((entry.factory)(id, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;

    struct FakeConfigurator {
        name: &'static str,
    }

    impl Configurator for FakeConfigurator {
        fn category(&self) -> Category {
            Category::Instrument
        }

        fn name(&self) -> &str {
            self.name
        }

        fn make_params(&self) -> Params {
            Params::new(vec![])
        }
    }

    #[test]
    fn find_is_case_sensitive_and_reports_not_found() {
        let library: Library<()> = Library::new(vec![LibraryEntry {
            name: "Widget".to_string(),
            configurator: Arc::new(FakeConfigurator { name: "Widget" }),
            factory: Arc::new(|_id, _params| Arc::new(())),
        }]);
        assert!(library.find("Widget").is_ok());
        assert!(library.find("widget").is_err());
    }

    #[test]
    fn entries_are_sorted_by_name() {
        let library: Library<()> = Library::new(vec![
            LibraryEntry {
                name: "Zeta".to_string(),
                configurator: Arc::new(FakeConfigurator { name: "Zeta" }),
                factory: Arc::new(|_id, _params| Arc::new(())),
            },
            LibraryEntry {
                name: "Alpha".to_string(),
                configurator: Arc::new(FakeConfigurator { name: "Alpha" }),
                factory: Arc::new(|_id, _params| Arc::new(())),
            },
        ]);
        let names: Vec<_> = library.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }
}
