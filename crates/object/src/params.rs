//! Persistable, introspectable object configuration (§3/§4.2).
//!
//! `Params` is an ordered collection of typed [`Field`]s, each keyed by a
//! stable string for persistence. A special field kind, [`FieldValue::ObjectLink`],
//! stores target [`ItemId`]s plus a [`Category`] tag identifying which
//! manager resolves them. Params are lockable: every accessor takes the
//! internal reentrant lock, so a configuration dialog and a background
//! resolver never observe a torn read.

use std::cell::RefCell;
use std::time::Duration;

use labcore_error::{Error, Result};
use parking_lot::ReentrantMutex;
use snafu::IntoError;

use crate::{category::Category, item_id::ItemId};

/// One field's value. `Enum` stores the selected string among the owning
/// [`FieldSpec::allowed_values`]; `ObjectLink` stores raw target IDs — link
/// *resolution* against a live manager happens outside this crate.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum(String),
    ObjectLink(ObjectLinkValue),
}

/// An `ObjectLink<T>` field's persisted content: the linked object's
/// `ItemId`s (empty if unset) and the `Category` of manager that owns them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectLinkValue {
    pub target_ids: Vec<ItemId>,
    pub capability: Option<Category>,
}

impl ObjectLinkValue {
    #[must_use]
    pub fn single(id: ItemId, capability: Category) -> Self {
        Self {
            target_ids: vec![id],
            capability: Some(capability),
        }
    }
}

/// Bounds for a numeric field (`Int`/`Float`), enforced on `set`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

/// Static metadata for one field: persistence key, UI label/description,
/// default, optional numeric bounds, and optional enum allow-list.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
    pub description: String,
    pub default: FieldValue,
    pub bounds: Option<Bounds>,
    pub allowed_values: Option<Vec<String>>,
}

impl FieldSpec {
    #[must_use]
    pub fn new(key: impl Into<String>, label: impl Into<String>, default: FieldValue) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            description: String::new(),
            default,
            bounds: None,
            allowed_values: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = Some(Bounds { min, max });
        self
    }

    #[must_use]
    pub fn with_allowed_values(mut self, values: Vec<String>) -> Self {
        self.allowed_values = Some(values);
        self
    }
}

#[derive(Clone, Debug)]
struct Field {
    spec: FieldSpec,
    value: FieldValue,
}

/// Ordered, lockable collection of typed fields. Constructed by a
/// [`crate::Configurator`] with each field's default value, then populated
/// either from a configuration dialog or deserialized XML.
pub struct Params {
    // Reentrant so a composite accessor (e.g. `set_enum` validating against
    // `allowed_values` read via `get`) doesn't self-deadlock (§4.2 lock
    // ordering rule 1: "Params of object X before its Data of object X").
    fields: ReentrantMutex<RefCell<Vec<Field>>>,
}

const FIELD_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

impl Params {
    #[must_use]
    pub fn new(specs: Vec<FieldSpec>) -> Self {
        let fields = specs
            .into_iter()
            .map(|spec| Field {
                value: spec.default.clone(),
                spec,
            })
            .collect();
        Self {
            fields: ReentrantMutex::new(RefCell::new(fields)),
        }
    }

    fn lock(&self) -> Result<parking_lot::ReentrantMutexGuard<'_, RefCell<Vec<Field>>>> {
        self.fields.try_lock_for(FIELD_LOCK_TIMEOUT).ok_or_else(|| {
            labcore_error::TimeoutSnafu {
                message: "failed to acquire params lock".to_string(),
                duration_ms: u64::try_from(FIELD_LOCK_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
            }
            .into_error(snafu::NoneError)
        })
    }

    /// Keys in declaration order.
    pub fn keys(&self) -> Result<Vec<String>> {
        let guard = self.lock()?;
        Ok(guard.borrow().iter().map(|f| f.spec.key.clone()).collect())
    }

    pub fn get(&self, key: &str) -> Result<FieldValue> {
        let guard = self.lock()?;
        guard
            .borrow()
            .iter()
            .find(|f| f.spec.key == key)
            .map(|f| f.value.clone())
            .ok_or_else(|| not_found(key))
    }

    pub fn spec(&self, key: &str) -> Result<FieldSpec> {
        let guard = self.lock()?;
        guard
            .borrow()
            .iter()
            .find(|f| f.spec.key == key)
            .map(|f| f.spec.clone())
            .ok_or_else(|| not_found(key))
    }

    /// Set `key`'s value, enforcing numeric bounds and enum allow-lists.
    /// Raises [`Error::TypeError`] if `value`'s variant doesn't match the
    /// field's default variant, [`Error::OutOfRange`] if numeric bounds are
    /// violated, and [`Error::InvalidData`] if an `Enum` value isn't among
    /// `allowed_values`.
    pub fn set(&self, key: &str, value: FieldValue) -> Result<()> {
        let guard = self.lock()?;
        let mut fields = guard.borrow_mut();
        let field = fields
            .iter_mut()
            .find(|f| f.spec.key == key)
            .ok_or_else(|| not_found(key))?;

        if std::mem::discriminant(&field.spec.default) != std::mem::discriminant(&value) {
            return Err(labcore_error::TypeErrorSnafu {
                message: format!("field '{key}' expects a different value kind"),
            }
            .into_error(snafu::NoneError));
        }

        if let (Some(bounds), FieldValue::Float(v)) = (field.spec.bounds, &value) {
            if *v < bounds.min || *v > bounds.max {
                return Err(labcore_error::OutOfRangeSnafu {
                    message: format!("field '{key}' value {v} outside [{}, {}]", bounds.min, bounds.max),
                }
                .into_error(snafu::NoneError));
            }
        }
        if let (Some(bounds), FieldValue::Int(v)) = (field.spec.bounds, &value) {
            let v = *v as f64;
            if v < bounds.min || v > bounds.max {
                return Err(labcore_error::OutOfRangeSnafu {
                    message: format!("field '{key}' value {v} outside bounds"),
                }
                .into_error(snafu::NoneError));
            }
        }
        if let (Some(allowed), FieldValue::Enum(v)) = (&field.spec.allowed_values, &value) {
            if !allowed.contains(v) {
                return Err(labcore_error::InvalidDataSnafu {
                    message: format!("'{v}' is not an allowed value for field '{key}'"),
                }
                .into_error(snafu::NoneError));
            }
        }

        field.value = value;
        Ok(())
    }
}

/// Deep-copies the current field values under the lock. Used when a
/// project needs to both feed a `Params` to a factory (which consumes it)
/// and retain one for later re-serialization (§6).
impl Clone for Params {
    fn clone(&self) -> Self {
        let guard = self.fields.lock();
        let fields = guard.borrow().clone();
        Self {
            fields: ReentrantMutex::new(RefCell::new(fields)),
        }
    }
}

fn not_found(key: &str) -> Error {
    labcore_error::NotFoundSnafu {
        message: format!("no such params field: {key}"),
    }
    .into_error(snafu::NoneError)
}

// SAFETY note: `ReentrantMutex<RefCell<_>>` is `Sync` as long as the
// contained `RefCell<Vec<Field>>` is `Send`, which it is (no non-Send
// field types). No `unsafe` needed.

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Params {
        Params::new(vec![
            FieldSpec::new("line_ending", "Line ending", FieldValue::Enum("LF".into()))
                .with_allowed_values(vec!["None".into(), "NUL".into(), "LF".into(), "CRLF".into(), "CR".into()]),
            FieldSpec::new("update_interval_ms", "Update interval", FieldValue::Int(100))
                .with_bounds(0.0, 60_000.0),
        ])
    }

    #[test]
    fn get_returns_default_until_set() {
        let params = sample();
        assert_eq!(params.get("line_ending").unwrap(), FieldValue::Enum("LF".into()));
    }

    #[test]
    fn set_enforces_enum_allow_list() {
        let params = sample();
        assert!(params.set("line_ending", FieldValue::Enum("CRLF".into())).is_ok());
        assert_eq!(params.get("line_ending").unwrap(), FieldValue::Enum("CRLF".into()));
        let err = params.set("line_ending", FieldValue::Enum("Bogus".into())).unwrap_err();
        assert!(matches!(err, Error::InvalidData { .. }));
    }

    #[test]
    fn set_enforces_numeric_bounds() {
        let params = sample();
        let err = params.set("update_interval_ms", FieldValue::Int(100_000)).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));
    }

    #[test]
    fn set_rejects_wrong_value_kind() {
        let params = sample();
        let err = params.set("update_interval_ms", FieldValue::Bool(true)).unwrap_err();
        assert!(matches!(err, Error::TypeError { .. }));
    }

    #[test]
    fn unknown_key_is_not_found() {
        let params = sample();
        assert!(matches!(params.get("nope").unwrap_err(), Error::NotFound { .. }));
    }
}
