//! Field-level XML encoding (§6): one `Params` field maps to one `<Field>`
//! element carrying `key`/`kind` attributes (plus `capability` for
//! `ObjectLink`) and its value as text content.
//!
//! This module only knows how to turn a single [`FieldValue`] into XML and
//! back; [`crate::document`] drives it once per field while walking an
//! `Item`'s `<Params>` children.

use std::io::Cursor;
use std::str::FromStr;

use labcore_error::{Error, Result};
use labcore_object::{Category, FieldValue, ItemId, ObjectLinkValue};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use snafu::IntoError;

pub(crate) fn invalid_data(message: impl Into<String>) -> Error {
    labcore_error::InvalidDataSnafu {
        message: message.into(),
    }
    .into_error(snafu::NoneError)
}

fn field_kind(value: &FieldValue) -> &'static str {
    match value {
        FieldValue::Bool(_) => "Bool",
        FieldValue::Int(_) => "Int",
        FieldValue::Float(_) => "Float",
        FieldValue::String(_) => "String",
        FieldValue::Enum(_) => "Enum",
        FieldValue::ObjectLink(_) => "ObjectLink",
    }
}

fn field_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Bool(v) => v.to_string(),
        FieldValue::Int(v) => v.to_string(),
        FieldValue::Float(v) => v.to_string(),
        FieldValue::String(v) | FieldValue::Enum(v) => v.clone(),
        FieldValue::ObjectLink(link) => link
            .target_ids
            .iter()
            .map(|id| id.get().to_string())
            .collect::<Vec<_>>()
            .join(","),
    }
}

/// Write `<Field key="..." kind="...">text</Field>` (plus `capability` for
/// `ObjectLink`) for one `(key, value)` pair.
pub(crate) fn write_field(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    key: &str,
    value: &FieldValue,
) -> Result<()> {
    let mut start = BytesStart::new("Field");
    start.push_attribute(("key", key));
    start.push_attribute(("kind", field_kind(value)));
    if let FieldValue::ObjectLink(ObjectLinkValue {
        capability: Some(capability),
        ..
    }) = value
    {
        start.push_attribute(("capability", capability.to_string().as_str()));
    }
    writer
        .write_event(Event::Start(start))
        .map_err(|e| invalid_data(format!("writing Field '{key}': {e}")))?;
    let text = field_text(value);
    if !text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&text)))
            .map_err(|e| invalid_data(format!("writing Field '{key}' text: {e}")))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("Field")))
        .map_err(|e| invalid_data(format!("closing Field '{key}': {e}")))?;
    Ok(())
}

/// The raw `(key, kind, capability, text)` tuple collected while scanning a
/// `<Field>` element, before it's checked against the target `Params`'s
/// declared field kinds.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawField {
    pub key: String,
    pub kind: String,
    pub capability: Option<String>,
    pub text: String,
}

impl RawField {
    /// Parse this field's text content into a [`FieldValue`] of its
    /// declared `kind`. §4.2: "reject unknown-type contents (raises
    /// `InvalidDataException`)".
    pub(crate) fn into_value(self) -> Result<FieldValue> {
        let text = self.text.trim();
        match self.kind.as_str() {
            "Bool" => text
                .parse::<bool>()
                .map(FieldValue::Bool)
                .map_err(|_| invalid_data(format!("field '{}': '{text}' is not a bool", self.key))),
            "Int" => text
                .parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|_| invalid_data(format!("field '{}': '{text}' is not an int", self.key))),
            "Float" => text
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| invalid_data(format!("field '{}': '{text}' is not a float", self.key))),
            "String" => Ok(FieldValue::String(text.to_string())),
            "Enum" => Ok(FieldValue::Enum(text.to_string())),
            "ObjectLink" => {
                let target_ids = text
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<u64>()
                            .map(ItemId::new)
                            .map_err(|_| invalid_data(format!("field '{}': '{s}' is not an ItemId", self.key)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let capability = self
                    .capability
                    .map(|c| {
                        Category::from_str(&c)
                            .map_err(|_| invalid_data(format!("field '{}': unknown capability '{c}'", self.key)))
                    })
                    .transpose()?;
                Ok(FieldValue::ObjectLink(ObjectLinkValue {
                    target_ids,
                    capability,
                }))
            }
            other => Err(invalid_data(format!(
                "field '{}': unknown field kind '{other}'",
                self.key
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_object_link_with_capability() {
        let value = FieldValue::ObjectLink(ObjectLinkValue {
            target_ids: vec![ItemId::new(3), ItemId::new(4)],
            capability: Some(Category::Instrument),
        });
        assert_eq!(field_text(&value), "3,4");
        let raw = RawField {
            key: "link".into(),
            kind: "ObjectLink".into(),
            capability: Some("Instrument".into()),
            text: "3,4".into(),
        };
        assert_eq!(raw.into_value().unwrap(), value);
    }

    #[test]
    fn rejects_non_numeric_int_content() {
        let raw = RawField {
            key: "count".into(),
            kind: "Int".into(),
            capability: None,
            text: "not-a-number".into(),
        };
        assert!(matches!(raw.into_value().unwrap_err(), Error::InvalidData { .. }));
    }

    #[test]
    fn empty_object_link_round_trips_to_empty_text() {
        let value = FieldValue::ObjectLink(ObjectLinkValue::default());
        assert_eq!(field_text(&value), "");
    }
}
